pub mod geocoding;
pub mod memory;
pub mod traits;
pub mod types;

pub use geocoding::GoogleGeocoder;
pub use memory::{MemoryAuth, MemoryBlobStore, MemoryStore};
pub use traits::{AuthProvider, BlobStore, DocumentStore, Geocoder};

use std::sync::Arc;

/// Handles to the external services every component talks to
#[derive(Clone)]
pub struct Backend {
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

impl Backend {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            store,
            blobs,
            auth,
            geocoder: None,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }
}
