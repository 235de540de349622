//! Shared fixtures for the in-module test suites.

use crate::backend::traits::{AuthProvider, DocumentStore};
use crate::backend::types::Record;
use crate::backend::{Backend, MemoryAuth, MemoryBlobStore, MemoryStore};
use crate::config::Config;
use crate::models::{ImageFile, ListingType};
use crate::session::Session;
use crate::submission::{FormInput, ListingField, ListingForm};
use serde_json::json;
use std::sync::Arc;

pub struct TestBackend {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub auth: Arc<MemoryAuth>,
    pub backend: Backend,
    pub config: Config,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::with_blobs(MemoryBlobStore::new("https://cdn.test"))
    }

    pub fn with_blobs(blobs: MemoryBlobStore) -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(blobs);
        let auth = Arc::new(MemoryAuth::new());
        let backend = Backend::new(store.clone(), blobs.clone(), auth.clone());
        Self {
            store,
            blobs,
            auth,
            backend,
            config: Config::default(),
        }
    }

    /// Register and sign in a user, returning their session
    pub async fn sign_up(&self, email: &str) -> Session {
        let user = self.auth.sign_up(email, "secret-password").await.unwrap();
        Session::new(user)
    }
}

pub fn image(name: &str) -> ImageFile {
    ImageFile::new(name, name.as_bytes().to_vec())
}

/// A form that passes validation, with `images` attached
pub fn valid_form(images: usize) -> ListingForm {
    let mut form = ListingForm::default();
    form.mutate(ListingField::Type, FormInput::Text("sale".to_string())).unwrap();
    form.mutate(ListingField::Name, FormInput::Text("Bright loft by the river".to_string()))
        .unwrap();
    form.mutate(ListingField::Bedrooms, FormInput::Number(2.0)).unwrap();
    form.mutate(ListingField::Bathrooms, FormInput::Number(1.0)).unwrap();
    form.mutate(ListingField::Parking, FormInput::Toggle(true)).unwrap();
    form.mutate(ListingField::Address, FormInput::Text("4 River Walk, Leeds".to_string()))
        .unwrap();
    form.mutate(ListingField::Latitude, FormInput::Number(53.79)).unwrap();
    form.mutate(ListingField::Longitude, FormInput::Number(-1.54)).unwrap();
    form.mutate(ListingField::RegularPrice, FormInput::Number(320_000.0)).unwrap();
    let files = (1..=images).map(|n| image(&format!("photo{n}.jpg"))).collect();
    form.mutate(ListingField::Images, FormInput::Files(files)).unwrap();
    form
}

pub async fn seed_listings(store: &MemoryStore, count: usize, kind: ListingType, owner: &str) {
    for n in 0..count {
        let record = Record::from_serialize(&json!({
            "type": kind.as_str(),
            "name": format!("Seeded {kind} listing {n:02}"),
            "bedrooms": 1 + (n % 4),
            "bathrooms": 1,
            "parking": n % 2 == 0,
            "furnished": false,
            "offer": false,
            "regularPrice": 1000 + n * 10,
            "location": format!("{n} Seed Street"),
            "geolocation": { "lat": 0.0, "lng": 0.0 },
            "imgUrls": [format!("https://cdn.test/seed-{n}.jpg")],
            "userRef": owner,
        }))
        .unwrap()
        .with_server_timestamp();
        store.create("listings", record).await.unwrap();
    }
}

pub async fn seed_offer(store: &MemoryStore, owner: &str) -> String {
    let record = Record::from_serialize(&json!({
        "type": "sale",
        "name": "Discounted corner house",
        "bedrooms": 3,
        "bathrooms": 2,
        "parking": true,
        "furnished": true,
        "offer": true,
        "regularPrice": 400000,
        "discountedPrice": 380000,
        "location": "1 Corner Lane",
        "geolocation": { "lat": 1.0, "lng": 2.0 },
        "imgUrls": ["https://cdn.test/corner.jpg"],
        "userRef": owner,
    }))
    .unwrap()
    .with_server_timestamp();
    store.create("listings", record).await.unwrap()
}
