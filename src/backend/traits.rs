use crate::backend::types::{
    AuthStream, AuthUser, Document, GeocodedAddress, Page, Query, Record, UploadStream,
};
use crate::error::{AuthError, GeocodeError, StoreError};
use async_trait::async_trait;

/// Document database holding the listings and users collections
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a record under a store-assigned id
    async fn create(&self, collection: &str, record: Record) -> Result<String, StoreError>;

    /// Create or replace the document with the given id
    async fn set(&self, collection: &str, id: &str, record: Record) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Merge fields into an existing document
    async fn update(&self, collection: &str, id: &str, patch: Record) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn query(&self, collection: &str, query: Query) -> Result<Page, StoreError>;
}

/// Managed blob storage for listing images
pub trait BlobStore: Send + Sync {
    /// Start an upload; the stream ends with the download URL or an error
    fn upload(&self, path: &str, bytes: Vec<u8>) -> UploadStream;
}

/// Hosted authentication provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    /// Stream of auth state, beginning with the current state
    fn auth_events(&self) -> AuthStream;

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;

    /// Federated sign-in through the configured identity provider
    async fn sign_in_with_provider(&self) -> Result<AuthUser, AuthError>;

    async fn update_profile(&self, display_name: &str) -> Result<AuthUser, AuthError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Resolves free-text addresses to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError>;
}
