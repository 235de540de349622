use thiserror::Error;

/// Failures reported by a document store implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Update targeted a document that does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// Cursor was produced by a query with a different filter or order.
    #[error("cursor does not belong to this query")]
    CursorMismatch,

    /// Records must serialize to a JSON object.
    #[error("record must be a JSON object")]
    NotAnObject,

    #[error("failed to encode record: {message}")]
    Encode { message: String },

    #[error("failed to decode document {id}: {message}")]
    Decode { id: String, message: String },

    /// Backend is unreachable or rejected the call.
    #[error("document store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Failures reported while uploading a single blob.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BlobError {
    #[error("upload of {path} failed: {message}")]
    Failed { path: String, message: String },

    /// Progress stream ended without reporting a download URL.
    #[error("upload of {path} ended without a download URL")]
    Incomplete { path: String },
}

/// Failures reported by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("an account already exists for {email}")]
    EmailInUse { email: String },

    #[error("no account exists for {email}")]
    UnknownEmail { email: String },

    #[error("password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("no user is signed in")]
    NotSignedIn,

    #[error("identity provider failed: {message}")]
    Provider { message: String },
}

/// Failures reported by a geocoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {message}")]
    Request { message: String },

    #[error("geocoding returned status {status}")]
    Status { status: String },

    #[error("no geocoding results for {address:?}")]
    NoResults { address: String },
}

/// Rejections raised by form mutation and listing validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("discounted price {discounted} must be less than regular price {regular}")]
    DiscountNotBelowRegular { discounted: u64, regular: u64 },

    #[error("{count} images selected, at most {max} allowed")]
    TooManyImages { count: usize, max: usize },

    #[error("at least one image is required")]
    NoImages,

    #[error("name must be between {min} and {max} characters, got {len}")]
    NameLength { len: usize, min: usize, max: usize },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{field} expects a whole non-negative number, got {value}")]
    InvalidNumber { field: &'static str, value: f64 },

    #[error("{field} expects {expected} input, got {actual}")]
    FieldKind {
        field: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unknown listing type {value:?}")]
    UnknownListingType { value: String },

    #[error("could not resolve address {address:?}")]
    Address { address: String },
}

/// Error classes surfaced by the marketplace operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// One image of the batch failed; nothing was written.
    #[error("image upload failed: {0}")]
    Upload(#[source] BlobError),

    /// Store write failed after any uploads succeeded.
    #[error("could not persist record: {0}")]
    Persistence(#[source] StoreError),

    /// Store read failed.
    #[error("could not read from the store: {0}")]
    Store(#[source] StoreError),

    /// Geocoding service failed for reasons other than an unknown address.
    #[error("geocoding unavailable: {0}")]
    Geocoding(#[source] GeocodeError),

    #[error("user {user} may not modify listing {listing}")]
    Authorization { listing: String, user: String },

    #[error("{what} {id} does not exist")]
    NotFound { what: &'static str, id: String },

    #[error("sign in required")]
    Unauthenticated,

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The consumer went away before the result could be applied.
    #[error("operation cancelled")]
    Cancelled,

    #[error("listing was already submitted")]
    AlreadySubmitted,
}

impl MarketError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Text of the transient notification shown for this error.
    ///
    /// Returns `None` when nobody is left to show it to.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            MarketError::Validation(ValidationError::DiscountNotBelowRegular { .. }) => {
                "Discounted price needs to be less than regular price".to_string()
            }
            MarketError::Validation(ValidationError::TooManyImages { max, .. }) => {
                format!("Max {max} images")
            }
            MarketError::Validation(ValidationError::Address { .. }) => {
                "Please enter a correct address".to_string()
            }
            MarketError::Validation(other) => other.to_string(),
            MarketError::Upload(_) => "Images not uploaded".to_string(),
            MarketError::Persistence(_) => "Could not save changes".to_string(),
            MarketError::Store(_) => "Could not fetch listings".to_string(),
            MarketError::Geocoding(_) => {
                "Address lookup is unavailable, please try again later".to_string()
            }
            MarketError::Authorization { .. } => "You can not edit this listing".to_string(),
            MarketError::NotFound { what: "user", .. } => "Could not get landlord data".to_string(),
            MarketError::NotFound { what, .. } => format!("{} does not exist", capitalize(what)),
            MarketError::Unauthenticated => "Please sign in to continue".to_string(),
            MarketError::Auth(AuthError::InvalidCredentials) => "Bad user credentials".to_string(),
            MarketError::Auth(AuthError::Provider { .. }) => {
                "Could not authorize with Google".to_string()
            }
            MarketError::Auth(AuthError::UnknownEmail { .. }) => {
                "Could not send reset email".to_string()
            }
            MarketError::Auth(_) => "Something went wrong with registration".to_string(),
            MarketError::AlreadySubmitted => "Listing was already saved".to_string(),
            MarketError::Cancelled => return None,
        };
        Some(message)
    }

    /// Whether the caller should navigate back to the home view.
    pub fn redirects_home(&self) -> bool {
        matches!(
            self,
            MarketError::Authorization { .. } | MarketError::NotFound { what: "listing", .. }
        )
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
