use crate::backend::types::Document;
use crate::error::{StoreError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category a listing is offered under
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Rent,
    Sale,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Rent => "rent",
            ListingType::Sale => "sale",
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingType {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rent" => Ok(ListingType::Rent),
            "sale" | "sell" => Ok(ListingType::Sale),
            other => Err(ValidationError::UnknownListingType {
                value: other.to_string(),
            }),
        }
    }
}

/// Latitude/longitude pair stored with every listing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Property listing as read back from the listings collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Store-assigned document id (not part of the stored fields)
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ListingType,
    pub name: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub parking: bool,
    pub furnished: bool,
    pub offer: bool,
    pub regular_price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<u64>,
    pub location: String,
    pub geolocation: GeoPoint,
    /// Ordered image URLs, the first one is the cover
    #[serde(rename = "imgUrls")]
    pub image_urls: Vec<String>,
    #[serde(rename = "userRef")]
    pub owner_ref: String,
    #[serde(rename = "timestamp", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Decode a listing from a stored document, carrying over its id
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut listing: Listing = doc.decode()?;
        listing.id = doc.id.clone();
        Ok(listing)
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }

    /// Amount taken off the regular price when the listing is on offer
    pub fn discount(&self) -> Option<u64> {
        match (self.offer, self.discounted_price) {
            (true, Some(discounted)) => Some(self.regular_price.saturating_sub(discounted)),
            _ => None,
        }
    }

    /// Price shown on listing cards
    pub fn display_price(&self) -> u64 {
        match (self.offer, self.discounted_price) {
            (true, Some(discounted)) => discounted,
            _ => self.regular_price,
        }
    }
}

/// Registered user as stored in the users collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub email: String,
    #[serde(rename = "timestamp", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut user: User = doc.decode()?;
        user.id = doc.id.clone();
        Ok(user)
    }
}

/// Raw image selected in the listing form
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}
