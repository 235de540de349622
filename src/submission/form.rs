use crate::error::ValidationError;
use crate::models::{ImageFile, Listing, ListingType};

pub const NAME_MIN_LEN: usize = 10;
pub const NAME_MAX_LEN: usize = 32;
pub const ROOMS_MIN: u64 = 1;
pub const ROOMS_MAX: u64 = 50;
pub const PRICE_MIN: u64 = 50;
pub const PRICE_MAX: u64 = 750_000_000;

/// Field of the create/edit listing form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingField {
    Type,
    Name,
    Bedrooms,
    Bathrooms,
    Parking,
    Furnished,
    Address,
    Offer,
    RegularPrice,
    DiscountedPrice,
    Images,
    Latitude,
    Longitude,
}

impl ListingField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingField::Type => "type",
            ListingField::Name => "name",
            ListingField::Bedrooms => "bedrooms",
            ListingField::Bathrooms => "bathrooms",
            ListingField::Parking => "parking",
            ListingField::Furnished => "furnished",
            ListingField::Address => "address",
            ListingField::Offer => "offer",
            ListingField::RegularPrice => "regularPrice",
            ListingField::DiscountedPrice => "discountedPrice",
            ListingField::Images => "images",
            ListingField::Latitude => "latitude",
            ListingField::Longitude => "longitude",
        }
    }
}

/// Value coming from a form control; the caller picks the kind
#[derive(Debug, Clone, PartialEq)]
pub enum FormInput {
    Text(String),
    Number(f64),
    Toggle(bool),
    Files(Vec<ImageFile>),
}

impl FormInput {
    fn kind(&self) -> &'static str {
        match self {
            FormInput::Text(_) => "text",
            FormInput::Number(_) => "number",
            FormInput::Toggle(_) => "toggle",
            FormInput::Files(_) => "files",
        }
    }
}

/// Editable state of the listing form
#[derive(Debug, Clone, PartialEq)]
pub struct ListingForm {
    pub kind: ListingType,
    pub name: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub parking: bool,
    pub furnished: bool,
    pub address: String,
    pub offer: bool,
    pub regular_price: u64,
    pub discounted_price: u64,
    pub images: Vec<ImageFile>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for ListingForm {
    fn default() -> Self {
        Self {
            kind: ListingType::Rent,
            name: String::new(),
            bedrooms: 1,
            bathrooms: 1,
            parking: false,
            furnished: false,
            address: String::new(),
            offer: false,
            regular_price: 0,
            discounted_price: 0,
            images: Vec::new(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl ListingForm {
    /// Pre-fill the form from a stored listing; images must be picked again
    pub fn from_listing(listing: &Listing) -> Self {
        Self {
            kind: listing.kind,
            name: listing.name.clone(),
            bedrooms: listing.bedrooms,
            bathrooms: listing.bathrooms,
            parking: listing.parking,
            furnished: listing.furnished,
            address: listing.location.clone(),
            offer: listing.offer,
            regular_price: listing.regular_price,
            discounted_price: listing.discounted_price.unwrap_or(0),
            images: Vec::new(),
            latitude: listing.geolocation.lat,
            longitude: listing.geolocation.lng,
        }
    }

    /// Apply one control's value to its field
    pub fn mutate(&mut self, field: ListingField, input: FormInput) -> Result<(), ValidationError> {
        match (field, input) {
            (ListingField::Type, FormInput::Text(value)) => self.kind = value.parse()?,
            (ListingField::Name, FormInput::Text(value)) => self.name = value,
            (ListingField::Address, FormInput::Text(value)) => self.address = value,
            (ListingField::Bedrooms, FormInput::Number(value)) => {
                self.bedrooms = whole_number(field, value, u64::from(u32::MAX))? as u32
            }
            (ListingField::Bathrooms, FormInput::Number(value)) => {
                self.bathrooms = whole_number(field, value, u64::from(u32::MAX))? as u32
            }
            (ListingField::RegularPrice, FormInput::Number(value)) => {
                self.regular_price = whole_number(field, value, u64::MAX)?
            }
            (ListingField::DiscountedPrice, FormInput::Number(value)) => {
                self.discounted_price = whole_number(field, value, u64::MAX)?
            }
            (ListingField::Latitude, FormInput::Number(value)) => self.latitude = value,
            (ListingField::Longitude, FormInput::Number(value)) => self.longitude = value,
            (ListingField::Parking, FormInput::Toggle(value)) => self.parking = value,
            (ListingField::Furnished, FormInput::Toggle(value)) => self.furnished = value,
            (ListingField::Offer, FormInput::Toggle(value)) => self.offer = value,
            (ListingField::Images, FormInput::Files(files)) => self.images = files,
            (field, input) => {
                return Err(ValidationError::FieldKind {
                    field: field.as_str(),
                    expected: expected_kind(field),
                    actual: input.kind(),
                })
            }
        }
        Ok(())
    }

    /// Check the business rules before anything leaves the client.
    ///
    /// Price and image-count rules come first so their messages win.
    pub fn validate(&self, max_images: usize) -> Result<(), ValidationError> {
        if self.offer && self.discounted_price >= self.regular_price {
            return Err(ValidationError::DiscountNotBelowRegular {
                discounted: self.discounted_price,
                regular: self.regular_price,
            });
        }
        if self.images.len() > max_images {
            return Err(ValidationError::TooManyImages {
                count: self.images.len(),
                max: max_images,
            });
        }
        if self.images.is_empty() {
            return Err(ValidationError::NoImages);
        }

        let name_len = self.name.trim().chars().count();
        if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name_len) {
            return Err(ValidationError::NameLength {
                len: name_len,
                min: NAME_MIN_LEN,
                max: NAME_MAX_LEN,
            });
        }

        check_range("bedrooms", u64::from(self.bedrooms), ROOMS_MIN, ROOMS_MAX)?;
        check_range("bathrooms", u64::from(self.bathrooms), ROOMS_MIN, ROOMS_MAX)?;
        check_range("regularPrice", self.regular_price, PRICE_MIN, PRICE_MAX)?;
        if self.offer {
            check_range("discountedPrice", self.discounted_price, PRICE_MIN, PRICE_MAX)?;
        }
        Ok(())
    }
}

fn expected_kind(field: ListingField) -> &'static str {
    match field {
        ListingField::Type | ListingField::Name | ListingField::Address => "text",
        ListingField::Bedrooms
        | ListingField::Bathrooms
        | ListingField::RegularPrice
        | ListingField::DiscountedPrice
        | ListingField::Latitude
        | ListingField::Longitude => "number",
        ListingField::Parking | ListingField::Furnished | ListingField::Offer => "toggle",
        ListingField::Images => "files",
    }
}

fn whole_number(field: ListingField, value: f64, max: u64) -> Result<u64, ValidationError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > max as f64 {
        return Err(ValidationError::InvalidNumber {
            field: field.as_str(),
            value,
        });
    }
    Ok(value as u64)
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
