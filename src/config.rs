use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

/// Marketplace client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Listings per feed page
    pub page_size: usize,
    /// Listings shown in the recent-listings carousel
    pub carousel_size: usize,
    /// Maximum images per listing
    pub max_images: usize,
    /// Resolve the address through the geocoder instead of manual coordinates
    pub geolocation_enabled: bool,
    pub geocoding_api_key: Option<String>,
    pub listings_collection: String,
    pub users_collection: String,
    /// Blob path prefix for listing images
    pub image_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 10,
            carousel_size: 5,
            max_images: 6,
            geolocation_enabled: false,
            geocoding_api_key: None,
            listings_collection: "listings".to_string(),
            users_collection: "users".to_string(),
            image_prefix: "images".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();
        let config = Self {
            page_size: parse_var("MARKET_PAGE_SIZE", defaults.page_size)?,
            carousel_size: parse_var("MARKET_CAROUSEL_SIZE", defaults.carousel_size)?,
            max_images: parse_var("MARKET_MAX_IMAGES", defaults.max_images)?,
            geolocation_enabled: parse_flag("GEOLOCATION_ENABLED", defaults.geolocation_enabled)?,
            geocoding_api_key: env::var("GEOCODING_API_KEY").ok().filter(|k| !k.is_empty()),
            listings_collection: env::var("LISTINGS_COLLECTION")
                .unwrap_or(defaults.listings_collection),
            users_collection: env::var("USERS_COLLECTION").unwrap_or(defaults.users_collection),
            image_prefix: env::var("IMAGE_PREFIX").unwrap_or(defaults.image_prefix),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("MARKET_PAGE_SIZE must be at least 1");
        }
        if self.max_images == 0 {
            bail!("MARKET_MAX_IMAGES must be at least 1");
        }
        if self.geolocation_enabled && self.geocoding_api_key.is_none() {
            bail!("GEOCODING_API_KEY must be set when GEOLOCATION_ENABLED is true");
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid value, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// Boolean variable: `true`/`false`, `1`/`0`, `yes`/`no` or `on`/`off`
fn parse_flag(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match flag_value(&raw) {
            Some(value) => Ok(value),
            None => bail!("{key} must be true or false, got {raw:?}"),
        },
        Err(_) => Ok(default),
    }
}

fn flag_value(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
