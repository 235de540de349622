//! Client-side data layer for a real-estate listing marketplace.
//!
//! Listings, users and images live in hosted services reached through the
//! collaborator traits in [`backend`]. This crate owns the listing feeds,
//! the create/edit submission workflow, session derivation and the account
//! and contact operations built on top of them.

pub mod account;
pub mod backend;
pub mod config;
pub mod contact;
pub mod error;
pub mod feed;
pub mod listing;
pub mod models;
pub mod notify;
pub mod session;
pub mod submission;

#[cfg(test)]
mod test_support;

pub use backend::Backend;
pub use config::Config;
pub use error::MarketError;
pub use session::Session;
