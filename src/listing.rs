use crate::backend::traits::DocumentStore;
use crate::backend::Backend;
use crate::config::Config;
use crate::error::MarketError;
use crate::feed::FeedFilter;
use crate::models::Listing;
use crate::notify::Notifier;
use crate::session::Session;
use tracing::{info, warn};

/// Fetch a single listing by id
pub async fn fetch_listing(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Listing, MarketError> {
    let doc = store
        .get(collection, id)
        .await
        .map_err(MarketError::Store)?
        .ok_or_else(|| MarketError::not_found("listing", id))?;
    Listing::from_document(&doc).map_err(MarketError::Store)
}

/// Whether the viewer gets the "contact owner" action for a listing
pub fn can_contact(listing: &Listing, viewer: Option<&Session>) -> bool {
    viewer.map_or(true, |session| !session.owns(listing))
}

/// All listings of the signed-in user, newest first
pub async fn owner_listings(
    backend: &Backend,
    config: &Config,
    session: &Session,
) -> Result<Vec<Listing>, MarketError> {
    let query = FeedFilter::Owner(session.uid().to_string()).query();
    let page = backend
        .store
        .query(&config.listings_collection, query)
        .await
        .map_err(MarketError::Store)?;

    page.documents
        .iter()
        .map(Listing::from_document)
        .collect::<Result<Vec<_>, _>>()
        .map_err(MarketError::Store)
}

/// Delete one of the user's listings and drop it from the displayed list.
///
/// When a notifier is given, the outcome is published to it.
pub async fn delete_listing(
    backend: &Backend,
    config: &Config,
    session: &Session,
    listings: Vec<Listing>,
    listing_id: &str,
    notifier: Option<&Notifier>,
) -> Result<Vec<Listing>, MarketError> {
    match remove_owned(backend, config, session, listing_id).await {
        Ok(()) => {
            info!(listing = listing_id, "Deleted listing");
            if let Some(notifier) = notifier {
                notifier.success("Successfully deleted listing");
            }
            Ok(listings.into_iter().filter(|l| l.id != listing_id).collect())
        }
        Err(err) => {
            warn!(listing = listing_id, error = %err, "Could not delete listing");
            if let Some(notifier) = notifier {
                notifier.report(&err);
            }
            Err(err)
        }
    }
}

async fn remove_owned(
    backend: &Backend,
    config: &Config,
    session: &Session,
    listing_id: &str,
) -> Result<(), MarketError> {
    let listing =
        fetch_listing(backend.store.as_ref(), &config.listings_collection, listing_id).await?;
    if !session.owns(&listing) {
        return Err(MarketError::Authorization {
            listing: listing_id.to_string(),
            user: session.uid().to_string(),
        });
    }

    backend
        .store
        .delete(&config.listings_collection, listing_id)
        .await
        .map_err(MarketError::Persistence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingType;
    use crate::notify::Notice;
    use crate::test_support::{seed_listings, seed_offer, TestBackend};

    #[tokio::test]
    async fn test_fetch_listing_and_missing() {
        let env = TestBackend::new();
        let id = seed_offer(&env.store, "U1").await;

        let listing = fetch_listing(env.store.as_ref(), "listings", &id).await.unwrap();
        assert_eq!(listing.id, id);
        assert_eq!(listing.discount(), Some(20_000));

        let missing = fetch_listing(env.store.as_ref(), "listings", "gone").await;
        assert_eq!(missing, Err(MarketError::not_found("listing", "gone")));
    }

    #[tokio::test]
    async fn test_owner_cannot_contact_self() {
        let env = TestBackend::new();
        let owner = env.sign_up("owner@example.com").await;
        let id = seed_offer(&env.store, owner.uid()).await;
        let listing = fetch_listing(env.store.as_ref(), "listings", &id).await.unwrap();

        assert!(!can_contact(&listing, Some(&owner)));
        assert!(can_contact(&listing, None));
        let visitor = env.sign_up("visitor@example.com").await;
        assert!(can_contact(&listing, Some(&visitor)));
    }

    #[tokio::test]
    async fn test_owner_listings_and_delete() {
        let env = TestBackend::new();
        let owner = env.sign_up("owner@example.com").await;
        seed_listings(&env.store, 3, ListingType::Rent, owner.uid()).await;
        seed_listings(&env.store, 2, ListingType::Rent, "someone-else").await;

        let listings = owner_listings(&env.backend, &env.config, &owner).await.unwrap();
        assert_eq!(listings.len(), 3);
        assert!(listings.iter().all(|l| l.owner_ref == owner.uid()));

        let target = listings[1].id.clone();
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let remaining = delete_listing(
            &env.backend,
            &env.config,
            &owner,
            listings,
            &target,
            Some(&notifier),
        )
        .await
        .unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|l| l.id != target));
        assert_eq!(env.store.count("listings").await, 4);
        assert_eq!(
            notices.recv().await.unwrap(),
            Notice::Success("Successfully deleted listing".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_foreign_listing_refused() {
        let env = TestBackend::new();
        let id = seed_offer(&env.store, "U1").await;
        let intruder = env.sign_up("intruder@example.com").await;

        let result =
            delete_listing(&env.backend, &env.config, &intruder, Vec::new(), &id, None).await;

        assert!(matches!(result, Err(MarketError::Authorization { .. })));
        assert_eq!(env.store.count("listings").await, 1);
    }
}
