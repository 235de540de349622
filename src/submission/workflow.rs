use crate::backend::types::Record;
use crate::backend::Backend;
use crate::config::Config;
use crate::error::{GeocodeError, MarketError, ValidationError};
use crate::listing::fetch_listing;
use crate::models::{GeoPoint, ListingType};
use crate::notify::Notifier;
use crate::session::Session;
use crate::submission::form::{FormInput, ListingField, ListingForm};
use crate::submission::upload::upload_images;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Progress of a listing submission.
///
/// `Done` is terminal; every failure returns to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Validating,
    UploadingImages,
    Persisting,
    Done(Submitted),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionMode {
    Create,
    Edit { listing_id: String, owner_ref: String },
}

/// Saved listing, enough to navigate to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub id: String,
    pub kind: ListingType,
}

impl Submitted {
    pub fn path(&self) -> String {
        format!("/category/{}/{}", self.kind, self.id)
    }
}

/// Fields written to the listings collection
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    #[serde(rename = "type")]
    pub kind: ListingType,
    pub name: String,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub parking: bool,
    pub furnished: bool,
    pub offer: bool,
    pub regular_price: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discounted_price: Option<u64>,
    pub location: String,
    pub geolocation: GeoPoint,
    #[serde(rename = "imgUrls")]
    pub image_urls: Vec<String>,
    #[serde(rename = "userRef")]
    pub owner_ref: String,
}

impl ListingRecord {
    /// Merge the form with its uploaded image URLs and resolved location.
    ///
    /// Raw files and the free-text address are left behind; the discounted
    /// price is only kept for offers.
    pub fn assemble(
        form: &ListingForm,
        image_urls: Vec<String>,
        location: String,
        geolocation: GeoPoint,
        owner_ref: &str,
    ) -> Self {
        Self {
            kind: form.kind,
            name: form.name.trim().to_string(),
            bedrooms: form.bedrooms,
            bathrooms: form.bathrooms,
            parking: form.parking,
            furnished: form.furnished,
            offer: form.offer,
            regular_price: form.regular_price,
            discounted_price: form.offer.then_some(form.discounted_price),
            location,
            geolocation,
            image_urls,
            owner_ref: owner_ref.to_string(),
        }
    }
}

/// Create or edit workflow for one listing form
pub struct ListingSubmission {
    backend: Backend,
    config: Config,
    mode: SubmissionMode,
    form: ListingForm,
    state: SubmissionState,
    mounted: CancellationToken,
    notifier: Option<Notifier>,
}

impl ListingSubmission {
    /// Start a new listing with an empty form
    pub fn create(backend: &Backend, config: &Config, mounted: CancellationToken) -> Self {
        Self {
            backend: backend.clone(),
            config: config.clone(),
            mode: SubmissionMode::Create,
            form: ListingForm::default(),
            state: SubmissionState::Idle,
            mounted,
            notifier: None,
        }
    }

    /// Load an existing listing for editing.
    ///
    /// Fails with `NotFound` when it is gone and with `Authorization` when
    /// the session user does not own it.
    pub async fn edit(
        backend: &Backend,
        config: &Config,
        session: &Session,
        listing_id: &str,
        mounted: CancellationToken,
    ) -> Result<Self, MarketError> {
        let listing =
            fetch_listing(backend.store.as_ref(), &config.listings_collection, listing_id).await?;

        if !session.owns(&listing) {
            warn!(listing = listing_id, user = session.uid(), "Edit refused, not the owner");
            return Err(MarketError::Authorization {
                listing: listing_id.to_string(),
                user: session.uid().to_string(),
            });
        }

        Ok(Self {
            backend: backend.clone(),
            config: config.clone(),
            mode: SubmissionMode::Edit {
                listing_id: listing.id.clone(),
                owner_ref: listing.owner_ref.clone(),
            },
            form: ListingForm::from_listing(&listing),
            state: SubmissionState::Idle,
            mounted,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn mode(&self) -> &SubmissionMode {
        &self.mode
    }

    pub fn form(&self) -> &ListingForm {
        &self.form
    }

    pub fn mutate(&mut self, field: ListingField, input: FormInput) -> Result<(), MarketError> {
        if matches!(self.state, SubmissionState::Done(_)) {
            return Err(MarketError::AlreadySubmitted);
        }
        self.form.mutate(field, input)?;
        Ok(())
    }

    /// Run the workflow: validate, upload images, persist.
    ///
    /// On success the submission is `Done` and cannot be submitted again.
    pub async fn submit(&mut self, session: &Session) -> Result<Submitted, MarketError> {
        if matches!(self.state, SubmissionState::Done(_)) {
            return Err(MarketError::AlreadySubmitted);
        }

        match self.run(session).await {
            Ok(submitted) => {
                info!(id = %submitted.id, kind = %submitted.kind, "Listing saved");
                if let Some(notifier) = &self.notifier {
                    notifier.success("Listing saved");
                }
                self.state = SubmissionState::Done(submitted.clone());
                Ok(submitted)
            }
            Err(err) => {
                warn!(error = %err, "Listing submission failed");
                if let Some(notifier) = &self.notifier {
                    notifier.report(&err);
                }
                self.state = SubmissionState::Idle;
                Err(err)
            }
        }
    }

    async fn run(&mut self, session: &Session) -> Result<Submitted, MarketError> {
        if let SubmissionMode::Edit {
            listing_id,
            owner_ref,
        } = &self.mode
        {
            if owner_ref != session.uid() {
                return Err(MarketError::Authorization {
                    listing: listing_id.clone(),
                    user: session.uid().to_string(),
                });
            }
        }

        self.state = SubmissionState::Validating;
        self.form.validate(self.config.max_images)?;
        let (geolocation, location) = self.resolve_location().await?;
        self.ensure_mounted()?;

        self.state = SubmissionState::UploadingImages;
        let image_urls = upload_images(
            self.backend.blobs.as_ref(),
            &self.config.image_prefix,
            session.uid(),
            &self.form.images,
        )
        .await
        .map_err(MarketError::Upload)?;
        self.ensure_mounted()?;

        self.state = SubmissionState::Persisting;
        let record = ListingRecord::assemble(
            &self.form,
            image_urls,
            location,
            geolocation,
            session.uid(),
        );
        let record = Record::from_serialize(&record)
            .map_err(MarketError::Persistence)?
            .with_server_timestamp();

        let store = self.backend.store.as_ref();
        let collection = self.config.listings_collection.as_str();
        let id = match &self.mode {
            SubmissionMode::Create => store
                .create(collection, record)
                .await
                .map_err(MarketError::Persistence)?,
            SubmissionMode::Edit { listing_id, .. } => {
                store
                    .set(collection, listing_id, record)
                    .await
                    .map_err(MarketError::Persistence)?;
                listing_id.clone()
            }
        };

        Ok(Submitted {
            id,
            kind: self.form.kind,
        })
    }

    /// Coordinates and display location for the record
    async fn resolve_location(&self) -> Result<(GeoPoint, String), MarketError> {
        let geocoder = match (&self.backend.geocoder, self.config.geolocation_enabled) {
            (Some(geocoder), true) => geocoder,
            _ => {
                let point = GeoPoint {
                    lat: self.form.latitude,
                    lng: self.form.longitude,
                };
                return Ok((point, self.form.address.trim().to_string()));
            }
        };

        match geocoder.geocode(&self.form.address).await {
            Ok(resolved) => Ok((resolved.point, resolved.formatted_address)),
            Err(GeocodeError::NoResults { .. }) => {
                warn!(address = %self.form.address, "Address could not be geocoded");
                Err(ValidationError::Address {
                    address: self.form.address.clone(),
                }
                .into())
            }
            Err(err) => {
                warn!(error = %err, "Geocoding service failed");
                Err(MarketError::Geocoding(err))
            }
        }
    }

    fn ensure_mounted(&self) -> Result<(), MarketError> {
        if self.mounted.is_cancelled() {
            return Err(MarketError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::WriteKind;
    use crate::backend::traits::{DocumentStore, Geocoder};
    use crate::backend::types::GeocodedAddress;
    use crate::backend::MemoryBlobStore;
    use crate::models::Listing;
    use crate::notify::Notice;
    use crate::test_support::{seed_offer, valid_form, TestBackend};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    fn fill(submission: &mut ListingSubmission, form: ListingForm) {
        submission.form = form;
    }

    async fn stored(env: &TestBackend, id: &str) -> Listing {
        let doc = env.store.get("listings", id).await.unwrap().unwrap();
        Listing::from_document(&doc).unwrap()
    }

    #[tokio::test]
    async fn test_create_listing() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        fill(&mut submission, valid_form(3));

        let submitted = submission.submit(&session).await.unwrap();

        assert_eq!(submitted.kind, ListingType::Sale);
        assert_eq!(submitted.path(), format!("/category/sale/{}", submitted.id));
        assert_eq!(submission.state(), &SubmissionState::Done(submitted.clone()));

        let listing = stored(&env, &submitted.id).await;
        assert_eq!(listing.owner_ref, session.uid());
        assert_eq!(listing.image_urls.len(), 3);
        assert!(listing.image_urls[0].contains("photo1.jpg"));
        assert_eq!(listing.location, "4 River Walk, Leeds");
        assert_eq!(listing.geolocation, GeoPoint { lat: 53.79, lng: -1.54 });
        assert!(listing.created_at.is_some());
    }

    #[tokio::test]
    async fn test_record_drops_transient_fields() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        let mut form = valid_form(1);
        form.discounted_price = 100;
        fill(&mut submission, form);

        let submitted = submission.submit(&session).await.unwrap();

        let doc = env.store.get("listings", &submitted.id).await.unwrap().unwrap();
        assert!(!doc.data.contains_key("discountedPrice"));
        assert!(!doc.data.contains_key("images"));
        assert!(!doc.data.contains_key("address"));
        assert!(!doc.data.contains_key("latitude"));
        assert!(doc.data.contains_key("timestamp"));
    }

    #[tokio::test]
    async fn test_offer_keeps_discounted_price() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        let mut form = valid_form(1);
        form.offer = true;
        form.discounted_price = 300_000;
        fill(&mut submission, form);

        let submitted = submission.submit(&session).await.unwrap();

        let listing = stored(&env, &submitted.id).await;
        assert_eq!(listing.discounted_price, Some(300_000));
        assert!(listing.discounted_price < Some(listing.regular_price));
    }

    #[tokio::test]
    async fn test_too_many_images_rejected_before_upload() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        fill(&mut submission, valid_form(7));

        let err = submission.submit(&session).await.unwrap_err();

        assert_eq!(
            err,
            MarketError::Validation(ValidationError::TooManyImages { count: 7, max: 6 })
        );
        assert_eq!(submission.state(), &SubmissionState::Idle);
        assert!(env.blobs.stored_paths().await.is_empty());
        assert!(env.store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_writes_nothing() {
        let env = TestBackend::with_blobs(
            MemoryBlobStore::new("https://cdn.test").failing_on("photo2"),
        );
        let session = env.sign_up("owner@example.com").await;
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new())
                .with_notifier(notifier);
        fill(&mut submission, valid_form(3));

        let err = submission.submit(&session).await.unwrap_err();

        assert!(matches!(err, MarketError::Upload(_)));
        assert_eq!(submission.state(), &SubmissionState::Idle);
        assert_eq!(env.store.count("listings").await, 0);
        assert!(env.store.writes().await.is_empty());
        assert_eq!(
            notices.recv().await.unwrap(),
            Notice::Error("Images not uploaded".to_string())
        );
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_persistence_failure_returns_to_idle() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        fill(&mut submission, valid_form(2));
        env.store.set_unavailable(true).await;

        let err = submission.submit(&session).await.unwrap_err();

        assert!(matches!(err, MarketError::Persistence(_)));
        assert_eq!(submission.state(), &SubmissionState::Idle);
        // Uploaded blobs are left behind
        assert_eq!(env.blobs.stored_paths().await.len(), 2);

        env.store.set_unavailable(false).await;
        assert!(submission.submit(&session).await.is_ok());
    }

    #[tokio::test]
    async fn test_done_is_terminal() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        fill(&mut submission, valid_form(1));
        submission.submit(&session).await.unwrap();

        assert_eq!(
            submission.submit(&session).await,
            Err(MarketError::AlreadySubmitted)
        );
        assert_eq!(
            submission.mutate(ListingField::Offer, FormInput::Toggle(true)),
            Err(MarketError::AlreadySubmitted)
        );
        assert!(matches!(submission.state(), SubmissionState::Done(_)));
        assert_eq!(env.store.count("listings").await, 1);
    }

    #[tokio::test]
    async fn test_unmounted_submission_does_not_persist() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let mounted = CancellationToken::new();
        let mut submission = ListingSubmission::create(&env.backend, &env.config, mounted.clone());
        fill(&mut submission, valid_form(1));
        mounted.cancel();

        assert_eq!(submission.submit(&session).await, Err(MarketError::Cancelled));
        assert_eq!(submission.state(), &SubmissionState::Idle);
        assert!(env.store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_unmount_during_upload_does_not_persist() {
        let env = TestBackend::with_blobs(
            MemoryBlobStore::new("https://cdn.test")
                .delayed_on("photo1", Duration::from_millis(50)),
        );
        let session = env.sign_up("owner@example.com").await;
        let mounted = CancellationToken::new();
        let mut submission = ListingSubmission::create(&env.backend, &env.config, mounted.clone());
        fill(&mut submission, valid_form(2));

        let unmount = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            mounted.cancel();
        });
        let result = submission.submit(&session).await;
        unmount.await.unwrap();

        assert_eq!(result, Err(MarketError::Cancelled));
        assert_eq!(submission.state(), &SubmissionState::Idle);
        // The upload itself completed after teardown
        assert_eq!(env.blobs.stored_paths().await.len(), 2);
        assert!(env.store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_by_other_user_is_refused() {
        let env = TestBackend::new();
        let listing_id = seed_offer(&env.store, "U1").await;
        let writes_before = env.store.writes().await.len();
        let intruder = Session::new(crate::backend::types::AuthUser {
            uid: "U2".to_string(),
            email: "u2@example.com".to_string(),
            display_name: None,
        });

        let result = ListingSubmission::edit(
            &env.backend,
            &env.config,
            &intruder,
            &listing_id,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(MarketError::Authorization { .. })));
        assert_eq!(env.store.writes().await.len(), writes_before);
    }

    #[tokio::test]
    async fn test_edit_missing_listing() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;

        let result = ListingSubmission::edit(
            &env.backend,
            &env.config,
            &session,
            "nope",
            CancellationToken::new(),
        )
        .await;

        let err = result.err().unwrap();
        assert_eq!(err, MarketError::not_found("listing", "nope"));
        assert!(err.redirects_home());
    }

    #[tokio::test]
    async fn test_edit_overwrites_listing() {
        let env = TestBackend::new();
        let session = env.sign_up("owner@example.com").await;
        let listing_id = seed_offer(&env.store, session.uid()).await;

        let mut submission = ListingSubmission::edit(
            &env.backend,
            &env.config,
            &session,
            &listing_id,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(submission.form().address, "1 Corner Lane");

        submission
            .mutate(ListingField::Offer, FormInput::Toggle(false))
            .unwrap();
        submission
            .mutate(
                ListingField::Images,
                FormInput::Files(vec![crate::test_support::image("kitchen.jpg")]),
            )
            .unwrap();
        let submitted = submission.submit(&session).await.unwrap();

        assert_eq!(submitted.id, listing_id);
        let listing = stored(&env, &listing_id).await;
        assert!(!listing.offer);
        assert_eq!(listing.discounted_price, None);
        assert_eq!(listing.image_urls.len(), 1);
        assert_eq!(env.store.count("listings").await, 1);
        let kinds: Vec<_> = env.store.writes().await.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WriteKind::Create, WriteKind::Set]);
    }

    #[tokio::test]
    async fn test_edit_with_foreign_session_rejected_at_submit() {
        let env = TestBackend::new();
        let owner = env.sign_up("owner@example.com").await;
        let listing_id = seed_offer(&env.store, owner.uid()).await;
        let mut submission = ListingSubmission::edit(
            &env.backend,
            &env.config,
            &owner,
            &listing_id,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        submission
            .mutate(
                ListingField::Images,
                FormInput::Files(vec![crate::test_support::image("hall.jpg")]),
            )
            .unwrap();

        let other = env.sign_up("other@example.com").await;
        let err = submission.submit(&other).await.unwrap_err();

        assert!(matches!(err, MarketError::Authorization { .. }));
        assert!(env.blobs.stored_paths().await.is_empty());
    }

    struct FixedGeocoder;

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
            if address.contains("Nowhere") {
                return Err(GeocodeError::NoResults {
                    address: address.to_string(),
                });
            }
            Ok(GeocodedAddress {
                point: GeoPoint { lat: 10.0, lng: 20.0 },
                formatted_address: "4 River Walk, Leeds LS1, UK".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_geocoded_location() {
        let mut env = TestBackend::new();
        env.backend = env.backend.clone().with_geocoder(Arc::new(FixedGeocoder));
        env.config.geolocation_enabled = true;
        let session = env.sign_up("owner@example.com").await;

        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        fill(&mut submission, valid_form(1));
        let submitted = submission.submit(&session).await.unwrap();
        let listing = stored(&env, &submitted.id).await;
        assert_eq!(listing.location, "4 River Walk, Leeds LS1, UK");
        assert_eq!(listing.geolocation, GeoPoint { lat: 10.0, lng: 20.0 });

        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new());
        let mut form = valid_form(1);
        form.address = "Nowhere Road".to_string();
        fill(&mut submission, form);
        let err = submission.submit(&session).await.unwrap_err();
        assert_eq!(err.user_message().as_deref(), Some("Please enter a correct address"));
    }

    struct DownGeocoder;

    #[async_trait]
    impl Geocoder for DownGeocoder {
        async fn geocode(&self, _address: &str) -> Result<GeocodedAddress, GeocodeError> {
            Err(GeocodeError::Request {
                message: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_geocoder_outage_is_not_an_address_error() {
        let mut env = TestBackend::new();
        env.backend = env.backend.clone().with_geocoder(Arc::new(DownGeocoder));
        env.config.geolocation_enabled = true;
        let session = env.sign_up("owner@example.com").await;
        let notifier = Notifier::new();
        let mut notices = notifier.subscribe();
        let mut submission =
            ListingSubmission::create(&env.backend, &env.config, CancellationToken::new())
                .with_notifier(notifier);
        fill(&mut submission, valid_form(1));

        let err = submission.submit(&session).await.unwrap_err();

        assert_eq!(
            err,
            MarketError::Geocoding(GeocodeError::Request {
                message: "connection refused".to_string()
            })
        );
        assert_eq!(submission.state(), &SubmissionState::Idle);
        assert!(env.blobs.stored_paths().await.is_empty());
        assert!(env.store.writes().await.is_empty());
        assert_eq!(
            notices.recv().await.unwrap(),
            Notice::Error("Address lookup is unavailable, please try again later".to_string())
        );
    }
}
