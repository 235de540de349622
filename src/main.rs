use anyhow::{Context, Result};
use house_marketplace::account::Accounts;
use house_marketplace::backend::{Backend, GoogleGeocoder, MemoryAuth, MemoryBlobStore, MemoryStore};
use house_marketplace::feed::{recent_listings, FeedFilter, ListingFeed};
use house_marketplace::models::{ImageFile, ListingType};
use house_marketplace::notify::{Notice, Notifier};
use house_marketplace::session::watch_auth_status;
use house_marketplace::submission::{FormInput, ListingField, ListingSubmission};
use house_marketplace::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_LISTINGS: [(&str, ListingType, u64, f64); 6] = [
    ("Harbour view two bed flat", ListingType::Rent, 1_450, 2.0),
    ("Family home with garden", ListingType::Sale, 425_000, 4.0),
    ("Studio close to station", ListingType::Rent, 820, 1.0),
    ("Converted mill apartment", ListingType::Sale, 289_000, 2.0),
    ("Furnished room in townhouse", ListingType::Rent, 600, 1.0),
    ("Penthouse with roof terrace", ListingType::Rent, 3_200, 3.0),
];

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🏠 House Marketplace - listing workflow demo");

    let config = Config::from_env().context("Failed to load configuration")?;
    let mut backend = Backend::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBlobStore::new("https://storage.example.com/o")),
        Arc::new(MemoryAuth::new()),
    );
    if let Some(key) = config.geocoding_api_key.as_deref() {
        let geocoder = GoogleGeocoder::new(key).context("Failed to create geocoder")?;
        backend = backend.with_geocoder(Arc::new(geocoder));
    }

    let mounted = CancellationToken::new();
    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let status = watch_auth_status(backend.auth.as_ref(), mounted.clone());

    let accounts = Accounts::new(&backend, &config);
    let session = accounts
        .sign_up("Demo Landlord", "landlord@example.com", "demo-password")
        .await
        .context("Failed to register demo user")?;
    tokio::task::yield_now().await;
    info!("Signed in as {} (logged in: {})", session.uid(), status.borrow().logged_in);

    for (i, (name, kind, price, bedrooms)) in DEMO_LISTINGS.iter().enumerate() {
        let mut submission = ListingSubmission::create(&backend, &config, mounted.clone())
            .with_notifier(notifier.clone());
        let images = (1..=2)
            .map(|n| ImageFile::new(format!("listing{i}-{n}.jpg"), vec![0u8; 128 * 1024]))
            .collect();
        let inputs = [
            (ListingField::Type, FormInput::Text(kind.to_string())),
            (ListingField::Name, FormInput::Text(name.to_string())),
            (ListingField::Bedrooms, FormInput::Number(*bedrooms)),
            (ListingField::Address, FormInput::Text(format!("{} Demo Street", i + 1))),
            (ListingField::RegularPrice, FormInput::Number(*price as f64)),
            (ListingField::Offer, FormInput::Toggle(i % 3 == 0)),
            (ListingField::DiscountedPrice, FormInput::Number((*price * 9 / 10) as f64)),
            (ListingField::Images, FormInput::Files(images)),
        ];
        for (field, input) in inputs {
            submission.mutate(field, input)?;
        }

        match submission.submit(&session).await {
            Ok(saved) => info!("Saved {} → {}", name, saved.path()),
            Err(err) => warn!("Could not save {}: {}", name, err),
        }
    }

    // A rejected submission, for the notification trail
    let mut rejected = ListingSubmission::create(&backend, &config, mounted.clone())
        .with_notifier(notifier.clone());
    rejected.mutate(ListingField::Offer, FormInput::Toggle(true))?;
    rejected.mutate(ListingField::RegularPrice, FormInput::Number(100.0))?;
    rejected.mutate(ListingField::DiscountedPrice, FormInput::Number(150.0))?;
    if let Err(err) = rejected.submit(&session).await {
        info!("Rejected as expected: {}", err);
    }

    let mut feed = ListingFeed::new(
        &backend,
        &config,
        FeedFilter::Category(ListingType::Rent),
        mounted.clone(),
    )
    .with_notifier(notifier.clone());
    feed.load().await?;
    while feed.has_more() {
        feed.load_more().await?;
    }

    println!("\nListings for rent\n");
    for (i, listing) in feed.listings().iter().enumerate() {
        println!("{}. {} ({} / month)", i + 1, listing.name, listing.display_price());
        println!("   {} bedrooms, {} bathrooms", listing.bedrooms, listing.bathrooms);
        println!("   Location: {}", listing.location);
        if let Some(discount) = listing.discount() {
            println!("   Offer: {} discount", discount);
        }
        println!("   ID: {}", listing.id);
        println!("   Images: {}", listing.image_urls.len());
        println!();
    }

    let recent = recent_listings(&backend, &config).await?;
    let json = serde_json::to_string_pretty(&recent)?;
    println!("Newest listings:\n{}", json);

    mounted.cancel();
    while let Ok(notice) = notices.try_recv() {
        match notice {
            Notice::Success(message) => info!("✅ {}", message),
            Notice::Error(message) => warn!("❌ {}", message),
        }
    }

    Ok(())
}
