use crate::backend::traits::BlobStore;
use crate::backend::types::UploadEvent;
use crate::error::BlobError;
use crate::models::ImageFile;
use futures::future::try_join_all;
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage path for a listing image: `{prefix}/{owner}-{file name}-{uuid}`
pub fn image_path(prefix: &str, owner_id: &str, file_name: &str) -> String {
    format!("{prefix}/{owner_id}-{file_name}-{}", Uuid::new_v4())
}

/// Upload one blob, following its progress until the download URL arrives
pub async fn store_image(
    blobs: &dyn BlobStore,
    path: String,
    bytes: Vec<u8>,
) -> Result<String, BlobError> {
    let mut events = blobs.upload(&path, bytes);

    while let Some(event) = events.next().await {
        match event {
            Ok(UploadEvent::Progress { transferred, total }) => {
                let percent = if total == 0 {
                    100.0
                } else {
                    transferred as f64 / total as f64 * 100.0
                };
                debug!(path = %path, "Upload is {percent:.0}% done");
            }
            Ok(UploadEvent::Completed { url }) => return Ok(url),
            Err(err) => {
                warn!(path = %path, error = %err, "Upload failed");
                return Err(err);
            }
        }
    }

    Err(BlobError::Incomplete { path })
}

/// Upload all images concurrently.
///
/// URLs come back in the order the images were given. The first failure
/// aborts the batch; blobs that already finished stay in storage.
pub async fn upload_images(
    blobs: &dyn BlobStore,
    prefix: &str,
    owner_id: &str,
    images: &[ImageFile],
) -> Result<Vec<String>, BlobError> {
    info!(count = images.len(), "Uploading listing images");

    let uploads = images.iter().map(|image| {
        let path = image_path(prefix, owner_id, &image.name);
        store_image(blobs, path, image.bytes.clone())
    });

    try_join_all(uploads).await
}
