pub mod form;
pub mod upload;
pub mod workflow;

pub use form::{FormInput, ListingField, ListingForm};
pub use upload::upload_images;
pub use workflow::{ListingRecord, ListingSubmission, SubmissionMode, SubmissionState, Submitted};
