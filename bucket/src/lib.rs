mod auth;
mod client;
mod constants;
mod errors;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::auth::Credentials;
pub use crate::client::{object_key, BucketClient, FetchOutcome, UploadOutcome};
pub use crate::errors::BucketError;

pub use reqwest::StatusCode;
