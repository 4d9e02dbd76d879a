//! Remote code-generation service
//!
//! Wire types, error classification and the HTTP adapters that back the
//! collaborator traits in production.

mod error;
mod http;
mod types;

pub use error::{RemoteError, RemoteErrorKind};
pub use http::{HttpJobClient, HttpUploader};
pub use types::*;
