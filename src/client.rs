//! Assistant backend client
//!
//! Request/response types of the chat backend, its error taxonomy, and the
//! HTTP implementation used in production.

mod error;
mod http;
mod types;

pub use error::{ClientError, ClientErrorKind};
pub use http::HttpBackend;
pub use types::*;
