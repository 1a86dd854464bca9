//! # Rampart Core
//!
//! Shared HTTP boundary types for the Rampart crates: request and response
//! wrappers plus the common error enum. Protection middleware (see
//! `rampart-csrf`) consumes these types instead of binding to a specific
//! server framework.

pub mod error;
pub mod http;

pub use error::Error;
pub use http::{HttpRequest, HttpResponse};
