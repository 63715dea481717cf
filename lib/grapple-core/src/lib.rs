//! Core types for the grapple blocking HTTP client.
//!
//! This crate provides the transport-independent building blocks:
//! - [`Method`] - HTTP method enum
//! - [`Request`] - a request under construction (method, URL, headers, body)
//! - [`Body`] - in-memory or streamed request payloads
//! - [`Values`] - multi-valued parameters for query strings and forms
//! - [`Error`] and [`Result`] - Error handling
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)
//! - [`header`] - HTTP header names (re-exported from `http` crate)

mod body;
mod error;
mod method;
pub mod prelude;
mod request;
mod values;

pub use body::{Body, CharsetCase, ContentType, from_json, to_form, to_json, to_xml};
pub use error::{Error, Result};
pub use method::Method;
pub use request::{Request, basic_auth, normalize_url};
pub use values::Values;

// Re-export http crate types for status codes and headers
pub use http::{HeaderMap, HeaderValue, StatusCode, header};
pub use url::Url;
