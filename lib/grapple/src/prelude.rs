//! Prelude module for convenient imports.
//!
//! ```
//! use grapple::prelude::*;
//! ```

pub use crate::{
    Body, ClientConfig, ContentType, Error, HttpClient, Method, RedirectAction, Request, Response,
    Result, StatusCode, Values, header,
};
pub use serde::{Deserialize, Serialize};
