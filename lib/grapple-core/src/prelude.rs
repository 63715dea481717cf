//! Prelude module for convenient imports.
//!
//! ```
//! use grapple_core::prelude::*;
//! ```

pub use crate::{
    Body, ContentType, Error, Method, Request, Result, Values, from_json, to_form, to_json,
    to_xml,
};
