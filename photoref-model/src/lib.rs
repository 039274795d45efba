//! Core data model definitions shared between the photoref resolver and its
//! UI collaborators.
#![allow(missing_docs)]

pub mod mime;
pub mod reference;
pub mod source;

pub use mime::{BASE64_SIGNATURES, Base64Signature, ImageMime, sniff_base64};
pub use reference::{RawImageReference, WRAPPER_FIELDS};
pub use source::{AuthorizationHeader, ResolvedImageSource};
