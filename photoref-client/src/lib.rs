//! Photo reference resolution
//!
//! Backend responses describe photos in many loosely typed ways: absolute
//! URLs, protected API paths, data URIs, bare or JSON-quoted base64, or
//! objects wrapping any of those. This crate turns all of them into one
//! displayable [`ResolvedImageSource`].
//!
//! Notes
//! - Resolution never fails loudly. `None` means "render a placeholder".
//! - Protected paths are fetched with the session's bearer token, at most
//!   once at a time per path, and cached until a photo upload to that path
//!   invalidates them.
//! - The [`ResolutionCache`] is created once by the application and shared
//!   through `Arc`; independent instances never see each other.

pub mod cache;
pub mod config;
pub mod extract;
pub mod fetcher;
pub mod inline;
pub mod paths;
pub mod resolver;
pub mod session;
pub mod transport;

pub use cache::{ResolutionCache, ResolutionStatsSnapshot};
pub use config::{ApiBase, ConfigError, ResolverConfig};
pub use fetcher::{AuthorizedFetcher, ResolveError};
pub use inline::normalize_image_payload;
pub use resolver::{ImageResolver, PhotoFile, UploadError};
pub use session::{SessionStore, TokenExpiry, TokenProvider};
pub use transport::{FetchedBody, HttpTransport, ImageTransport, TransportError};

pub use photoref_model::{RawImageReference, ResolvedImageSource};
