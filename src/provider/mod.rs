//! The remote provider boundary: token operations and paged data fetching.
//!
//! [`api::SeriesApi`] is the seam; [`http::HttpProvider`] speaks the real
//! protocol; [`pages::PagedFetcher`] drives a full paging run on top of
//! either.

pub mod api;
pub mod error;
pub mod http;
pub mod pages;
pub mod token;

pub use api::{Cursor, PageFetch, PageRequest, SeriesApi};
pub use error::ProviderError;
pub use http::HttpProvider;
pub use pages::{FetchError, PagedFetcher};
pub use token::TokenResponse;
