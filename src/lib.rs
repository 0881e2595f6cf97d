//! Find a higher resolution copy of a local image by uploading it to Google's
//! reverse image search and picking the largest of the "larger images" results.

pub mod data;
pub mod error;
pub mod local;
pub mod pipeline;
pub mod scrape;

pub use data::ImageRecord;
pub use error::{Error, ErrorKind, Result};
pub use pipeline::ResolutionPipeline;
pub use scrape::{Endpoints, SearchContext, SearchContextBuilder};

/// Sent with every request to the search service. Google serves a stripped
/// down page (without the "larger images" link) to clients it doesn't
/// recognize as a browser.
pub const SEARCH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/101.0.4951.54 Safari/537.36";
/// Sent when downloading candidate images from wherever they're hosted.
pub const IMAGE_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:101.0) Gecko/20100101 Firefox/101.0";
pub const IMAGE_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
pub const IMAGE_ACCEPT_ENCODING: &str = "gzip, deflate, br";

pub const UPLOAD_URL: &str = "https://images.google.com/searchbyimage/upload";
/// Used as both the `origin` and `referer` of search requests. Uploads without
/// these get rejected.
pub const SEARCH_REFERER: &str = "https://images.google.com/";
/// Prefixed to the relative "larger images" link found in the results page.
pub const SEARCH_ORIGIN: &str = "https://google.com";

/// Responses bigger than this are abandoned.
///
/// This is a lot higher than it needs to be for the search pages, but some of
/// the candidates are huge scans.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
