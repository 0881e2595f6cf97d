use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Response;
use tracing::warn;
use url::Url;

use crate::{Error, Result, MAX_BODY_BYTES, SEARCH_ORIGIN, SEARCH_REFERER, UPLOAD_URL};

pub mod image;
pub mod page;
pub mod upload;

/// Where the search service lives.
#[derive(Clone, Debug)]
pub struct Endpoints {
    /// The image gets POSTed here.
    pub upload_url: Url,
    /// Relative links found in the results page are resolved against this.
    pub search_origin: Url,
    /// Sent as both `origin` and `referer`.
    pub referer: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            upload_url: Url::parse(UPLOAD_URL).expect("UPLOAD_URL is a valid url"),
            search_origin: Url::parse(SEARCH_ORIGIN).expect("SEARCH_ORIGIN is a valid url"),
            referer: SEARCH_REFERER.to_owned(),
        }
    }
}

/// HTTP clients and settings shared by every stage of a resolution.
///
/// Cloning is cheap, the clients are reference counted.
#[derive(Clone, Debug)]
pub struct SearchContext {
    /// Talks to the search service.
    search_http: reqwest::Client,
    /// Downloads candidate images from arbitrary hosts.
    image_http: reqwest::Client,
    endpoints: Endpoints,
    max_body_bytes: usize,
}

impl SearchContext {
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> SearchContextBuilder {
        SearchContextBuilder::default()
    }
}

#[derive(Clone, Debug)]
pub struct SearchContextBuilder {
    endpoints: Endpoints,
    max_body_bytes: usize,
    request_timeout: Option<Duration>,
    accept_invalid_image_certs: bool,
}

impl Default for SearchContextBuilder {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            max_body_bytes: MAX_BODY_BYTES,
            request_timeout: None,
            accept_invalid_image_certs: true,
        }
    }
}

impl SearchContextBuilder {
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Transport timeout for every request. There's none by default, callers
    /// are expected to wrap stages with [`crate::pipeline::with_deadline`] or
    /// [`crate::pipeline::cancellable`] instead.
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Skip TLS certificate verification when downloading candidate images.
    ///
    /// On by default: a lot of the hosts the results point at are mirrors with
    /// self-signed or mismatched certificates. This only affects the image
    /// client, requests to the search service are always verified.
    pub fn accept_invalid_image_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_image_certs = accept;
        self
    }

    pub fn build(self) -> Result<SearchContext> {
        let mut search_http = reqwest::ClientBuilder::new();
        let mut image_http = reqwest::ClientBuilder::new()
            .danger_accept_invalid_certs(self.accept_invalid_image_certs);
        if let Some(timeout) = self.request_timeout {
            search_http = search_http.timeout(timeout);
            image_http = image_http.timeout(timeout);
        }

        Ok(SearchContext {
            search_http: search_http.build()?,
            image_http: image_http.build()?,
            endpoints: self.endpoints,
            max_body_bytes: self.max_body_bytes,
        })
    }
}

/// Read the whole body of the response, giving up if it's bigger than
/// `limit`.
pub(crate) async fn read_body(res: Response, limit: usize) -> Result<Vec<u8>> {
    let url = res.url().clone();
    let mut bytes = Vec::new();
    let mut stream = res.bytes_stream();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk?);
        if bytes.len() > limit {
            warn!("too much data sent by {url}, aborting");
            return Err(Error::BodyTooLarge { url, limit });
        }
    }
    Ok(bytes)
}
