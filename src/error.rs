use std::path::PathBuf;

use reqwest::StatusCode;
use url::Url;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported image format")]
    UnsupportedFormat(#[source] Option<image::ImageError>),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("non 2xx response code {status} from {url}")]
    BadStatus { status: StatusCode, url: Url },
    #[error("expected an image but the response was html: {0}")]
    UnexpectedHtml(Url),
    #[error("search service responded with a captcha")]
    Captcha,
    #[error("no larger images available")]
    NoLargerAvailable,
    #[error("no results found")]
    NoResults,
    #[error("cancelled")]
    Cancelled,
    #[error("response from {url} was bigger than {limit} bytes")]
    BodyTooLarge { url: Url, limit: usize },
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The category of an [`Error`], without any of the attached context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unreadable,
    UnsupportedFormat,
    Network,
    BadStatus,
    UnexpectedHtml,
    Captcha,
    NoLargerAvailable,
    NoResults,
    Cancelled,
    BodyTooLarge,
    InvalidUrl,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unreadable { .. } => ErrorKind::Unreadable,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Network(_) => ErrorKind::Network,
            Error::BadStatus { .. } => ErrorKind::BadStatus,
            Error::UnexpectedHtml(_) => ErrorKind::UnexpectedHtml,
            Error::Captcha => ErrorKind::Captcha,
            Error::NoLargerAvailable => ErrorKind::NoLargerAvailable,
            Error::NoResults => ErrorKind::NoResults,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::BodyTooLarge { .. } => ErrorKind::BodyTooLarge,
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::UnsupportedFormat(Some(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Error::Captcha.kind(), ErrorKind::Captcha);
        assert_eq!(Error::UnsupportedFormat(None).kind(), ErrorKind::UnsupportedFormat);

        let err = Error::Unreadable {
            path: "missing.png".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.kind(), ErrorKind::Unreadable);
        assert!(err.to_string().starts_with("couldn't read missing.png"));
    }
}
