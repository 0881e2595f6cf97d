use std::{path::Path, time::Instant};

use reqwest::{
    header,
    multipart::{Form, Part},
    RequestBuilder, StatusCode,
};
use tracing::{debug, instrument};
use url::Url;

use crate::{Error, Result, SEARCH_USER_AGENT};

use super::SearchContext;

/// A page returned by the search service. The status isn't checked here, see
/// [`SearchPage::check_status`].
#[derive(Clone, Debug)]
pub struct SearchPage {
    pub url: Url,
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl SearchPage {
    /// Reject non-2xx pages, unless they look like a captcha challenge (which
    /// is usually served as a 429) so the parser can report it as one.
    pub fn check_status(self) -> Result<Self> {
        if self.status.is_success() || super::page::contains_captcha(&self.body) {
            Ok(self)
        } else {
            Err(Error::BadStatus {
                status: self.status,
                url: self.url,
            })
        }
    }
}

/// Upload the image at the path to the search service and return the initial
/// results page.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn upload_image(ctx: &SearchContext, path: &Path) -> Result<SearchPage> {
    let contents = tokio::fs::read(path).await.map_err(|source| Error::Unreadable {
        path: path.to_owned(),
        source,
    })?;
    upload_image_bytes(ctx, path, contents).await
}

/// Same as [`upload_image`] but with the contents already read. `path` is only
/// used for the file name in the form.
pub async fn upload_image_bytes(
    ctx: &SearchContext,
    path: &Path,
    contents: Vec<u8>,
) -> Result<SearchPage> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let encoded_image = Part::bytes(contents)
        .file_name(file_name)
        .mime_str("application/octet-stream")?;
    let form = Form::new()
        .part("encoded_image", encoded_image)
        .text("image_url", "")
        .text("filename", "")
        .text("hl", "en");

    let url = ctx.endpoints.upload_url.clone();
    let request_start = Instant::now();
    let res = search_request(ctx, ctx.search_http.post(url.clone()))
        .multipart(form)
        .send()
        .await?;
    let request_duration = request_start.elapsed();
    debug!("upload took {request_duration:?}");

    let status = res.status();
    let url = res.url().clone();
    let body = super::read_body(res, ctx.max_body_bytes).await?;
    Ok(SearchPage { url, status, body })
}

/// Fetch a page from the search service, with the same headers as the upload.
#[instrument(skip_all, fields(url = %url))]
pub async fn fetch_search_page(ctx: &SearchContext, url: Url) -> Result<SearchPage> {
    let request_start = Instant::now();
    let res = search_request(ctx, ctx.search_http.get(url)).send().await?;
    let request_duration = request_start.elapsed();
    debug!("page request took {request_duration:?}");

    let status = res.status();
    let url = res.url().clone();
    let body = super::read_body(res, ctx.max_body_bytes).await?;
    Ok(SearchPage { url, status, body })
}

/// The search service rejects requests that don't look like they're coming
/// from its own page.
fn search_request(ctx: &SearchContext, req: RequestBuilder) -> RequestBuilder {
    req.header(header::ORIGIN, &ctx.endpoints.referer)
        .header(header::REFERER, &ctx.endpoints.referer)
        .header(header::USER_AGENT, SEARCH_USER_AGENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: StatusCode, body: &str) -> SearchPage {
        SearchPage {
            url: Url::parse("https://images.google.com/searchbyimage/upload").unwrap(),
            status,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_success_passes_status_check() {
        assert!(page(StatusCode::OK, "<html></html>").check_status().is_ok());
    }

    #[test]
    fn test_error_status_is_rejected() {
        let err = page(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>")
            .check_status()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::BadStatus);
    }

    #[test]
    fn test_captcha_page_is_passed_through() {
        let page = page(
            StatusCode::TOO_MANY_REQUESTS,
            r#"<div id="recaptcha" class="g-recaptcha" data-sitekey="x"></div>"#,
        );
        assert!(page.check_status().is_ok());
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let ctx = SearchContext::new().unwrap();
        let err = upload_image(&ctx, Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Unreadable);
    }
}
