use std::{io::Cursor, time::Instant};

use image::{ImageFormat, ImageReader};
use reqwest::header;
use tracing::{instrument, trace};
use url::Url;

use crate::{
    data::ImageRecord, Error, Result, IMAGE_ACCEPT, IMAGE_ACCEPT_ENCODING, IMAGE_USER_AGENT,
};

use super::SearchContext;

/// Download the image at the url and read its format and dimensions.
#[instrument(skip_all, fields(url = %url))]
pub async fn download_image(ctx: &SearchContext, url: Url) -> Result<ImageRecord> {
    trace!("downloading image");
    let request_start = Instant::now();
    let res = ctx
        .image_http
        .get(url.clone())
        .header(header::ACCEPT, IMAGE_ACCEPT)
        .header(header::ACCEPT_ENCODING, IMAGE_ACCEPT_ENCODING)
        .header(header::USER_AGENT, IMAGE_USER_AGENT)
        .send()
        .await?;
    let request_duration = request_start.elapsed();
    trace!("image request took {request_duration:?}");

    // an html page where we expected an image usually means the link expired,
    // so this is checked before the status
    let is_html = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("text/html"));
    if is_html {
        return Err(Error::UnexpectedHtml(url));
    }

    let status = res.status();
    if !status.is_success() {
        return Err(Error::BadStatus { status, url });
    }

    let bytes = super::read_body(res, ctx.max_body_bytes).await?;
    let (format, width, height) = probe_header(&bytes)?;
    trace!("image is {width}x{height} {format:?}, {} bytes", bytes.len());

    Ok(ImageRecord::downloaded(url, bytes, format, width, height))
}

/// Get the format and dimensions of the image from its header, without
/// decoding any pixels.
pub fn probe_header(bytes: &[u8]) -> Result<(ImageFormat, u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::UnsupportedFormat(Some(e.into())))?;
    let Some(format) = reader.format() else {
        return Err(Error::UnsupportedFormat(None));
    };
    let (width, height) = reader.into_dimensions()?;
    Ok((format, width, height))
}
