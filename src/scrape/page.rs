//! Scraping the search service's result pages.
//!
//! There's no API here, just regexes against whatever markup Google happens to
//! be serving, so everything in this module works on plain bytes and can be
//! tested without touching the network.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::{data::ImageRecord, Error, Result};

use super::{upload, SearchContext};

/// A relative `/search?...` link that has `simg:` in it, up to the end of the
/// attribute.
static SIMILAR_IMAGES_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(/search\?.*?simg:.*?)">"#).expect("regex is valid"));
/// `["<url>",<height>,<width>]`, which is how the detail page lists images in
/// its inline scripts.
static IMAGE_INFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\["(https://.*?.)",(\d+),(\d+)\]"#).expect("regex is valid"));
/// Anything mentioning a captcha. Matched against the raw body since the page
/// isn't always valid utf-8.
static CAPTCHA: LazyLock<regex::bytes::Regex> =
    LazyLock::new(|| regex::bytes::Regex::new("captcha").expect("regex is valid"));

/// Only links with this in them filter for large images.
const LARGE_SIZE_FILTER: &str = ",isz:l";

/// Fetch the "larger images" page linked from the initial results page and
/// return the biggest image on it.
#[instrument(skip_all)]
pub async fn find_best_candidate(
    ctx: &SearchContext,
    results_page: &[u8],
) -> Result<ImageRecord> {
    let link = larger_images_link(results_page, &ctx.endpoints.search_origin)?;
    debug!("larger images link: {link}");

    let detail_page = upload::fetch_search_page(ctx, link).await?.check_status()?;
    best_candidate(&detail_page.body)
}

/// Find the absolute link to the "larger images" page in the initial results
/// page.
pub fn larger_images_link(body: &[u8], origin: &Url) -> Result<Url> {
    let text = String::from_utf8_lossy(body);

    let relative_link = SIMILAR_IMAGES_LINK
        .captures_iter(&text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|link| link.contains(LARGE_SIZE_FILTER));

    let Some(relative_link) = relative_link else {
        // google doesn't bother telling us when it wants a captcha solved, the
        // page just doesn't have any results
        if contains_captcha(body) {
            return Err(Error::Captcha);
        }
        return Err(Error::NoLargerAvailable);
    };

    let link = format!(
        "{}{}",
        origin.as_str().trim_end_matches('/'),
        unescape_html_attribute(relative_link)
    );
    Ok(Url::parse(&link)?)
}

pub(crate) fn contains_captcha(body: &[u8]) -> bool {
    CAPTCHA.is_match(body)
}

/// Every image listed on the detail page, biggest first. Images with the same
/// area are kept in the order they were found in.
pub fn ranked_candidates(body: &[u8]) -> Result<Vec<ImageRecord>> {
    let text = String::from_utf8_lossy(body);

    let mut candidates = Vec::new();
    for c in IMAGE_INFO.captures_iter(&text) {
        let (_, [raw_url, height, width]) = c.extract();

        let Some(url) = unescape_js_string(raw_url) else {
            trace!("couldn't unescape url: {raw_url}");
            continue;
        };
        let url = match Url::parse(&url) {
            Ok(url) => url,
            Err(e) => {
                warn!("invalid candidate url {url}: {e}");
                continue;
            }
        };
        let (Ok(height), Ok(width)) = (height.parse::<u32>(), width.parse::<u32>()) else {
            warn!("invalid dimensions for {url}: {width}x{height}");
            continue;
        };

        candidates.push(ImageRecord::candidate(url, width, height));
    }

    if candidates.is_empty() {
        return Err(Error::NoResults);
    }

    // sort_by is stable, which keeps ties in page order
    candidates.sort_by(|a, b| b.area().cmp(&a.area()));
    debug!("found {} candidates", candidates.len());

    Ok(candidates)
}

/// The biggest image listed on the detail page.
pub fn best_candidate(body: &[u8]) -> Result<ImageRecord> {
    ranked_candidates(body)?
        .into_iter()
        .next()
        .ok_or(Error::NoResults)
}

/// Decode html character references (like `&amp;`) the same way a browser
/// would when reading them out of an attribute.
fn unescape_html_attribute(raw: &str) -> String {
    // the regex stops at `">` so there can still be a stray quote in here, and
    // it would end the attribute early
    let raw = raw.replace('"', "&quot;");
    let fragment = scraper::Html::parse_fragment(&format!(r#"<a href="{raw}"></a>"#));
    let anchor_selector = scraper::Selector::parse("a").expect("selector is valid");
    fragment
        .select(&anchor_selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(str::to_owned)
        .unwrap_or(raw)
}

/// Decode the contents of a javascript string literal, like `\u003d` or `\/`.
fn unescape_js_string(raw: &str) -> Option<String> {
    // json strings are almost the same thing except they don't have \x escapes
    let raw = expand_hex_escapes(raw)?;
    serde_json::from_str::<String>(&format!("\"{raw}\"")).ok()
}

/// Rewrite `\xNN` escapes as `\u00NN`.
fn expand_hex_escapes(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return None;
                }
                out.push_str("\\u00");
                out.push_str(&hex);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}
