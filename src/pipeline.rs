//! Putting the stages together.
//!
//! Nothing in here has a timeout of its own. Wrap calls in [`with_deadline`]
//! or [`cancellable`] to bound them.

use std::{future::Future, path::Path, time::Duration};

use tracing::{debug, info, instrument};

use crate::{
    data::ImageRecord,
    local,
    scrape::{image, page, upload, upload::SearchPage, SearchContext},
    Error, Result,
};

/// Finds bigger versions of local images.
#[derive(Clone, Debug)]
pub struct ResolutionPipeline {
    ctx: SearchContext,
}

impl ResolutionPipeline {
    pub fn new(ctx: SearchContext) -> Self {
        Self { ctx }
    }

    /// Upload the image and return the biggest image the search service knows
    /// about. Only the url and dimensions are filled in, call
    /// [`Self::materialize`] to download it.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn resolve(&self, path: &Path) -> Result<ImageRecord> {
        let results_page = upload::upload_image(&self.ctx, path).await?;
        self.best_from_results(results_page).await
    }

    async fn best_from_results(&self, results_page: SearchPage) -> Result<ImageRecord> {
        let results_page = results_page.check_status()?;
        let best = page::find_best_candidate(&self.ctx, &results_page.body).await?;
        debug!(
            "best candidate is {}x{}: {url}",
            best.width(),
            best.height(),
            url = display_url(&best)
        );
        Ok(best)
    }

    /// Download a candidate returned by [`Self::resolve`]. The result has the
    /// dimensions from the image itself rather than the ones the search page
    /// claimed.
    pub async fn materialize(&self, candidate: &ImageRecord) -> Result<ImageRecord> {
        let Some(url) = candidate.source_url() else {
            return Err(Error::NoResults);
        };
        image::download_image(&self.ctx, url.clone()).await
    }

    /// Read the local image, find the best candidate for it, and download it if
    /// it's bigger than what we already have. Returns the source and, if there
    /// was one, the bigger image.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn upsize(&self, path: &Path) -> Result<(ImageRecord, Option<ImageRecord>)> {
        let source = local::read_image(path).await?;
        let contents = source.raw_bytes().unwrap_or_default().to_vec();
        let results_page = upload::upload_image_bytes(&self.ctx, path, contents).await?;
        let candidate = self.best_from_results(results_page).await?;

        if candidate.area() <= source.area() {
            info!(
                "best candidate ({}x{}) isn't bigger than the source ({}x{})",
                candidate.width(),
                candidate.height(),
                source.width(),
                source.height()
            );
            return Ok((source, None));
        }

        let upsized = self.materialize(&candidate).await?;
        info!(
            "upsized {}x{} -> {}x{} ({} -> {} bytes)",
            source.width(),
            source.height(),
            upsized.width(),
            upsized.height(),
            source.file_size(),
            upsized.file_size()
        );
        Ok((source, Some(upsized)))
    }
}

fn display_url(record: &ImageRecord) -> &str {
    record.source_url().map(|url| url.as_str()).unwrap_or_default()
}

/// Run the future until it finishes or `signal` does, whichever comes first.
/// If the signal wins, the future (and whatever request it has in flight) is
/// dropped and this returns [`Error::Cancelled`].
pub async fn cancellable<T>(
    fut: impl Future<Output = Result<T>>,
    signal: impl Future<Output = ()>,
) -> Result<T> {
    tokio::select! {
        res = fut => res,
        () = signal => Err(Error::Cancelled),
    }
}

/// Like [`cancellable`], but gives up after the duration.
pub async fn with_deadline<T>(
    fut: impl Future<Output = Result<T>>,
    deadline: Duration,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn test_cancellable_finishes_first() {
        let res = cancellable(async { Ok(5) }, std::future::pending()).await;
        assert_eq!(res.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_cancellable_signal_fires() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();
        let res: Result<()> = cancellable(std::future::pending(), async {
            let _ = rx.await;
        })
        .await;
        assert_eq!(res.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_deadline_elapses() {
        let res: Result<()> =
            with_deadline(std::future::pending(), Duration::from_millis(10)).await;
        assert_eq!(res.unwrap_err().kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_materialize_without_url() {
        let pipeline = ResolutionPipeline::new(SearchContext::new().unwrap());
        let err = pipeline.materialize(&ImageRecord::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResults);
    }
}
