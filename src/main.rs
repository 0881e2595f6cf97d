use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use eyre::{bail, WrapErr};
use image_upsizer::{pipeline, ErrorKind, ResolutionPipeline, SearchContext};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Where the bigger images get written to.
pub const OUTPUT_DIR: &str = "upsized";
/// How long we give each image (upload, both searches, and the download)
/// before moving on to the next one.
pub const RESOLVE_DEADLINE: Duration = Duration::from_secs(120);
/// How many `<stem>-<n>` names to try before giving up on a taken output name.
const MAX_NAME_ATTEMPTS: usize = 100;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::fs::File::create("image-upsizer.log")?)
                .with_ansi(false)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive("image_upsizer=trace".parse()?)
                        .from_env_lossy(),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(LevelFilter::INFO.into())
                        .from_env_lossy()
                        .add_directive("html5ever=error".parse()?),
                ),
        )
        .init();

    let paths = std::env::args_os().skip(1).map(PathBuf::from).collect::<Vec<_>>();
    if paths.is_empty() {
        bail!("usage: image-upsizer <image>...");
    }

    tokio::fs::create_dir_all(OUTPUT_DIR)
        .await
        .wrap_err("couldn't create output directory")?;

    let resolver = ResolutionPipeline::new(SearchContext::new()?);

    let mut upsized_count = 0_usize;
    for path in &paths {
        let start = Instant::now();
        match upsize_one(&resolver, path).await {
            Ok(Some(output_path)) => {
                upsized_count += 1;
                info!("wrote {} in {:?}", output_path.display(), start.elapsed());
            }
            Ok(None) => {}
            Err(e) => match e.downcast_ref::<image_upsizer::Error>().map(|e| e.kind()) {
                // these just mean google didn't have anything for us
                Some(ErrorKind::NoLargerAvailable | ErrorKind::NoResults) => {
                    info!("nothing bigger found for {}", path.display());
                }
                Some(ErrorKind::Captcha) => {
                    // every request after this is going to get the same page
                    error!("got a captcha for {}, stopping", path.display());
                    break;
                }
                _ => warn!("failed to upsize {}: {e:#}", path.display()),
            },
        }
    }

    info!("upsized {upsized_count}/{} images", paths.len());

    Ok(())
}

/// Returns the path the bigger image was written to, if there was one.
async fn upsize_one(
    resolver: &ResolutionPipeline,
    path: &Path,
) -> eyre::Result<Option<PathBuf>> {
    let (source, upsized) =
        pipeline::with_deadline(resolver.upsize(path), RESOLVE_DEADLINE).await?;
    let Some(upsized) = upsized else {
        return Ok(None);
    };
    trace!(
        "source: {}, upsized: {}",
        serde_json::to_string(&source)?,
        serde_json::to_string(&upsized)?
    );

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_owned());
    let file_ext = upsized
        .format()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(source.format_name());

    let Some(bytes) = upsized.into_raw_bytes() else {
        bail!("downloaded image has no bytes");
    };
    let output_path = write_new_file(Path::new(OUTPUT_DIR), &stem, file_ext, &bytes).await?;

    Ok(Some(output_path))
}

/// Write `bytes` to `<stem>.<ext>` in `dir`. Existing files are never
/// replaced, `<stem>-1.<ext>`, `<stem>-2.<ext>` and so on are tried instead.
async fn write_new_file(
    dir: &Path,
    stem: &str,
    ext: &str,
    bytes: &[u8],
) -> eyre::Result<PathBuf> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let name = match n {
            0 => format!("{stem}.{ext}"),
            n => format!("{stem}-{n}.{ext}"),
        };
        let path = dir.join(name);

        let open = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match open {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!("{} already exists, not overwriting it", path.display());
                continue;
            }
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("couldn't create {}", path.display()))
            }
        };

        file.write_all(bytes)
            .await
            .wrap_err_with(|| format!("couldn't write {}", path.display()))?;
        file.flush()
            .await
            .wrap_err_with(|| format!("couldn't write {}", path.display()))?;
        return Ok(path);
    }

    bail!("no free name for {stem}.{ext} in {}", dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_new_file(dir.path(), "cat", "png", b"meow").await.unwrap();
        assert_eq!(path, dir.path().join("cat.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"meow");
    }

    #[tokio::test]
    async fn test_write_new_file_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cat.png"), b"first").unwrap();
        std::fs::write(dir.path().join("cat-1.png"), b"second").unwrap();

        let path = write_new_file(dir.path(), "cat", "png", b"third").await.unwrap();
        assert_eq!(path, dir.path().join("cat-2.png"));
        assert_eq!(std::fs::read(dir.path().join("cat.png")).unwrap(), b"first");
        assert_eq!(std::fs::read(dir.path().join("cat-1.png")).unwrap(), b"second");
        assert_eq!(std::fs::read(&path).unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_write_new_file_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(write_new_file(&missing, "cat", "png", b"meow").await.is_err());
    }
}
