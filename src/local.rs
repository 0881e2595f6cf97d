use std::path::Path;

use tracing::{instrument, trace};

use crate::{data::ImageRecord, scrape::image::probe_header, Error, Result};

/// Read the image at the path, keeping its bytes and getting its format and
/// dimensions from the header.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn read_image(path: &Path) -> Result<ImageRecord> {
    let unreadable = |source| Error::Unreadable {
        path: path.to_owned(),
        source,
    };

    let bytes = tokio::fs::read(path).await.map_err(unreadable)?;
    let file_size = tokio::fs::metadata(path).await.map_err(unreadable)?.len();

    let (format, width, height) = probe_header(&bytes)?;
    trace!("local image is {width}x{height} {format:?}, {file_size} bytes");

    Ok(ImageRecord::local(
        path.to_owned(),
        bytes,
        file_size,
        format,
        width,
        height,
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::ImageFormat;

    use super::*;
    use crate::ErrorKind;

    #[tokio::test]
    async fn test_read_local_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.png");
        let mut bytes = Cursor::new(Vec::new());
        image::RgbImage::new(400, 300)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        let bytes = bytes.into_inner();
        std::fs::write(&path, &bytes).unwrap();

        let record = read_image(&path).await.unwrap();
        assert_eq!(record.format(), Some(ImageFormat::Png));
        assert_eq!(record.format_name(), "png");
        assert_eq!((record.width(), record.height()), (400, 300));
        assert_eq!(record.area(), 120_000);
        assert_eq!(record.file_size(), bytes.len() as u64);
        assert_eq!(record.raw_bytes(), Some(bytes.as_slice()));
        assert_eq!(record.local_path(), Some(path.as_path()));
        assert!(record.source_url().is_none());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_image(&dir.path().join("nope.jpg")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreadable);
    }

    #[tokio::test]
    async fn test_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just some text, definitely not an image").unwrap();

        let err = read_image(&path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }
}
