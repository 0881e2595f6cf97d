use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::{Serialize, Serializer};
use url::Url;

/// An image somewhere, either on disk or on the internet, and whatever we know
/// about it so far.
///
/// The dimensions are only settable together so `area` can't go stale.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImageRecord {
    /// Where the image was found online. None for local images.
    source_url: Option<Url>,
    /// Where the image is on disk. None for remote images.
    local_path: Option<PathBuf>,
    /// The whole file. None until it's been downloaded.
    #[serde(skip)]
    raw_bytes: Option<Vec<u8>>,
    #[serde(serialize_with = "serialize_format")]
    format: Option<ImageFormat>,
    width: u32,
    height: u32,
    area: u64,
    file_size: u64,
}

impl ImageRecord {
    /// A result from the search page that hasn't been downloaded yet.
    pub fn candidate(url: Url, width: u32, height: u32) -> Self {
        let mut record = Self {
            source_url: Some(url),
            ..Default::default()
        };
        record.set_dimensions(width, height);
        record
    }

    /// A fully read image. `file_size` is the length of `bytes`.
    pub fn downloaded(
        url: Url,
        bytes: Vec<u8>,
        format: ImageFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let mut record = Self {
            source_url: Some(url),
            file_size: bytes.len() as u64,
            raw_bytes: Some(bytes),
            format: Some(format),
            ..Default::default()
        };
        record.set_dimensions(width, height);
        record
    }

    /// An image read from disk. `file_size` comes from the filesystem rather
    /// than the length of `bytes`.
    pub fn local(
        path: PathBuf,
        bytes: Vec<u8>,
        file_size: u64,
        format: ImageFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let mut record = Self {
            local_path: Some(path),
            raw_bytes: Some(bytes),
            file_size,
            format: Some(format),
            ..Default::default()
        };
        record.set_dimensions(width, height);
        record
    }

    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.area = u64::from(width) * u64::from(height);
    }

    pub fn source_url(&self) -> Option<&Url> {
        self.source_url.as_ref()
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw_bytes.as_deref()
    }

    pub fn into_raw_bytes(self) -> Option<Vec<u8>> {
        self.raw_bytes
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// The short name of the container format, like `jpeg` or `png`. Empty if
    /// the format isn't known yet.
    pub fn format_name(&self) -> &'static str {
        self.format.map(format_name).unwrap_or_default()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn area(&self) -> u64 {
        self.area
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Whether the bytes have been fetched yet.
    pub fn is_materialized(&self) -> bool {
        self.raw_bytes.is_some()
    }
}

pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Avif => "avif",
        ImageFormat::Ico => "ico",
        ImageFormat::Tga => "tga",
        ImageFormat::Hdr => "hdr",
        ImageFormat::OpenExr => "exr",
        ImageFormat::Qoi => "qoi",
        ImageFormat::Pnm => "pnm",
        // everything else is rare enough that its usual extension will do
        other => other.extensions_str().first().copied().unwrap_or_default(),
    }
}

fn serialize_format<S: Serializer>(format: &Option<ImageFormat>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(format.map(format_name).unwrap_or_default())
}
