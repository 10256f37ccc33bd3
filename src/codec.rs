use crate::constants::{
    LIBDEFLATER_HIGH_LEVEL, LIBDEFLATER_LOW_LEVEL, MAX_FILE_SIZE, MAX_IMAGE_DIMENSION,
    OXIPNG_PRESET, ZOPFLI_ITERATIONS,
};
use crate::error::{CompressionError, Result};
use crate::formats::ImageKind;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use oxipng::{Deflaters, Options};
use std::fs;
use std::io::{Cursor, Write};
use std::num::NonZeroU8;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::trace;

/// What the codec is allowed to do to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionPolicy {
    pub max_quality: u8,
    pub allow_resize: bool,
    pub max_width: u32,
    pub max_height: u32,
}

/// Result of one codec call.
///
/// A skipped file was left exactly as it was; `new_size` is then its
/// original size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOutcome {
    pub new_size: u64,
    pub skipped: bool,
}

/// The pixel-level compressor a task delegates to.
///
/// Implementations are shared by every worker, so they must not hold
/// per-call mutable state. `destination` may equal `source`; whatever is
/// written there must appear atomically.
pub trait ImageCodec: Send + Sync {
    fn compress(
        &self,
        source: &Path,
        destination: &Path,
        policy: &CompressionPolicy,
    ) -> Result<CodecOutcome>;
}

/// Codec backed by the `image` crate, with `oxipng` for PNG.
#[derive(Debug, Clone, Default)]
pub struct StandardCodec;

impl StandardCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for StandardCodec {
    /// load -> resize -> encode -> keep if smaller
    fn compress(
        &self,
        source: &Path,
        destination: &Path,
        policy: &CompressionPolicy,
    ) -> Result<CodecOutcome> {
        let kind = ImageKind::from_path(source).ok_or_else(|| {
            CompressionError::UnsupportedFormat(source.display().to_string())
        })?;

        let data = read_limited(source)?;
        let original_size = data.len() as u64;

        let mut img = image::load_from_memory_with_format(&data, kind.to_image_format())?;
        let (width, height) = img.dimensions();
        if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
            return Err(CompressionError::InvalidDimensions(
                width,
                height,
                MAX_IMAGE_DIMENSION,
            ));
        }

        if policy.allow_resize {
            resize_to_fit(&mut img, policy.max_width, policy.max_height);
        }

        let encoded = encode(&img, kind, policy.max_quality)?;
        let new_size = encoded.len() as u64;
        if new_size >= original_size {
            trace!(file = %source.display(), original_size, new_size, "No gain, left as is");
            return Ok(CodecOutcome {
                new_size: original_size,
                skipped: true,
            });
        }

        write_atomically(destination, &encoded)?;
        Ok(CodecOutcome {
            new_size,
            skipped: false,
        })
    }
}

fn read_limited(path: &Path) -> Result<Vec<u8>> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CompressionError::FileNotFound(path.to_path_buf()),
        _ => CompressionError::Io(e),
    })?;
    if metadata.len() > MAX_FILE_SIZE {
        return Err(CompressionError::FileTooLarge(metadata.len(), MAX_FILE_SIZE));
    }
    Ok(fs::read(path)?)
}

/// Shrink `img` to fit within the bounds, keeping its aspect ratio.
/// Images already inside the bounds are not touched.
pub fn resize_to_fit(img: &mut DynamicImage, max_width: u32, max_height: u32) -> bool {
    if img.width() <= max_width && img.height() <= max_height {
        return false;
    }
    *img = img.resize(max_width, max_height, FilterType::Lanczos3);
    true
}

pub fn encode(img: &DynamicImage, kind: ImageKind, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    match kind {
        ImageKind::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            rgb.write_with_encoder(encoder)?;
        }
        ImageKind::Png => {
            img.write_to(&mut buffer, image::ImageFormat::Png)?;
            let optimized = oxipng::optimize_from_memory(buffer.get_ref(), &png_options(quality))
                .map_err(|e| CompressionError::PngOptimization(e.to_string()))?;
            return Ok(optimized);
        }
        ImageKind::WebP => {
            img.write_to(&mut buffer, image::ImageFormat::WebP)?;
        }
    }

    Ok(buffer.into_inner())
}

fn png_options(quality: u8) -> Options {
    let mut options = Options::from_preset(OXIPNG_PRESET);
    options.force = true;

    options.deflate = if quality >= 90 {
        match NonZeroU8::new(ZOPFLI_ITERATIONS) {
            Some(iterations) => Deflaters::Zopfli { iterations },
            None => Deflaters::Libdeflater {
                compression: LIBDEFLATER_HIGH_LEVEL,
            },
        }
    } else if quality >= 70 {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_HIGH_LEVEL,
        }
    } else {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_LOW_LEVEL,
        }
    };
    options
}

/// Write `bytes` to a temp file next to `destination`, then rename it over.
pub fn write_atomically(destination: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(CompressionError::DirectoryCreationFailed(
            parent.to_path_buf(),
        ));
    }

    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged
        .persist(destination)
        .map_err(|e| CompressionError::Io(e.error))?;
    Ok(())
}
