//! Image kinds the compressor knows how to re-encode.
//!
//! Candidate files inside a task are picked by extension only; the codec
//! decodes with the format implied here rather than sniffing content.
use image::ImageFormat;
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Lossy, re-encoded at the policy quality
    Jpeg,
    /// Lossless, re-packed with oxipng
    Png,
    /// Re-encoded lossless
    WebP,
}

impl ImageKind {
    /// Detect the kind from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "webp" => Some(ImageKind::WebP),
            _ => None,
        }
    }

    pub fn to_image_format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
            ImageKind::WebP => ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Jpeg => "JPEG",
            ImageKind::Png => "PNG",
            ImageKind::WebP => "WebP",
        };
        write!(f, "{}", name)
    }
}

pub fn is_image_file(path: &Path) -> bool {
    ImageKind::from_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_kind_from_path() {
        assert_eq!(ImageKind::from_path(Path::new("a.jpg")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("a.JPEG")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("a.PnG")), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_path(Path::new("a.webp")), Some(ImageKind::WebP));

        assert_eq!(ImageKind::from_path(Path::new("a.gif")), None);
        assert_eq!(ImageKind::from_path(Path::new("a.txt")), None);
        assert_eq!(ImageKind::from_path(Path::new("jpg")), None);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("/photos/holiday.JPG")));
        assert!(!is_image_file(Path::new("/photos/notes.md")));
    }

    #[test]
    fn test_image_kind_display() {
        assert_eq!(format!("{}", ImageKind::Jpeg), "JPEG");
        assert_eq!(format!("{}", ImageKind::WebP), "WebP");
    }
}
