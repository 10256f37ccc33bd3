#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use dir_squeeze::codec::encode;
use dir_squeeze::formats::ImageKind;
use dir_squeeze::{CodecOutcome, CompressionError, CompressionPolicy, ImageCodec};
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Image content that shrinks a lot when re-encoded at low quality.
pub fn noisy_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = (x * 31 + y * 17) ^ (x * y);
        Rgb([(v % 251) as u8, (v % 241) as u8, (v % 239) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    let bytes = encode(&noisy_image(width, height), ImageKind::Jpeg, 100).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Create `names` as sibling directories of `root`, each holding one
/// placeholder image file.
pub fn create_image_dirs(root: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let dir = root.join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("photo.jpg"), vec![9u8; 100]).unwrap();
            dir
        })
        .collect()
}

/// Pretends to compress every file to a tenth of its size and counts calls.
/// File names containing `fail` produce a codec error.
#[derive(Default)]
pub struct CountingCodec {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<PathBuf>>,
}

impl ImageCodec for CountingCodec {
    fn compress(
        &self,
        source: &Path,
        _destination: &Path,
        _policy: &CompressionPolicy,
    ) -> dir_squeeze::Result<CodecOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(source.to_path_buf());
        let name = source.file_name().unwrap_or_default().to_string_lossy();
        if name.contains("fail") {
            return Err(CompressionError::UnsupportedFormat("scripted".to_string()));
        }
        let size = fs::metadata(source)?.len();
        Ok(CodecOutcome {
            new_size: size / 10,
            skipped: false,
        })
    }
}

/// Announces every call on `started` and then waits for a token on
/// `release` before finishing.
pub struct GatedCodec {
    pub started: Sender<PathBuf>,
    pub release: Receiver<()>,
}

impl ImageCodec for GatedCodec {
    fn compress(
        &self,
        source: &Path,
        _destination: &Path,
        _policy: &CompressionPolicy,
    ) -> dir_squeeze::Result<CodecOutcome> {
        let _ = self.started.send(source.to_path_buf());
        let _ = self.release.recv();
        Ok(CodecOutcome {
            new_size: 1,
            skipped: false,
        })
    }
}
