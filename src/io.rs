use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{FxError, FxResult};

/// Raster formats the `image` build can decode (lowercase extensions).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tga", "tif", "tiff"];

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Decode any supported raster file to RGBA8.
pub fn load_image(path: &Path) -> FxResult<RgbaImage> {
    let img = image::open(path)?.to_rgba8();
    tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "image loaded");
    Ok(img)
}

/// PNG bytes for an RGBA image.
pub fn encode_png(image: &RgbaImage) -> FxResult<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(out)
}

pub fn save_png(image: &RgbaImage, path: &Path) -> FxResult<()> {
    let file = File::create(path).map_err(|e| FxError::io(path, e))?;
    let writer = BufWriter::new(file);
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

/// Largest size with the same aspect ratio whose longer side is at most
/// `max_dim`.  Never upscales; `max_dim == 0` means no cap.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height);
    if max_dim == 0 || longest <= max_dim {
        return (width, height);
    }
    let scale = max_dim as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_dim);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_dim);
    (w, h)
}

/// Expand glob patterns into a sorted, de-duplicated list of image files.
/// Patterns that match nothing are reported in the log, not as errors.
pub fn expand_inputs(patterns: &[String]) -> FxResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let entries = glob::glob(pattern).map_err(|e| FxError::manifest(format!("bad pattern '{}': {}", pattern, e)))?;
        let before = files.len();
        for path in entries.flatten() {
            let ok = path.is_file()
                && path.extension().and_then(|e| e.to_str()).map(is_image_extension).unwrap_or(false);
            if ok {
                files.push(path);
            }
        }
        if files.len() == before {
            tracing::warn!(pattern = %pattern, "pattern matched no images");
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(800, 600, 1024), (800, 600));
        assert_eq!(fit_within(4000, 3000, 1024), (1024, 768));
        assert_eq!(fit_within(3000, 4000, 1024), (768, 1024));
        assert_eq!(fit_within(5000, 1, 1000), (1000, 1));
        assert_eq!(fit_within(4000, 3000, 0), (4000, 3000));
    }

    #[test]
    fn png_round_trip_through_disk() {
        let dir = std::env::temp_dir().join(format!("shaderstack-io-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let img = RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8 * 40, y as u8 * 90, 7, 255]));

        let bytes = encode_png(&img).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let path = dir.join("a.png");
        save_png(&img, &path).unwrap();
        assert_eq!(load_image(&path).unwrap(), img);

        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        let found = expand_inputs(&[format!("{}/*", dir.display())]).unwrap();
        assert_eq!(found, vec![path]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
