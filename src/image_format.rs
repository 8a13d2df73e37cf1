//! # Image Format Detection Module
//!
//! Determina il formato di un'immagine dal contenuto del file (magic bytes),
//! mai dall'estensione.
//!
//! ## Responsabilità:
//! - Riconosce il formato con `image::io::Reader::with_guessed_format`
//! - Legge solo l'header per dimensioni e color type (nessuna decodifica completa)
//! - Restituisce l'identificatore usato dal registry ("PNG", "JPEG", ...)
//!
//! Un file con magic bytes validi ma header corrotto è considerato
//! non riconoscibile, esattamente come un file illeggibile.

use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{ColorType, ImageDecoder, ImageFormat, ImageResult};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the sniffer found in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedFormat {
    /// Registry identifier ("PNG", "JPEG", "GIF", ...)
    pub id: String,
    pub format: ImageFormat,
    /// Width and height, when a header decoder is available for the format
    pub dimensions: Option<(u32, u32)>,
    pub color: Option<ColorType>,
}

/// Registry identifier for an `image` format
pub fn format_id(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        ImageFormat::Ico => "ICO".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

/// Sniffs the format of `path` from its content.
///
/// Returns `None` for unreadable files, unrecognized content and
/// recognized formats whose header fails to parse.
pub fn detect_format(path: &Path) -> Option<DetectedFormat> {
    let reader = match image::io::Reader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => reader,
        Err(e) => {
            debug!("Unable to determine file format of {}: {}", path.display(), e);
            return None;
        }
    };

    let Some(format) = reader.format() else {
        debug!("Unable to determine file format of {}", path.display());
        return None;
    };

    let header = match read_header(path, format) {
        Ok(header) => header,
        Err(e) => {
            debug!("Invalid {:?} header in {}: {}", format, path.display(), e);
            return None;
        }
    };

    let detected = DetectedFormat {
        id: format_id(format),
        format,
        dimensions: header.map(|(dimensions, _)| dimensions),
        color: header.map(|(_, color)| color),
    };

    match (detected.dimensions, detected.color) {
        (Some((width, height)), Some(color)) => debug!(
            "{}, {}, {}x{}, {:?}",
            path.display(),
            detected.id,
            width,
            height,
            color
        ),
        _ => debug!("{}, {}", path.display(), detected.id),
    }

    Some(detected)
}

/// Async wrapper running detection on the blocking pool
pub async fn detect(path: &Path) -> Option<DetectedFormat> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || detect_format(&path))
        .await
        .unwrap_or(None)
}

fn read_header(path: &Path, format: ImageFormat) -> ImageResult<Option<((u32, u32), ColorType)>> {
    let reader = BufReader::new(File::open(path)?);
    match format {
        ImageFormat::Png => header_of(PngDecoder::new(reader)),
        ImageFormat::Jpeg => header_of(JpegDecoder::new(reader)),
        ImageFormat::Gif => header_of(GifDecoder::new(reader)),
        ImageFormat::WebP => header_of(WebPDecoder::new(reader)),
        _ => Ok(None),
    }
}

fn header_of<'a, D: ImageDecoder<'a>>(
    decoder: ImageResult<D>,
) -> ImageResult<Option<((u32, u32), ColorType)>> {
    let decoder = decoder?;
    Ok(Some((decoder.dimensions(), decoder.color_type())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_image(dir: &TempDir, name: &str, format: ImageOutputFormat) -> PathBuf {
        let path = dir.path().join(name);
        let image = RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8 * 6, y as u8 * 8, 128]));
        let mut file = File::create(&path).unwrap();
        image::DynamicImage::ImageRgb8(image).write_to(&mut file, format).unwrap();
        path
    }

    #[test]
    fn test_detects_png_by_content() {
        let dir = TempDir::new().unwrap();
        // Extension deliberately wrong
        let path = write_image(&dir, "picture.jpg", ImageOutputFormat::Png);

        let detected = detect_format(&path).unwrap();
        assert_eq!(detected.id, "PNG");
        assert_eq!(detected.dimensions, Some((40, 30)));
        assert_eq!(detected.color, Some(ColorType::Rgb8));
    }

    #[test]
    fn test_detects_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "photo.jpeg", ImageOutputFormat::Jpeg(80));

        let detected = detect_format(&path).unwrap();
        assert_eq!(detected.id, "JPEG");
        assert_eq!(detected.dimensions, Some((40, 30)));
    }

    #[test]
    fn test_corrupted_file_is_undetectable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"this is not an image at all").unwrap();
        assert!(detect_format(&path).is_none());
    }

    #[test]
    fn test_truncated_png_header_is_undetectable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("truncated.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n\x00\x00").unwrap();
        assert!(detect_format(&path).is_none());
    }

    #[test]
    fn test_missing_file_is_undetectable() {
        let dir = TempDir::new().unwrap();
        assert!(detect_format(&dir.path().join("absent.png")).is_none());
    }

    #[test]
    fn test_format_without_header_decoder_still_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image.bmp");
        let mut bytes = b"BM".to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, bytes).unwrap();

        let detected = detect_format(&path).unwrap();
        assert_eq!(detected.id, "BMP");
        assert_eq!(detected.dimensions, None);
    }

    #[tokio::test]
    async fn test_async_detection() {
        let dir = TempDir::new().unwrap();
        let path = write_image(&dir, "a.png", ImageOutputFormat::Png);
        assert_eq!(detect(&path).await.map(|d| d.id), Some("PNG".to_string()));
    }
}
