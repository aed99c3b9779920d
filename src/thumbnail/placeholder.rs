use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::info;

use super::ThumbnailImage;
use crate::error::{Result, ReelcastError};

/// Output format from the file extension, PNG when unknown
pub fn output_format(path: &Path) -> ImageFormat {
    match ImageFormat::from_path(path) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => format,
        _ => ImageFormat::Png,
    }
}

pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::WebP => "webp",
        _ => "png",
    }
}

/// Resize `image` to exactly `width`x`height` and write it to `path`
pub fn save_image(image: &DynamicImage, path: &Path, width: u32, height: u32) -> Result<ThumbnailImage> {
    let resized = if image.width() == width && image.height() == height {
        image.clone()
    } else {
        image.resize_exact(width, height, image::imageops::FilterType::Lanczos3)
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    // JPEG has no alpha channel
    let format = output_format(path);
    DynamicImage::ImageRgb8(resized.to_rgb8()).save_with_format(path, format)?;

    Ok(ThumbnailImage {
        path: path.to_path_buf(),
        width,
        height,
        format: format_name(format).to_string(),
        file_size: std::fs::metadata(path)?.len(),
        placeholder: false,
    })
}

/// Write a flat-color image of the requested size
pub fn write_placeholder(path: &Path, width: u32, height: u32, color: [u8; 3]) -> Result<ThumbnailImage> {
    let canvas = RgbImage::from_pixel(width, height, Rgb(color));
    let mut thumbnail = save_image(&DynamicImage::ImageRgb8(canvas), path, width, height)?;
    thumbnail.placeholder = true;

    info!("Placeholder thumbnail written to {}", path.display());
    Ok(thumbnail)
}

/// [`write_placeholder`] on the blocking pool, for async callers
pub async fn spawn_placeholder(path: &Path, width: u32, height: u32, color: [u8; 3]) -> Result<ThumbnailImage> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_placeholder(&path, width, height, color))
        .await
        .map_err(|e| ReelcastError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_has_requested_size_and_color() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumbs").join("thumb.png");

        let thumb = write_placeholder(&path, 64, 36, [10, 20, 30]).unwrap();

        assert!(thumb.placeholder);
        assert_eq!(thumb.format, "png");
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 36));
        assert_eq!(decoded.get_pixel(5, 5), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_jpeg_extension_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumb.jpg");

        let thumb = write_placeholder(&path, 32, 18, [200, 100, 50]).unwrap();

        assert_eq!(thumb.format, "jpeg");
        assert_eq!(image::ImageFormat::from_path(&path).unwrap(), ImageFormat::Jpeg);
        assert!(thumb.file_size > 0);
    }

    #[tokio::test]
    async fn test_spawned_placeholder_matches_sync_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("thumb.png");

        let thumb = spawn_placeholder(&path, 48, 27, [90, 60, 30]).await.unwrap();

        assert!(thumb.placeholder);
        assert_eq!((thumb.width, thumb.height), (48, 27));
        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([90, 60, 30]));
    }

    #[test]
    fn test_unknown_extension_falls_back_to_png() {
        assert_eq!(output_format(Path::new("thumb.xyz")), ImageFormat::Png);
        assert_eq!(output_format(Path::new("thumb")), ImageFormat::Png);
    }

    #[test]
    fn test_save_image_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resized.png");
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([1, 2, 3])));

        let thumb = save_image(&source, &path, 40, 20).unwrap();

        assert_eq!((thumb.width, thumb.height), (40, 20));
        assert_eq!(image::image_dimensions(&path).unwrap(), (40, 20));
    }
}
