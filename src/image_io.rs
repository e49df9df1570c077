use std::path::{Path, PathBuf};

use image::DynamicImage;
use wgpu::TextureFormat;

use crate::error::Result;
use crate::gpu::context::GpuContext;
use crate::gpu::texture::Texture;
use crate::gpu::thumbnail::ThumbnailPass;

pub const THUMB_SIZE: u32 = 300;

static FLOAT_EXTS: &[&str] = &["exr", "hdr"];
static SUPPORTED_IMAGE_EXTS: &[&str] = &[
    "jpg", "jpeg", "png", "tiff", "tif", "webp", "bmp", "gif", "tga", "qoi", "exr", "hdr",
];

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy()) else {
        return false;
    };
    exts.iter().any(|known| ext.eq_ignore_ascii_case(known))
}

/// Returns `true` if the path names a floating-point image container.
pub fn is_float_image(path: &Path) -> bool {
    has_extension(path, FLOAT_EXTS)
}

/// Returns `true` if the path has a supported image extension.
pub fn is_supported_image(path: &Path) -> bool {
    has_extension(path, SUPPORTED_IMAGE_EXTS)
}

/// Returns the cached thumbnail path for a given source image.
pub fn cache_path(source: &Path, cache_dir: &Path) -> PathBuf {
    let stem = source.file_name().unwrap_or_default().to_string_lossy();
    cache_dir.join(format!("{}.png", stem))
}

pub fn open_image(path: &Path) -> Result<DynamicImage> {
    Ok(image::open(path)?)
}

/// Upload format for `img`: 8-bit images stay 8-bit, everything deeper goes
/// to half float. 16-bit integer data keeps only the top 11 bits of precision.
pub fn upload_format(img: &DynamicImage) -> TextureFormat {
    match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => TextureFormat::Rgba8Unorm,
        _ => TextureFormat::Rgba16Float,
    }
}

/// Encodes `img` to `path`, picking the pixel layout from the extension.
///
/// Float containers keep float data; everything else is written as 8-bit,
/// without alpha for JPEG.
pub fn save(img: &DynamicImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let encoded = if has_extension(path, &["hdr"]) {
        DynamicImage::ImageRgb32F(img.to_rgb32f())
    } else if has_extension(path, &["exr"]) {
        DynamicImage::ImageRgba32F(img.to_rgba32f())
    } else if has_extension(path, &["jpg", "jpeg"]) {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        DynamicImage::ImageRgba8(img.to_rgba8())
    };
    encoded.save(path)?;
    Ok(())
}

/// Renders a thumbnail of `img` on the GPU and writes it to `dest`.
pub fn generate(
    ctx: &GpuContext,
    pass: &mut ThumbnailPass,
    img: &DynamicImage,
    dest: &Path,
    size: u32,
) -> Result<()> {
    let texture = Texture::from_image(ctx, img, upload_format(img), false)?;
    let thumb = pass.create_thumbnail(ctx, size, &texture, TextureFormat::Rgba8Unorm, 0);
    save(&thumb.to_image(ctx, 0, 0)?, dest)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use image::{DynamicImage, ImageBuffer, Rgba, Rgba32FImage};
    use wgpu::TextureFormat;

    use super::{cache_path, is_float_image, is_supported_image, save, upload_format};

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("texconv-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn extension_detection_is_case_insensitive() {
        assert!(is_supported_image(Path::new("/tmp/a.PNG")));
        assert!(is_supported_image(Path::new("/tmp/a.exr")));
        assert!(!is_supported_image(Path::new("/tmp/a.txt")));
        assert!(!is_supported_image(Path::new("/tmp/noext")));
        assert!(is_float_image(Path::new("/tmp/a.HDR")));
        assert!(!is_float_image(Path::new("/tmp/a.png")));
    }

    #[test]
    fn cache_path_keeps_source_name() {
        let out = cache_path(Path::new("/photos/cat.jpg"), Path::new("/cache"));
        assert_eq!(out, Path::new("/cache/cat.jpg.png"));
    }

    #[test]
    fn float_images_upload_as_half_float() {
        let ldr = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(1, 1, Rgba([0, 0, 0, 0])));
        let hdr = DynamicImage::ImageRgba32F(Rgba32FImage::new(1, 1));
        let deep = DynamicImage::ImageRgba16(ImageBuffer::new(1, 1));
        assert_eq!(upload_format(&ldr), TextureFormat::Rgba8Unorm);
        assert_eq!(upload_format(&hdr), TextureFormat::Rgba16Float);
        assert_eq!(upload_format(&deep), TextureFormat::Rgba16Float);
    }

    #[test]
    fn save_creates_parent_and_round_trips_png() {
        let dir = scratch_dir("save");
        let path = dir.join("nested").join("out.png");
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(3, 2, Rgba([4, 5, 6, 7])));
        save(&img, &path).expect("png save should succeed");
        let back = image::open(&path).expect("saved png should decode");
        assert_eq!(back.to_rgba8().into_raw(), img.to_rgba8().into_raw());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn generate_writes_bounded_thumbnail() {
        let Some(ctx) = crate::gpu::context::shared() else {
            return;
        };
        let dir = scratch_dir("generate");
        let dest = dir.join("thumb.png");
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(120, 40, Rgba([9, 9, 9, 255])));
        let mut pass = crate::gpu::thumbnail::ThumbnailPass::new(ctx);
        super::generate(ctx, &mut pass, &img, &dest, 30).expect("thumbnail should be written");
        let thumb = image::open(&dest).expect("thumbnail should decode");
        assert_eq!((thumb.width(), thumb.height()), (30, 10));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn oversized_image_fails_without_writing() {
        let Some(ctx) = crate::gpu::context::shared() else {
            return;
        };
        let dir = scratch_dir("oversized");
        let dest = dir.join("thumb.png");
        let max = ctx.device.limits().max_texture_dimension_2d;
        let img = DynamicImage::ImageRgba8(ImageBuffer::new(1, max + 1));
        let mut pass = crate::gpu::thumbnail::ThumbnailPass::new(ctx);
        let result = super::generate(ctx, &mut pass, &img, &dest, 30);
        assert!(matches!(result, Err(crate::error::Error::TooLarge { .. })));
        assert!(!dest.exists());
        assert!(ctx.binding_slots().is_clear());
    }
}
