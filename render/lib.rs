use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageError};
use log::{debug, warn};
use pngveil::{ColorMode, DecodedPng, PixelData, PixelGrid};
use thiserror::Error;

/// Blur strength used when metadata asks for it.
pub const BLUR_SIGMA: f32 = 8.0;
/// Images with a side at or below this many pixels get upscaled for display.
pub const UPSCALE_THRESHOLD: u32 = 50;
pub const UPSCALE_FACTOR: u32 = 100;
/// Largest pixel buffer, in bytes, that upscaling may allocate.
pub const MAX_UPSCALED_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Grayscale with alpha needs an image with an alpha channel, got {0:?}")]
    AlphaRequired(image::ColorType),

    #[error("Pixel buffer of {len} samples does not fit a {width}x{height} {mode:?} image")]
    BufferMismatch { width: u32, height: u32, mode: ColorMode, len: usize },

    #[error("Upscaling {width}x{height} would need {bytes} bytes, over the upscale limit")]
    TooLarge { width: u32, height: u32, bytes: u64 },

    #[error("Image error: {0}")]
    Image(#[from] ImageError),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Which of the metadata driven effects [`render`] may apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub effects: bool,
    pub upscale: bool,
    pub blur_sigma: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            effects: true,
            upscale: true,
            blur_sigma: BLUR_SIGMA,
        }
    }
}

fn buffer<P: image::Pixel<Subpixel = u8>>(grid: &PixelGrid, samples: Vec<u8>) -> RenderResult<ImageBuffer<P, Vec<u8>>> {
    let len = samples.len();

    ImageBuffer::from_raw(grid.width(), grid.height(), samples).ok_or(RenderError::BufferMismatch {
        width: grid.width(),
        height: grid.height(),
        mode: grid.mode(),
        len,
    })
}

/// Builds a displayable image from decoded pixels. Palette images come out as RGB.
pub fn to_image(grid: &PixelGrid) -> RenderResult<DynamicImage> {
    let image = match grid.data() {
        PixelData::L8(samples) => DynamicImage::ImageLuma8(buffer::<image::Luma<u8>>(grid, samples.clone())?),
        PixelData::RGB8(_) => DynamicImage::ImageRgb8(buffer::<image::Rgb<u8>>(grid, grid.data().to_bytes())?),
        PixelData::LA8(_) => DynamicImage::ImageLumaA8(buffer::<image::LumaA<u8>>(grid, grid.data().to_bytes())?),
        PixelData::RGBA8(_) => DynamicImage::ImageRgba8(buffer::<image::Rgba<u8>>(grid, grid.data().to_bytes())?),
        PixelData::Indexed(indices) => {
            let out_of_range = indices
                .iter()
                .filter(|&&index| index as usize >= grid.palette().len())
                .count();
            if out_of_range > 0 {
                warn!("{} pixels use a missing palette entry, drawing them black", out_of_range);
            }

            let rgb: Vec<u8> = grid.expand_palette().unwrap_or_default().into_iter().flatten().collect();
            DynamicImage::ImageRgb8(buffer::<image::Rgb<u8>>(grid, rgb)?)
        }
    };

    Ok(image)
}

pub fn apply_blur(image: &DynamicImage, sigma: f32) -> DynamicImage {
    debug!("Blurring with sigma {}", sigma);
    image.blur(sigma)
}

/// Converts to grayscale while keeping the alpha channel. Output is always RGBA8.
pub fn grayscale_with_alpha(image: &DynamicImage) -> RenderResult<DynamicImage> {
    if !image.color().has_alpha() {
        return Err(RenderError::AlphaRequired(image.color()));
    }

    let mut rgba = image.to_rgba8();
    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let luma = (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
        let luma = luma as u8;

        pixel.0 = [luma, luma, luma, a];
    }

    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Nearest-neighbour upscale of tiny images so they are visible at all.
pub fn upscale_small(image: &DynamicImage) -> RenderResult<DynamicImage> {
    let (width, height) = (image.width(), image.height());

    if width > UPSCALE_THRESHOLD && height > UPSCALE_THRESHOLD {
        return Ok(image.clone());
    }

    let new_width = width.saturating_mul(UPSCALE_FACTOR);
    let new_height = height.saturating_mul(UPSCALE_FACTOR);
    let bytes = u64::from(new_width)
        .saturating_mul(u64::from(new_height))
        .saturating_mul(u64::from(image.color().bytes_per_pixel()));

    if bytes > MAX_UPSCALED_BYTES {
        return Err(RenderError::TooLarge { width, height, bytes });
    }

    debug!("Upscaling {}x{} to {}x{}", width, height, new_width, new_height);
    Ok(image.resize_exact(new_width, new_height, FilterType::Nearest))
}

/// Turns a decoded PNG into the image to show, applying whatever its metadata asked for.
pub fn render(decoded: &DecodedPng, options: &RenderOptions) -> RenderResult<DynamicImage> {
    let mut image = to_image(decoded.grid())?;
    let flags = decoded.flags();

    if options.effects {
        if flags.should_blur() {
            image = apply_blur(&image, options.blur_sigma);
        }

        if flags.should_grayscale_with_alpha() {
            image = grayscale_with_alpha(&image)?;
        }
    }

    if options.upscale {
        image = upscale_small(&image)?;
    }

    Ok(image)
}

pub fn save<P: AsRef<Path>>(image: &DynamicImage, path: P) -> RenderResult<()> {
    image.save(path.as_ref())?;
    debug!("Wrote {}", path.as_ref().display());

    Ok(())
}
