//! Raster helpers used by the compositing stages.
//!
//! Everything operates on 8-bit RGB buffers. Placement helpers clip to the
//! destination so callers never need to bounds-check.

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Width of the white frame drawn around an inlaid thumbnail.
pub const INLAY_BORDER: u32 = 2;

/// Gap left between the two panes of a side-by-side composite.
pub const SBS_SEPARATOR: u32 = 2;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Resize to `width`, keeping the aspect ratio. Never returns an empty image.
pub fn resize_to_width(image: &RgbImage, width: u32) -> RgbImage {
    let width = width.max(1);
    if width == image.width() {
        return image.clone();
    }
    let ratio = width as f64 / image.width().max(1) as f64;
    let height = ((image.height() as f64 * ratio) as u32).max(1);
    imageops::resize(image, width, height, RESIZE_FILTER)
}

/// Scale both dimensions by `1 / factor`.
pub fn downscale(image: &RgbImage, factor: u32) -> RgbImage {
    let factor = factor.max(1);
    if factor == 1 {
        return image.clone();
    }
    resize_to_width(image, image.width() / factor)
}

/// Fill the rectangle at (`x`, `y`) of size `w`×`h`, clipped to `image`.
pub fn fill_rect(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = x.saturating_add(w).min(image.width());
    let y_end = y.saturating_add(h).min(image.height());
    for py in y.min(y_end)..y_end {
        for px in x.min(x_end)..x_end {
            image.put_pixel(px, py, color);
        }
    }
}

/// Draw a one-pixel rectangle outline `thickness` pixels wide, clipped.
pub fn outline_rect(
    image: &mut RgbImage,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    thickness: u32,
    color: Rgb<u8>,
) {
    let t = thickness.max(1);
    fill_rect(image, x, y, w, t, color);
    fill_rect(image, x, (y + h).saturating_sub(t), w, t, color);
    fill_rect(image, x, y, t, h, color);
    fill_rect(image, (x + w).saturating_sub(t), y, t, h, color);
}

/// Copy `src` onto `dst` with its top-left corner at (`x`, `y`), clipped.
pub fn blit(dst: &mut RgbImage, src: &RgbImage, x: u32, y: u32) {
    imageops::replace(dst, src, x as i64, y as i64);
}

/// Picture-in-picture: a copy of `canvas` with `thumb` scaled to
/// `canvas.width / factor` in the top-left corner, framed white on its
/// right and bottom edges.
pub fn inlay(canvas: &RgbImage, thumb: &RgbImage, factor: u32) -> RgbImage {
    let small = resize_to_width(thumb, canvas.width() / factor.max(1));
    let mut out = canvas.clone();
    fill_rect(
        &mut out,
        0,
        0,
        small.width() + INLAY_BORDER,
        small.height() + INLAY_BORDER,
        WHITE,
    );
    blit(&mut out, &small, 0, 0);
    out
}

/// Two panes downscaled by `factor` and placed next to each other with a
/// black separator, or stacked when `vertical` is set. The shorter pane is
/// padded with black.
pub fn side_by_side(first: &RgbImage, second: &RgbImage, factor: u32, vertical: bool) -> RgbImage {
    let a = downscale(first, factor);
    let b = downscale(second, factor);

    let (width, height, b_x, b_y) = if vertical {
        (
            a.width().max(b.width()),
            a.height() + SBS_SEPARATOR + b.height(),
            0,
            a.height() + SBS_SEPARATOR,
        )
    } else {
        (
            a.width() + SBS_SEPARATOR + b.width(),
            a.height().max(b.height()),
            a.width() + SBS_SEPARATOR,
            0,
        )
    };

    let mut out = RgbImage::from_pixel(width, height, BLACK);
    blit(&mut out, &a, 0, 0);
    blit(&mut out, &b, b_x, b_y);
    out
}

/// Encode as baseline JPEG for transport.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(bytes)
}

/// Encode as PNG.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}
