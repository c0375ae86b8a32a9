//! Deterministic image helpers used by the generation worker: fitting
//! source images to the model's canvas, preparing inpainting masks and
//! blending generated content back over the original.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FILTER: FilterType = FilterType::Lanczos3;

/// Longest edge of a gallery thumbnail.
pub const THUMBNAIL_SIZE: u32 = 256;

/// Default edge softening applied to inpainting masks.
pub const MASK_BLUR_RADIUS: f32 = 5.0;

#[derive(Debug, Error)]
pub enum ImageProcessingError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Invalid base64 mask data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid target size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Center-crop to the target aspect ratio, then scale.
    Crop,
    /// Scale to fit inside the target and pad with black.
    Pad,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, utoipa::ToSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A user-drawn selection, as an alternative to a painted mask.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum MaskRegion {
    Polygon { points: Vec<Point> },
    Rect { x: u32, y: u32, width: u32, height: u32 },
}

pub fn load(data: &[u8]) -> Result<DynamicImage, ImageProcessingError> {
    image::load_from_memory(data).map_err(ImageProcessingError::Decode)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ImageProcessingError> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(ImageProcessingError::Encode)?;
    Ok(buffer.into_inner())
}

pub fn resize_image(
    img: &DynamicImage,
    width: u32,
    height: u32,
    mode: ResizeMode,
) -> Result<DynamicImage, ImageProcessingError> {
    if width == 0 || height == 0 {
        return Err(ImageProcessingError::InvalidSize { width, height });
    }
    Ok(match mode {
        ResizeMode::Crop => crop_to_aspect_and_resize(img, width, height),
        ResizeMode::Pad => letterbox(img, width, height),
    })
}

pub fn crop_to_aspect_and_resize(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let target_ratio = width as f64 / height as f64;
    let img_ratio = img.width() as f64 / img.height() as f64;

    let cropped = if img_ratio > target_ratio {
        // Wider than the target: trim the sides.
        let new_width = ((img.height() as f64 * target_ratio) as u32).max(1);
        let left = (img.width() - new_width) / 2;
        img.crop_imm(left, 0, new_width, img.height())
    } else {
        let new_height = ((img.width() as f64 / target_ratio) as u32).clamp(1, img.height());
        let top = (img.height() - new_height) / 2;
        img.crop_imm(0, top, img.width(), new_height)
    };

    cropped.resize_exact(width, height, FILTER)
}

/// Fits the image inside `width`x`height` without upscaling and centers it
/// on a black canvas.
pub fn letterbox(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let fitted = if img.width() > width || img.height() > height {
        img.resize(width, height, FILTER)
    } else {
        img.clone()
    };

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    let x = (width - fitted.width()) / 2;
    let y = (height - fitted.height()) / 2;
    imageops::overlay(&mut canvas, &fitted.to_rgb8(), x as i64, y as i64);
    DynamicImage::ImageRgb8(canvas)
}

pub fn thumbnail(img: &DynamicImage) -> DynamicImage {
    if img.width() > THUMBNAIL_SIZE || img.height() > THUMBNAIL_SIZE {
        img.resize(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FILTER)
    } else {
        img.clone()
    }
}

/// Decodes a base64 PNG mask, with or without a `data:` URL prefix, into
/// a grayscale image.
pub fn decode_mask(mask_data: &str) -> Result<GrayImage, ImageProcessingError> {
    let encoded = match mask_data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => mask_data,
    };
    let bytes = general_purpose::STANDARD.decode(encoded.trim())?;
    Ok(load(&bytes)?.to_luma8())
}

/// White marks the area to regenerate.
pub fn prepare_mask(mask: &GrayImage, size: (u32, u32), blur_radius: f32, invert: bool) -> GrayImage {
    let (width, height) = size;
    let mut prepared = if mask.dimensions() != size {
        imageops::resize(mask, width, height, FILTER)
    } else {
        mask.clone()
    };

    if invert {
        imageops::invert(&mut prepared);
    }

    if blur_radius > 0.0 {
        prepared = imageops::blur(&prepared, blur_radius);
    }

    prepared
}

pub fn mask_from_region(width: u32, height: u32, region: &MaskRegion) -> GrayImage {
    let mut mask = GrayImage::new(width, height);

    match region {
        MaskRegion::Rect { x, y, width: w, height: h } => {
            // Both edges inclusive.
            let x_end = x.saturating_add(*w).min(width.saturating_sub(1));
            let y_end = y.saturating_add(*h).min(height.saturating_sub(1));
            if *x < width && *y < height {
                for py in *y..=y_end {
                    for px in *x..=x_end {
                        mask.put_pixel(px, py, Luma([255]));
                    }
                }
            }
        }
        MaskRegion::Polygon { points } => {
            if points.len() >= 3 {
                for py in 0..height {
                    for px in 0..width {
                        if point_in_polygon(px as f64 + 0.5, py as f64 + 0.5, points) {
                            mask.put_pixel(px, py, Luma([255]));
                        }
                    }
                }
            }
        }
    }

    mask
}

fn point_in_polygon(x: f64, y: f64, points: &[Point]) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (a, b) = (points[i], points[j]);
        if (a.y > y) != (b.y > y) && x < (b.x - a.x) * (y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Blends `generated` over `original`: white mask pixels take the generated
/// content, black keep the original, grays mix linearly.
pub fn composite(original: &DynamicImage, generated: &DynamicImage, mask: &GrayImage) -> RgbImage {
    let (width, height) = (original.width(), original.height());
    let original = original.to_rgb8();
    let generated = if generated.width() != width || generated.height() != height {
        generated.resize_exact(width, height, FILTER).to_rgb8()
    } else {
        generated.to_rgb8()
    };
    let mask = if mask.dimensions() != (width, height) {
        imageops::resize(mask, width, height, FILTER)
    } else {
        mask.clone()
    };

    RgbImage::from_fn(width, height, |x, y| {
        let alpha = mask.get_pixel(x, y)[0] as u32;
        let base = original.get_pixel(x, y);
        let top = generated.get_pixel(x, y);
        let mut out = [0u8; 3];
        for (channel, value) in out.iter_mut().enumerate() {
            let blended = top[channel] as u32 * alpha + base[channel] as u32 * (255 - alpha);
            *value = ((blended + 127) / 255) as u8;
        }
        Rgb(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_image(width: u32, height: u32) -> DynamicImage {
        // Left half red, right half blue.
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        }))
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn crop_mode_keeps_the_center_and_hits_exact_size() {
        let out = resize_image(&split_image(200, 100), 10, 10, ResizeMode::Crop).unwrap();
        assert_eq!((out.width(), out.height()), (10, 10));

        let rgb = out.to_rgb8();
        assert!(rgb.get_pixel(0, 5)[0] > 200, "left edge stays red");
        assert!(rgb.get_pixel(9, 5)[2] > 200, "right edge stays blue");
    }

    #[test]
    fn crop_mode_trims_tall_images_vertically() {
        let out = crop_to_aspect_and_resize(&solid(50, 200, [10, 20, 30]), 64, 32);
        assert_eq!((out.width(), out.height()), (64, 32));
    }

    #[test]
    fn pad_mode_centers_on_black() {
        let out = resize_image(&solid(100, 50, [255, 255, 255]), 100, 100, ResizeMode::Pad).unwrap();
        let rgb = out.to_rgb8();
        assert_eq!((rgb.width(), rgb.height()), (100, 100));
        assert_eq!(rgb.get_pixel(50, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(50, 50), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(50, 99), &Rgb([0, 0, 0]));
    }

    #[test]
    fn zero_sized_targets_are_rejected() {
        assert!(matches!(
            resize_image(&solid(4, 4, [0, 0, 0]), 0, 4, ResizeMode::Crop),
            Err(ImageProcessingError::InvalidSize { .. })
        ));
    }

    #[test]
    fn thumbnail_never_upscales() {
        assert_eq!(thumbnail(&solid(100, 40, [0, 0, 0])).width(), 100);
        let thumb = thumbnail(&solid(1024, 512, [0, 0, 0]));
        assert_eq!((thumb.width(), thumb.height()), (256, 128));
    }

    #[test]
    fn decode_mask_accepts_data_urls() {
        let png = encode_png(&solid(8, 8, [255, 255, 255])).unwrap();
        let encoded = general_purpose::STANDARD.encode(png);

        let plain = decode_mask(&encoded).unwrap();
        let data_url = decode_mask(&format!("data:image/png;base64,{encoded}")).unwrap();

        assert_eq!(plain.dimensions(), (8, 8));
        assert_eq!(plain, data_url);
        assert_eq!(plain.get_pixel(3, 3)[0], 255);
    }

    #[test]
    fn decode_mask_rejects_garbage() {
        assert!(matches!(decode_mask("not base64!!"), Err(ImageProcessingError::Base64(_))));
    }

    #[test]
    fn prepare_mask_resizes_and_inverts() {
        let mask = GrayImage::from_pixel(4, 4, Luma([0]));
        let prepared = prepare_mask(&mask, (16, 8), 0.0, true);
        assert_eq!(prepared.dimensions(), (16, 8));
        assert!(prepared.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn rect_region_is_inclusive_and_clamped() {
        let mask = mask_from_region(10, 10, &MaskRegion::Rect { x: 2, y: 2, width: 3, height: 20 });
        assert_eq!(mask.get_pixel(2, 2)[0], 255);
        assert_eq!(mask.get_pixel(5, 9)[0], 255);
        assert_eq!(mask.get_pixel(6, 5)[0], 0);
        assert_eq!(mask.get_pixel(1, 5)[0], 0);
    }

    #[test]
    fn polygon_region_fills_the_interior_only() {
        let points = vec![
            Point { x: 0.0, y: 0.0 },
            Point { x: 10.0, y: 0.0 },
            Point { x: 0.0, y: 10.0 },
        ];
        let mask = mask_from_region(10, 10, &MaskRegion::Polygon { points });
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
        assert_eq!(mask.get_pixel(9, 9)[0], 0);

        let degenerate = vec![Point { x: 0.0, y: 0.0 }, Point { x: 5.0, y: 5.0 }];
        let empty = mask_from_region(10, 10, &MaskRegion::Polygon { points: degenerate });
        assert!(empty.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn region_json_shapes_parse() {
        let rect: MaskRegion = serde_json::from_str(r#"{"x":1,"y":2,"width":3,"height":4}"#).unwrap();
        assert_eq!(rect, MaskRegion::Rect { x: 1, y: 2, width: 3, height: 4 });
        let poly: MaskRegion =
            serde_json::from_str(r#"{"points":[{"x":0,"y":0},{"x":1,"y":0},{"x":0,"y":1}]}"#).unwrap();
        assert!(matches!(poly, MaskRegion::Polygon { ref points } if points.len() == 3));
    }

    #[test]
    fn composite_uses_mask_as_blend_map() {
        let original = solid(4, 1, [0, 0, 0]);
        let generated = solid(4, 1, [200, 100, 50]);
        let mask = GrayImage::from_fn(4, 1, |x, _| match x {
            0 => Luma([0]),
            1 => Luma([255]),
            _ => Luma([128]),
        });

        let out = composite(&original, &generated, &mask);
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([200, 100, 50]));
        assert_eq!(out.get_pixel(2, 0), &Rgb([100, 50, 25]));
    }

    #[test]
    fn composite_scales_generated_to_original() {
        let original = solid(8, 8, [0, 0, 0]);
        let generated = solid(2, 2, [255, 255, 255]);
        let mask = GrayImage::from_pixel(8, 8, Luma([255]));
        let out = composite(&original, &generated, &mask);
        assert_eq!(out.dimensions(), (8, 8));
        assert!(out.get_pixel(4, 4).0.iter().all(|c| *c >= 250));
    }
}
