//! Bitmap Transform Pipeline
//!
//! Pure sizing, cropping and orientation helpers shared by the decode
//! workers and the grid. Nothing here keeps state, and nothing here fails
//! on odd geometry: empty images and zero dimensions are treated as 1×1.
//!
//! The two layouts compose these steps differently:
//!
//! - **Square grid**: [`ensure_min_size`] → [`apply_orientation`] → [`crop_to_square`]
//!   (the crop must see the upright image)
//! - **Full width**: [`fit_to_width`] → [`apply_orientation`]
//!   (only final pixel dimensions matter)

use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbaImage};
use serde::{Deserialize, Serialize};

// =============================================================================
// Geometry helpers
// =============================================================================

fn clamp_dim(value: u32) -> u32 {
    value.max(1)
}

fn clamp_empty(image: RgbaImage) -> RgbaImage {
    if image.width() == 0 || image.height() == 0 {
        RgbaImage::new(1, 1)
    } else {
        image
    }
}

/// Scale `value` by `numerator / denominator`, rounding, never below 1
fn scale_dim(value: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = (value as f64 * numerator as f64 / clamp_dim(denominator) as f64).round();
    clamp_dim(scaled as u32)
}

/// Height / width, with zero dimensions treated as 1
pub fn compute_aspect_ratio(width: u32, height: u32) -> f32 {
    clamp_dim(height) as f32 / clamp_dim(width) as f32
}

// =============================================================================
// Sub-sampling
// =============================================================================

/// Largest power-of-two reduction that keeps both dimensions at or above
/// `target_min`. Returns 1 if either side is already at or below the target.
pub fn compute_subsample_factor(source_width: u32, source_height: u32, target_min: u32) -> u32 {
    let width = clamp_dim(source_width);
    let height = clamp_dim(source_height);
    let target = clamp_dim(target_min);

    if width <= target || height <= target {
        return 1;
    }

    let half_width = width / 2;
    let half_height = height / 2;
    let mut factor = 1;
    while half_width / factor >= target && half_height / factor >= target {
        factor *= 2;
    }
    factor
}

/// Reduce an image by an integer factor without filtering, the way a
/// sampled decode would.
pub fn subsample(image: &RgbaImage, factor: u32) -> RgbaImage {
    let factor = clamp_dim(factor);
    if factor == 1 {
        return image.clone();
    }
    let width = clamp_dim(image.width() / factor);
    let height = clamp_dim(image.height() / factor);
    imageops::resize(image, width, height, FilterType::Nearest)
}

// =============================================================================
// Sizing
// =============================================================================

/// Bring an image near `min_size` before cropping.
///
/// When both sides exceed `min_size`, shrinks so the shorter side equals it.
/// When a side is below it, grows so that side reaches it. Aspect ratio is
/// preserved either way.
pub fn ensure_min_size(image: RgbaImage, min_size: u32) -> RgbaImage {
    let image = clamp_empty(image);
    let size = clamp_dim(min_size);
    let (mut width, mut height) = image.dimensions();

    if width == size && height == size {
        return image;
    }

    if width > size && height > size {
        if width > height {
            width = scale_dim(width, size, height);
            height = size;
        } else {
            height = scale_dim(height, size, width);
            width = size;
        }
    } else {
        if width < size {
            height = scale_dim(height, size, width);
            width = size;
        }
        if height < size {
            width = scale_dim(width, size, height);
            height = size;
        }
    }

    if (width, height) == image.dimensions() {
        return image;
    }
    imageops::resize(&image, width, height, FilterType::Triangle)
}

/// Center-crop to `size × size`. Images smaller than `size` on a side are
/// cropped to their shorter side instead.
pub fn crop_to_square(image: RgbaImage, size: u32) -> RgbaImage {
    let image = clamp_empty(image);
    let (width, height) = image.dimensions();
    let side = clamp_dim(size).min(width).min(height);

    if width == side && height == side {
        return image;
    }

    let x = (width - side) / 2;
    let y = (height - side) / 2;
    imageops::crop_imm(&image, x, y, side, side).to_image()
}

/// Uniformly scale so the width equals `max_width`
pub fn fit_to_width(image: RgbaImage, max_width: u32) -> RgbaImage {
    let image = clamp_empty(image);
    let (width, height) = image.dimensions();
    let target = clamp_dim(max_width);

    if width == target {
        return image;
    }
    let new_height = scale_dim(height, target, width);
    imageops::resize(&image, target, new_height, FilterType::Triangle)
}

/// Uniform scale so the larger dimension equals `max_dimension`.
///
/// `filtered` picks a smoothing filter; the low-res placeholder path uses
/// it, the full decode path does not.
pub fn scale(image: &RgbaImage, max_dimension: u32, filtered: bool) -> RgbaImage {
    let (width, height) = (clamp_dim(image.width()), clamp_dim(image.height()));
    if image.width() == 0 || image.height() == 0 {
        return RgbaImage::new(1, 1);
    }

    let target = clamp_dim(max_dimension);
    let (new_width, new_height) = if width >= height {
        (target, scale_dim(height, target, width))
    } else {
        (scale_dim(width, target, height), target)
    };

    if (new_width, new_height) == (width, height) {
        return image.clone();
    }

    let filter = if filtered {
        FilterType::Triangle
    } else {
        FilterType::Nearest
    };
    imageops::resize(image, new_width, new_height, filter)
}

// =============================================================================
// Orientation
// =============================================================================

/// The eight EXIF orientation values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl Orientation {
    /// Parse an EXIF orientation tag. Unknown values yield `None`.
    pub fn from_exif(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Orientation::Normal),
            2 => Some(Orientation::FlipHorizontal),
            3 => Some(Orientation::Rotate180),
            4 => Some(Orientation::FlipVertical),
            5 => Some(Orientation::Transpose),
            6 => Some(Orientation::Rotate90),
            7 => Some(Orientation::Transverse),
            8 => Some(Orientation::Rotate270),
            _ => None,
        }
    }

    pub fn to_exif(self) -> u8 {
        self as u8
    }

    /// The orientation that undoes this one
    pub fn inverse(self) -> Self {
        match self {
            Orientation::Rotate90 => Orientation::Rotate270,
            Orientation::Rotate270 => Orientation::Rotate90,
            other => other,
        }
    }

    /// Whether width and height trade places
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90
                | Orientation::Transverse
                | Orientation::Rotate270
        )
    }

    /// Upright dimensions for a stored `width × height` image
    pub fn oriented_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Map a destination pixel back to its source pixel.
    /// `width`/`height` are the source dimensions.
    fn source_pixel(self, dx: u32, dy: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Normal => (dx, dy),
            Orientation::FlipHorizontal => (width - 1 - dx, dy),
            Orientation::Rotate180 => (width - 1 - dx, height - 1 - dy),
            Orientation::FlipVertical => (dx, height - 1 - dy),
            Orientation::Transpose => (dy, dx),
            Orientation::Rotate90 => (dy, height - 1 - dx),
            Orientation::Transverse => (width - 1 - dy, height - 1 - dx),
            Orientation::Rotate270 => (width - 1 - dy, dx),
        }
    }
}

impl From<image::metadata::Orientation> for Orientation {
    fn from(value: image::metadata::Orientation) -> Self {
        Orientation::from_exif(value.to_exif()).unwrap_or(Orientation::Normal)
    }
}

/// Apply an EXIF orientation as one remapping pass. `None` and
/// [`Orientation::Normal`] leave the image untouched.
pub fn apply_orientation(image: RgbaImage, orientation: Option<Orientation>) -> RgbaImage {
    let orientation = match orientation {
        None | Some(Orientation::Normal) => return image,
        Some(o) => o,
    };
    let image = clamp_empty(image);
    let (width, height) = image.dimensions();
    let (out_width, out_height) = orientation.oriented_dimensions(width, height);

    ImageBuffer::from_fn(out_width, out_height, |dx, dy| {
        let (sx, sy) = orientation.source_pixel(dx, dy, width, height);
        *image.get_pixel(sx, sy)
    })
}

// =============================================================================
// Layout pipelines
// =============================================================================

/// Square grid thumbnail: size, straighten, then crop
pub fn square_thumbnail(
    image: RgbaImage,
    size: u32,
    orientation: Option<Orientation>,
) -> RgbaImage {
    // An axis swap does not change which side is shorter, so sizing can
    // happen on the stored image.
    let image = ensure_min_size(image, size);
    let image = apply_orientation(image, orientation);
    crop_to_square(image, size)
}

/// Full-width thumbnail: fit, then straighten. When the orientation swaps
/// axes the stored height becomes the displayed width, so that side is fit.
pub fn full_width_thumbnail(
    image: RgbaImage,
    width: u32,
    orientation: Option<Orientation>,
) -> RgbaImage {
    let swaps = orientation.map(|o| o.swaps_axes()).unwrap_or(false);
    let fitted = if swaps {
        let image = clamp_empty(image);
        let (w, h) = image.dimensions();
        let target = clamp_dim(width);
        if h == target {
            image
        } else {
            imageops::resize(&image, scale_dim(w, target, h), target, FilterType::Triangle)
        }
    } else {
        fit_to_width(image, width)
    };
    apply_orientation(fitted, orientation)
}
