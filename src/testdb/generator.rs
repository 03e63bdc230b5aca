//! Media generators for tests
//!
//! Produces small but real encoded files so the decoders run their normal
//! code paths.

use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, ImageFormat, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::types::MediaKind;

/// Frame delay used for generated animations
pub const TEST_FRAME_DELAY: Duration = Duration::from_millis(100);

/// A gradient with a seed-dependent tint, so distinct seeds give distinct pixels
pub fn gradient(width: u32, height: u32, seed: u8) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgba([r, g, seed, 255])
    })
}

/// PNG bytes for a `width` x `height` gradient
pub fn encode_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    gradient(width, height, 0)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("PNG encoding into memory");
    bytes
}

/// Animated GIF bytes with `frames` frames of [`TEST_FRAME_DELAY`] each
pub fn encode_gif(width: u32, height: u32, frames: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        let delay = Delay::from_numer_denom_ms(TEST_FRAME_DELAY.as_millis() as u32, 1);
        let frames = (0..frames.max(1))
            .map(|i| Frame::from_parts(gradient(width, height, (i * 40) as u8), 0, 0, delay));
        encoder
            .encode_frames(frames)
            .expect("GIF encoding into memory");
    }
    bytes
}

/// One generated library entry
#[derive(Debug, Clone)]
pub struct GeneratedMedia {
    pub key: String,
    pub kind: MediaKind,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// A reproducible mix of pictures (PNG) and clips (GIF) with random sizes
pub fn generate_library(count: usize, seed: u64) -> Vec<GeneratedMedia> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let width = rng.gen_range(8..=96);
            let height = rng.gen_range(8..=96);
            if rng.gen_bool(0.25) {
                GeneratedMedia {
                    key: format!("clip_{:04}.gif", i),
                    kind: MediaKind::Video,
                    width,
                    height,
                    bytes: encode_gif(width, height, rng.gen_range(2..=4)),
                }
            } else {
                GeneratedMedia {
                    key: format!("img_{:04}.png", i),
                    kind: MediaKind::Picture,
                    width,
                    height,
                    bytes: encode_png(width, height),
                }
            }
        })
        .collect()
}
