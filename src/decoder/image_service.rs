//! Isolated image decode service
//!
//! Runs decodes on a dedicated thread behind a request channel, standing in
//! for a decoder living in another process. If the thread dies the channel
//! reports itself unavailable and the scheduler fails requests fast.

use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use image::{DynamicImage, ImageDecoder, ImageReader};
use log::{debug, error, warn};

use crate::core::config::DecodeConfig;
use crate::core::error::{DecodeError, Result};
use crate::decoder::opener::ResourceOpener;
use crate::decoder::{DecodeJob, DecodedMedia, ImageDecodeChannel, WorkerResult};
use crate::transform::{self, Orientation};

/// Decode one still image for `job`.
///
/// Reads the header to size the sampled decode, honours the EXIF
/// orientation, then builds a square or full-width thumbnail. The ratio is
/// that of the upright source before any crop.
pub fn decode_image(
    opener: &dyn ResourceOpener,
    job: &DecodeJob,
    config: &DecodeConfig,
) -> Result<DecodedMedia> {
    let too_large = |size: u64| {
        DecodeError::ResourceExhausted(format!(
            "{} is {} bytes, limit is {}",
            job.key, size, config.max_source_bytes
        ))
    };

    if let Some(size) = opener.size_hint(&job.key) {
        if size > config.max_source_bytes {
            return Err(too_large(size));
        }
    }

    let mut bytes = Vec::new();
    opener.open(&job.key)?.read_to_end(&mut bytes)?;
    if bytes.len() as u64 > config.max_source_bytes {
        return Err(too_large(bytes.len() as u64));
    }

    let mut decoder = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder
        .orientation()
        .ok()
        .map(Orientation::from)
        .filter(|o| *o != Orientation::Normal);
    let (width, height) = decoder.dimensions();
    let image = DynamicImage::from_decoder(decoder)?.to_rgba8();

    let (upright_width, upright_height) = orientation
        .map(|o| o.oriented_dimensions(width, height))
        .unwrap_or((width, height));
    let ratio = transform::compute_aspect_ratio(upright_width, upright_height);

    let factor = transform::compute_subsample_factor(width, height, job.size);
    let sampled = transform::subsample(&image, factor);
    let frame = if job.full_width {
        transform::full_width_thumbnail(sampled, job.size, orientation)
    } else {
        transform::square_thumbnail(sampled, job.size, orientation)
    };

    debug!(
        "Decoded {} ({}x{}, 1/{} sample) to {}x{}",
        job.key,
        width,
        height,
        factor,
        frame.width(),
        frame.height()
    );

    Ok(DecodedMedia {
        frames: vec![frame],
        duration: None,
        ratio,
    })
}

/// Dedicated-thread image decoder
pub struct ImageDecodeService {
    request_tx: Option<Sender<DecodeJob>>,
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ImageDecodeService {
    /// Start the decoder thread. Results go to `result_tx`.
    pub fn spawn(
        opener: Arc<dyn ResourceOpener>,
        config: DecodeConfig,
        result_tx: Sender<WorkerResult>,
    ) -> std::io::Result<Self> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<DecodeJob>();
        let alive = Arc::new(AtomicBool::new(true));
        let alive_flag = alive.clone();

        let handle = thread::Builder::new()
            .name("image-decoder".to_string())
            .spawn(move || {
                while let Ok(job) = request_rx.recv() {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        decode_image(opener.as_ref(), &job, &config)
                    }));
                    let result = outcome.unwrap_or_else(|_| {
                        error!("Image decoder panicked on {}", job.key);
                        Err(DecodeError::DecodeRuntime("decoder panicked".to_string()))
                    });

                    if result_tx.send(WorkerResult { key: job.key, result }).is_err() {
                        break;
                    }
                }
                alive_flag.store(false, Ordering::SeqCst);
                debug!("Image decoder stopped");
            })?;

        Ok(Self {
            request_tx: Some(request_tx),
            alive,
            handle: Some(handle),
        })
    }

    /// Stop accepting work and wait for the thread to finish its current decode
    pub fn shutdown(&mut self) {
        self.request_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Image decoder thread exited abnormally");
            }
        }
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl ImageDecodeChannel for ImageDecodeService {
    fn is_connected(&self) -> bool {
        self.request_tx.is_some() && self.alive.load(Ordering::SeqCst)
    }

    fn dispatch(&mut self, job: DecodeJob) -> Result<()> {
        if !self.is_connected() {
            return Err(DecodeError::ChannelUnavailable);
        }
        let tx = self
            .request_tx
            .as_ref()
            .ok_or(DecodeError::ChannelUnavailable)?;
        if tx.send(job).is_err() {
            self.alive.store(false, Ordering::SeqCst);
            return Err(DecodeError::ChannelUnavailable);
        }
        Ok(())
    }
}

impl Drop for ImageDecodeService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
