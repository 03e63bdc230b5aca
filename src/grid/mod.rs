//! Picker Grid
//!
//! Per-cell binding decisions. For each visible tile the grid shows the best
//! cached thumbnail it has, a rescaled placeholder while a decode runs, or an
//! empty tile, and asks the scheduler for anything it is missing.
//!
//! Cells are shared handles: the decode callback holds one and updates the
//! cell only if it still shows the key the request was made for.

pub mod candidates;

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::Serialize;

pub use candidates::{
    classify, sort_newest_first, Candidate, CandidateProvider, DirectoryCandidates,
    StaticCandidates, TileKind,
};

use crate::core::config::GridConfig;
use crate::core::types::{CacheTier, DecodeResult, MediaKind, Thumbnail};
use crate::scheduler::DecodeScheduler;
use crate::transform;

/// What binding a cell did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindDecision {
    /// Static tile, nothing to decode
    NoAction,
    /// Shown straight from the cache tier for the current mode
    FromCache,
    /// A decode was requested (a placeholder may be showing meanwhile)
    Decode,
}

/// Display state of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellState {
    Unbound,
    /// Affordance tile
    Static,
    /// Waiting with nothing to show
    Empty,
    /// Showing a rescaled lower-fidelity image while decoding
    Placeholder,
    Loaded,
    Failed,
}

/// What a cell currently shows
#[derive(Debug, Clone)]
pub struct CellView {
    pub key: Option<String>,
    pub state: CellState,
    pub image: Option<Thumbnail>,
    pub duration: Option<String>,
    pub ratio: f32,
    /// Whether the last image swap animated in
    pub faded_in: bool,
}

impl Default for CellView {
    fn default() -> Self {
        Self {
            key: None,
            state: CellState::Unbound,
            image: None,
            duration: None,
            ratio: 1.0,
            faded_in: false,
        }
    }
}

impl CellView {
    fn show(&mut self, thumbnail: Thumbnail, state: CellState, fade_in: bool) {
        self.ratio = thumbnail.ratio;
        if thumbnail.duration.is_some() {
            self.duration = thumbnail.duration.clone();
        }
        self.image = Some(thumbnail);
        self.state = state;
        self.faded_in = fade_in;
    }

    /// Apply a decode result for the key this view is bound to
    fn apply(&mut self, result: DecodeResult) {
        match result.thumbnail {
            Some(thumbnail) => {
                // A single frame arriving after an animation keeps the animation
                let richer_shown = self.state == CellState::Loaded
                    && self
                        .image
                        .as_ref()
                        .is_some_and(|shown| shown.frame_count() > thumbnail.frame_count());
                if richer_shown {
                    return;
                }
                let fade_in = self.image.is_none();
                self.show(thumbnail, CellState::Loaded, fade_in);
            }
            None => {
                if self.state != CellState::Loaded {
                    self.state = CellState::Failed;
                }
            }
        }
    }
}

/// A grid slot, shared with the decode callbacks issued for it
#[derive(Debug, Clone, Default)]
pub struct GridCell {
    view: Rc<RefCell<CellView>>,
}

impl GridCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self) -> Option<String> {
        self.view.borrow().key.clone()
    }

    pub fn state(&self) -> CellState {
        self.view.borrow().state
    }

    pub fn faded_in(&self) -> bool {
        self.view.borrow().faded_in
    }

    pub fn image(&self) -> Option<Thumbnail> {
        self.view.borrow().image.clone()
    }

    pub fn snapshot(&self) -> CellView {
        self.view.borrow().clone()
    }

    fn rebind(&self, key: &str) {
        *self.view.borrow_mut() = CellView {
            key: Some(key.to_string()),
            ..CellView::default()
        };
    }

    fn clear(&self) {
        *self.view.borrow_mut() = CellView::default();
    }
}

/// Grid-level binding counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GridCounters {
    pub cache_hits: u64,
    pub decode_requests: u64,
}

/// Decision logic for every cell of one picker grid
pub struct PickerGrid {
    config: GridConfig,
    magnified: bool,
    counters: GridCounters,
}

impl PickerGrid {
    pub fn new(config: GridConfig) -> Self {
        Self {
            magnified: config.magnified,
            config,
            counters: GridCounters::default(),
        }
    }

    pub fn is_magnified(&self) -> bool {
        self.magnified
    }

    /// Requested size for the current mode: cell edge, or screen width
    pub fn target_size(&self) -> u32 {
        if self.magnified {
            self.config.full_width_size
        } else {
            self.config.image_size
        }
    }

    fn tier(&self) -> CacheTier {
        if self.magnified {
            CacheTier::FullWidth
        } else {
            CacheTier::HighRes
        }
    }

    /// Switch between the square grid and single-column full-width layout.
    /// Full-width entries are dropped; the other tiers stay valid.
    pub fn set_magnified(&mut self, magnified: bool, scheduler: &mut DecodeScheduler) {
        if self.magnified == magnified {
            return;
        }
        self.magnified = magnified;
        scheduler.cache_mut().evict_tier(CacheTier::FullWidth);
        debug!("Grid magnified: {}", magnified);
    }

    /// Bind `cell` to `candidate` and decide where its image comes from
    pub fn bind_cell(
        &mut self,
        cell: &GridCell,
        candidate: &Candidate,
        scheduler: &mut DecodeScheduler,
    ) -> BindDecision {
        if let Some(previous) = cell.key() {
            if previous != candidate.key {
                scheduler.cancel(&previous);
            }
        }
        cell.rebind(&candidate.key);

        let Some(kind) = candidate.kind.media_kind() else {
            cell.view.borrow_mut().state = CellState::Static;
            return BindDecision::NoAction;
        };

        let key = candidate.key.as_str();
        let size = self.target_size();

        if let Some(thumbnail) = scheduler.cache_mut().get(self.tier(), key) {
            let still_video = kind == MediaKind::Video && !thumbnail.is_animated();
            cell.view
                .borrow_mut()
                .show(thumbnail, CellState::Loaded, false);
            self.counters.cache_hits += 1;

            // A first frame alone means the animation request never completed
            if still_video && !scheduler.has_request(key) {
                debug!("Requesting the animation missing for cached {}", key);
                self.request_decode(cell, key, kind, size, &[false], scheduler);
            }
            return BindDecision::FromCache;
        }

        match self.placeholder(key, size, scheduler) {
            Some(placeholder) => cell
                .view
                .borrow_mut()
                .show(placeholder, CellState::Placeholder, false),
            None => cell.view.borrow_mut().state = CellState::Empty,
        }

        let passes: &[bool] = match kind {
            MediaKind::Picture => &[false],
            MediaKind::Video => &[true, false],
        };
        self.request_decode(cell, key, kind, size, passes, scheduler);
        BindDecision::Decode
    }

    /// Stop caring about whatever `cell` shows; pending decodes for its key
    /// are dropped.
    pub fn recycle_cell(&self, cell: &GridCell, scheduler: &mut DecodeScheduler) {
        if let Some(key) = cell.key() {
            scheduler.cancel(&key);
        }
        cell.clear();
    }

    /// High-res first (even when magnified), then low-res, rescaled to `size`
    fn placeholder(
        &self,
        key: &str,
        size: u32,
        scheduler: &mut DecodeScheduler,
    ) -> Option<Thumbnail> {
        let cache = scheduler.cache_mut();
        let high_res = match self.tier() {
            CacheTier::HighRes => None,
            _ => cache.get(CacheTier::HighRes, key),
        };
        let source = high_res.or_else(|| cache.get(CacheTier::LowRes, key))?;

        let frame = source.first_frame()?;
        let scaled = if self.magnified {
            transform::fit_to_width(frame.clone(), size)
        } else {
            transform::scale(frame, size, false)
        };
        Some(Thumbnail::still(scaled, self.magnified, source.ratio))
    }

    /// One request per entry of `first_frame_passes`. Videos normally get a
    /// first-frame request and an animation request; the first frame is
    /// served ahead of every pending animation.
    fn request_decode(
        &mut self,
        cell: &GridCell,
        key: &str,
        kind: MediaKind,
        size: u32,
        first_frame_passes: &[bool],
        scheduler: &mut DecodeScheduler,
    ) {
        for &first_frame_only in first_frame_passes {
            let view = cell.view.clone();
            let bound_key = key.to_string();
            scheduler.request(
                key,
                kind,
                size,
                self.magnified,
                first_frame_only,
                Box::new(move |result| {
                    let mut view = view.borrow_mut();
                    if view.key.as_deref() != Some(bound_key.as_str()) {
                        return;
                    }
                    view.apply(result);
                }),
            );
        }
        self.counters.decode_requests += 1;
    }

    pub fn counters(&self) -> GridCounters {
        self.counters
    }

    /// Hand the counters to the scheduler's telemetry sink and reset them
    pub fn flush_counters(&mut self, scheduler: &mut DecodeScheduler) {
        let counters = std::mem::take(&mut self.counters);
        scheduler
            .telemetry_mut()
            .grid_counts(counters.cache_hits, counters.decode_requests);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TieredCache;
    use crate::core::config::CacheConfig;
    use crate::core::error::DecodeError;
    use crate::decoder::{result_channel, DecodedMedia, WorkerResult};
    use crate::scheduler::NullTelemetry;
    use crate::testdb::{DispatchLog, RecordingImageChannel, RecordingVideoChannel};
    use chrono::Utc;
    use image::RgbaImage;

    fn scheduler() -> (DecodeScheduler, DispatchLog) {
        let log = DispatchLog::new();
        let (_tx, rx) = result_channel();
        let cache = TieredCache::new(&CacheConfig {
            memory_budget_mb: 16,
            low_res_size: 4,
            backfill_threads: 1,
            ..Default::default()
        });
        let scheduler = DecodeScheduler::new(
            cache,
            Box::new(RecordingImageChannel::new(log.clone())),
            Box::new(RecordingVideoChannel::new(log.clone())),
            rx,
            Box::new(NullTelemetry),
        );
        (scheduler, log)
    }

    fn grid() -> PickerGrid {
        PickerGrid::new(GridConfig {
            image_size: 10,
            full_width_size: 40,
            magnified: false,
        })
    }

    fn picture(key: &str) -> Candidate {
        Candidate::new(key, TileKind::Picture, Utc::now())
    }

    fn complete(scheduler: &mut DecodeScheduler, frames: usize, edge: u32) {
        let key = scheduler.processing_key().unwrap().to_string();
        let media = DecodedMedia {
            frames: (0..frames).map(|_| RgbaImage::new(edge, edge)).collect(),
            duration: None,
            ratio: 1.0,
        };
        scheduler.on_worker_result(WorkerResult::success(key, media));
    }

    #[test]
    fn test_affordance_tile_no_action() {
        let (mut scheduler, log) = scheduler();
        let mut grid = grid();
        let cell = GridCell::new();

        let decision = grid.bind_cell(&cell, &Candidate::affordance(TileKind::Camera), &mut scheduler);
        assert_eq!(decision, BindDecision::NoAction);
        assert_eq!(cell.state(), CellState::Static);
        assert!(log.is_empty());
    }

    #[test]
    fn test_miss_requests_decode_and_fades_in() {
        let (mut scheduler, log) = scheduler();
        let mut grid = grid();
        let cell = GridCell::new();

        assert_eq!(grid.bind_cell(&cell, &picture("p"), &mut scheduler), BindDecision::Decode);
        assert_eq!(cell.state(), CellState::Empty);
        assert_eq!(log.jobs()[0].size, 10);

        complete(&mut scheduler, 1, 10);
        assert_eq!(cell.state(), CellState::Loaded);
        assert!(cell.faded_in());
        assert_eq!(grid.counters().decode_requests, 1);
    }

    #[test]
    fn test_second_bind_is_cache_hit() {
        let (mut scheduler, _log) = scheduler();
        let mut grid = grid();
        let cell = GridCell::new();

        grid.bind_cell(&cell, &picture("p"), &mut scheduler);
        complete(&mut scheduler, 1, 10);

        let other = GridCell::new();
        assert_eq!(grid.bind_cell(&other, &picture("p"), &mut scheduler), BindDecision::FromCache);
        assert_eq!(other.state(), CellState::Loaded);
        assert!(!other.faded_in());
        assert_eq!(grid.counters(), GridCounters { cache_hits: 1, decode_requests: 1 });
    }

    #[test]
    fn test_low_res_placeholder_then_promotion() {
        let (mut scheduler, _log) = scheduler();
        let mut grid = grid();
        scheduler.cache_mut().put(
            CacheTier::LowRes,
            "k",
            Thumbnail::still(RgbaImage::new(4, 4), false, 1.0),
        );

        let cell = GridCell::new();
        assert_eq!(grid.bind_cell(&cell, &picture("k"), &mut scheduler), BindDecision::Decode);
        assert_eq!(cell.state(), CellState::Placeholder);
        assert_eq!(cell.image().unwrap().dimensions(), (10, 10));

        complete(&mut scheduler, 1, 10);
        assert_eq!(cell.state(), CellState::Loaded);
        assert!(!cell.faded_in(), "placeholder was visible, no fade");

        let again = GridCell::new();
        assert_eq!(grid.bind_cell(&again, &picture("k"), &mut scheduler), BindDecision::FromCache);
        assert!(scheduler.cache().contains(CacheTier::HighRes, "k"));
    }

    #[test]
    fn test_magnified_uses_high_res_placeholder() {
        let (mut scheduler, log) = scheduler();
        let mut grid = grid();
        scheduler.cache_mut().put(
            CacheTier::HighRes,
            "k",
            Thumbnail::still(RgbaImage::new(10, 10), false, 1.0),
        );
        grid.set_magnified(true, &mut scheduler);

        let cell = GridCell::new();
        assert_eq!(grid.bind_cell(&cell, &picture("k"), &mut scheduler), BindDecision::Decode);
        assert_eq!(cell.state(), CellState::Placeholder);
        assert_eq!(cell.image().unwrap().dimensions(), (40, 40));

        let job = log.last().unwrap();
        assert!(job.full_width);
        assert_eq!(job.size, 40);
    }

    #[test]
    fn test_set_magnified_evicts_full_width_only() {
        let (mut scheduler, _log) = scheduler();
        let mut grid = grid();
        let thumb = Thumbnail::still(RgbaImage::new(4, 4), false, 1.0);
        scheduler.cache_mut().put(CacheTier::HighRes, "a", thumb.clone());
        scheduler.cache_mut().put(CacheTier::FullWidth, "a", thumb);

        grid.set_magnified(true, &mut scheduler);
        assert!(scheduler.cache().contains(CacheTier::HighRes, "a"));
        assert!(!scheduler.cache().contains(CacheTier::FullWidth, "a"));
    }

    #[test]
    fn test_video_requests_first_frame_then_animation() {
        let (mut scheduler, log) = scheduler();
        let mut grid = grid();
        let cell = GridCell::new();

        grid.bind_cell(&cell, &Candidate::new("v", TileKind::Video, Utc::now()), &mut scheduler);
        complete(&mut scheduler, 1, 10);
        assert!(cell.faded_in());
        complete(&mut scheduler, 4, 10);

        let jobs = log.jobs();
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].first_frame_only);
        assert!(!jobs[1].first_frame_only);
        assert_eq!(cell.image().unwrap().frame_count(), 4);
        assert!(!cell.faded_in());
        assert_eq!(grid.counters().decode_requests, 1);
    }

    #[test]
    fn test_cached_first_frame_requests_missing_animation() {
        let (mut scheduler, log) = scheduler();
        let mut grid = grid();
        let clip = Candidate::new("v", TileKind::Video, Utc::now());

        let cell = GridCell::new();
        grid.bind_cell(&cell, &clip, &mut scheduler);
        // A picture jumps ahead of the animation
        grid.bind_cell(&GridCell::new(), &picture("p"), &mut scheduler);
        complete(&mut scheduler, 1, 10);
        // Scrolled away before the animation ran
        grid.recycle_cell(&cell, &mut scheduler);
        complete(&mut scheduler, 1, 10);
        assert!(scheduler.is_idle());
        assert_eq!(log.keys(), vec!["v", "p"]);

        let again = GridCell::new();
        assert_eq!(grid.bind_cell(&again, &clip, &mut scheduler), BindDecision::FromCache);
        assert_eq!(again.state(), CellState::Loaded);

        let jobs = log.jobs();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[2].key, "v");
        assert!(!jobs[2].first_frame_only);

        complete(&mut scheduler, 4, 10);
        assert_eq!(again.image().unwrap().frame_count(), 4);

        let third = GridCell::new();
        assert_eq!(grid.bind_cell(&third, &clip, &mut scheduler), BindDecision::FromCache);
        assert_eq!(log.jobs().len(), 3);
    }

    #[test]
    fn test_cached_first_frame_with_animation_queued_adds_nothing() {
        let (mut scheduler, log) = scheduler();
        let mut grid = grid();
        let clip = Candidate::new("v", TileKind::Video, Utc::now());

        grid.bind_cell(&GridCell::new(), &clip, &mut scheduler);
        complete(&mut scheduler, 1, 10);
        assert!(scheduler.has_request("v"));

        grid.bind_cell(&GridCell::new(), &clip, &mut scheduler);
        assert_eq!(log.jobs().len(), 2);
        assert!(scheduler.pending_len() == 0 && scheduler.is_processing());
    }

    #[test]
    fn test_recycled_cell_ignores_stale_result() {
        let (mut scheduler, _log) = scheduler();
        let mut grid = grid();
        let cell = GridCell::new();

        grid.bind_cell(&cell, &picture("first"), &mut scheduler);
        // "first" is in flight; rebinding cannot cancel it
        grid.bind_cell(&cell, &picture("second"), &mut scheduler);
        complete(&mut scheduler, 1, 10);

        assert_eq!(cell.key().as_deref(), Some("second"));
        assert_eq!(cell.state(), CellState::Empty);
        assert!(scheduler.cache().contains(CacheTier::HighRes, "first"));

        complete(&mut scheduler, 1, 10);
        assert_eq!(cell.state(), CellState::Loaded);
    }

    #[test]
    fn test_recycle_cancels_pending() {
        let (mut scheduler, log) = scheduler();
        let mut grid = grid();
        let busy = GridCell::new();
        let cell = GridCell::new();

        grid.bind_cell(&busy, &picture("busy"), &mut scheduler);
        grid.bind_cell(&cell, &picture("queued"), &mut scheduler);
        assert_eq!(scheduler.pending_len(), 1);

        grid.recycle_cell(&cell, &mut scheduler);
        assert_eq!(scheduler.pending_len(), 0);
        assert_eq!(cell.state(), CellState::Unbound);

        complete(&mut scheduler, 1, 10);
        assert_eq!(log.keys(), vec!["busy"]);
    }

    #[test]
    fn test_failure_marks_cell() {
        let (mut scheduler, _log) = scheduler();
        let mut grid = grid();
        let cell = GridCell::new();

        grid.bind_cell(&cell, &picture("bad"), &mut scheduler);
        scheduler.on_worker_result(WorkerResult::failure(
            "bad",
            DecodeError::DecodeRuntime("corrupt".to_string()),
        ));
        assert_eq!(cell.state(), CellState::Failed);
        assert!(cell.image().is_none());
    }

    #[test]
    fn test_flush_counters_resets() {
        let (mut scheduler, _log) = scheduler();
        let mut grid = grid();
        grid.bind_cell(&GridCell::new(), &picture("p"), &mut scheduler);

        grid.flush_counters(&mut scheduler);
        assert_eq!(grid.counters(), GridCounters::default());
    }
}
