//! Turns camera updates into build waves and swaps each wave in atomically.
//!
//! Control flow per frame:
//!
//! 1. [`TerrainBuildCoordinator::set_camera_position`] rebuilds the face set,
//!    diffs its leaf keys against the active chunks and starts a wave for the
//!    difference.
//! 2. [`TerrainBuildCoordinator::update`] resubmits refused jobs, applies
//!    build results whose token still matches, resubmits timed-out jobs, and
//!    swaps the wave in once every new chunk is ready.
//! 3. [`TerrainBuildCoordinator::process_surface_synthesis`] colors and
//!    shades built chunks until a deadline.
//!
//! A camera update arriving while a wave is outstanding is latched and
//! applied right after the swap; no in-flight job is ever abandoned.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{DMat3, DVec3};
use regolith_config::{Config, RenderConfig};
use regolith_cubesphere::CubeFace;
use regolith_lod::{Body, ChunkKey, CubeFaceSet, HeightSource, LeafNode};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    BuildJob, BuildResult, BuildWorker, Chunk, ChunkId, ChunkParams, ChunkPool, ChunkState,
    ColorRamp, ReleaseOutcome, SurfaceInput, SurfaceSynthesizer, TerrainError, grid_indices,
};

/// What a camera update did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraUpdate {
    /// A wave is outstanding; the position is latched until it swaps.
    Deferred,
    /// The leaf key set did not change; nothing was built.
    Unchanged,
    /// A new wave was started.
    WaveStarted { allocated: usize, retiring: usize },
}

/// What a call to [`TerrainBuildCoordinator::update`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No wave is outstanding.
    Idle,
    /// The wave is still waiting on builds or surface synthesis.
    Pending {
        awaiting_geometry: usize,
        awaiting_surface: usize,
    },
    /// The wave was revealed and the superseded chunks retired.
    Swapped {
        shown: usize,
        retired: usize,
        /// Result of applying a camera position latched during the wave.
        next: CameraUpdate,
    },
}

/// Progress of one [`TerrainBuildCoordinator::process_surface_synthesis`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SynthesisReport {
    pub synthesized: usize,
    /// Chunks still waiting for surface data.
    pub remaining: usize,
    /// Nothing ran because no color ramp is loaded yet.
    pub deferred: bool,
}

/// Running totals for observing pool effectiveness and job health.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub chunks_constructed: u64,
    pub chunks_reused: u64,
    pub chunks_disposed: u64,
    pub jobs_submitted: u64,
    pub jobs_retried: u64,
    pub failed_builds: u64,
    pub stale_results: u64,
    pub waves_completed: u64,
    /// Most chunks alive at once, active and in-flight together.
    pub peak_chunks: usize,
}

/// One visible chunk as the host needs it for scene-graph attachment.
#[derive(Clone, Copy, Debug)]
pub struct Renderable<'a> {
    pub chunk: ChunkId,
    pub key: ChunkKey,
    pub face: CubeFace,
    /// Face orientation; columns are tangent, bitangent and normal.
    ///
    /// Informational only. `positions` are already oriented in body space,
    /// so the world position of a vertex is `origin + position` and this
    /// rotation must not be applied on top.
    pub transform: DMat3,
    /// Translation to add to every position.
    pub origin: DVec3,
    /// Body-space offsets from `origin`.
    pub positions: &'a [[f32; 3]],
    pub normals: &'a [[f32; 3]],
    pub colors: &'a [[u8; 4]],
    pub visible: bool,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub wireframe: bool,
}

struct PendingJob {
    token: u64,
    submitted_at: Instant,
    /// Refused by the worker and waiting in the backlog.
    queued: bool,
}

struct BuildWave {
    allocated: Vec<(ChunkKey, ChunkId)>,
    retire: Vec<ChunkId>,
    started: Instant,
}

/// Orchestrates the chunk lifecycle for one body.
///
/// Single-threaded: every method runs on the caller's thread, and only
/// [`BuildWorker`]s do work elsewhere.
pub struct TerrainBuildCoordinator<W: BuildWorker> {
    faces: CubeFaceSet,
    body: Arc<Body>,
    worker: W,
    synthesizer: Box<dyn SurfaceSynthesizer>,
    ramp: Option<ColorRamp>,
    render: RenderConfig,
    job_timeout: Duration,
    synthesis_budget: Duration,
    indices: Vec<u32>,

    chunks: FxHashMap<ChunkId, Chunk>,
    active: FxHashMap<ChunkKey, ChunkId>,
    wave: Option<BuildWave>,
    pending_camera: Option<DVec3>,
    outstanding: FxHashMap<ChunkId, PendingJob>,
    backlog: VecDeque<BuildJob>,
    pool: ChunkPool,

    next_chunk_id: u64,
    next_token: u64,
    stats: CoordinatorStats,
}

impl<W: BuildWorker> TerrainBuildCoordinator<W> {
    /// Validate the body, sample the coarse height grids and set up an empty
    /// chunk set. Nothing is built until the first camera update.
    pub fn new(
        config: &Config,
        heights: &dyn HeightSource,
        worker: W,
        synthesizer: Box<dyn SurfaceSynthesizer>,
    ) -> Result<Self, TerrainError> {
        let body = Body::from_config(&config.body)?;
        let faces = CubeFaceSet::new(body.clone(), heights)?;
        let synthesis_budget =
            Duration::try_from_secs_f64(config.build.synthesis_budget_ms.max(0.0) / 1000.0)
                .unwrap_or(Duration::ZERO);

        tracing::info!(
            radius = body.radius,
            resolution = body.sample_resolution,
            "terrain coordinator ready"
        );

        Ok(Self {
            pool: ChunkPool::new(body.vertex_count(), config.build.pool_capacity_per_size),
            indices: grid_indices(body.sample_resolution),
            body: Arc::new(body),
            faces,
            worker,
            synthesizer,
            ramp: None,
            render: config.render.clone(),
            job_timeout: Duration::from_millis(config.build.job_timeout_ms),
            synthesis_budget,
            chunks: FxHashMap::default(),
            active: FxHashMap::default(),
            wave: None,
            pending_camera: None,
            outstanding: FxHashMap::default(),
            backlog: VecDeque::new(),
            next_chunk_id: 0,
            next_token: 0,
            stats: CoordinatorStats::default(),
        })
    }

    /// Install the color ramp. Surface synthesis is deferred until this is called.
    pub fn set_color_ramp(&mut self, ramp: ColorRamp) {
        tracing::debug!(texels = ramp.len(), "color ramp installed");
        self.ramp = Some(ramp);
    }

    pub fn has_color_ramp(&self) -> bool {
        self.ramp.is_some()
    }

    /// Recompute the leaf set for `camera` and start a wave for what changed.
    ///
    /// Leaves whose key is already active keep their chunk untouched.
    pub fn set_camera_position(&mut self, camera: DVec3) -> CameraUpdate {
        if self.wave.is_some() {
            tracing::trace!(?camera, "camera update latched until the current wave swaps");
            self.pending_camera = Some(camera);
            return CameraUpdate::Deferred;
        }

        self.faces.set_camera_position(camera);
        let leaves: Vec<LeafNode> = self.faces.iter_leaves().collect();
        let wanted: FxHashSet<ChunkKey> = leaves.iter().map(|leaf| leaf.key).collect();

        let mut retire: Vec<ChunkId> = self
            .active
            .iter()
            .filter(|(key, _)| !wanted.contains(key))
            .map(|(_, &id)| id)
            .collect();
        retire.sort_unstable();

        let mut allocated = Vec::new();
        for leaf in &leaves {
            if !self.active.contains_key(&leaf.key) {
                allocated.push((leaf.key, self.allocate(leaf)));
            }
        }

        if allocated.is_empty() && retire.is_empty() {
            return CameraUpdate::Unchanged;
        }

        self.stats.peak_chunks = self.stats.peak_chunks.max(self.chunks.len());
        let update = CameraUpdate::WaveStarted {
            allocated: allocated.len(),
            retiring: retire.len(),
        };
        tracing::debug!(
            allocated = allocated.len(),
            retiring = retire.len(),
            "build wave started"
        );
        self.wave = Some(BuildWave {
            allocated,
            retire,
            started: Instant::now(),
        });
        update
    }

    /// Bind a chunk to `leaf`, reusing a pooled one of the same size when
    /// possible, hide it and submit its build.
    fn allocate(&mut self, leaf: &LeafNode) -> ChunkId {
        let params = ChunkParams::from_leaf(leaf, self.body.sample_resolution);
        let mut chunk = match self.pool.acquire(params.depth()) {
            Some(mut chunk) => {
                chunk.reconfigure(params);
                self.stats.chunks_reused += 1;
                chunk
            }
            None => {
                let id = ChunkId(self.next_chunk_id);
                self.next_chunk_id += 1;
                self.stats.chunks_constructed += 1;
                Chunk::new(id, params)
            }
        };
        chunk.hide();
        let id = chunk.id();
        self.chunks.insert(id, chunk);
        self.start_build(id);
        id
    }

    /// Issue a fresh token for `id` and hand its job to the worker.
    fn start_build(&mut self, id: ChunkId) {
        self.next_token += 1;
        let token = self.next_token;
        let Some(chunk) = self.chunks.get_mut(&id) else {
            return;
        };
        chunk.begin_build(token);
        let job = BuildJob::new(id, token, chunk.params(), Arc::clone(&self.body));

        let queued = match self.worker.submit(job) {
            Ok(()) => {
                self.stats.jobs_submitted += 1;
                false
            }
            Err(job) => {
                tracing::trace!(chunk = %id, "build worker busy; job backlogged");
                self.backlog.push_back(job);
                true
            }
        };
        self.outstanding.insert(
            id,
            PendingJob {
                token,
                submitted_at: Instant::now(),
                queued,
            },
        );
    }

    /// Per-frame step. Swaps the outstanding wave in once every chunk of it
    /// is [`ChunkState::Ready`]; until then the visible set is untouched.
    pub fn update(&mut self) -> UpdateOutcome {
        self.flush_backlog();
        for result in self.worker.drain_results() {
            self.apply_result(result);
        }
        self.retry_timed_out_jobs();

        let Some(wave) = &self.wave else {
            return UpdateOutcome::Idle;
        };
        let awaiting_surface = wave
            .allocated
            .iter()
            .filter(|(_, id)| {
                self.chunks
                    .get(id)
                    .is_some_and(|c| c.state() == ChunkState::AwaitingSurfaceData)
            })
            .count();
        if !self.outstanding.is_empty() || awaiting_surface > 0 {
            return UpdateOutcome::Pending {
                awaiting_geometry: self.outstanding.len(),
                awaiting_surface,
            };
        }
        self.swap_wave()
    }

    fn flush_backlog(&mut self) {
        while let Some(job) = self.backlog.pop_front() {
            let current = self
                .outstanding
                .get(&job.chunk)
                .is_some_and(|p| p.token == job.token);
            if !current {
                continue;
            }
            let chunk = job.chunk;
            match self.worker.submit(job) {
                Ok(()) => {
                    self.stats.jobs_submitted += 1;
                    if let Some(pending) = self.outstanding.get_mut(&chunk) {
                        pending.queued = false;
                        pending.submitted_at = Instant::now();
                    }
                }
                Err(job) => {
                    self.backlog.push_front(job);
                    break;
                }
            }
        }
    }

    fn apply_result(&mut self, result: BuildResult) {
        let expected = self.outstanding.get(&result.chunk).map(|p| p.token);
        if expected != Some(result.token) {
            self.stats.stale_results += 1;
            let err = TerrainError::StaleResult {
                chunk: result.chunk,
                expected: expected.unwrap_or_default(),
                received: result.token,
            };
            tracing::warn!(%err, "discarding build result");
            return;
        }
        self.outstanding.remove(&result.chunk);

        let Some(chunk) = self.chunks.get_mut(&result.chunk) else {
            return;
        };
        let applied = result
            .geometry
            .map_err(TerrainError::from)
            .and_then(|geometry| chunk.assign_geometry(result.token, &geometry));

        match applied {
            Ok(()) => tracing::trace!(
                chunk = %result.chunk,
                build_time_us = result.build_time_us,
                "geometry assigned"
            ),
            Err(err) => {
                self.stats.failed_builds += 1;
                self.stats.jobs_retried += 1;
                tracing::warn!(chunk = %result.chunk, %err, "build failed; resubmitting");
                self.start_build(result.chunk);
            }
        }
    }

    fn retry_timed_out_jobs(&mut self) {
        let now = Instant::now();
        let mut stalled = 0;
        for pending in self.outstanding.values_mut() {
            if pending.queued && now.duration_since(pending.submitted_at) >= self.job_timeout {
                pending.submitted_at = now;
                stalled += 1;
            }
        }
        if stalled > 0 {
            tracing::warn!(
                stalled,
                backlog = self.backlog.len(),
                in_flight = self.worker.in_flight_count(),
                "build worker has refused jobs for longer than the job timeout"
            );
        }

        let mut expired: Vec<ChunkId> = self
            .outstanding
            .iter()
            .filter(|(_, p)| !p.queued && now.duration_since(p.submitted_at) >= self.job_timeout)
            .map(|(&id, _)| id)
            .collect();
        expired.sort_unstable();

        for id in expired {
            tracing::warn!(
                chunk = %id,
                timeout_ms = self.job_timeout.as_millis() as u64,
                "build job timed out; resubmitting"
            );
            self.stats.jobs_retried += 1;
            self.start_build(id);
        }
    }

    fn swap_wave(&mut self) -> UpdateOutcome {
        let Some(wave) = self.wave.take() else {
            return UpdateOutcome::Idle;
        };

        let retired = wave.retire.len();
        for id in wave.retire {
            if let Some(mut chunk) = self.chunks.remove(&id) {
                self.active.remove(&chunk.key());
                chunk.retire();
                self.recycle(chunk);
            }
        }

        let shown = wave.allocated.len();
        for (key, id) in wave.allocated {
            if let Some(chunk) = self.chunks.get_mut(&id) {
                chunk.show();
            }
            self.active.insert(key, id);
        }

        self.stats.waves_completed += 1;
        tracing::debug!(
            shown,
            retired,
            elapsed_ms = wave.started.elapsed().as_millis() as u64,
            pooled = self.pool.len(),
            "build wave swapped"
        );

        let next = match self.pending_camera.take() {
            Some(camera) => self.set_camera_position(camera),
            None => CameraUpdate::Unchanged,
        };
        UpdateOutcome::Swapped {
            shown,
            retired,
            next,
        }
    }

    fn recycle(&mut self, chunk: Chunk) {
        match self.pool.release(chunk) {
            Ok(ReleaseOutcome::Pooled) => {}
            Ok(ReleaseOutcome::Full(chunk)) => {
                self.stats.chunks_disposed += 1;
                chunk.dispose();
            }
            Err(err) => {
                self.stats.chunks_disposed += 1;
                tracing::error!(%err, "chunk pool corruption");
                if cfg!(debug_assertions) {
                    panic!("chunk pool corruption: {err}");
                }
            }
        }
    }

    /// Synthesize colors and normals for built chunks until `deadline`.
    ///
    /// The deadline is checked before each chunk, so an already-expired
    /// deadline does no work. Without a color ramp nothing runs and the
    /// report is marked deferred.
    pub fn process_surface_synthesis(&mut self, deadline: Instant) -> SynthesisReport {
        let mut waiting: Vec<ChunkId> = self
            .chunks
            .values()
            .filter(|c| c.state() == ChunkState::AwaitingSurfaceData)
            .map(Chunk::id)
            .collect();
        waiting.sort_unstable();

        let Some(ramp) = self.ramp.as_ref() else {
            if !waiting.is_empty() {
                tracing::debug!(
                    waiting = waiting.len(),
                    reason = %TerrainError::SynthesisNotReady,
                    "surface synthesis deferred"
                );
            }
            return SynthesisReport {
                synthesized: 0,
                remaining: waiting.len(),
                deferred: true,
            };
        };

        let mut synthesized = 0;
        for id in &waiting {
            if Instant::now() >= deadline {
                break;
            }
            let Some(chunk) = self.chunks.get_mut(id) else {
                continue;
            };
            let params = *chunk.params();
            let data = {
                let input = SurfaceInput {
                    face: params.face(),
                    origin: params.origin,
                    resolution: params.resolution,
                    positions: chunk.positions(),
                    apron: chunk.apron(),
                    body: &self.body,
                };
                self.synthesizer.synthesize(&input, ramp)
            };
            match data.and_then(|data| chunk.assign_surface_data(&data)) {
                Ok(()) => synthesized += 1,
                Err(err) => tracing::warn!(chunk = %id, %err, "surface synthesis failed"),
            }
        }

        SynthesisReport {
            synthesized,
            remaining: waiting.len() - synthesized,
            deferred: false,
        }
    }

    /// [`Self::process_surface_synthesis`] with the configured per-frame budget.
    pub fn process_surface_synthesis_for_frame(&mut self) -> SynthesisReport {
        self.process_surface_synthesis(Instant::now() + self.synthesis_budget)
    }

    /// The active chunk set, ordered by chunk id.
    ///
    /// Between the start and the swap of a wave this is exactly the previous
    /// set; afterwards it is exactly the new one.
    pub fn get_renderables(&self) -> Vec<Renderable<'_>> {
        let mut renderables: Vec<Renderable<'_>> = self
            .active
            .values()
            .filter_map(|id| self.chunks.get(id))
            .map(|chunk| {
                let params = chunk.params();
                Renderable {
                    chunk: chunk.id(),
                    key: params.key,
                    face: params.face(),
                    transform: params.face().orientation(),
                    origin: params.origin,
                    positions: chunk.positions(),
                    normals: chunk.normals(),
                    colors: chunk.colors(),
                    visible: chunk.is_visible(),
                    cast_shadows: self.render.cast_shadows,
                    receive_shadows: self.render.receive_shadows,
                    wireframe: self.render.wireframe,
                }
            })
            .collect();
        renderables.sort_by_key(|r| r.chunk);
        renderables
    }

    /// Triangle list shared by every chunk.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn face_set(&self) -> &CubeFaceSet {
        &self.faces
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(&id)
    }

    /// Chunks currently shown.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether a wave is waiting to swap.
    pub fn is_wave_pending(&self) -> bool {
        self.wave.is_some()
    }

    /// Camera position latched during the outstanding wave, if any.
    pub fn pending_camera(&self) -> Option<DVec3> {
        self.pending_camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BuildError, InlineBuildWorker, NoiseHeightSource, NoiseParams, RampSurfaceSynthesizer,
        ThreadedBuildWorker, build_chunk_geometry,
    };
    use regolith_config::{BodyConfig, BuildConfig};
    use regolith_lod::LodError;
    use std::cell::{Cell, RefCell};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rolling(d: DVec3) -> f64 {
        (d.x * 4.0).sin() * 0.5 + d.y * 0.25
    }

    /// Holds jobs until the test completes them, in whatever order it likes.
    #[derive(Default)]
    struct ManualWorker {
        queued: RefCell<Vec<BuildJob>>,
        done: RefCell<Vec<BuildResult>>,
        capacity: Cell<usize>,
        submissions: Cell<usize>,
    }

    impl ManualWorker {
        fn with_capacity(capacity: usize) -> Self {
            let worker = Self::default();
            worker.capacity.set(capacity);
            worker
        }

        fn queued_len(&self) -> usize {
            self.queued.borrow().len()
        }

        /// Complete the first `count` queued jobs, newest first.
        fn complete_first(&self, count: usize) {
            let jobs: Vec<BuildJob> = {
                let mut queued = self.queued.borrow_mut();
                let count = count.min(queued.len());
                queued.drain(..count).collect()
            };
            let mut done = self.done.borrow_mut();
            for job in jobs.into_iter().rev() {
                done.push(BuildResult {
                    chunk: job.chunk,
                    token: job.token,
                    geometry: build_chunk_geometry(&job, &rolling),
                    build_time_us: 0,
                });
            }
        }

        fn complete_all(&self) {
            self.complete_first(usize::MAX);
        }

        fn fail_all(&self) {
            let jobs: Vec<BuildJob> = self.queued.borrow_mut().drain(..).collect();
            let mut done = self.done.borrow_mut();
            for job in jobs {
                done.push(BuildResult {
                    chunk: job.chunk,
                    token: job.token,
                    geometry: Err(BuildError::NonFinite { index: 0 }),
                    build_time_us: 0,
                });
            }
        }
    }

    impl BuildWorker for ManualWorker {
        fn submit(&self, job: BuildJob) -> Result<(), BuildJob> {
            let capacity = self.capacity.get();
            if capacity > 0 && self.queued.borrow().len() >= capacity {
                return Err(job);
            }
            self.queued.borrow_mut().push(job);
            self.submissions.set(self.submissions.get() + 1);
            Ok(())
        }

        fn drain_results(&self) -> Vec<BuildResult> {
            self.done.take()
        }

        fn in_flight_count(&self) -> usize {
            self.queued.borrow().len() + self.done.borrow().len()
        }
    }

    type Manual = TerrainBuildCoordinator<ManualWorker>;

    const FAR: DVec3 = DVec3::new(0.0, 0.0, 1.0e7);
    const NEAR: DVec3 = DVec3::new(0.0, 0.0, 1010.0);

    fn config() -> Config {
        Config {
            body: BodyConfig {
                radius: 1000.0,
                displacement_weight: 10.0,
                min_chunk_size: 100.0,
                chunk_split_distance: 1.25,
                sample_resolution: 4,
                height_grid_resolution: 8,
                ..Default::default()
            },
            build: BuildConfig {
                job_timeout_ms: 60_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn ramp() -> ColorRamp {
        ColorRamp::from_gradient(&[(0.0, [60, 50, 40, 255]), (1.0, [220, 210, 190, 255])], 16)
            .unwrap()
    }

    fn coordinator_with(config: &Config, worker: ManualWorker) -> Manual {
        let body = regolith_lod::Body::from_config(&config.body).unwrap();
        let mut c = TerrainBuildCoordinator::new(
            config,
            &rolling,
            worker,
            Box::new(RampSurfaceSynthesizer::for_body(&body)),
        )
        .unwrap();
        c.set_color_ramp(ramp());
        c
    }

    fn coordinator() -> Manual {
        coordinator_with(&config(), ManualWorker::default())
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    fn finish_wave(c: &mut Manual) -> UpdateOutcome {
        for _ in 0..8 {
            c.worker().complete_all();
            let first = c.update();
            if matches!(first, UpdateOutcome::Swapped { .. }) {
                return first;
            }
            c.process_surface_synthesis(later());
            let outcome = c.update();
            if matches!(outcome, UpdateOutcome::Swapped { .. }) {
                return outcome;
            }
        }
        panic!("wave did not complete");
    }

    fn visible_keys(c: &Manual) -> FxHashSet<ChunkKey> {
        c.get_renderables()
            .iter()
            .filter(|r| r.visible)
            .map(|r| r.key)
            .collect()
    }

    fn leaf_keys(c: &Manual) -> FxHashSet<ChunkKey> {
        c.face_set().iter_leaves().map(|l| l.key).collect()
    }

    #[test]
    fn test_first_wave_reveals_all_roots_together() {
        let mut c = coordinator();
        assert_eq!(
            c.set_camera_position(FAR),
            CameraUpdate::WaveStarted {
                allocated: 6,
                retiring: 0
            }
        );
        assert!(c.get_renderables().is_empty());
        assert_eq!(
            c.update(),
            UpdateOutcome::Pending {
                awaiting_geometry: 6,
                awaiting_surface: 0
            }
        );

        let outcome = finish_wave(&mut c);
        assert!(matches!(
            outcome,
            UpdateOutcome::Swapped {
                shown: 6,
                retired: 0,
                next: CameraUpdate::Unchanged
            }
        ));
        let renderables = c.get_renderables();
        assert_eq!(renderables.len(), 6);
        assert!(renderables.iter().all(|r| r.visible));
        assert!(renderables.iter().all(|r| r.positions.len() == 25));
        assert_eq!(c.update(), UpdateOutcome::Idle);
    }

    #[test]
    fn test_wave_swap_is_atomic_for_any_completion_order() {
        let mut c = coordinator();
        c.set_camera_position(FAR);
        finish_wave(&mut c);
        let old_keys = visible_keys(&c);

        let CameraUpdate::WaveStarted { allocated, retiring } = c.set_camera_position(NEAR) else {
            panic!("expected a new wave");
        };
        assert_eq!(retiring, 6);
        assert!(allocated > 6);
        let new_keys = leaf_keys(&c);
        assert_ne!(old_keys, new_keys);

        // Half the builds land, out of order, and get synthesized.
        c.worker().complete_first(allocated / 2);
        c.update();
        c.process_surface_synthesis(later());
        assert!(matches!(c.update(), UpdateOutcome::Pending { .. }));
        assert_eq!(visible_keys(&c), old_keys);

        // The rest land; surface data still pending.
        c.worker().complete_all();
        assert!(matches!(
            c.update(),
            UpdateOutcome::Pending {
                awaiting_geometry: 0,
                ..
            }
        ));
        assert_eq!(visible_keys(&c), old_keys);

        c.process_surface_synthesis(later());
        assert!(matches!(
            c.update(),
            UpdateOutcome::Swapped { retired: 6, .. }
        ));
        assert_eq!(visible_keys(&c), new_keys);
        assert_eq!(c.active_count(), new_keys.len());
    }

    #[test]
    fn test_same_camera_twice_builds_nothing() {
        let mut c = coordinator();
        c.set_camera_position(NEAR);
        finish_wave(&mut c);
        let submissions = c.worker().submissions.get();

        assert_eq!(c.set_camera_position(NEAR), CameraUpdate::Unchanged);
        assert_eq!(c.worker().submissions.get(), submissions);
        assert!(!c.is_wave_pending());
    }

    #[test]
    fn test_camera_during_wave_is_applied_after_swap() {
        let mut c = coordinator();
        c.set_camera_position(FAR);
        finish_wave(&mut c);

        assert!(matches!(
            c.set_camera_position(NEAR),
            CameraUpdate::WaveStarted { .. }
        ));
        let latest = DVec3::new(0.0, 1020.0, 0.0);
        assert_eq!(c.set_camera_position(latest), CameraUpdate::Deferred);
        assert_eq!(c.pending_camera(), Some(latest));

        let outcome = finish_wave(&mut c);
        assert!(matches!(
            outcome,
            UpdateOutcome::Swapped {
                next: CameraUpdate::WaveStarted { .. },
                ..
            }
        ));
        assert!(c.is_wave_pending());
        assert_eq!(c.pending_camera(), None);

        finish_wave(&mut c);
        assert_eq!(c.face_set().camera(), Some(latest));
        assert_eq!(visible_keys(&c), leaf_keys(&c));
    }

    #[test]
    fn test_timed_out_jobs_are_retried_and_late_results_discarded() {
        let mut config = config();
        config.build.job_timeout_ms = 0;
        let mut c = coordinator_with(&config, ManualWorker::default());

        c.set_camera_position(FAR);
        assert_eq!(c.worker().queued_len(), 6);
        c.update();
        assert_eq!(c.stats().jobs_retried, 6);
        assert_eq!(c.worker().queued_len(), 12);

        // The original jobs finally answer.
        c.worker().complete_first(6);
        c.update();
        assert_eq!(c.stats().stale_results, 6);
        assert!(c.get_renderables().is_empty());
        assert!(
            c.chunks
                .values()
                .all(|chunk| chunk.state() == ChunkState::AwaitingGeometry)
        );

        // Only the newest token for each chunk is applied.
        let outcome = finish_wave(&mut c);
        assert!(matches!(outcome, UpdateOutcome::Swapped { shown: 6, .. }));
        assert_eq!(c.stats().stale_results, 12);
    }

    #[test]
    fn test_zooming_recycles_pooled_chunks() {
        let mut c = coordinator();
        let mut allocations = 0;
        let mut near_allocations = 0;
        for (i, camera) in [FAR, NEAR, FAR, NEAR].into_iter().enumerate() {
            let CameraUpdate::WaveStarted { allocated, .. } = c.set_camera_position(camera) else {
                panic!("camera {i} should start a wave");
            };
            if i == 1 {
                near_allocations = allocated;
            }
            allocations += allocated;
            finish_wave(&mut c);
        }

        let stats = c.stats();
        assert_eq!(stats.chunks_constructed, (6 + near_allocations) as u64);
        assert_eq!(stats.chunks_reused, (6 + near_allocations) as u64);
        assert!(stats.chunks_constructed < allocations as u64);
        assert_eq!(stats.chunks_disposed, 0);
        assert_eq!(stats.waves_completed, 4);
        assert_eq!(c.pool().bucket_len(0), 6);
    }

    #[test]
    fn test_pool_capacity_disposes_overflow() {
        let mut config = config();
        config.build.pool_capacity_per_size = 2;
        let mut c = coordinator_with(&config, ManualWorker::default());
        c.set_camera_position(FAR);
        finish_wave(&mut c);
        c.set_camera_position(NEAR);
        finish_wave(&mut c);
        assert_eq!(c.pool().bucket_len(0), 2);
        assert_eq!(c.stats().chunks_disposed, 4);
    }

    #[test]
    fn test_synthesis_waits_for_color_ramp() {
        let config = config();
        let body = regolith_lod::Body::from_config(&config.body).unwrap();
        let mut c = TerrainBuildCoordinator::new(
            &config,
            &rolling,
            ManualWorker::default(),
            Box::new(RampSurfaceSynthesizer::for_body(&body)),
        )
        .unwrap();
        assert!(!c.has_color_ramp());

        c.set_camera_position(FAR);
        c.worker().complete_all();
        c.update();
        let report = c.process_surface_synthesis(later());
        assert_eq!(
            report,
            SynthesisReport {
                synthesized: 0,
                remaining: 6,
                deferred: true
            }
        );
        assert_eq!(
            c.update(),
            UpdateOutcome::Pending {
                awaiting_geometry: 0,
                awaiting_surface: 6
            }
        );

        c.set_color_ramp(ramp());
        assert!(matches!(finish_wave(&mut c), UpdateOutcome::Swapped { shown: 6, .. }));
    }

    #[test]
    fn test_expired_deadline_defers_synthesis() {
        let mut c = coordinator();
        c.set_camera_position(FAR);
        c.worker().complete_all();
        c.update();
        let report = c.process_surface_synthesis(Instant::now());
        assert_eq!(report.synthesized, 0);
        assert_eq!(report.remaining, 6);
        assert!(!report.deferred);

        let report = c.process_surface_synthesis(later());
        assert_eq!(report.synthesized, 6);
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn test_refused_jobs_are_resubmitted_from_backlog() {
        let mut c = coordinator_with(&config(), ManualWorker::with_capacity(2));
        c.set_camera_position(FAR);
        assert_eq!(c.stats().jobs_submitted, 2);
        assert_eq!(c.worker().queued_len(), 2);

        c.worker().complete_all();
        c.update();
        assert_eq!(c.stats().jobs_submitted, 4);

        assert!(matches!(finish_wave(&mut c), UpdateOutcome::Swapped { shown: 6, .. }));
        assert_eq!(c.stats().jobs_submitted, 6);
        assert_eq!(c.stats().jobs_retried, 0);
    }

    #[test]
    fn test_failed_builds_are_resubmitted() {
        let mut c = coordinator();
        c.set_camera_position(FAR);
        c.worker().fail_all();
        assert!(matches!(c.update(), UpdateOutcome::Pending { .. }));
        assert_eq!(c.stats().failed_builds, 6);
        assert_eq!(c.worker().queued_len(), 6);
        assert!(matches!(finish_wave(&mut c), UpdateOutcome::Swapped { shown: 6, .. }));
    }

    #[test]
    fn test_renderables_forward_render_toggles() {
        let mut config = config();
        config.render.cast_shadows = false;
        config.render.wireframe = true;
        let mut c = coordinator_with(&config, ManualWorker::default());
        c.set_camera_position(FAR);
        finish_wave(&mut c);

        let renderables = c.get_renderables();
        for r in &renderables {
            assert!(!r.cast_shadows);
            assert!(r.receive_shadows);
            assert!(r.wireframe);
            assert_eq!(r.transform.z_axis, r.face.normal());
            assert_eq!(r.normals.len(), r.positions.len());
            assert!(r.colors.iter().all(|px| px[3] == 255));
        }
        assert_eq!(c.indices().len(), 4 * 4 * 6);
    }

    #[test]
    fn test_invalid_body_refuses_to_start() {
        let mut config = config();
        config.body.sample_resolution = 0;
        let body = regolith_lod::Body::from_config(&BodyConfig::default()).unwrap();
        let result = TerrainBuildCoordinator::new(
            &config,
            &rolling,
            ManualWorker::default(),
            Box::new(RampSurfaceSynthesizer::for_body(&body)),
        );
        assert!(matches!(
            result,
            Err(TerrainError::Lod(LodError::Config(_)))
        ));
    }

    #[test]
    fn test_inline_worker_end_to_end() {
        let config = config();
        let heights = Arc::new(NoiseHeightSource::new(NoiseParams::default()));
        let body = regolith_lod::Body::from_config(&config.body).unwrap();
        let mut c = TerrainBuildCoordinator::new(
            &config,
            heights.as_ref(),
            InlineBuildWorker::new(heights.clone()),
            Box::new(RampSurfaceSynthesizer::for_body(&body)),
        )
        .unwrap();
        c.set_color_ramp(ramp());

        c.set_camera_position(NEAR);
        let mut swapped = false;
        for _ in 0..4 {
            c.update();
            c.process_surface_synthesis(later());
            if matches!(c.update(), UpdateOutcome::Swapped { .. }) {
                swapped = true;
                break;
            }
        }
        assert!(swapped);
        let renderables = c.get_renderables();
        assert_eq!(renderables.len(), c.face_set().leaf_count());
        for r in &renderables {
            assert!(r.positions.iter().flatten().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_threaded_worker_end_to_end() {
        let config = config();
        let heights = Arc::new(NoiseHeightSource::new(NoiseParams::default()));
        let body = regolith_lod::Body::from_config(&config.body).unwrap();
        let worker = ThreadedBuildWorker::new(2, 256, heights.clone()).unwrap();
        let mut c = TerrainBuildCoordinator::new(
            &config,
            heights.as_ref(),
            worker,
            Box::new(RampSurfaceSynthesizer::for_body(&body)),
        )
        .unwrap();
        c.set_color_ramp(ramp());
        c.set_camera_position(NEAR);

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut swapped = false;
        while !swapped && Instant::now() < deadline {
            c.update();
            c.process_surface_synthesis(later());
            swapped = matches!(c.update(), UpdateOutcome::Swapped { .. });
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(swapped, "wave did not swap within the deadline");
        assert_eq!(c.active_count(), c.face_set().leaf_count());
        assert_eq!(c.stats().stale_results, 0);
    }

    #[test]
    fn test_renderable_positions_are_already_body_oriented() {
        let config = config();
        let mut c = coordinator_with(&config, ManualWorker::default());
        c.set_camera_position(NEAR);
        finish_wave(&mut c);

        let reach = config.body.displacement_weight + 0.01;
        for r in &c.get_renderables() {
            for p in r.positions {
                let world = r.origin + glam::Vec3::from_array(*p).as_dvec3();
                assert!(world.dot(r.face.normal()) > 0.0, "{:?}: {world:?}", r.face);
                assert!((world.length() - config.body.radius).abs() <= reach);
            }
        }
    }

    /// Panics on its first `panics` samples, then behaves like `rolling`.
    struct ColdStart {
        calls: AtomicUsize,
        panics: usize,
    }

    impl HeightSource for ColdStart {
        fn height(&self, direction: DVec3) -> f64 {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.panics {
                panic!("height source not ready");
            }
            rolling(direction)
        }
    }

    #[test]
    fn test_panicking_builds_are_retried_until_wave_swaps() {
        let config = config();
        let heights = Arc::new(ColdStart {
            calls: AtomicUsize::new(0),
            panics: 2,
        });
        let body = regolith_lod::Body::from_config(&config.body).unwrap();
        let worker = ThreadedBuildWorker::new(2, 64, heights).unwrap();
        let mut c = TerrainBuildCoordinator::new(
            &config,
            &rolling,
            worker,
            Box::new(RampSurfaceSynthesizer::for_body(&body)),
        )
        .unwrap();
        c.set_color_ramp(ramp());
        c.set_camera_position(FAR);

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut swapped = false;
        while !swapped && Instant::now() < deadline {
            c.update();
            c.process_surface_synthesis(later());
            swapped = matches!(c.update(), UpdateOutcome::Swapped { .. });
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(swapped, "wave stalled behind panicked builds");
        assert_eq!(c.stats().failed_builds, 2);
        assert_eq!(c.stats().jobs_retried, 2);
        assert_eq!(c.worker().in_flight_count(), 0);
        assert_eq!(c.active_count(), 6);
    }
}
