//! Background geometry builds: the job/result contract and two workers.
//!
//! A job carries everything needed to build one chunk, so workers share no
//! state with the coordinator. Results are tagged with the job token and
//! matched against the chunk on the coordinator's thread; workers never touch
//! chunks directly.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use glam::{DVec2, DVec3};
use regolith_config::BuildConfig;
use regolith_cubesphere::{CubeFace, FaceDirection, face_point_to_direction};
use regolith_lod::{Body, EdgeStrides, HeightSource};

use crate::{BuildError, ChunkId, ChunkParams, TerrainError};

/// Everything a worker needs to build one chunk's positions.
#[derive(Clone, Debug)]
pub struct BuildJob {
    pub chunk: ChunkId,
    /// Must match the chunk's expected token for the result to be applied.
    pub token: u64,
    pub face: CubeFace,
    /// Face-local center of the leaf.
    pub center: DVec2,
    /// Leaf edge length.
    pub size: f64,
    /// Quads per edge.
    pub resolution: u32,
    pub strides: EdgeStrides,
    /// World anchor; returned positions are relative to it.
    pub origin: DVec3,
    pub body: Arc<Body>,
}

impl BuildJob {
    /// A job building the chunk described by `params`.
    pub fn new(chunk: ChunkId, token: u64, params: &ChunkParams, body: Arc<Body>) -> Self {
        Self {
            chunk,
            token,
            face: params.face(),
            center: params.center,
            size: params.size,
            resolution: params.resolution,
            strides: params.key.strides,
            origin: params.origin,
            body,
        }
    }
}

/// Origin-relative positions of one built chunk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkGeometry {
    /// `(resolution + 1)^2` mesh vertices, row-major from the face-local
    /// `(-x, -y)` corner, with stitched edges.
    pub positions: Vec<[f32; 3]>,
    /// The unstitched surface one grid step past each edge: `resolution + 1`
    /// samples per direction at `dir.index() * (resolution + 1) + i`.
    ///
    /// Never meshed; it lets border normals use central differences, so
    /// same-size neighbors shade their shared edge identically.
    pub apron: Vec<[f32; 3]>,
}

/// Number of apron samples for a chunk of `resolution` quads per edge.
pub fn apron_len(resolution: u32) -> usize {
    4 * (resolution as usize + 1)
}

/// A finished build.
#[derive(Debug)]
pub struct BuildResult {
    pub chunk: ChunkId,
    pub token: u64,
    pub geometry: Result<ChunkGeometry, BuildError>,
    /// Build time in microseconds.
    pub build_time_us: u64,
}

/// Asynchronous build service.
///
/// Results may arrive in any order and after any delay. A job that never
/// completes is handled by the coordinator's timeout.
pub trait BuildWorker {
    /// Queue a job. Hands it back if the worker cannot accept more right now.
    fn submit(&self, job: BuildJob) -> Result<(), BuildJob>;

    /// Take every result completed since the last call.
    fn drain_results(&self) -> Vec<BuildResult>;

    /// Jobs accepted by [`BuildWorker::submit`] whose results have not been
    /// drained yet, whether still running or already finished.
    fn in_flight_count(&self) -> usize;
}

/// Build the positions and apron of a chunk.
///
/// Edges with a stride `k > 1` have every vertex whose index is not a
/// multiple of `k` moved onto the segment between the surrounding multiples,
/// which reproduces the coarser neighbor's edge exactly. Strides are clamped
/// to the resolution; seams are exact when the resolution is a multiple of
/// the stride. A non-finite index counts mesh vertices first, then the apron.
pub fn build_chunk_geometry(
    job: &BuildJob,
    heights: &dyn HeightSource,
) -> Result<ChunkGeometry, BuildError> {
    let n = job.resolution.max(1) as usize;
    let side = n + 1;
    let half_extent = job.body.half_extent();
    let step = job.size / n as f64;
    let corner = job.center - DVec2::splat(job.size * 0.5);
    let sample = |x: f64, y: f64| {
        let local = corner + DVec2::new(x, y) * step;
        let direction = face_point_to_direction(job.face, local, half_extent);
        job.body.project_direction(direction, heights.height(direction))
    };

    let mut points = Vec::with_capacity(side * side);
    for y in 0..side {
        for x in 0..side {
            points.push(sample(x as f64, y as f64));
        }
    }
    stitch_edges(&mut points, n, job.strides);

    let past = side as f64;
    let mut apron = Vec::with_capacity(4 * side);
    for dir in FaceDirection::ALL {
        for i in 0..side {
            let i = i as f64;
            apron.push(match dir {
                FaceDirection::North => sample(i, past),
                FaceDirection::South => sample(i, -1.0),
                FaceDirection::East => sample(past, i),
                FaceDirection::West => sample(-1.0, i),
            });
        }
    }

    let relative = |index: usize, p: &DVec3| {
        let r = (*p - job.origin).as_vec3();
        if r.is_finite() {
            Ok(r.to_array())
        } else {
            Err(BuildError::NonFinite { index })
        }
    };
    Ok(ChunkGeometry {
        positions: points
            .iter()
            .enumerate()
            .map(|(i, p)| relative(i, p))
            .collect::<Result<_, _>>()?,
        apron: apron
            .iter()
            .enumerate()
            .map(|(i, p)| relative(points.len() + i, p))
            .collect::<Result<_, _>>()?,
    })
}

fn stitch_edges(points: &mut [DVec3], n: usize, strides: EdgeStrides) {
    let side = n + 1;
    for dir in FaceDirection::ALL {
        let stride = (strides.get(dir) as usize).clamp(1, n);
        if stride == 1 {
            continue;
        }
        let at = |i: usize| match dir {
            FaceDirection::North => n * side + i,
            FaceDirection::South => i,
            FaceDirection::East => i * side + n,
            FaceDirection::West => i * side,
        };
        for i in 0..=n {
            let i0 = i / stride * stride;
            if i0 == i {
                continue;
            }
            let i1 = (i0 + stride).min(n);
            let t = (i - i0) as f64 / (i1 - i0) as f64;
            points[at(i)] = points[at(i0)].lerp(points[at(i1)], t);
        }
    }
}

/// Run one job, turning a panic in the height source into a failed build.
fn run_job(job: &BuildJob, heights: &dyn HeightSource) -> BuildResult {
    let start = Instant::now();
    let geometry = panic::catch_unwind(AssertUnwindSafe(|| build_chunk_geometry(job, heights)))
        .unwrap_or_else(|payload| {
            Err(BuildError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        });
    BuildResult {
        chunk: job.chunk,
        token: job.token,
        geometry,
        build_time_us: start.elapsed().as_micros() as u64,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Builds chunks on a pool of named OS threads.
///
/// Jobs travel over a bounded channel; results come back over an unbounded
/// one and are collected with [`BuildWorker::drain_results`] once per frame.
/// A panicking height source fails the job but never the thread.
pub struct ThreadedBuildWorker {
    job_sender: Option<Sender<BuildJob>>,
    result_receiver: Receiver<BuildResult>,
    worker_handles: Vec<JoinHandle<()>>,
    budget: usize,
    in_flight: AtomicUsize,
}

impl ThreadedBuildWorker {
    /// Spawn `worker_count` threads holding at most `budget` undrained jobs.
    pub fn new(
        worker_count: usize,
        budget: usize,
        heights: Arc<dyn HeightSource>,
    ) -> Result<Self, TerrainError> {
        let budget = budget.max(1);
        let (job_tx, job_rx) = bounded::<BuildJob>(budget);
        let (result_tx, result_rx) = unbounded::<BuildResult>();

        let mut worker_handles = Vec::with_capacity(worker_count.max(1));
        for i in 0..worker_count.max(1) {
            let rx = job_rx.clone();
            let tx = result_tx.clone();
            let heights = Arc::clone(&heights);

            let handle = std::thread::Builder::new()
                .name(format!("chunk-build-{i}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        let result = run_job(&job, heights.as_ref());
                        if let Err(BuildError::Panicked { message }) = &result.geometry {
                            tracing::error!(chunk = %job.chunk, %message, "height source panicked");
                        }
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                })?;
            worker_handles.push(handle);
        }

        Ok(Self {
            job_sender: Some(job_tx),
            result_receiver: result_rx,
            worker_handles,
            budget,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Size the pool from config: `worker_threads == 0` means `num_cpus - 2`, at least 1.
    pub fn from_config(
        config: &BuildConfig,
        heights: Arc<dyn HeightSource>,
    ) -> Result<Self, TerrainError> {
        let threads = match config.worker_threads {
            0 => (num_cpus::get().max(2) - 2).max(1),
            n => n,
        };
        tracing::debug!(threads, "starting chunk build workers");
        Self::new(threads, threads * 32, heights)
    }

    /// Number of worker threads still attached.
    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }

    /// Close the job channel and join every thread.
    pub fn shutdown(&mut self) {
        self.job_sender.take();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadedBuildWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl BuildWorker for ThreadedBuildWorker {
    fn submit(&self, job: BuildJob) -> Result<(), BuildJob> {
        let Some(sender) = &self.job_sender else {
            return Err(job);
        };
        if self.in_flight.load(Ordering::Relaxed) >= self.budget {
            return Err(job);
        }
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        sender.try_send(job).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            e.into_inner()
        })
    }

    fn drain_results(&self) -> Vec<BuildResult> {
        let results: Vec<BuildResult> = self.result_receiver.try_iter().collect();
        self.in_flight.fetch_sub(results.len(), Ordering::Relaxed);
        results
    }

    fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Builds each job synchronously inside [`BuildWorker::submit`].
///
/// For headless tools and tests; results are still delivered through
/// [`BuildWorker::drain_results`].
pub struct InlineBuildWorker {
    heights: Arc<dyn HeightSource>,
    completed: RefCell<Vec<BuildResult>>,
}

impl InlineBuildWorker {
    pub fn new(heights: Arc<dyn HeightSource>) -> Self {
        Self {
            heights,
            completed: RefCell::new(Vec::new()),
        }
    }
}

impl BuildWorker for InlineBuildWorker {
    fn submit(&self, job: BuildJob) -> Result<(), BuildJob> {
        let result = run_job(&job, self.heights.as_ref());
        self.completed.borrow_mut().push(result);
        Ok(())
    }

    fn drain_results(&self) -> Vec<BuildResult> {
        self.completed.take()
    }

    fn in_flight_count(&self) -> usize {
        self.completed.borrow().len()
    }
}
