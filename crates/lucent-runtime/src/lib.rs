//! Worker orchestration for translucency-sort builds (slim, engine-only).
//!
//! Geometry collection and sort-data construction run on a worker pool, one
//! job per chunk; the frame-owning thread drains results and integrates them
//! into the trigger coordinator. A job exclusively owns its chunk's data
//! until the result is published back.
#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use lucent_geom::{ChunkCoord, Vec3};
use lucent_sort::{
    DataOutcome, Facing, GeometryCollector, MeshRanges, SortSettings, SortType, TranslucentData,
};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// One translucent quad as produced by the mesh builder.
#[derive(Clone, Debug)]
pub struct QuadInput {
    pub facing: Facing,
    pub vertices: [Vec3; 4],
    pub normal: Vec3,
}

#[derive(Clone, Debug)]
pub struct SortJob {
    pub coord: ChunkCoord,
    pub rev: u64,
    pub job_id: u64,
    pub quads: Vec<QuadInput>,
    pub ranges: MeshRanges,
    pub camera: Vec3,
    /// The chunk's previous data, moved into the job so subtree reuse and
    /// the identical-geometry check can consult it.
    pub old_data: Option<TranslucentData>,
    pub settings: SortSettings,
}

#[derive(Clone, Debug)]
pub struct SortJobOut {
    pub coord: ChunkCoord,
    pub rev: u64,
    pub job_id: u64,
    pub sort_type: SortType,
    /// Returned to the caller for trigger-index integration.
    pub old_data: Option<TranslucentData>,
    /// `None` means the old data is still valid and no re-upload is needed.
    pub data: Option<TranslucentData>,
    pub t_total_ms: u32,
}

fn process_sort_job(job: SortJob, tx: &Sender<SortJobOut>) {
    let SortJob {
        coord,
        rev,
        job_id,
        quads,
        ranges,
        camera,
        old_data,
        settings,
    } = job;

    let t_start = Instant::now();
    let mut collector = GeometryCollector::new(coord, settings);
    for quad in &quads {
        collector.add_quad(quad.facing, &quad.vertices, quad.normal);
    }
    let sort_type = collector.finish_rendering();
    let data = match collector.get_translucent_data(old_data.as_ref(), &ranges, camera) {
        DataOutcome::Reused => None,
        DataOutcome::Built(data) => Some(data),
    };
    let t_total_ms = t_start.elapsed().as_millis().min(u128::from(u32::MAX)) as u32;

    let _ = tx.send(SortJobOut {
        coord,
        rev,
        job_id,
        sort_type,
        old_data,
        data,
        t_total_ms,
    });
}

pub struct Runtime {
    job_tx: Sender<SortJob>,
    res_rx: Receiver<SortJobOut>,
    _pool: Arc<ThreadPool>,
    queued: Arc<AtomicUsize>,
    inflight: Arc<AtomicUsize>,
    pub workers: usize,
}

impl Runtime {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (job_tx, job_rx) = unbounded::<SortJob>();
        let (res_tx, res_rx) = unbounded::<SortJobOut>();
        let queued = Arc::new(AtomicUsize::new(0));
        let inflight = Arc::new(AtomicUsize::new(0));

        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("lucent-sort-{i}"))
                .build()
                .expect("sort worker pool"),
        );
        for _ in 0..workers {
            let rx = job_rx.clone();
            let tx = res_tx.clone();
            let queued = queued.clone();
            let inflight = inflight.clone();
            pool.spawn(move || {
                while let Ok(job) = rx.recv() {
                    queued.fetch_sub(1, Ordering::Relaxed);
                    inflight.fetch_add(1, Ordering::Relaxed);
                    process_sort_job(job, &tx);
                    inflight.fetch_sub(1, Ordering::Relaxed);
                }
            });
        }

        Self {
            job_tx,
            res_rx,
            _pool: pool,
            queued,
            inflight,
            workers,
        }
    }

    pub fn submit(&self, job: SortJob) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        let _ = self.job_tx.send(job);
    }

    /// Non-blocking drain step for the frame loop.
    pub fn try_recv(&self) -> Option<SortJobOut> {
        self.res_rx.try_recv().ok()
    }

    /// Blocks until one result is available; test and shutdown helper.
    pub fn recv_blocking(&self) -> Option<SortJobOut> {
        self.res_rx.recv().ok()
    }

    #[inline]
    pub fn queued_len(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn inflight_len(&self) -> usize {
        self.inflight.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_vertices(facing: Facing, plane: f32) -> [Vec3; 4] {
        let axis = facing.axis();
        let (ua, va) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        let mk = |u: f32, v: f32| {
            let mut c = [0.0f32; 3];
            c[axis] = plane;
            c[ua] = u;
            c[va] = v;
            Vec3::new(c[0], c[1], c[2])
        };
        [mk(0.0, 0.0), mk(16.0, 0.0), mk(16.0, 16.0), mk(0.0, 16.0)]
    }

    fn slab_job(coord: ChunkCoord, rev: u64) -> SortJob {
        SortJob {
            coord,
            rev,
            job_id: rev,
            quads: vec![
                QuadInput {
                    facing: Facing::PosX,
                    vertices: face_vertices(Facing::PosX, 0.0),
                    normal: Facing::PosX.normal(),
                },
                QuadInput {
                    facing: Facing::NegX,
                    vertices: face_vertices(Facing::NegX, 16.0),
                    normal: Facing::NegX.normal(),
                },
            ],
            ranges: MeshRanges::default(),
            camera: Vec3::ZERO,
            old_data: None,
            settings: SortSettings::default(),
        }
    }

    #[test]
    fn jobs_round_trip_through_the_pool() {
        let runtime = Runtime::new(2);
        for i in 0..4 {
            runtime.submit(slab_job(ChunkCoord::new(i, 0, 0), 1));
        }
        let mut seen = Vec::new();
        for _ in 0..4 {
            let out = runtime.recv_blocking().expect("worker result");
            assert_eq!(out.sort_type, SortType::None);
            assert!(out.data.is_some());
            seen.push(out.coord);
        }
        seen.sort_by_key(|c| c.cx);
        assert_eq!(seen.len(), 4);
        assert_eq!(runtime.queued_len(), 0);
    }

    #[test]
    fn unchanged_geometry_reports_reuse() {
        let runtime = Runtime::new(1);
        let coord = ChunkCoord::new(0, 0, 0);
        runtime.submit(slab_job(coord, 1));
        let first = runtime.recv_blocking().unwrap();
        let data = first.data.unwrap();

        let mut job = slab_job(coord, 2);
        job.old_data = Some(data);
        runtime.submit(job);
        let second = runtime.recv_blocking().unwrap();
        assert!(second.data.is_none(), "identical geometry must reuse");
        assert!(second.old_data.is_some());
    }
}
