use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use sah_utils::{Scheduler, ShouldCancel};
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::build::binning;
use crate::build::chunk::{merge_chunks, ChildRef, ChunkNode, ChunkNodeKind, ChunkReport, ResultChunk};
use crate::build::cost::SahCost;
use crate::build::exact_search::{self, SplitCandidate};
use crate::build::object::{BuildObject, ObjectBuffers, Side};
use crate::build::settings::{BuildSettings, ResolvedStrategy, MAX_DEPTH};
use crate::build::statistics::{BuildStatistics, LeafReason};
use crate::build::{BuildOutcome, BvhResult};
use crate::error::try_vec;
use crate::partitioning::{self, Halves};
use crate::{Aabb, BuildError, BvhNode, Result};

#[derive(Debug, Copy, Clone)]
struct BuildRange {
    begin: usize,
    end: usize,
    bounds: Aabb,
    centroid_bounds: Aabb,
    depth: u32,
    side: Side,
}

impl BuildRange {
    fn len(&self) -> usize {
        self.end - self.begin
    }

    fn range(&self) -> Range<usize> {
        self.begin..self.end
    }
}

/// State shared by every task of one build.
struct BuildContext {
    settings: BuildSettings,
    strategy: ResolvedStrategy,
    cost: SahCost,
    objects: ObjectBuffers,
    scheduler: Arc<dyn Scheduler>,
    nested: Option<ThreadPool>,
    nested_tasks: usize,
    cancel: Box<dyn ShouldCancel>,
    aborted: AtomicBool,
    failure: Mutex<Option<BuildError>>,
    next_chunk: AtomicU32,
    reports: Sender<ChunkReport>,
}

impl BuildContext {
    fn should_stop(&self) -> bool {
        if self.aborted.load(Ordering::Acquire) {
            return true;
        }
        if self.cancel.should_cancel() {
            self.aborted.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Records the first fatal error and makes every other task unwind.
    fn fail(&self, error: BuildError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            log::error!("BVH build failed: {}", error);
            *failure = Some(error);
        }
        self.aborted.store(true, Ordering::Release);
    }

    fn nested_pool(&self, num_objects: usize, threshold: usize) -> Option<&ThreadPool> {
        if num_objects >= threshold {
            self.nested.as_ref()
        } else {
            None
        }
    }

    fn spawn(ctx: &Arc<BuildContext>, chunk_id: u32, range: BuildRange) {
        let task_ctx = ctx.clone();
        ctx.scheduler
            .submit(Box::new(move || run_subtree_task(task_ctx, chunk_id, range)));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_subtree_task(ctx: Arc<BuildContext>, chunk_id: u32, range: BuildRange) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Option<ChunkReport>> {
        if ctx.should_stop() {
            return Ok(None);
        }
        let mut builder = SubtreeBuilder::new(&ctx, chunk_id);
        let root = builder.chunk.alloc()?;
        builder.build(root, range)?;
        Ok(Some(builder.finish()))
    }));

    match outcome {
        Ok(Ok(None)) => {}
        Ok(Ok(Some(report))) => {
            if ctx.aborted.load(Ordering::Acquire) {
                return;
            }
            if ctx.reports.send(report).is_err() {
                ctx.fail(BuildError::Internal(format!(
                    "result of chunk {} could not be delivered",
                    chunk_id
                )));
            }
        }
        Ok(Err(error)) => ctx.fail(error),
        Err(payload) => ctx.fail(BuildError::TaskPanicked(panic_message(payload.as_ref()))),
    }
}

/// Builds one subtree into its own chunk. Ranges handed to a builder are
/// owned by it exclusively until it returns, on both buffers.
struct SubtreeBuilder<'a> {
    ctx: &'a Arc<BuildContext>,
    chunk: ResultChunk,
    stats: BuildStatistics,
    scratch: Vec<f32>,
}

impl<'a> SubtreeBuilder<'a> {
    fn new(ctx: &'a Arc<BuildContext>, chunk_id: u32) -> Self {
        Self {
            ctx,
            chunk: ResultChunk::new(chunk_id),
            stats: BuildStatistics::default(),
            scratch: Vec::new(),
        }
    }

    fn finish(self) -> ChunkReport {
        ChunkReport {
            chunk: self.chunk,
            stats: self.stats,
        }
    }

    fn build(&mut self, node: u32, range: BuildRange) -> Result<()> {
        if self.ctx.should_stop() {
            return Ok(());
        }

        let n = range.len();
        if n <= self.ctx.settings.leaf_object_threshold {
            return self.make_leaf(node, &range, LeafReason::UnderThreshold);
        }
        if range.depth >= MAX_DEPTH {
            return self.make_leaf(node, &range, LeafReason::MaxDepth);
        }

        let candidate = self.find_split(&range)?;
        if self.ctx.should_stop() {
            return Ok(());
        }
        let candidate = match candidate {
            Some(candidate) => candidate,
            None => return self.arbitrary_split(node, range),
        };

        if self.ctx.cost.prefers_leaf(
            candidate.cost_factor,
            range.bounds.surface_area(),
            n,
            self.ctx.settings.max_objects_per_leaf,
        ) {
            return self.make_leaf(node, &range, LeafReason::CheaperNotToSplit);
        }

        let (halves, child_side) = self.partition(&range, &candidate);
        if halves.is_degenerate() {
            return self.arbitrary_split(node, range);
        }

        let mid = range.begin + halves.left_count;
        let left = BuildRange {
            begin: range.begin,
            end: mid,
            bounds: halves.left_bounds,
            centroid_bounds: halves.left_centroids,
            depth: range.depth + 1,
            side: child_side,
        };
        let right = BuildRange {
            begin: mid,
            end: range.end,
            bounds: halves.right_bounds,
            centroid_bounds: halves.right_centroids,
            depth: range.depth + 1,
            side: child_side,
        };

        self.interior(node, &range, left, right)
    }

    fn interior(&mut self, node: u32, range: &BuildRange, left: BuildRange, right: BuildRange) -> Result<()> {
        let threshold = self.ctx.settings.new_task_threshold;
        let spawn = left.len() >= threshold && right.len() >= threshold;

        let left_index = self.chunk.alloc()?;
        let right_ref = if spawn {
            ChildRef::Chunk(self.ctx.next_chunk.fetch_add(1, Ordering::AcqRel))
        } else {
            ChildRef::Local(self.chunk.alloc()?)
        };

        self.chunk.write(
            node,
            ChunkNode {
                bounds: range.bounds,
                kind: ChunkNodeKind::Interior {
                    left: left_index,
                    right: right_ref,
                },
                depth: range.depth,
            },
        );
        self.stats.record_interior();

        match right_ref {
            ChildRef::Chunk(chunk_id) => {
                BuildContext::spawn(self.ctx, chunk_id, right);
                self.build(left_index, left)
            }
            ChildRef::Local(right_index) => {
                self.build(left_index, left)?;
                self.build(right_index, right)
            }
        }
    }

    fn make_leaf(&mut self, node: u32, range: &BuildRange, reason: LeafReason) -> Result<()> {
        // SAFETY: this builder owns `range`.
        unsafe { self.ctx.objects.settle(range.side, range.range()) };

        self.chunk.write(
            node,
            ChunkNode {
                bounds: range.bounds,
                kind: ChunkNodeKind::Leaf {
                    begin: range.begin as u32,
                    end: range.end as u32,
                },
                depth: range.depth,
            },
        );
        self.stats.record_leaf(reason, range.depth, range.len());
        Ok(())
    }

    /// Halves the range by position until the pieces fit in a leaf.
    fn arbitrary_split(&mut self, node: u32, range: BuildRange) -> Result<()> {
        if self.ctx.should_stop() {
            return Ok(());
        }

        let n = range.len();
        if n <= self.ctx.settings.max_objects_per_leaf {
            return self.make_leaf(node, &range, LeafReason::ArbitrarySplit);
        }

        let mid = range.begin + n / 2;
        let (left_bounds, left_centroids) = self.bounds_of(range.side, range.begin..mid);
        let (right_bounds, right_centroids) = self.bounds_of(range.side, mid..range.end);
        let left = BuildRange {
            begin: range.begin,
            end: mid,
            bounds: left_bounds,
            centroid_bounds: left_centroids,
            depth: range.depth + 1,
            side: range.side,
        };
        let right = BuildRange {
            begin: mid,
            end: range.end,
            bounds: right_bounds,
            centroid_bounds: right_centroids,
            depth: range.depth + 1,
            side: range.side,
        };

        let left_index = self.chunk.alloc()?;
        let right_index = self.chunk.alloc()?;
        self.chunk.write(
            node,
            ChunkNode {
                bounds: range.bounds,
                kind: ChunkNodeKind::Interior {
                    left: left_index,
                    right: ChildRef::Local(right_index),
                },
                depth: range.depth,
            },
        );
        self.stats.record_interior();

        self.arbitrary_split(left_index, left)?;
        self.arbitrary_split(right_index, right)
    }

    fn bounds_of(&self, side: Side, range: Range<usize>) -> (Aabb, Aabb) {
        // SAFETY: this builder owns `range`.
        let objects = unsafe { self.ctx.objects.get(side, 0, range) };
        let mut bounds = Aabb::EMPTY;
        let mut centroids = Aabb::EMPTY;
        for object in objects {
            bounds.grow_bb(&object.aabb);
            centroids.grow(object.aabb.center());
        }
        (bounds, centroids)
    }

    fn find_split(&mut self, range: &BuildRange) -> Result<Option<SplitCandidate>> {
        let ctx: &BuildContext = self.ctx;
        let settings = &ctx.settings;
        let stop = || ctx.should_stop();
        let n = range.len();

        match ctx.strategy {
            ResolvedStrategy::Exact => {
                // SAFETY: this builder owns `range` and only reads it here.
                let arrays = unsafe {
                    [
                        ctx.objects.get(range.side, 0, range.range()),
                        ctx.objects.get(range.side, 1, range.range()),
                        ctx.objects.get(range.side, 2, range.range()),
                    ]
                };
                let pool = ctx.nested_pool(n, settings.axis_parallel_threshold);
                exact_search::find_best_split(arrays, &mut self.scratch, pool, &stop)
            }
            ResolvedStrategy::Binning => {
                // SAFETY: as above.
                let objects = unsafe { ctx.objects.get(range.side, 0, range.range()) };
                let pool = ctx.nested_pool(n, settings.parallel_binning_threshold);
                Ok(binning::find_best_split(
                    objects,
                    &range.centroid_bounds,
                    pool,
                    ctx.nested_tasks,
                    &stop,
                ))
            }
        }
    }

    /// Splits the range by `candidate` and returns which buffer now holds
    /// the children.
    fn partition(&mut self, range: &BuildRange, candidate: &SplitCandidate) -> (Halves, Side) {
        let ctx: &BuildContext = self.ctx;
        let settings = &ctx.settings;
        let n = range.len();
        let side = range.side;
        let other = side.other();
        let (axis, split_value) = (candidate.axis, candidate.split_value);

        match ctx.strategy {
            ResolvedStrategy::Exact => {
                // SAFETY: this builder owns `range` on both buffers, and the
                // source and destination views live in different buffers.
                let (src, dst) = unsafe {
                    (
                        [
                            ctx.objects.get(side, 0, range.range()),
                            ctx.objects.get(side, 1, range.range()),
                            ctx.objects.get(side, 2, range.range()),
                        ],
                        [
                            ctx.objects.get_mut(other, 0, range.range()),
                            ctx.objects.get_mut(other, 1, range.range()),
                            ctx.objects.get_mut(other, 2, range.range()),
                        ],
                    )
                };
                let pool = ctx.nested_pool(n, settings.axis_parallel_threshold);
                let halves = partitioning::mirrored_partition(src, dst, axis, split_value, pool);
                (halves, other)
            }
            ResolvedStrategy::Binning => {
                let pool = ctx.nested_pool(n, settings.parallel_partition_threshold);
                match pool {
                    Some(pool) if ctx.objects.has_second_buffer() => {
                        // SAFETY: as above.
                        let (src, dst) = unsafe {
                            (
                                ctx.objects.get(side, 0, range.range()),
                                ctx.objects.get_mut(other, 0, range.range()),
                            )
                        };
                        let halves = partitioning::parallel_partition_into(
                            src,
                            dst,
                            axis,
                            split_value,
                            pool,
                            ctx.nested_tasks,
                        );
                        (halves, other)
                    }
                    _ => {
                        // SAFETY: this builder owns `range`.
                        let objects = unsafe { ctx.objects.get_mut(side, 0, range.range()) };
                        (partitioning::partition_in_place(objects, axis, split_value), side)
                    }
                }
            }
        }
    }
}

/// Parallel top down SAH builder.
///
/// Subtrees above `new_task_threshold` objects are handed to the scheduler
/// as independent tasks; each task writes its nodes into a private chunk and
/// the chunks are stitched together once the scheduler is idle.
pub struct TopDownBuilder {
    settings: BuildSettings,
    stats: BuildStatistics,
    root_bounds: Aabb,
}

impl TopDownBuilder {
    pub fn new(settings: BuildSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            stats: BuildStatistics::default(),
            root_bounds: Aabb::EMPTY,
        })
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Statistics of the last completed build.
    pub fn statistics(&self) -> &BuildStatistics {
        &self.stats
    }

    pub fn max_leaf_depth(&self) -> u32 {
        self.stats.max_leaf_depth
    }

    pub fn root_bounds(&self) -> Aabb {
        self.root_bounds
    }

    /// Builds a tree over `aabbs`.
    ///
    /// Blocks until every task of the build has finished, using
    /// [`Scheduler::wait_for_all_complete`]; the scheduler should not be
    /// running unrelated long lived work at the same time. `cancel` is
    /// polled throughout, once it fires the build stops spawning work and
    /// returns [`BuildOutcome::Cancelled`].
    pub fn build<S, C>(&mut self, aabbs: &[Aabb], scheduler: &Arc<S>, cancel: C) -> Result<BuildOutcome>
    where
        S: Scheduler + 'static,
        C: ShouldCancel + 'static,
    {
        let timer = Instant::now();
        self.stats = BuildStatistics::default();
        self.root_bounds = Aabb::EMPTY;

        let n = aabbs.len();
        if n > u32::MAX as usize {
            return Err(BuildError::TooManyObjects(n));
        }
        if cancel.should_cancel() {
            return Ok(BuildOutcome::Cancelled);
        }

        if n == 0 {
            self.stats.record_leaf(LeafReason::UnderThreshold, 0, 0);
            self.stats.num_chunks = 1;
            return Ok(BuildOutcome::Complete(BvhResult {
                nodes: vec![BvhNode::leaf(Aabb::EMPTY, 0, 0, 0)],
                prim_indices: Vec::new(),
            }));
        }

        let strategy = self.settings.resolve_strategy(n);
        let (bounds, centroid_bounds) = compute_bounds(aabbs);

        let nested = if self.settings.wants_nested_pool(strategy, n) {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.settings.nested_worker_threads)
                .thread_name(|i| format!("bvh-nested-{}", i))
                .build()?;
            Some(pool)
        } else {
            None
        };
        let second_buffer = match strategy {
            ResolvedStrategy::Exact => true,
            ResolvedStrategy::Binning => {
                nested.is_some() && n >= self.settings.parallel_partition_threshold
            }
        };

        let objects = prepare_objects(aabbs, strategy, second_buffer)?;
        log::debug!(
            "prepared {} objects for {:?} build in {:.2?}",
            n,
            strategy,
            timer.elapsed()
        );

        let (sender, receiver) = channel::unbounded();
        let scheduler: Arc<dyn Scheduler> = scheduler.clone();
        let ctx = Arc::new(BuildContext {
            settings: self.settings,
            strategy,
            cost: SahCost::new(self.settings.intersection_cost),
            objects,
            scheduler,
            nested,
            nested_tasks: self.settings.nested_worker_threads.max(1) * 4,
            cancel: Box::new(cancel),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
            next_chunk: AtomicU32::new(0),
            reports: sender,
        });

        let root_chunk = ctx.next_chunk.fetch_add(1, Ordering::AcqRel);
        BuildContext::spawn(
            &ctx,
            root_chunk,
            BuildRange {
                begin: 0,
                end: n,
                bounds,
                centroid_bounds,
                depth: 0,
                side: Side::A,
            },
        );
        ctx.scheduler.wait_for_all_complete();
        let build_time = timer.elapsed();

        if let Some(error) = ctx.failure.lock().take() {
            return Err(error);
        }
        if ctx.aborted.load(Ordering::Acquire) {
            log::debug!("BVH build cancelled after {:.2?}", build_time);
            return Ok(BuildOutcome::Cancelled);
        }

        let num_chunks = ctx.next_chunk.load(Ordering::Acquire) as usize;
        let mut slots: Vec<Option<ResultChunk>> = (0..num_chunks).map(|_| None).collect();
        let mut stats = BuildStatistics::default();
        for report in receiver.try_iter() {
            stats.accumulate(&report.stats);
            let id = report.chunk.id() as usize;
            match slots.get_mut(id) {
                Some(slot) => *slot = Some(report.chunk),
                None => return Err(BuildError::Internal(format!("unexpected chunk {}", id))),
            }
        }
        let chunks = slots
            .into_iter()
            .enumerate()
            .map(|(id, chunk)| {
                chunk.ok_or_else(|| BuildError::Internal(format!("chunk {} was never reported", id)))
            })
            .collect::<Result<Vec<_>>>()?;
        stats.num_chunks = chunks.len() as u64;

        let nodes = merge_chunks(&chunks)?;
        drop(chunks);

        // SAFETY: all tasks have completed, nothing else views the buffers.
        let ordered = unsafe { ctx.objects.get(Side::A, 0, 0..n) };
        let mut prim_indices: Vec<u32> = try_vec(n, "object index permutation")?;
        prim_indices.par_extend(ordered.par_iter().map(|object| object.index));

        log::info!(
            "built BVH over {} objects in {:.2?} ({:.2?} total): {} nodes, {} leaves, {} chunks, max leaf depth {}",
            n,
            build_time,
            timer.elapsed(),
            nodes.len(),
            stats.num_leaves,
            stats.num_chunks,
            stats.max_leaf_depth
        );
        log::debug!("build statistics:\n{}", stats);

        self.stats = stats;
        self.root_bounds = bounds;

        Ok(BuildOutcome::Complete(BvhResult { nodes, prim_indices }))
    }
}

fn compute_bounds(aabbs: &[Aabb]) -> (Aabb, Aabb) {
    aabbs
        .par_iter()
        .fold(
            || (Aabb::EMPTY, Aabb::EMPTY),
            |(mut bounds, mut centroids), aabb| {
                bounds.grow_bb(aabb);
                centroids.grow(aabb.center());
                (bounds, centroids)
            },
        )
        .reduce(
            || (Aabb::EMPTY, Aabb::EMPTY),
            |a, b| (a.0.union_of(&b.0), a.1.union_of(&b.1)),
        )
}

fn prepare_objects(aabbs: &[Aabb], strategy: ResolvedStrategy, second_buffer: bool) -> Result<ObjectBuffers> {
    let n = aabbs.len();
    let mut base: Vec<BuildObject> = try_vec(n, "object array")?;
    base.par_extend(
        aabbs
            .par_iter()
            .enumerate()
            .map(|(i, aabb)| BuildObject { aabb: *aabb, index: i as u32 }),
    );

    match strategy {
        ResolvedStrategy::Exact => {
            let mut arrays = Vec::with_capacity(3);
            for axis in 0..3 {
                let mut array = if axis == 2 {
                    std::mem::take(&mut base)
                } else {
                    let mut copy = try_vec(n, "object array")?;
                    copy.extend_from_slice(&base);
                    copy
                };
                array.par_sort_unstable_by(|a, b| {
                    a.centroid(axis)
                        .total_cmp(&b.centroid(axis))
                        .then(a.index.cmp(&b.index))
                });
                arrays.push(array);
            }
            ObjectBuffers::new(arrays, second_buffer)
        }
        ResolvedStrategy::Binning => ObjectBuffers::new(vec![base], second_buffer),
    }
}
