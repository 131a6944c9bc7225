use rayon::prelude::*;
use rayon::ThreadPool;

use crate::build::object::BuildObject;
use crate::{Aabb, BuildError, Result};

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct SplitCandidate {
    pub axis: usize,
    /// Objects with a centroid `<= split_value` on `axis` go left.
    pub split_value: f32,
    /// `N_L * halfArea(L) + N_R * halfArea(R)`.
    pub cost_factor: f32,
}

impl SplitCandidate {
    pub fn better_of(a: Option<SplitCandidate>, b: Option<SplitCandidate>) -> Option<SplitCandidate> {
        match (a, b) {
            (Some(a), Some(b)) if b.cost_factor < a.cost_factor => Some(b),
            (Some(a), _) => Some(a),
            (None, b) => b,
        }
    }
}

pub(crate) fn ensure_scratch(scratch: &mut Vec<f32>, len: usize) -> Result<()> {
    if scratch.len() < len {
        scratch
            .try_reserve(len - scratch.len())
            .map_err(|_| BuildError::OutOfMemory {
                what: "split search scratch",
                count: len,
            })?;
        scratch.resize(len, 0.0);
    }
    Ok(())
}

/// Sweeps one axis of a range sorted by centroid on that axis.
///
/// The forward pass stores the half area of every prefix in
/// `left_half_area`, the backward pass grows the right side one object at
/// a time. Candidates whose centroid equals the centroid of the first
/// object on the right are skipped, objects sharing a centroid can't be
/// separated by a plane.
pub(crate) fn search_axis(
    objects: &[BuildObject],
    axis: usize,
    left_half_area: &mut [f32],
) -> Option<SplitCandidate> {
    let n = objects.len();
    if n < 2 {
        return None;
    }
    debug_assert!(left_half_area.len() >= n);

    let mut left = Aabb::EMPTY;
    for (i, object) in objects.iter().enumerate() {
        left.grow_bb(&object.aabb);
        left_half_area[i] = left.half_area();
    }

    let mut right = objects[n - 1].aabb;
    let mut last_split_value = objects[n - 1].centroid(axis);
    let mut best: Option<SplitCandidate> = None;
    let mut best_cost = f32::INFINITY;

    for i in (0..n - 1).rev() {
        let split_value = objects[i].centroid(axis);
        let n_left = (i + 1) as f32;
        let n_right = (n - i - 1) as f32;
        let cost = n_left * left_half_area[i] + n_right * right.half_area();

        if cost < best_cost && split_value != last_split_value {
            best_cost = cost;
            best = Some(SplitCandidate {
                axis,
                split_value,
                cost_factor: cost,
            });
        }

        last_split_value = split_value;
        right.grow_bb(&objects[i].aabb);
    }

    best
}

/// Best candidate over the three sorted arrays of a range, or `None` when
/// every axis has all centroids coincident.
///
/// With a nested pool the axes are searched concurrently, each with its own
/// scratch table; otherwise `scratch` is reused for all three.
pub(crate) fn find_best_split(
    arrays: [&[BuildObject]; 3],
    scratch: &mut Vec<f32>,
    pool: Option<&ThreadPool>,
    should_stop: &(dyn Fn() -> bool + Sync),
) -> Result<Option<SplitCandidate>> {
    let n = arrays[0].len();

    if let Some(pool) = pool {
        let per_axis = pool.install(|| {
            arrays
                .par_iter()
                .enumerate()
                .map(|(axis, objects)| {
                    if should_stop() {
                        return Ok(None);
                    }
                    let mut scratch = Vec::new();
                    ensure_scratch(&mut scratch, n)?;
                    Ok(search_axis(objects, axis, &mut scratch))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        return Ok(per_axis.into_iter().fold(None, SplitCandidate::better_of));
    }

    ensure_scratch(scratch, n)?;
    let mut best = None;
    for (axis, objects) in arrays.iter().enumerate() {
        if should_stop() {
            return Ok(None);
        }
        best = SplitCandidate::better_of(best, search_axis(objects, axis, scratch));
    }
    Ok(best)
}
