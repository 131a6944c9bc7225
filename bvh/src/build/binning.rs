use rayon::prelude::*;
use rayon::ThreadPool;

use crate::build::exact_search::SplitCandidate;
use crate::build::object::BuildObject;
use crate::Aabb;

pub(crate) const MAX_BINS: usize = 32;

pub(crate) fn bin_count(num_objects: usize) -> usize {
    let count = (4.0 + 0.05 * num_objects as f32) as usize;
    count.max(1).min(MAX_BINS)
}

/// Per axis bucket unions and counts over a range's centroid bounds.
#[derive(Debug, Clone)]
pub(crate) struct Bins {
    count: usize,
    origin: [f32; 3],
    scale: [f32; 3],
    width: [f32; 3],
    valid: [bool; 3],
    bounds: [[Aabb; MAX_BINS]; 3],
    counts: [[u32; MAX_BINS]; 3],
}

impl Bins {
    pub fn new(count: usize, centroid_bounds: &Aabb) -> Self {
        let count = count.max(1).min(MAX_BINS);
        let mut bins = Self {
            count,
            origin: centroid_bounds.min,
            scale: [0.0; 3],
            width: [0.0; 3],
            valid: [false; 3],
            bounds: [[Aabb::EMPTY; MAX_BINS]; 3],
            counts: [[0; MAX_BINS]; 3],
        };

        for axis in 0..3 {
            let extent = centroid_bounds.extend(axis);
            if extent > 0.0 && extent.is_finite() {
                bins.valid[axis] = true;
                bins.scale[axis] = count as f32 / extent;
                bins.width[axis] = extent / count as f32;
            }
        }

        bins
    }

    #[inline]
    fn bin_index(&self, axis: usize, centroid: f32) -> usize {
        // float to int casts saturate and map NaN to zero
        let b = ((centroid - self.origin[axis]) * self.scale[axis]) as isize;
        b.max(0).min(self.count as isize - 1) as usize
    }

    pub fn accumulate(&mut self, objects: &[BuildObject]) {
        for object in objects {
            for axis in 0..3 {
                if !self.valid[axis] {
                    continue;
                }
                let b = self.bin_index(axis, object.centroid(axis));
                self.bounds[axis][b].grow_bb(&object.aabb);
                self.counts[axis][b] += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &Bins) {
        debug_assert_eq!(self.count, other.count);
        for axis in 0..3 {
            for b in 0..self.count {
                self.bounds[axis][b].grow_bb(&other.bounds[axis][b]);
                self.counts[axis][b] += other.counts[axis][b];
            }
        }
    }

    /// Cheapest bin boundary over all axes with a non-zero centroid extent.
    /// Boundaries that leave one side empty are not candidates.
    pub fn best_split(&self) -> Option<SplitCandidate> {
        let nb = self.count;
        let mut best: Option<SplitCandidate> = None;

        for axis in 0..3 {
            if !self.valid[axis] {
                continue;
            }

            let mut right_area = [0.0f32; MAX_BINS];
            let mut right_count = [0u32; MAX_BINS];
            let mut right = Aabb::EMPTY;
            let mut count = 0;
            for b in (1..nb).rev() {
                right.grow_bb(&self.bounds[axis][b]);
                count += self.counts[axis][b];
                right_area[b] = right.half_area();
                right_count[b] = count;
            }

            let mut left = Aabb::EMPTY;
            let mut left_count = 0;
            for b in 0..nb.saturating_sub(1) {
                left.grow_bb(&self.bounds[axis][b]);
                left_count += self.counts[axis][b];

                let n_right = right_count[b + 1];
                if left_count == 0 || n_right == 0 {
                    continue;
                }

                let cost = left_count as f32 * left.half_area() + n_right as f32 * right_area[b + 1];
                let candidate = SplitCandidate {
                    axis,
                    split_value: self.origin[axis] + self.width[axis] * (b + 1) as f32,
                    cost_factor: cost,
                };
                best = SplitCandidate::better_of(best, Some(candidate));
            }
        }

        best
    }
}

/// Bins a range and returns its cheapest boundary. With a pool the range
/// is cut into `num_tasks` sub-ranges whose bins are merged.
pub(crate) fn find_best_split(
    objects: &[BuildObject],
    centroid_bounds: &Aabb,
    pool: Option<&ThreadPool>,
    num_tasks: usize,
    should_stop: &(dyn Fn() -> bool + Sync),
) -> Option<SplitCandidate> {
    if objects.len() < 2 || should_stop() {
        return None;
    }

    let count = bin_count(objects.len());
    let bins = match pool {
        Some(pool) if num_tasks > 1 => {
            let chunk_size = (objects.len() + num_tasks - 1) / num_tasks;
            pool.install(|| {
                objects
                    .par_chunks(chunk_size.max(1))
                    .map(|sub_range| {
                        let mut bins = Bins::new(count, centroid_bounds);
                        bins.accumulate(sub_range);
                        bins
                    })
                    .reduce(
                        || Bins::new(count, centroid_bounds),
                        |mut a, b| {
                            a.merge(&b);
                            a
                        },
                    )
            })
        }
        _ => {
            let mut bins = Bins::new(count, centroid_bounds);
            bins.accumulate(objects);
            bins
        }
    };

    if should_stop() {
        return None;
    }
    bins.best_split()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(index: u32, x: f32) -> BuildObject {
        BuildObject {
            aabb: Aabb {
                min: [x, 0.0, 0.0],
                max: [x + 1.0, 1.0, 1.0],
            },
            index,
        }
    }

    fn centroid_bounds(objects: &[BuildObject]) -> Aabb {
        let mut bb = Aabb::EMPTY;
        for o in objects {
            bb.grow(o.aabb.center());
        }
        bb
    }

    #[test]
    fn bin_counts() {
        assert_eq!(bin_count(0), 4);
        assert_eq!(bin_count(100), 9);
        assert_eq!(bin_count(1000), 32);
        assert_eq!(bin_count(1 << 24), MAX_BINS);
    }

    #[test]
    fn splits_two_clusters() {
        let objects: Vec<_> = (0..20)
            .map(|i| object(i, if i % 2 == 0 { i as f32 * 0.01 } else { 50.0 + i as f32 * 0.01 }))
            .collect();
        let cb = centroid_bounds(&objects);
        let best = find_best_split(&objects, &cb, None, 1, &|| false).unwrap();

        assert_eq!(best.axis, 0);
        assert!(best.split_value > 1.0 && best.split_value < 50.0);
    }

    #[test]
    fn coincident_centroids_have_no_split() {
        let objects: Vec<_> = (0..50).map(|i| object(i, 3.0)).collect();
        let cb = centroid_bounds(&objects);
        assert!(find_best_split(&objects, &cb, None, 1, &|| false).is_none());
    }

    #[test]
    fn parallel_bins_match_serial() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();
        let objects: Vec<_> = (0..1000)
            .map(|i| object(i, ((i as f32) * 0.618).fract() * 100.0))
            .collect();
        let cb = centroid_bounds(&objects);

        let serial = find_best_split(&objects, &cb, None, 1, &|| false);
        let parallel = find_best_split(&objects, &cb, Some(&pool), 7, &|| false);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn stop_request_aborts_search() {
        let objects: Vec<_> = (0..100).map(|i| object(i, i as f32)).collect();
        let cb = centroid_bounds(&objects);
        assert!(find_best_split(&objects, &cb, None, 1, &|| true).is_none());
    }
}
