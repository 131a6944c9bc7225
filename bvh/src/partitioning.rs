use rayon::prelude::*;
use rayon::ThreadPool;

use crate::build::object::BuildObject;
use crate::Aabb;

#[inline]
fn goes_left(object: &BuildObject, axis: usize, split_value: f32) -> bool {
    object.centroid(axis) <= split_value
}

/// Membership summary of a partitioned range.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Halves {
    pub left_count: usize,
    pub right_count: usize,
    pub left_bounds: Aabb,
    pub left_centroids: Aabb,
    pub right_bounds: Aabb,
    pub right_centroids: Aabb,
}

impl Default for Halves {
    fn default() -> Self {
        Self {
            left_count: 0,
            right_count: 0,
            left_bounds: Aabb::EMPTY,
            left_centroids: Aabb::EMPTY,
            right_bounds: Aabb::EMPTY,
            right_centroids: Aabb::EMPTY,
        }
    }
}

impl Halves {
    #[inline]
    fn add_left(&mut self, object: &BuildObject) {
        self.left_count += 1;
        self.left_bounds.grow_bb(&object.aabb);
        self.left_centroids.grow(object.aabb.center());
    }

    #[inline]
    fn add_right(&mut self, object: &BuildObject) {
        self.right_count += 1;
        self.right_bounds.grow_bb(&object.aabb);
        self.right_centroids.grow(object.aabb.center());
    }

    fn merge(mut self, other: &Halves) -> Halves {
        self.left_count += other.left_count;
        self.right_count += other.right_count;
        self.left_bounds.grow_bb(&other.left_bounds);
        self.left_centroids.grow_bb(&other.left_centroids);
        self.right_bounds.grow_bb(&other.right_bounds);
        self.right_centroids.grow_bb(&other.right_centroids);
        self
    }

    /// True when one side received every object.
    pub fn is_degenerate(&self) -> bool {
        self.left_count == 0 || self.right_count == 0
    }
}

pub(crate) fn count(objects: &[BuildObject], axis: usize, split_value: f32) -> Halves {
    let mut halves = Halves::default();
    for object in objects {
        if goes_left(object, axis, split_value) {
            halves.add_left(object);
        } else {
            halves.add_right(object);
        }
    }
    halves
}

/// Two pointer partition. Order within each half is not preserved.
pub(crate) fn partition_in_place(objects: &mut [BuildObject], axis: usize, split_value: f32) -> Halves {
    let mut halves = Halves::default();
    let mut i = 0;
    let mut j = objects.len();

    while i < j {
        if goes_left(&objects[i], axis, split_value) {
            halves.add_left(&objects[i]);
            i += 1;
        } else {
            j -= 1;
            objects.swap(i, j);
            halves.add_right(&objects[j]);
        }
    }

    halves
}

/// Stable copy of `src` into `left` and `right`, which must have exactly
/// the sizes of the two halves.
fn place(src: &[BuildObject], left: &mut [BuildObject], right: &mut [BuildObject], axis: usize, split_value: f32) {
    let mut l = 0;
    let mut r = 0;
    for object in src {
        if goes_left(object, axis, split_value) {
            left[l] = *object;
            l += 1;
        } else {
            right[r] = *object;
            r += 1;
        }
    }
    debug_assert_eq!(l, left.len());
    debug_assert_eq!(r, right.len());
}

/// Partitions the three per-axis arrays of a range from `src` into `dst`
/// with the same decision for every array, so all three keep describing
/// the same set of objects on each side. Each array stays sorted.
///
/// The left count is fixed by a counting pass over the decision axis
/// before anything is written.
pub(crate) fn mirrored_partition(
    src: [&[BuildObject]; 3],
    dst: [&mut [BuildObject]; 3],
    axis: usize,
    split_value: f32,
    pool: Option<&ThreadPool>,
) -> Halves {
    let halves = count(src[axis], axis, split_value);
    let left_count = halves.left_count;

    let pairs: Vec<(&[BuildObject], &mut [BuildObject])> = src.iter().copied().zip(dst).collect();
    let partition_one = |(src, dst): (&[BuildObject], &mut [BuildObject])| {
        let (left, right) = dst.split_at_mut(left_count);
        place(src, left, right, axis, split_value);
    };

    match pool {
        Some(pool) => pool.install(|| pairs.into_par_iter().for_each(partition_one)),
        None => pairs.into_iter().for_each(partition_one),
    }

    halves
}

/// Counting pass per sub-range, prefix sums for write offsets, then a
/// placement pass writing every sub-range into its share of `dst`.
pub(crate) fn parallel_partition_into(
    src: &[BuildObject],
    dst: &mut [BuildObject],
    axis: usize,
    split_value: f32,
    pool: &ThreadPool,
    num_tasks: usize,
) -> Halves {
    assert_eq!(src.len(), dst.len());
    let chunk_size = ((src.len() + num_tasks.max(1) - 1) / num_tasks.max(1)).max(1);

    let counts: Vec<Halves> = pool.install(|| {
        src.par_chunks(chunk_size)
            .map(|sub_range| count(sub_range, axis, split_value))
            .collect()
    });
    let halves = counts.iter().fold(Halves::default(), |acc, h| acc.merge(h));

    let (mut dst_left, mut dst_right) = dst.split_at_mut(halves.left_count);
    let mut jobs = Vec::with_capacity(counts.len());
    for (sub_range, h) in src.chunks(chunk_size).zip(counts.iter()) {
        let (left, rest) = std::mem::take(&mut dst_left).split_at_mut(h.left_count);
        dst_left = rest;
        let (right, rest) = std::mem::take(&mut dst_right).split_at_mut(h.right_count);
        dst_right = rest;
        jobs.push((sub_range, left, right));
    }

    pool.install(|| {
        jobs.into_par_iter()
            .for_each(|(sub_range, left, right)| place(sub_range, left, right, axis, split_value))
    });

    halves
}
