use std::ops::Range;

use crate::error::try_vec;
use crate::{Aabb, Result};

/// An input box paired with its position in the caller's array.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct BuildObject {
    pub aabb: Aabb,
    pub index: u32,
}

impl BuildObject {
    #[inline]
    pub fn centroid(&self, axis: usize) -> f32 {
        self.aabb.centroid(axis)
    }
}

/// Which of the two ping-pong buffers currently holds a range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Owned buffer that hands out views of disjoint ranges to several tasks at
/// once. Callers guarantee that no two live views of the same range exist
/// while one of them is mutable.
pub(crate) struct SharedSlice<T> {
    ptr: *mut T,
    len: usize,
}

unsafe impl<T: Send> Send for SharedSlice<T> {}
unsafe impl<T: Send> Sync for SharedSlice<T> {}

impl<T> SharedSlice<T> {
    pub fn new(v: Vec<T>) -> Self {
        let boxed = v.into_boxed_slice();
        let len = boxed.len();
        let ptr = Box::into_raw(boxed) as *mut T;
        Self { ptr, len }
    }

    /// # Safety
    /// No mutable view overlapping `range` may be alive.
    pub unsafe fn range(&self, range: Range<usize>) -> &[T] {
        assert!(
            range.start <= range.end && range.end <= self.len,
            "Range was out of bounds, range: {:?}, len: {}",
            range,
            self.len
        );
        std::slice::from_raw_parts(self.ptr.add(range.start), range.end - range.start)
    }

    /// # Safety
    /// No other view overlapping `range` may be alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn range_mut(&self, range: Range<usize>) -> &mut [T] {
        assert!(
            range.start <= range.end && range.end <= self.len,
            "Range was out of bounds, range: {:?}, len: {}",
            range,
            self.len
        );
        std::slice::from_raw_parts_mut(self.ptr.add(range.start), range.end - range.start)
    }
}

impl<T> Drop for SharedSlice<T> {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr, self.len,
            )));
        }
    }
}

/// The object arrays of a build: one array per sorted axis for the exact
/// strategy, a single array for binning, each with an optional second
/// buffer that partitions write into.
pub(crate) struct ObjectBuffers {
    a: Vec<SharedSlice<BuildObject>>,
    b: Vec<SharedSlice<BuildObject>>,
}

impl ObjectBuffers {
    pub fn new(arrays: Vec<Vec<BuildObject>>, second_buffer: bool) -> Result<Self> {
        let len = arrays.first().map(|a| a.len()).unwrap_or(0);
        assert!(arrays.iter().all(|a| a.len() == len));

        let mut b = Vec::new();
        if second_buffer {
            for array in arrays.iter() {
                let mut copy = try_vec(len, "partition buffer")?;
                copy.extend_from_slice(array);
                b.push(SharedSlice::new(copy));
            }
        }

        Ok(Self {
            a: arrays.into_iter().map(SharedSlice::new).collect(),
            b,
        })
    }

    pub fn has_second_buffer(&self) -> bool {
        !self.b.is_empty()
    }

    fn side(&self, side: Side) -> &[SharedSlice<BuildObject>] {
        match side {
            Side::A => &self.a,
            Side::B => {
                assert!(self.has_second_buffer(), "second buffer was not allocated");
                &self.b
            }
        }
    }

    /// # Safety
    /// The calling task must own `range`.
    pub unsafe fn get(&self, side: Side, array: usize, range: Range<usize>) -> &[BuildObject] {
        self.side(side)[array].range(range)
    }

    /// # Safety
    /// The calling task must own `range` and hold no other view of it on
    /// the same side and array.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(
        &self,
        side: Side,
        array: usize,
        range: Range<usize>,
    ) -> &mut [BuildObject] {
        self.side(side)[array].range_mut(range)
    }

    /// Makes buffer A hold the final order of a finished leaf range.
    ///
    /// # Safety
    /// The calling task must own `range`.
    pub unsafe fn settle(&self, side: Side, range: Range<usize>) {
        if side == Side::B {
            let src = self.b[0].range(range.clone());
            self.a[0].range_mut(range).copy_from_slice(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(n: usize) -> Vec<BuildObject> {
        (0..n)
            .map(|i| BuildObject {
                aabb: Aabb {
                    min: [i as f32; 3],
                    max: [i as f32 + 1.0; 3],
                },
                index: i as u32,
            })
            .collect()
    }

    #[test]
    fn disjoint_ranges() {
        let buffers = ObjectBuffers::new(vec![objects(8)], true).unwrap();
        unsafe {
            let left = buffers.get_mut(Side::B, 0, 0..4);
            let right = buffers.get_mut(Side::B, 0, 4..8);
            left.reverse();
            right[0].index = 42;

            buffers.settle(Side::B, 0..8);
            let a: Vec<u32> = buffers.get(Side::A, 0, 0..8).iter().map(|o| o.index).collect();
            assert_eq!(a, vec![3, 2, 1, 0, 42, 5, 6, 7]);
        }
    }

    #[test]
    fn settle_on_a_is_noop() {
        let buffers = ObjectBuffers::new(vec![objects(4)], false).unwrap();
        unsafe {
            buffers.settle(Side::A, 0..4);
            assert_eq!(buffers.get(Side::A, 0, 1..2)[0].index, 1);
        }
        assert!(!buffers.has_second_buffer());
    }
}
