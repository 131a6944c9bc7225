use glam::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Display for Aabb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let min = Vec3::from(self.min);
        let max = Vec3::from(self.max);

        write!(
            f,
            "(min: ({}, {}, {}),  max: ({}, {}, {}))",
            min.x, min.y, min.z, max.x, max.y, max.z,
        )
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// Identity of [`Aabb::union_of`]: lower bounds above upper bounds.
    pub const EMPTY: Aabb = Aabb {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    pub fn new() -> Aabb {
        Self::EMPTY
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Aabb {
        Aabb {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn grow(&mut self, pos: Vec3) {
        let (min, max) = self.points();

        self.min = min.min(pos).into();
        self.max = max.max(pos).into();
    }

    pub fn grow_bb(&mut self, aabb: &Aabb) {
        let (min, max) = self.points();
        let (b_min, b_max) = aabb.points();
        self.min = min.min(b_min).into();
        self.max = max.max(b_max).into();
    }

    pub fn union_of(&self, bb: &Self) -> Self {
        let (min, max) = self.points();
        let (b_min, b_max) = bb.points();
        Self {
            min: min.min(b_min).into(),
            max: max.max(b_max).into(),
        }
    }

    /// Whether `other` lies entirely inside this box. An empty box is
    /// contained in everything.
    pub fn contains(&self, other: &Aabb) -> bool {
        if other.is_empty() {
            return true;
        }
        (0..3).all(|i| self.min[i] <= other.min[i] && other.max[i] <= self.max[i])
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        let p: [f32; 3] = p.into();
        (0..3).all(|i| self.min[i] <= p[i] && p[i] <= self.max[i])
    }

    pub fn center(&self) -> Vec3 {
        let (min, max) = self.points();
        (min + max) * 0.5
    }

    /// Centroid coordinate along a single axis.
    #[inline]
    pub fn centroid(&self, axis: usize) -> f32 {
        (self.min[axis] + self.max[axis]) * 0.5
    }

    /// Half of the surface area, the quantity the SAH sweeps accumulate.
    pub fn half_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }

        let e = self.lengths();
        let value: f32 = e.x * e.y + e.x * e.z + e.y * e.z;

        0.0_f32.max(value)
    }

    pub fn surface_area(&self) -> f32 {
        2.0 * self.half_area()
    }

    pub fn lengths(&self) -> Vec3 {
        Vec3::from(self.max) - Vec3::from(self.min)
    }

    pub fn longest_axis(&self) -> usize {
        let mut a: usize = 0;
        if self.extend(1) > self.extend(0) {
            a = 1;
        }
        if self.extend(2) > self.extend(a) {
            a = 2
        }
        a
    }

    pub fn extend(&self, axis: usize) -> f32 {
        self.max[axis] - self.min[axis]
    }

    pub fn points(&self) -> (Vec3, Vec3) {
        (self.min.into(), self.max.into())
    }
}

impl From<(Vec3, Vec3)> for Aabb {
    fn from(v: (Vec3, Vec3)) -> Self {
        Aabb {
            min: v.0.into(),
            max: v.1.into(),
        }
    }
}

impl From<Aabb> for (Vec3, Vec3) {
    fn from(bb: Aabb) -> Self {
        bb.points()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_at(x: f32) -> Aabb {
        Aabb::from_min_max(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn empty_is_union_identity() {
        let bb = unit_at(2.0);
        assert!(Aabb::EMPTY.is_empty());
        assert_eq!(Aabb::EMPTY.union_of(&bb), bb);
        assert_eq!(bb.union_of(&Aabb::EMPTY), bb);
        assert_eq!(Aabb::EMPTY.half_area(), 0.0);
    }

    #[test]
    fn areas() {
        let bb = Aabb::from_min_max(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bb.half_area(), 2.0 + 3.0 + 6.0);
        assert_eq!(bb.surface_area(), 22.0);

        let flat = Aabb::from_min_max(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(flat.half_area(), 1.0);
    }

    #[test]
    fn containment() {
        let a = unit_at(0.0);
        let b = unit_at(3.0);
        let u = a.union_of(&b);

        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert!(!a.contains(&b));
        assert!(a.contains(&Aabb::EMPTY));
        assert!(u.contains_point(Vec3::new(2.0, 0.5, 0.5)));
        assert!(!a.contains_point(Vec3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn grow_and_axes() {
        let mut bb = Aabb::new();
        bb.grow(Vec3::new(-1.0, 0.0, 0.0));
        bb.grow(Vec3::new(4.0, 1.0, 2.0));

        assert_eq!(bb.min, [-1.0, 0.0, 0.0]);
        assert_eq!(bb.max, [4.0, 1.0, 2.0]);
        assert_eq!(bb.longest_axis(), 0);
        assert_eq!(bb.centroid(0), 1.5);
        assert_eq!(bb.center(), Vec3::new(1.5, 0.5, 1.0));
    }
}
