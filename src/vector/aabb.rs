use crate::real::Real;

use super::Vector;

/// An axis-aligned bounding box, represented as its `min` and `max`
/// corners. `V` is generic so the same type works for both [`super::Vec2`]
/// and [`super::Vec3`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb<V> {
    pub min: V,
    pub max: V,
}

impl<R: Real, V: Vector<R>> Aabb<V> {
    pub fn new(min: V, max: V) -> Self {
        Self { min, max }
    }

    pub fn extent(&self) -> V {
        self.max - self.min
    }

    pub fn center(&self) -> V {
        (self.min + self.max) * (R::ONE / (R::ONE + R::ONE))
    }

    /// Product of the extent's components: area in 2-D, volume in 3-D.
    pub fn volume(&self) -> R {
        self.extent().component_product()
    }

    /// Per-axis count of `spacing`-sized bins that tile this box, rounded
    /// down. Used to size the uniform neighbor grid and to tile a fluid
    /// volume with a regular lattice.
    pub fn bin_count_in_volume(&self, spacing: R) -> V {
        (self.extent() / spacing).floor()
    }

    pub fn contains(&self, point: &V) -> bool {
        point.clamp(&self.min, &self.max) == *point
    }

    pub fn clamp_point(&self, point: &V) -> V {
        point.clamp(&self.min, &self.max)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.min.componentwise_min(&other.min),
            self.max.componentwise_max(&other.max),
        )
    }

    /// Padded by one bin of `spacing` on every side, as required when
    /// building the uniform neighbor grid over the global boundary.
    pub fn padded(&self, spacing: R) -> Self {
        Self::new(self.min - V::splat(spacing), self.max + V::splat(spacing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Vec2;

    #[test]
    fn volume_is_area_in_2d() {
        let aabb = Aabb::new(Vec2::new(0.0_f64, 0.0), Vec2::new(2.0, 3.0));
        assert_eq!(aabb.volume(), 6.0);
    }

    #[test]
    fn bin_count_rounds_down() {
        let aabb = Aabb::new(Vec2::new(0.0_f64, 0.0), Vec2::new(2.5, 4.9));
        let counts = aabb.bin_count_in_volume(1.0);
        assert_eq!(counts, Vec2::new(2.0, 4.0));
    }
}
