//! Transform helpers for 2D rendering.
//!
//! Vulkan clip space has `y` pointing down and `x`/`y` in `[-1, 1]`.

use glam::{Mat4, Vec2, Vec3};

/// Map pixel coordinates (origin top-left, `y` down) to clip space.
#[inline]
pub fn pixel_to_clip(width: f32, height: f32) -> Mat4 {
    let width = width.max(1.0);
    let height = height.max(1.0);
    Mat4::from_translation(Vec3::new(-1.0, -1.0, 0.0))
        * Mat4::from_scale(Vec3::new(2.0 / width, 2.0 / height, 1.0))
}

/// Map world units (`y` up) seen by a 2D camera to clip space.
///
/// `zoom` is the number of pixels covered by one world unit.
#[inline]
pub fn camera_to_clip(width: f32, height: f32, center: Vec2, zoom: f32) -> Mat4 {
    let width = width.max(1.0);
    let height = height.max(1.0);
    Mat4::from_scale(Vec3::new(2.0 * zoom / width, -2.0 * zoom / height, 1.0))
        * Mat4::from_translation(Vec3::new(-center.x, -center.y, 0.0))
}

/// Axis-aligned rectangle in 2D.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Rect {
    /// Unit rectangle `[0, 1]²`, the full texture in UV space.
    pub const UNIT: Self = Self {
        min: Vec2::ZERO,
        max: Vec2::ONE,
    };

    /// Create a new rect from min and max corners
    #[inline]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create a rect from its top-left corner and size
    #[inline]
    pub fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self {
            min: origin,
            max: origin + size,
        }
    }

    /// Size of the rect
    #[inline]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// The four corners in quad order: min, (max.x, min.y), max, (min.x, max.y).
    #[inline]
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pixel_corners_map_to_clip_corners() {
        let m = pixel_to_clip(800.0, 600.0);

        let top_left = m.transform_point3(Vec3::ZERO);
        assert_relative_eq!(top_left.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(top_left.y, -1.0, epsilon = 1e-6);

        let bottom_right = m.transform_point3(Vec3::new(800.0, 600.0, 0.0));
        assert_relative_eq!(bottom_right.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(bottom_right.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn camera_centre_maps_to_origin() {
        let center = Vec2::new(10.0, -4.0);
        let m = camera_to_clip(800.0, 600.0, center, 2.0);

        let p = m.transform_point3(center.extend(0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);

        // One world unit up lands above the centre (negative clip y).
        let up = m.transform_point3(Vec3::new(10.0, -3.0, 0.0));
        assert_relative_eq!(up.y, -2.0 * 2.0 / 600.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_extent_does_not_produce_nan() {
        let m = pixel_to_clip(0.0, 0.0);
        assert!(m.is_finite());
    }

    #[test]
    fn rect_corners() {
        let r = Rect::from_origin_size(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        assert_eq!(r.size(), Vec2::new(3.0, 4.0));
        let c = r.corners();
        assert_eq!(c[0], Vec2::new(1.0, 2.0));
        assert_eq!(c[1], Vec2::new(4.0, 2.0));
        assert_eq!(c[2], Vec2::new(4.0, 6.0));
        assert_eq!(c[3], Vec2::new(1.0, 6.0));
    }
}
