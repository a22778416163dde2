//! Coordinate space uploaded to shaders at the start of every frame.

use crate::math::{camera_to_clip, pixel_to_clip};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};

/// Current camera/view mapping.
///
/// `world` maps world units to clip space, `screen` maps pixels to clip space.
/// The layout matches the `CoordinateSpace` uniform block in the shaders
/// (two column-major `mat4`, std140 compatible).
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CoordinateSpace {
    /// World-to-clip transform.
    pub world: Mat4,
    /// Pixel-to-clip transform.
    pub screen: Mat4,
}

impl Default for CoordinateSpace {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl CoordinateSpace {
    /// Both transforms are identity; vertices are already in clip space.
    pub const IDENTITY: Self = Self {
        world: Mat4::IDENTITY,
        screen: Mat4::IDENTITY,
    };

    /// Size in bytes of the uniform block.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Create a new coordinate space from explicit transforms.
    #[inline]
    pub const fn new(world: Mat4, screen: Mat4) -> Self {
        Self { world, screen }
    }

    /// Coordinate space for a drawable of the given size, with a camera
    /// looking at `center` where one world unit spans `zoom` pixels.
    pub fn for_extent(width: u32, height: u32, center: Vec2, zoom: f32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            world: camera_to_clip(w, h, center, zoom),
            screen: pixel_to_clip(w, h),
        }
    }

    /// Raw bytes as uploaded to the uniform buffer.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_size() {
        assert_eq!(CoordinateSpace::SIZE, 128);
        assert_eq!(CoordinateSpace::IDENTITY.as_bytes().len(), 128);
    }

    #[test]
    fn default_is_identity() {
        assert_eq!(CoordinateSpace::default(), CoordinateSpace::IDENTITY);
    }

    #[test]
    fn for_extent_fills_both_transforms() {
        let space = CoordinateSpace::for_extent(640, 480, Vec2::ZERO, 1.0);
        assert_ne!(space.world, Mat4::IDENTITY);
        assert_ne!(space.screen, Mat4::IDENTITY);
        assert_ne!(space.world, space.screen);
    }
}
