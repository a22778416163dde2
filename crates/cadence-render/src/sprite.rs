//! Sprite renderer: textured quads from rectangles.

use ash::vk;
use cadence_core::math::Rect;
use cadence_core::Colour;
use cadence_frame::{FrameDevice, RenderParameters};
use cadence_gpu::{GraphicsPipeline, Result};
use cadence_shaders::Space;

use crate::pipeline::DrawPipeline;
use crate::textured::TexturedRenderer;
use crate::vertex::TexturedVertex;

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// One sprite draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sprite {
    /// Where the sprite lands, in the renderer's space.
    pub rect: Rect,
    /// Part of the texture to show.
    pub uv: Rect,
    pub colour: Colour,
}

impl Sprite {
    /// The whole texture, untinted.
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            uv: Rect::UNIT,
            colour: Colour::WHITE,
        }
    }

    #[must_use]
    pub fn with_uv(mut self, uv: Rect) -> Self {
        self.uv = uv;
        self
    }

    #[must_use]
    pub fn with_colour(mut self, colour: Colour) -> Self {
        self.colour = colour;
        self
    }

    /// Corner vertices in quad order.
    pub fn vertices(&self) -> [TexturedVertex; 4] {
        let positions = self.rect.corners();
        let uvs = self.uv.corners();
        std::array::from_fn(|i| TexturedVertex::new(positions[i], uvs[i], self.colour))
    }
}

/// Textured quads on top of [`TexturedRenderer`].
pub struct SpriteRenderer<D: FrameDevice> {
    inner: TexturedRenderer<D>,
}

impl<D: FrameDevice> SpriteRenderer<D> {
    pub fn new(device: &D, space: Space) -> Result<Self> {
        Ok(Self {
            inner: TexturedRenderer::new(device, space)?,
        })
    }

    pub fn draw(&mut self, texture: vk::DescriptorSet, sprite: &Sprite) {
        self.inner.draw_iter(texture, sprite.vertices(), &QUAD_INDICES);
    }

    /// Draw many sprites sharing one texture.
    pub fn draw_all<'a>(&mut self, texture: vk::DescriptorSet, sprites: impl IntoIterator<Item = &'a Sprite>) {
        for sprite in sprites {
            self.draw(texture, sprite);
        }
    }

    pub fn textured(&self) -> &TexturedRenderer<D> {
        &self.inner
    }
}

impl<D: FrameDevice> DrawPipeline<D> for SpriteRenderer<D> {
    fn pipeline(&self) -> &GraphicsPipeline {
        self.inner.pipeline()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn bind(
        &mut self,
        device: &D,
        frame_index: usize,
        command_buffer: vk::CommandBuffer,
    ) -> Result<bool> {
        self.inner.bind(device, frame_index, command_buffer)
    }

    fn render(&mut self, params: &RenderParameters<'_, D>) -> Result<()> {
        self.inner.render(params)
    }

    fn destroy(&mut self, device: &D) -> Result<()> {
        self.inner.destroy(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use cadence_frame::testing::SimDevice;
    use glam::Vec2;

    #[test]
    fn sprite_corners_follow_rect_and_uv() {
        let sprite = Sprite::new(Rect::from_origin_size(Vec2::new(10.0, 20.0), Vec2::new(32.0, 16.0)))
            .with_uv(Rect::new(Vec2::new(0.5, 0.0), Vec2::new(1.0, 0.5)))
            .with_colour(Colour::RED);
        let [a, b, c, d] = sprite.vertices();

        assert_eq!(a.position, Vec2::new(10.0, 20.0));
        assert_eq!(b.position, Vec2::new(42.0, 20.0));
        assert_eq!(c.position, Vec2::new(42.0, 36.0));
        assert_eq!(d.position, Vec2::new(10.0, 36.0));
        assert_eq!(a.uv, Vec2::new(0.5, 0.0));
        assert_eq!(c.uv, Vec2::new(1.0, 0.5));
        assert!([a, b, c, d].iter().all(|v| v.colour == Colour::RED));
    }

    #[test]
    fn sprites_share_batch_indices() {
        let sim = SimDevice::new();
        let mut sprites = SpriteRenderer::new(&sim, Space::Screen).unwrap();
        let texture = vk::DescriptorSet::from_raw(7);
        let quad = Sprite::new(Rect::UNIT);

        sprites.draw_all(texture, &[quad, quad]);
        let batch = sprites.textured().batch();
        assert_eq!(batch.batch().indices(), &[0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]);
        assert_eq!(batch.ranges().len(), 1);

        sprites.destroy(&sim).unwrap();
    }
}
