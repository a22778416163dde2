//! Vertex layouts shared with the shaders.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use cadence_core::Colour;
use glam::Vec2;

/// A vertex type that can feed a drawing pipeline.
pub trait Vertex: Pod {
    /// Single interleaved binding at slot 0.
    fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    fn attributes() -> Vec<vk::VertexInputAttributeDescription>;

    /// The same vertex moved by `offset`.
    #[must_use]
    fn translated(self, offset: Vec2) -> Self;
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription::default()
        .binding(0)
        .location(location)
        .format(format)
        .offset(offset as u32)
}

/// Flat-coloured vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshVertex {
    pub position: Vec2,
    pub colour: Colour,
}

impl MeshVertex {
    pub const fn new(position: Vec2, colour: Colour) -> Self {
        Self { position, colour }
    }
}

impl Vertex for MeshVertex {
    fn attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, colour)),
        ]
    }

    fn translated(self, offset: Vec2) -> Self {
        Self {
            position: self.position + offset,
            ..self
        }
    }
}

/// Vertex with texture coordinates. The sampled texel is multiplied by
/// `colour`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TexturedVertex {
    pub position: Vec2,
    pub uv: Vec2,
    pub colour: Colour,
}

impl TexturedVertex {
    pub const fn new(position: Vec2, uv: Vec2, colour: Colour) -> Self {
        Self {
            position,
            uv,
            colour,
        }
    }
}

impl Vertex for TexturedVertex {
    fn attributes() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
            attribute(2, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, colour)),
        ]
    }

    fn translated(self, offset: Vec2) -> Self {
        Self {
            position: self.position + offset,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_are_tightly_packed() {
        assert_eq!(size_of::<MeshVertex>(), 24);
        assert_eq!(size_of::<TexturedVertex>(), 32);
        assert_eq!(MeshVertex::binding().stride, 24);

        let offsets: Vec<u32> = TexturedVertex::attributes()
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 8, 16]);
    }

    #[test]
    fn translation_keeps_attributes() {
        let v = TexturedVertex::new(Vec2::new(1.0, 2.0), Vec2::new(0.5, 0.5), Colour::RED);
        let moved = v.translated(Vec2::new(10.0, -2.0));
        assert_eq!(moved.position, Vec2::new(11.0, 0.0));
        assert_eq!(moved.uv, v.uv);
        assert_eq!(moved.colour, v.colour);
    }
}
