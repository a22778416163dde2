//! CPU-side accumulation of draws into shared vertex and index lists.

use ash::vk;
use glam::Vec2;

use crate::vertex::Vertex;

/// Vertices and indices collected during one frame.
///
/// Indices passed to [`Batch::draw`] are local to the vertices of that call
/// and are offset by the number of vertices already in the batch, so every
/// draw of a frame shares one vertex and one index buffer.
#[derive(Clone, Debug)]
pub struct Batch<V> {
    vertices: Vec<V>,
    indices: Vec<u32>,
}

impl<V> Default for Batch<V> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }
}

impl<V: Vertex> Batch<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a draw. Returns the index range it occupies, or `None` if
    /// either list was empty and nothing was added.
    pub fn draw(&mut self, vertices: &[V], indices: &[u32]) -> Option<IndexRange> {
        self.draw_iter(vertices.iter().copied(), indices)
    }

    /// Append a draw with every vertex moved by `offset`.
    pub fn draw_offset(&mut self, vertices: &[V], indices: &[u32], offset: Vec2) -> Option<IndexRange> {
        self.draw_iter(vertices.iter().map(|v| v.translated(offset)), indices)
    }

    /// Append a draw whose vertices are produced on the fly.
    pub fn draw_iter<I>(&mut self, vertices: I, indices: &[u32]) -> Option<IndexRange>
    where
        I: IntoIterator<Item = V>,
        I::IntoIter: ExactSizeIterator,
    {
        let vertices = vertices.into_iter();
        let vertex_count = vertices.len();
        if vertex_count == 0 || indices.is_empty() {
            return None;
        }
        debug_assert!(
            indices.iter().all(|&i| (i as usize) < vertex_count),
            "index out of range for a draw of {vertex_count} vertices"
        );

        let base = self.vertices.len() as u32;
        let first_index = self.indices.len() as u32;
        self.vertices.extend(vertices);
        self.indices.extend(indices.iter().map(|&i| i + base));

        Some(IndexRange {
            first_index,
            index_count: indices.len() as u32,
        })
    }
}

impl<V> Batch<V> {
    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Empty both lists, keeping their capacity for the next frame.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }
}

/// A span of the index list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexRange {
    pub first_index: u32,
    pub index_count: u32,
}

/// Indices drawn with one texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRange {
    /// Set-1 descriptor of the texture.
    pub texture: vk::DescriptorSet,
    pub range: IndexRange,
}

/// A [`Batch`] that also records which texture each draw samples.
///
/// Consecutive draws with the same texture merge into one range, so the
/// number of draw calls equals the number of texture switches.
#[derive(Clone, Debug)]
pub struct TexturedBatch<V> {
    batch: Batch<V>,
    ranges: Vec<TextureRange>,
}

impl<V> Default for TexturedBatch<V> {
    fn default() -> Self {
        Self {
            batch: Batch::default(),
            ranges: Vec::new(),
        }
    }
}

impl<V: Vertex> TexturedBatch<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, texture: vk::DescriptorSet, vertices: &[V], indices: &[u32]) {
        if let Some(range) = self.batch.draw(vertices, indices) {
            self.record(texture, range);
        }
    }

    pub fn draw_offset(
        &mut self,
        texture: vk::DescriptorSet,
        vertices: &[V],
        indices: &[u32],
        offset: Vec2,
    ) {
        if let Some(range) = self.batch.draw_offset(vertices, indices, offset) {
            self.record(texture, range);
        }
    }

    pub fn draw_iter<I>(&mut self, texture: vk::DescriptorSet, vertices: I, indices: &[u32])
    where
        I: IntoIterator<Item = V>,
        I::IntoIter: ExactSizeIterator,
    {
        if let Some(range) = self.batch.draw_iter(vertices, indices) {
            self.record(texture, range);
        }
    }

    fn record(&mut self, texture: vk::DescriptorSet, range: IndexRange) {
        match self.ranges.last_mut() {
            Some(last) if last.texture == texture => last.range.index_count += range.index_count,
            _ => self.ranges.push(TextureRange { texture, range }),
        }
    }
}

impl<V> TexturedBatch<V> {
    pub fn batch(&self) -> &Batch<V> {
        &self.batch
    }

    pub fn ranges(&self) -> &[TextureRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn clear(&mut self) {
        self.batch.clear();
        self.ranges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::MeshVertex;
    use ash::vk::Handle;
    use cadence_core::Colour;

    fn verts(n: usize) -> Vec<MeshVertex> {
        (0..n)
            .map(|i| MeshVertex::new(Vec2::new(i as f32, 0.0), Colour::WHITE))
            .collect()
    }

    #[test]
    fn indices_are_offset_by_previous_vertices() {
        let mut batch = Batch::new();
        let a = batch.draw(&verts(3), &[0, 1, 2]).unwrap();
        let b = batch.draw(&verts(4), &[0, 1, 2, 2, 3, 0]).unwrap();

        assert_eq!(batch.indices(), &[0, 1, 2, 3, 4, 5, 5, 6, 3]);
        assert_eq!(batch.vertices().len(), 7);
        assert_eq!(a, IndexRange { first_index: 0, index_count: 3 });
        assert_eq!(b, IndexRange { first_index: 3, index_count: 6 });
    }

    #[test]
    fn empty_draws_change_nothing() {
        let mut batch: Batch<MeshVertex> = Batch::new();
        assert!(batch.draw(&[], &[]).is_none());
        assert!(batch.draw(&verts(3), &[]).is_none());
        assert!(batch.draw(&[], &[0]).is_none());
        assert!(batch.is_empty());
        assert!(batch.vertices().is_empty());

        batch.draw(&verts(1), &[0]);
        let before = (batch.vertices().to_vec(), batch.indices().to_vec());
        batch.draw(&[], &[]);
        assert_eq!((batch.vertices().to_vec(), batch.indices().to_vec()), before);
    }

    #[test]
    fn offset_moves_positions() {
        let mut batch = Batch::new();
        batch.draw_offset(&verts(2), &[0, 1, 0], Vec2::new(5.0, 1.0));
        let xs: Vec<Vec2> = batch.vertices().iter().map(|v| v.position).collect();
        assert_eq!(xs, vec![Vec2::new(5.0, 1.0), Vec2::new(6.0, 1.0)]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut batch = Batch::new();
        batch.draw(&verts(64), &[0; 96]);
        let capacity = batch.indices.capacity();
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.indices.capacity(), capacity);
    }

    #[test]
    fn consecutive_draws_with_one_texture_merge() {
        let a = vk::DescriptorSet::from_raw(1);
        let b = vk::DescriptorSet::from_raw(2);
        let mut batch = TexturedBatch::new();

        batch.draw(a, &verts(3), &[0, 1, 2]);
        batch.draw(a, &verts(3), &[0, 1, 2]);
        batch.draw(b, &verts(3), &[0, 1, 2]);
        batch.draw(b, &[], &[]);
        batch.draw(a, &verts(3), &[0, 1, 2]);

        let ranges: Vec<(vk::DescriptorSet, u32, u32)> = batch
            .ranges()
            .iter()
            .map(|r| (r.texture, r.range.first_index, r.range.index_count))
            .collect();
        assert_eq!(ranges, vec![(a, 0, 6), (b, 6, 3), (a, 9, 3)]);

        batch.clear();
        assert!(batch.ranges().is_empty());
        assert!(batch.is_empty());
    }
}
