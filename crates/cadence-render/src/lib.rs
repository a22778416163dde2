//! Drawing pipelines for the Cadence renderer.
//!
//! This crate provides:
//! - Vertex layouts matching the shaders
//! - Draw batching with per-draw index offsets
//! - Per-frame-slot rotating geometry buffers
//! - Mesh, textured and sprite renderers behind [`DrawPipeline`]

pub mod batch;
pub mod mesh;
pub mod pipeline;
pub mod ring;
pub mod sprite;
pub mod textured;
pub mod vertex;

pub use batch::{Batch, IndexRange, TextureRange, TexturedBatch};
pub use cadence_shaders::Space;
pub use mesh::MeshRenderer;
pub use pipeline::{mesh_pipeline_config, textured_pipeline_config, DrawPipeline};
pub use ring::{FrameRing, GeometryRings};
pub use sprite::{Sprite, SpriteRenderer};
pub use textured::TexturedRenderer;
pub use vertex::{MeshVertex, TexturedVertex, Vertex};
