//! Shaders for the Cadence drawing pipelines.
//!
//! GLSL sources live in `shaders/` and are compiled to SPIR-V by the build
//! script. Vertex shaders come in two flavours: one transforms positions by
//! the world matrix of the coordinate-space block, the other by the screen
//! matrix.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    pub static MESH_WORLD_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh_world_vert.spv"));
    pub static MESH_SCREEN_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh_screen_vert.spv"));
    pub static MESH_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh_frag.spv"));
    pub static TEXTURED_WORLD_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/textured_world_vert.spv"));
    pub static TEXTURED_SCREEN_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/textured_screen_vert.spv"));
    pub static TEXTURED_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/textured_frag.spv"));
}

/// Which matrix of the coordinate-space block a vertex shader applies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Space {
    /// Camera-relative world coordinates.
    #[default]
    World,
    /// Window pixels, origin top-left.
    Screen,
}

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be 4-byte aligned"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

macro_rules! shader {
    ($(#[$meta:meta])* $name:ident, $bytes:path) => {
        $(#[$meta])*
        pub fn $name() -> &'static [u32] {
            static WORDS: OnceLock<Vec<u32>> = OnceLock::new();
            WORDS.get_or_init(|| bytes_to_spirv($bytes))
        }
    };
}

shader!(
    /// Flat-coloured mesh vertex shader, world space.
    mesh_world_vert, spirv_bytes::MESH_WORLD_VERT
);
shader!(
    /// Flat-coloured mesh vertex shader, screen space.
    mesh_screen_vert, spirv_bytes::MESH_SCREEN_VERT
);
shader!(
    /// Flat-coloured mesh fragment shader.
    mesh_frag, spirv_bytes::MESH_FRAG
);
shader!(
    /// Textured vertex shader, world space.
    textured_world_vert, spirv_bytes::TEXTURED_WORLD_VERT
);
shader!(
    /// Textured vertex shader, screen space.
    textured_screen_vert, spirv_bytes::TEXTURED_SCREEN_VERT
);
shader!(
    /// Textured fragment shader (texture colour times vertex colour).
    textured_frag, spirv_bytes::TEXTURED_FRAG
);

/// Mesh vertex shader for the given space.
pub fn mesh_vert(space: Space) -> &'static [u32] {
    match space {
        Space::World => mesh_world_vert(),
        Space::Screen => mesh_screen_vert(),
    }
}

/// Textured vertex shader for the given space.
pub fn textured_vert(space: Space) -> &'static [u32] {
    match space {
        Space::World => textured_world_vert(),
        Space::Screen => textured_screen_vert(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn all_shaders_load() {
        for shader in [
            mesh_world_vert(),
            mesh_screen_vert(),
            mesh_frag(),
            textured_world_vert(),
            textured_screen_vert(),
            textured_frag(),
        ] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 5, "Shader too small");
        }
    }

    #[test]
    fn space_variants_differ() {
        assert_ne!(mesh_vert(Space::World), mesh_vert(Space::Screen));
        assert_ne!(textured_vert(Space::World), textured_vert(Space::Screen));
    }
}
