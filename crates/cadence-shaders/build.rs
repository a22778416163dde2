//! Build script to compile GLSL shaders to SPIR-V.

use naga::back::spv;
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use std::env;
use std::fs;
use std::path::Path;

/// (source file, output name, stage, defines)
const SHADERS: &[(&str, &str, ShaderStage, &[&str])] = &[
    ("mesh.vert", "mesh_world_vert", ShaderStage::Vertex, &[]),
    ("mesh.vert", "mesh_screen_vert", ShaderStage::Vertex, &["SCREEN_SPACE"]),
    ("mesh.frag", "mesh_frag", ShaderStage::Fragment, &[]),
    ("textured.vert", "textured_world_vert", ShaderStage::Vertex, &[]),
    ("textured.vert", "textured_screen_vert", ShaderStage::Vertex, &["SCREEN_SPACE"]),
    ("textured.frag", "textured_frag", ShaderStage::Fragment, &[]),
];

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let shader_dir = Path::new("shaders");

    // Rerun if shaders change
    println!("cargo:rerun-if-changed=shaders/");

    for &(source, output, stage, defines) in SHADERS {
        compile_shader(
            &shader_dir.join(source),
            &Path::new(&out_dir).join(format!("{output}.spv")),
            stage,
            defines,
        );
    }
}

fn compile_shader(input: &Path, output: &Path, stage: ShaderStage, defines: &[&str]) {
    let source = fs::read_to_string(input)
        .unwrap_or_else(|e| panic!("Failed to read shader {input:?}: {e}"));

    let mut options = Options::from(stage);
    for &define in defines {
        options.defines.insert(define.to_string(), "1".to_string());
    }

    let module = Frontend::default()
        .parse(&options, &source)
        .unwrap_or_else(|e| panic!("Failed to parse shader {input:?}: {e:?}"));

    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .unwrap_or_else(|e| panic!("Shader {input:?} failed validation: {e:?}"));

    // Clip space is authored for Vulkan directly; no Y flip
    let mut spv_options = spv::Options::default();
    spv_options
        .flags
        .remove(spv::WriterFlags::ADJUST_COORDINATE_SPACE);

    let words = spv::write_vec(&module, &info, &spv_options, None)
        .unwrap_or_else(|e| panic!("Failed to emit SPIR-V for {input:?}: {e}"));

    fs::write(output, bytemuck::cast_slice::<u32, u8>(&words))
        .unwrap_or_else(|e| panic!("Failed to write shader {output:?}: {e}"));
}
