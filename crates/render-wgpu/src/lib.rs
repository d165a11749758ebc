//! wgpu backend for the texgrid pipeline.
//!
//! Emulates an immediate context on top of wgpu: `begin_scene` acquires the
//! back buffer and clears it, each indexed draw records its own render pass
//! with a bind group built from the currently bound slots, and `end_scene`
//! submits and presents.
//!
//! # Invariants
//! - Geometry is wound clockwise; back faces are culled.
//! - Every pipeline renders into the surface format plus a `Depth32Float` depth buffer.
//! - Resource creation runs inside error scopes, so validation failures are returned, not panicked.

mod convert;
mod gpu;

pub use convert::{DEPTH_FORMAT, present_mode};
pub use gpu::{GpuBuffer, GpuPipeline, GpuSampler, GpuShader, GpuTexture, WgpuBackend};

pub fn crate_info() -> &'static str {
    "texgrid-render-wgpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use texgrid_render::{MatrixBuffer, ShaderSource, Vertex};

    fn shader_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/shaders")
    }

    fn parse(path: &Path) -> naga::Module {
        let source = std::fs::read_to_string(path).unwrap();
        let module = naga::front::wgsl::parse_str(&source)
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e.emit_to_string(&source)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap_or_else(|e| panic!("{}: {e:?}", path.display()));
        module
    }

    fn bindings(module: &naga::Module) -> Vec<u32> {
        let mut slots: Vec<u32> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| var.binding.as_ref())
            .map(|b| {
                assert_eq!(b.group, 0);
                b.binding
            })
            .collect();
        slots.sort_unstable();
        slots
    }

    fn has_entry(module: &naga::Module, name: &str, stage: naga::ShaderStage) -> bool {
        module
            .entry_points
            .iter()
            .any(|ep| ep.name == name && ep.stage == stage)
    }

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("wgpu"));
    }

    #[test]
    fn shipped_shaders_validate() {
        for kind in ["color", "texture"] {
            let source = ShaderSource::new(
                shader_dir().join(format!("{kind}.vert.wgsl")),
                shader_dir().join(format!("{kind}.frag.wgsl")),
            );
            let vertex = parse(&source.vertex_path);
            let pixel = parse(&source.pixel_path);
            assert!(has_entry(&vertex, &source.vertex_entry, naga::ShaderStage::Vertex));
            assert!(has_entry(&pixel, &source.pixel_entry, naga::ShaderStage::Fragment));
        }
    }

    #[test]
    fn texture_program_binds_all_three_slots() {
        let vertex = parse(&shader_dir().join("texture.vert.wgsl"));
        let pixel = parse(&shader_dir().join("texture.frag.wgsl"));
        assert_eq!(bindings(&vertex), vec![0]);
        assert_eq!(bindings(&pixel), vec![1, 2]);

        let color = parse(&shader_dir().join("color.frag.wgsl"));
        assert!(bindings(&color).is_empty());
    }

    #[test]
    fn vertex_inputs_match_layout() {
        let module = parse(&shader_dir().join("texture.vert.wgsl"));
        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.name == "vs_main")
            .unwrap();
        let input = &entry.function.arguments[0];
        let naga::TypeInner::Struct { members, .. } = &module.types[input.ty].inner else {
            panic!("vertex input is not a struct");
        };
        let locations: Vec<u32> = members
            .iter()
            .filter_map(|m| match &m.binding {
                Some(naga::Binding::Location { location, .. }) => Some(*location),
                _ => None,
            })
            .collect();
        let expected: Vec<u32> = Vertex::LAYOUT.attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, expected);
    }

    #[test]
    fn uniform_block_matches_matrix_buffer() {
        let module = parse(&shader_dir().join("texture.vert.wgsl"));
        let (_, uniform) = module
            .global_variables
            .iter()
            .find(|(_, var)| var.space == naga::AddressSpace::Uniform)
            .unwrap();
        let size = module.types[uniform.ty].inner.size(module.to_ctx());
        assert_eq!(size as usize, std::mem::size_of::<MatrixBuffer>());
    }
}
