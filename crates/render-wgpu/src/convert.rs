//! Translation from backend-agnostic descriptors to wgpu types.

use texgrid_render::{
    AddressMode, BindingSlot, FilterMode, SamplerDesc, Topology, VertexFormat, VertexLayout,
};

/// Every render target is paired with this depth format.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

pub fn topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
    }
}

pub fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
    }
}

pub fn vertex_attributes(layout: &VertexLayout) -> Vec<wgpu::VertexAttribute> {
    layout
        .attributes
        .iter()
        .map(|attr| wgpu::VertexAttribute {
            format: vertex_format(attr.format),
            offset: attr.offset,
            shader_location: attr.location,
        })
        .collect()
}

/// One layout entry per slot; the binding number is the slot's position.
pub fn layout_entries(bindings: &[BindingSlot]) -> Vec<wgpu::BindGroupLayoutEntry> {
    bindings
        .iter()
        .enumerate()
        .map(|(binding, slot)| {
            let (visibility, ty) = match slot {
                BindingSlot::ConstantBuffer => (
                    wgpu::ShaderStages::VERTEX,
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                ),
                BindingSlot::Texture => (
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                ),
                BindingSlot::Sampler => (
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                ),
            };
            wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility,
                ty,
                count: None,
            }
        })
        .collect()
}

pub fn sampler_descriptor<'a>(label: &'a str, desc: &SamplerDesc) -> wgpu::SamplerDescriptor<'a> {
    let filter = match desc.filter {
        FilterMode::Point => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    };
    let address = match desc.address {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
    };
    wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: filter,
        compare: None,
        ..Default::default()
    }
}

pub fn clear_color(color: [f32; 4]) -> wgpu::Color {
    let [r, g, b, a] = color.map(f64::from);
    wgpu::Color { r, g, b, a }
}

/// Prefer an sRGB surface format, otherwise take the first offered.
pub fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|f| f.is_srgb())
        .or_else(|| formats.first())
        .copied()
}
