use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use texgrid_common::DisplayConfig;
use texgrid_render::{
    BindingSlot, DeviceError, GpuBackend, ImageData, PipelineDesc, ResourceCreationError,
    SamplerDesc, ShaderStage, Topology,
};
use wgpu::util::DeviceExt;

use crate::convert;

/// Vertex, index or constant buffer.
#[derive(Debug, Clone)]
pub struct GpuBuffer(Arc<wgpu::Buffer>);

/// One compiled WGSL stage and the function it starts at.
#[derive(Debug)]
pub struct GpuShader {
    module: wgpu::ShaderModule,
    stage: ShaderStage,
    entry_point: String,
}

#[derive(Debug)]
struct PipelineState {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bindings: Vec<BindingSlot>,
    stride: u64,
    topology: Topology,
}

#[derive(Debug, Clone)]
pub struct GpuPipeline(Arc<PipelineState>);

#[derive(Debug, Clone)]
pub struct GpuSampler(Arc<wgpu::Sampler>);

#[derive(Debug)]
struct TextureState {
    view: wgpu::TextureView,
    _texture: wgpu::Texture,
}

#[derive(Debug, Clone)]
pub struct GpuTexture(Arc<TextureState>);

#[derive(Debug, Clone)]
enum Bound {
    Buffer(Arc<wgpu::Buffer>),
    Texture(Arc<TextureState>),
    Sampler(Arc<wgpu::Sampler>),
}

/// Immediate-context state set between `begin_scene` and each draw.
#[derive(Debug, Default)]
struct BoundState {
    vertex: Option<(Arc<wgpu::Buffer>, u64)>,
    index: Option<Arc<wgpu::Buffer>>,
    topology: Topology,
    pipeline: Option<Arc<PipelineState>>,
    slots: BTreeMap<u32, Bound>,
}

/// Back buffer acquired by `begin_scene`, presented by `end_scene`.
struct FrameInFlight {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

/// Draws dropped since the last `end_scene`, which reports them.
#[derive(Debug, Default)]
struct SkippedDraws {
    count: u32,
    first: Option<String>,
}

impl SkippedDraws {
    fn skip(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "draw skipped");
        self.count += 1;
        self.first.get_or_insert(reason);
    }

    fn finish(&mut self) -> Result<(), DeviceError> {
        let skipped = std::mem::take(self);
        match skipped.first {
            Some(reason) => Err(DeviceError::DrawSkipped {
                count: skipped.count,
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// [`GpuBackend`] on wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth: wgpu::TextureView,
    adapter: wgpu::AdapterInfo,
    bound: BoundState,
    frame: Option<FrameInFlight>,
    skipped: SkippedDraws,
}

impl WgpuBackend {
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        scoped(&self.device, f)
    }

    fn bind_group(&self, pipeline: &PipelineState) -> Result<wgpu::BindGroup, String> {
        let mut entries = Vec::with_capacity(pipeline.bindings.len());
        for (binding, slot) in pipeline.bindings.iter().enumerate() {
            let binding = binding as u32;
            let resource = match (slot, self.bound.slots.get(&binding)) {
                (BindingSlot::ConstantBuffer, Some(Bound::Buffer(buffer))) => {
                    buffer.as_entire_binding()
                }
                (BindingSlot::Texture, Some(Bound::Texture(texture))) => {
                    wgpu::BindingResource::TextureView(&texture.view)
                }
                (BindingSlot::Sampler, Some(Bound::Sampler(sampler))) => {
                    wgpu::BindingResource::Sampler(sampler)
                }
                (slot, bound) => {
                    return Err(format!(
                        "binding {binding} expects {slot:?}, found {}",
                        bound.map_or("nothing", Bound::kind)
                    ));
                }
            };
            entries.push(wgpu::BindGroupEntry { binding, resource });
        }
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw bind group"),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        }))
    }

    fn acquire(&mut self) -> Result<wgpu::SurfaceTexture, DeviceError> {
        match self.surface.get_current_texture() {
            Ok(output) => Ok(output),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!("surface lost or outdated; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|e| DeviceError::Acquire(e.to_string()))
            }
            Err(e) => Err(DeviceError::Acquire(e.to_string())),
        }
    }
}

impl Bound {
    fn kind(&self) -> &'static str {
        match self {
            Bound::Buffer(_) => "a buffer",
            Bound::Texture(_) => "a texture",
            Bound::Sampler(_) => "a sampler",
        }
    }
}

fn scoped<T>(device: &wgpu::Device, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f(device);
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(err) => Err(err.to_string()),
        None => Ok(value),
    }
}

fn create_depth_buffer(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth buffer"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: convert::DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl GpuBackend for WgpuBackend {
    type Surface = wgpu::SurfaceTarget<'static>;
    type Buffer = GpuBuffer;
    type Shader = GpuShader;
    type Pipeline = GpuPipeline;
    type Sampler = GpuSampler;
    type TextureView = GpuTexture;

    fn create(target: Self::Surface, display: &DisplayConfig) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(target)
            .map_err(|e| DeviceError::Surface(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(DeviceError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("texgrid device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| DeviceError::Device(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|err: wgpu::Error| {
            tracing::error!(%err, "uncaptured wgpu error");
        }));

        let caps = surface.get_capabilities(&adapter);
        let format = convert::pick_surface_format(&caps.formats)
            .ok_or_else(|| DeviceError::Surface("surface offers no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: display.width,
            height: display.height,
            present_mode: convert::present_mode(display.vsync),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        scoped(&device, |device| surface.configure(device, &config))
            .map_err(DeviceError::Surface)?;

        let depth = scoped(&device, |device| {
            create_depth_buffer(device, display.width, display.height)
        })
        .map_err(DeviceError::DepthBuffer)?;

        let info = adapter.get_info();
        tracing::info!(
            adapter = %info.name,
            backend = info.backend.to_str(),
            ?format,
            present_mode = ?config.present_mode,
            "GPU initialized"
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            depth,
            adapter: info,
            bound: BoundState::default(),
            frame: None,
            skipped: SkippedDraws::default(),
        })
    }

    fn describe(&self) -> String {
        format!(
            "{} ({}, {:?})",
            self.adapter.name,
            self.adapter.backend.to_str(),
            self.adapter.device_type
        )
    }

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        contents: &[u8],
    ) -> Result<GpuBuffer, ResourceCreationError> {
        let buffer = self
            .scoped(|device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage: wgpu::BufferUsages::VERTEX,
                })
            })
            .map_err(|reason| ResourceCreationError::new(label, reason))?;
        Ok(GpuBuffer(Arc::new(buffer)))
    }

    fn create_index_buffer(
        &mut self,
        label: &str,
        contents: &[u8],
    ) -> Result<GpuBuffer, ResourceCreationError> {
        let buffer = self
            .scoped(|device| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage: wgpu::BufferUsages::INDEX,
                })
            })
            .map_err(|reason| ResourceCreationError::new(label, reason))?;
        Ok(GpuBuffer(Arc::new(buffer)))
    }

    fn create_constant_buffer(
        &mut self,
        label: &str,
        size: u64,
    ) -> Result<GpuBuffer, ResourceCreationError> {
        let buffer = self
            .scoped(|device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .map_err(|reason| ResourceCreationError::new(label, reason))?;
        Ok(GpuBuffer(Arc::new(buffer)))
    }

    fn compile_shader(
        &mut self,
        label: &str,
        stage: ShaderStage,
        source: &str,
        entry_point: &str,
    ) -> Result<GpuShader, String> {
        let module = self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })?;
        Ok(GpuShader {
            module,
            stage,
            entry_point: entry_point.to_string(),
        })
    }

    fn create_pipeline(
        &mut self,
        desc: &PipelineDesc<'_, Self>,
    ) -> Result<GpuPipeline, ResourceCreationError> {
        if desc.vertex.stage != ShaderStage::Vertex || desc.pixel.stage != ShaderStage::Pixel {
            return Err(ResourceCreationError::new(desc.label, "shader stages are swapped"));
        }

        let layout_entries = convert::layout_entries(desc.bindings);
        let attributes = convert::vertex_attributes(desc.layout);
        let format = self.config.format;

        let (pipeline, bind_group_layout) = self
            .scoped(|device| {
                let bind_group_layout =
                    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(desc.label),
                        entries: &layout_entries,
                    });
                let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(desc.label),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });
                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(desc.label),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &desc.vertex.module,
                        entry_point: Some(desc.vertex.entry_point.as_str()),
                        compilation_options: Default::default(),
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: desc.layout.stride,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &attributes,
                        }],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &desc.pixel.module,
                        entry_point: Some(desc.pixel.entry_point.as_str()),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: convert::topology(desc.topology),
                        front_face: wgpu::FrontFace::Cw,
                        cull_mode: Some(wgpu::Face::Back),
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: convert::DEPTH_FORMAT,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                    multisample: Default::default(),
                    multiview: None,
                    cache: None,
                });
                (pipeline, bind_group_layout)
            })
            .map_err(|reason| ResourceCreationError::new(desc.label, reason))?;

        tracing::debug!(label = desc.label, bindings = ?desc.bindings, "pipeline created");
        Ok(GpuPipeline(Arc::new(PipelineState {
            pipeline,
            bind_group_layout,
            bindings: desc.bindings.to_vec(),
            stride: desc.layout.stride,
            topology: desc.topology,
        })))
    }

    fn create_sampler(
        &mut self,
        label: &str,
        desc: &SamplerDesc,
    ) -> Result<GpuSampler, ResourceCreationError> {
        let sampler = self
            .scoped(|device| device.create_sampler(&convert::sampler_descriptor(label, desc)))
            .map_err(|reason| ResourceCreationError::new(label, reason))?;
        Ok(GpuSampler(Arc::new(sampler)))
    }

    fn create_texture(
        &mut self,
        label: &str,
        image: &ImageData,
    ) -> Result<GpuTexture, ResourceCreationError> {
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let queue = &self.queue;
        let texture = self
            .scoped(|device| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8UnormSrgb,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    &image.rgba,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * image.width),
                        rows_per_image: Some(image.height),
                    },
                    size,
                );
                texture
            })
            .map_err(|reason| ResourceCreationError::new(label, reason))?;

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture(Arc::new(TextureState {
            view,
            _texture: texture,
        })))
    }

    fn begin_scene(&mut self, color: [f32; 4]) -> Result<(), DeviceError> {
        if self.frame.take().is_some() {
            tracing::warn!("begin_scene called twice; discarding the unfinished frame");
        }

        let output = self.acquire()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene encoder"),
            });

        // Clear color and depth; draws load what this pass stores.
        let clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(convert::clear_color(color)),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        drop(clear);

        self.frame = Some(FrameInFlight {
            output,
            view,
            encoder,
        });
        Ok(())
    }

    fn end_scene(&mut self) -> Result<(), DeviceError> {
        let frame = self.frame.take().ok_or(DeviceError::NoScene("end_scene"))?;
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.output.present();
        self.bound.slots.clear();
        self.skipped.finish()
    }

    fn set_vertex_buffer(&mut self, buffer: &GpuBuffer, stride: u64) {
        self.bound.vertex = Some((buffer.0.clone(), stride));
    }

    fn set_index_buffer(&mut self, buffer: &GpuBuffer) {
        self.bound.index = Some(buffer.0.clone());
    }

    fn set_topology(&mut self, topology: Topology) {
        self.bound.topology = topology;
    }

    fn set_pipeline(&mut self, pipeline: &GpuPipeline) {
        self.bound.pipeline = Some(pipeline.0.clone());
    }

    fn write_buffer(
        &mut self,
        buffer: &GpuBuffer,
        contents: &[u8],
    ) -> Result<(), ResourceCreationError> {
        let size = NonZeroU64::new(contents.len() as u64)
            .ok_or_else(|| ResourceCreationError::new("buffer mapping", "nothing to write"))?;
        let mut mapped = self
            .queue
            .write_buffer_with(&buffer.0, 0, size)
            .ok_or_else(|| ResourceCreationError::new("buffer mapping", "map for write failed"))?;
        mapped.copy_from_slice(contents);
        Ok(())
    }

    fn bind_buffer(&mut self, binding: u32, buffer: &GpuBuffer) {
        self.bound.slots.insert(binding, Bound::Buffer(buffer.0.clone()));
    }

    fn bind_texture(&mut self, binding: u32, view: &GpuTexture) {
        self.bound.slots.insert(binding, Bound::Texture(view.0.clone()));
    }

    fn bind_sampler(&mut self, binding: u32, sampler: &GpuSampler) {
        self.bound.slots.insert(binding, Bound::Sampler(sampler.0.clone()));
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        let (Some(pipeline), Some((vertex, stride)), Some(index)) = (
            self.bound.pipeline.clone(),
            self.bound.vertex.clone(),
            self.bound.index.clone(),
        ) else {
            self.skipped.skip("pipeline, vertex or index buffer not set");
            return;
        };
        if stride != pipeline.stride || self.bound.topology != pipeline.topology {
            self.skipped.skip(format!(
                "input state (stride {stride}, {:?}) does not match the pipeline (stride {}, {:?})",
                self.bound.topology, pipeline.stride, pipeline.topology
            ));
            return;
        }
        let bind_group = match self.bind_group(&pipeline) {
            Ok(group) => group,
            Err(reason) => {
                self.skipped.skip(reason);
                return;
            }
        };
        let Some(frame) = self.frame.as_mut() else {
            self.skipped.skip("no scene in progress");
            return;
        };

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("draw pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, vertex.slice(..));
        pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(first_index..first_index + index_count, base_vertex, 0..1);
    }
}
