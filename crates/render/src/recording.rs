//! Software backend that records every context command instead of drawing.
//!
//! Buffer memory lives on the host so tests and the headless CLI can read back
//! exactly what would have reached the GPU. Faults can be injected per
//! resource kind through [`FaultPlan`].
//!
//! The log keeps the frame in progress (or the last presented one) plus any
//! calls made since. Earlier frames are dropped at `begin_scene` and only
//! survive as the running totals in [`RecordingBackend::stats`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use texgrid_common::DisplayConfig;

use crate::backend::{
    BindingSlot, GpuBackend, PipelineDesc, SamplerDesc, ShaderStage, Topology,
};
use crate::error::{DeviceError, ResourceCreationError};
use crate::texture::ImageData;

pub type ResourceId = u32;

/// One recorded context call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginScene { color: [f32; 4] },
    EndScene,
    SetVertexBuffer { buffer: ResourceId, stride: u64 },
    SetIndexBuffer { buffer: ResourceId },
    SetTopology(Topology),
    SetPipeline { pipeline: ResourceId },
    WriteBuffer { buffer: ResourceId, contents: Vec<u8> },
    BindBuffer { binding: u32, buffer: ResourceId },
    BindTexture { binding: u32, texture: ResourceId },
    BindSampler { binding: u32, sampler: ResourceId },
    DrawIndexed { index_count: u32, first_index: u32, base_vertex: i32 },
}

/// Totals over every frame the backend has seen, including dropped ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub commands: u64,
    pub draws: u64,
    pub indices: u64,
}

/// Which native calls should fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    pub device: bool,
    pub buffers: bool,
    pub pipelines: bool,
    pub samplers: bool,
    pub textures: bool,
    /// Constant-buffer map failures.
    pub buffer_writes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    Shader,
    Pipeline,
    Sampler,
    Texture,
}

#[derive(Debug, Default)]
struct Store {
    live: BTreeMap<ResourceId, ResourceKind>,
    memory: BTreeMap<ResourceId, Vec<u8>>,
}

/// Shared view of the backend's live resources; survives the backend itself.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker(Rc<RefCell<Store>>);

impl ResourceTracker {
    pub fn live_count(&self) -> usize {
        self.0.borrow().live.len()
    }

    pub fn live_of(&self, kind: ResourceKind) -> usize {
        self.0.borrow().live.values().filter(|k| **k == kind).count()
    }

    /// Current host copy of a buffer, if it is still alive.
    pub fn contents(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.0.borrow().memory.get(&id).cloned()
    }
}

/// Releases its resource from the tracker exactly once, on drop.
#[derive(Debug)]
struct Lease {
    id: ResourceId,
    store: ResourceTracker,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut store = self.store.0.borrow_mut();
        store.live.remove(&self.id);
        store.memory.remove(&self.id);
    }
}

#[derive(Debug)]
pub struct SoftBuffer {
    lease: Lease,
    pub kind: ResourceKind,
    pub size: u64,
}

impl SoftBuffer {
    pub fn id(&self) -> ResourceId {
        self.lease.id
    }
}

#[derive(Debug)]
pub struct SoftShader {
    _lease: Lease,
    pub stage: ShaderStage,
    pub entry_point: String,
}

#[derive(Debug)]
pub struct SoftPipeline {
    lease: Lease,
    pub stride: u64,
    pub bindings: Vec<BindingSlot>,
    pub topology: Topology,
}

impl SoftPipeline {
    pub fn id(&self) -> ResourceId {
        self.lease.id
    }
}

#[derive(Debug)]
pub struct SoftSampler {
    lease: Lease,
    pub desc: SamplerDesc,
}

impl SoftSampler {
    pub fn id(&self) -> ResourceId {
        self.lease.id
    }
}

#[derive(Debug)]
pub struct SoftTexture {
    lease: Lease,
    pub width: u32,
    pub height: u32,
}

impl SoftTexture {
    pub fn id(&self) -> ResourceId {
        self.lease.id
    }
}

/// Recording implementation of [`GpuBackend`].
#[derive(Debug)]
pub struct RecordingBackend {
    display: DisplayConfig,
    faults: FaultPlan,
    store: ResourceTracker,
    next_id: ResourceId,
    commands: Vec<Command>,
    /// Log position just past the last `EndScene`.
    frame_start: usize,
    stats: RecordStats,
    in_scene: bool,
    frames_presented: u64,
}

impl RecordingBackend {
    pub fn faults(&self) -> FaultPlan {
        self.faults
    }

    /// Change which calls fail from now on.
    pub fn set_faults(&mut self, faults: FaultPlan) {
        self.faults = faults;
    }

    pub fn tracker(&self) -> ResourceTracker {
        self.store.clone()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        self.frame_start = 0;
        std::mem::take(&mut self.commands)
    }

    pub fn stats(&self) -> RecordStats {
        self.stats
    }

    /// `(index_count, first_index, base_vertex)` of every draw still in the log.
    pub fn draws(&self) -> Vec<(u32, u32, i32)> {
        self.commands
            .iter()
            .filter_map(|c| match *c {
                Command::DrawIndexed {
                    index_count,
                    first_index,
                    base_vertex,
                } => Some((index_count, first_index, base_vertex)),
                _ => None,
            })
            .collect()
    }

    /// Host copy of a buffer's current contents.
    pub fn buffer_contents(&self, buffer: &SoftBuffer) -> Option<Vec<u8>> {
        self.store.contents(buffer.id())
    }

    /// Bytes of the most recent write to `buffer` in the command log.
    pub fn last_write(&self, buffer: ResourceId) -> Option<&[u8]> {
        self.commands.iter().rev().find_map(|c| match c {
            Command::WriteBuffer { buffer: id, contents } if *id == buffer => {
                Some(contents.as_slice())
            }
            _ => None,
        })
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn in_scene(&self) -> bool {
        self.in_scene
    }

    fn lease(&mut self, kind: ResourceKind, memory: Option<Vec<u8>>) -> Lease {
        self.next_id += 1;
        let id = self.next_id;
        {
            let mut store = self.store.0.borrow_mut();
            store.live.insert(id, kind);
            if let Some(bytes) = memory {
                store.memory.insert(id, bytes);
            }
        }
        Lease {
            id,
            store: self.store.clone(),
        }
    }

    fn buffer(
        &mut self,
        label: &str,
        kind: ResourceKind,
        contents: Vec<u8>,
    ) -> Result<SoftBuffer, ResourceCreationError> {
        if self.faults.buffers {
            return Err(ResourceCreationError::new(label, "injected buffer fault"));
        }
        let size = contents.len() as u64;
        let lease = self.lease(kind, Some(contents));
        tracing::trace!(label, id = lease.id, size, "soft buffer created");
        Ok(SoftBuffer { lease, kind, size })
    }

    fn record(&mut self, command: Command) {
        if !self.in_scene && !matches!(command, Command::BeginScene { .. }) {
            tracing::trace!(?command, "recorded outside of a scene");
        }
        self.stats.commands += 1;
        if let Command::DrawIndexed { index_count, .. } = command {
            self.stats.draws += 1;
            self.stats.indices += u64::from(index_count);
        }
        self.commands.push(command);
    }
}

/// True when `source` contains `fn <name>` followed by an argument list.
fn declares_fn(source: &str, name: &str) -> bool {
    let needle = format!("fn {name}");
    source.match_indices(&needle).any(|(at, _)| {
        source[at + needle.len()..].trim_start().starts_with('(')
    })
}

impl GpuBackend for RecordingBackend {
    type Surface = FaultPlan;
    type Buffer = SoftBuffer;
    type Shader = SoftShader;
    type Pipeline = SoftPipeline;
    type Sampler = SoftSampler;
    type TextureView = SoftTexture;

    fn create(faults: FaultPlan, display: &DisplayConfig) -> Result<Self, DeviceError> {
        if faults.device {
            return Err(DeviceError::Device("injected device fault".into()));
        }
        Ok(Self {
            display: display.clone(),
            faults,
            store: ResourceTracker::default(),
            next_id: 0,
            commands: Vec::new(),
            frame_start: 0,
            stats: RecordStats::default(),
            in_scene: false,
            frames_presented: 0,
        })
    }

    fn describe(&self) -> String {
        format!(
            "software recording backend ({}x{})",
            self.display.width, self.display.height
        )
    }

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        contents: &[u8],
    ) -> Result<SoftBuffer, ResourceCreationError> {
        self.buffer(label, ResourceKind::VertexBuffer, contents.to_vec())
    }

    fn create_index_buffer(
        &mut self,
        label: &str,
        contents: &[u8],
    ) -> Result<SoftBuffer, ResourceCreationError> {
        if contents.len() % 4 != 0 {
            return Err(ResourceCreationError::new(
                label,
                format!("{} bytes is not a whole number of u32 indices", contents.len()),
            ));
        }
        self.buffer(label, ResourceKind::IndexBuffer, contents.to_vec())
    }

    fn create_constant_buffer(
        &mut self,
        label: &str,
        size: u64,
    ) -> Result<SoftBuffer, ResourceCreationError> {
        if size == 0 || size % 16 != 0 {
            return Err(ResourceCreationError::new(
                label,
                format!("constant buffer size {size} must be a non-zero multiple of 16"),
            ));
        }
        self.buffer(label, ResourceKind::ConstantBuffer, vec![0; size as usize])
    }

    fn compile_shader(
        &mut self,
        label: &str,
        stage: ShaderStage,
        source: &str,
        entry_point: &str,
    ) -> Result<SoftShader, String> {
        let attribute = match stage {
            ShaderStage::Vertex => "@vertex",
            ShaderStage::Pixel => "@fragment",
        };
        if source.trim().is_empty() {
            return Err(format!("{label}: source is empty"));
        }
        if !source.contains(attribute) {
            return Err(format!("{label}: no {attribute} function declared"));
        }
        if !declares_fn(source, entry_point) {
            return Err(format!("{label}: entry point `{entry_point}` not found"));
        }
        Ok(SoftShader {
            _lease: self.lease(ResourceKind::Shader, None),
            stage,
            entry_point: entry_point.to_string(),
        })
    }

    fn create_pipeline(
        &mut self,
        desc: &PipelineDesc<'_, Self>,
    ) -> Result<SoftPipeline, ResourceCreationError> {
        if self.faults.pipelines {
            return Err(ResourceCreationError::new(desc.label, "injected layout fault"));
        }
        if desc.vertex.stage != ShaderStage::Vertex || desc.pixel.stage != ShaderStage::Pixel {
            return Err(ResourceCreationError::new(desc.label, "shader stages are swapped"));
        }
        if let Some(attr) = desc
            .layout
            .attributes
            .iter()
            .find(|a| a.offset + a.format.size() > desc.layout.stride)
        {
            return Err(ResourceCreationError::new(
                desc.label,
                format!("attribute {} overruns the {}-byte stride", attr.semantic, desc.layout.stride),
            ));
        }
        Ok(SoftPipeline {
            lease: self.lease(ResourceKind::Pipeline, None),
            stride: desc.layout.stride,
            bindings: desc.bindings.to_vec(),
            topology: desc.topology,
        })
    }

    fn create_sampler(
        &mut self,
        label: &str,
        desc: &SamplerDesc,
    ) -> Result<SoftSampler, ResourceCreationError> {
        if self.faults.samplers {
            return Err(ResourceCreationError::new(label, "injected sampler fault"));
        }
        Ok(SoftSampler {
            lease: self.lease(ResourceKind::Sampler, None),
            desc: *desc,
        })
    }

    fn create_texture(
        &mut self,
        label: &str,
        image: &ImageData,
    ) -> Result<SoftTexture, ResourceCreationError> {
        if self.faults.textures {
            return Err(ResourceCreationError::new(label, "injected texture fault"));
        }
        Ok(SoftTexture {
            lease: self.lease(ResourceKind::Texture, Some(image.rgba.clone())),
            width: image.width,
            height: image.height,
        })
    }

    fn begin_scene(&mut self, color: [f32; 4]) -> Result<(), DeviceError> {
        if self.in_scene {
            tracing::warn!("begin_scene called twice without end_scene");
        }
        self.in_scene = true;
        self.commands.drain(..self.frame_start);
        self.frame_start = 0;
        self.record(Command::BeginScene { color });
        Ok(())
    }

    fn end_scene(&mut self) -> Result<(), DeviceError> {
        if !self.in_scene {
            return Err(DeviceError::NoScene("end_scene"));
        }
        self.record(Command::EndScene);
        self.frame_start = self.commands.len();
        self.in_scene = false;
        self.frames_presented += 1;
        Ok(())
    }

    fn set_vertex_buffer(&mut self, buffer: &SoftBuffer, stride: u64) {
        self.record(Command::SetVertexBuffer {
            buffer: buffer.id(),
            stride,
        });
    }

    fn set_index_buffer(&mut self, buffer: &SoftBuffer) {
        self.record(Command::SetIndexBuffer { buffer: buffer.id() });
    }

    fn set_topology(&mut self, topology: Topology) {
        self.record(Command::SetTopology(topology));
    }

    fn set_pipeline(&mut self, pipeline: &SoftPipeline) {
        self.record(Command::SetPipeline {
            pipeline: pipeline.id(),
        });
    }

    fn write_buffer(
        &mut self,
        buffer: &SoftBuffer,
        contents: &[u8],
    ) -> Result<(), ResourceCreationError> {
        if self.faults.buffer_writes {
            return Err(ResourceCreationError::new("buffer mapping", "injected map fault"));
        }
        if buffer.kind != ResourceKind::ConstantBuffer {
            return Err(ResourceCreationError::new(
                "buffer mapping",
                "only constant buffers are CPU-writable",
            ));
        }
        if contents.len() as u64 > buffer.size {
            return Err(ResourceCreationError::new(
                "buffer mapping",
                format!("{} bytes exceed the {}-byte buffer", contents.len(), buffer.size),
            ));
        }
        if let Some(memory) = self.store.0.borrow_mut().memory.get_mut(&buffer.id()) {
            memory[..contents.len()].copy_from_slice(contents);
        }
        self.record(Command::WriteBuffer {
            buffer: buffer.id(),
            contents: contents.to_vec(),
        });
        Ok(())
    }

    fn bind_buffer(&mut self, binding: u32, buffer: &SoftBuffer) {
        self.record(Command::BindBuffer {
            binding,
            buffer: buffer.id(),
        });
    }

    fn bind_texture(&mut self, binding: u32, view: &SoftTexture) {
        self.record(Command::BindTexture {
            binding,
            texture: view.id(),
        });
    }

    fn bind_sampler(&mut self, binding: u32, sampler: &SoftSampler) {
        self.record(Command::BindSampler {
            binding,
            sampler: sampler.id(),
        });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.record(Command::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RecordingBackend {
        RecordingBackend::create(FaultPlan::default(), &DisplayConfig::default()).unwrap()
    }

    #[test]
    fn device_fault_fails_creation() {
        let faults = FaultPlan {
            device: true,
            ..FaultPlan::default()
        };
        let err = RecordingBackend::create(faults, &DisplayConfig::default()).unwrap_err();
        assert!(matches!(err, DeviceError::Device(_)));
    }

    #[test]
    fn constant_buffer_round_trip() {
        let mut b = backend();
        let buf = b.create_constant_buffer("cb", 32).unwrap();
        b.write_buffer(&buf, &[7u8; 16]).unwrap();
        let contents = b.buffer_contents(&buf).unwrap();
        assert_eq!(&contents[..16], &[7u8; 16]);
        assert_eq!(&contents[16..], &[0u8; 16]);
        assert_eq!(b.last_write(buf.id()), Some(&[7u8; 16][..]));
    }

    #[test]
    fn static_buffers_reject_writes() {
        let mut b = backend();
        let buf = b.create_vertex_buffer("vb", &[0u8; 20]).unwrap();
        assert!(b.write_buffer(&buf, &[1u8; 4]).is_err());
    }

    #[test]
    fn oversized_write_fails() {
        let mut b = backend();
        let buf = b.create_constant_buffer("cb", 16).unwrap();
        assert!(b.write_buffer(&buf, &[0u8; 32]).is_err());
    }

    #[test]
    fn handles_release_on_drop() {
        let mut b = backend();
        let tracker = b.tracker();
        let vb = b.create_vertex_buffer("vb", &[0u8; 8]).unwrap();
        let ib = b.create_index_buffer("ib", &[0u8; 12]).unwrap();
        assert_eq!(tracker.live_count(), 2);
        drop(vb);
        assert_eq!(tracker.live_count(), 1);
        assert_eq!(tracker.live_of(ResourceKind::IndexBuffer), 1);
        drop(ib);
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn compiler_reports_missing_entry_point() {
        let mut b = backend();
        let src = "@vertex\nfn main_vs() -> @builtin(position) vec4<f32> { return vec4<f32>(); }";
        let err = b
            .compile_shader("vs", ShaderStage::Vertex, src, "vs_main")
            .unwrap_err();
        assert!(err.contains("`vs_main` not found"));
        assert!(b.compile_shader("vs", ShaderStage::Vertex, src, "main_vs").is_ok());
    }

    #[test]
    fn compiler_checks_stage_attribute() {
        let mut b = backend();
        let src = "@vertex fn fs_main () {}";
        let err = b
            .compile_shader("fs", ShaderStage::Pixel, src, "fs_main")
            .unwrap_err();
        assert!(err.contains("@fragment"));
    }

    #[test]
    fn log_keeps_only_the_latest_frame() {
        let mut b = backend();
        let cb = b.create_constant_buffer("cb", 16).unwrap();
        for _ in 0..1000 {
            b.begin_scene([0.0, 0.0, 0.0, 1.0]).unwrap();
            b.write_buffer(&cb, &[1u8; 16]).unwrap();
            b.draw_indexed(6, 0, 0);
            b.end_scene().unwrap();
        }
        assert_eq!(b.commands().len(), 4);
        assert_eq!(b.draws(), vec![(6, 0, 0)]);
        assert_eq!(b.frames_presented(), 1000);
        assert_eq!(
            b.stats(),
            RecordStats {
                commands: 4000,
                draws: 1000,
                indices: 6000,
            }
        );
    }

    #[test]
    fn calls_between_frames_carry_into_the_next() {
        let mut b = backend();
        b.begin_scene([0.0, 0.0, 0.0, 1.0]).unwrap();
        b.end_scene().unwrap();
        b.set_topology(Topology::TriangleList);
        b.begin_scene([1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(
            b.commands(),
            &[
                Command::SetTopology(Topology::TriangleList),
                Command::BeginScene {
                    color: [1.0, 0.0, 0.0, 1.0]
                },
            ]
        );
    }

    #[test]
    fn end_without_begin_is_an_error() {
        let mut b = backend();
        assert!(matches!(b.end_scene(), Err(DeviceError::NoScene(_))));
        b.begin_scene([0.0, 0.0, 0.0, 1.0]).unwrap();
        b.end_scene().unwrap();
        assert_eq!(b.frames_presented(), 1);
        assert_eq!(
            b.commands(),
            &[
                Command::BeginScene {
                    color: [0.0, 0.0, 0.0, 1.0]
                },
                Command::EndScene
            ]
        );
    }
}
