use bytemuck::{Pod, Zeroable};
use texgrid_common::GeometrySpec;

use crate::backend::{GpuBackend, Topology, VertexAttribute, VertexFormat, VertexLayout};
use crate::error::ResourceCreationError;

/// Position plus texture coordinate; 20 bytes, tightly packed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Input layout every shader program must be compiled against.
    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: std::mem::size_of::<Vertex>() as u64,
        attributes: &[
            VertexAttribute {
                semantic: "POSITION",
                format: VertexFormat::Float32x3,
                offset: 0,
                location: 0,
            },
            VertexAttribute {
                semantic: "TEXCOORD",
                format: VertexFormat::Float32x2,
                offset: 12,
                location: 1,
            },
        ],
    };

    pub const fn new(position: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            tex_coord,
        }
    }
}

/// Host-side vertex and index arrays. Immutable once generated.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBuffer {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl GeometryBuffer {
    pub fn generate(spec: &GeometrySpec) -> Result<Self, ResourceCreationError> {
        spec.validate()
            .map_err(|e| ResourceCreationError::new("geometry", e.to_string()))?;
        Ok(match *spec {
            GeometrySpec::Quad => Self::quad(),
            GeometrySpec::Grid { subdivisions } => Self::grid(subdivisions),
        })
    }

    /// Four corners at `(±1, ±1, 0)`, two triangles sharing the 0-2 diagonal.
    ///
    /// Both triangles are deliberately clockwise in xy, matching the grid
    /// cells and the pipeline's clockwise front face.
    pub fn quad() -> Self {
        #[rustfmt::skip]
        let vertices = vec![
            Vertex::new([-1.0, -1.0, 0.0], [0.0, 1.0]), // bottom left
            Vertex::new([-1.0,  1.0, 0.0], [0.0, 0.0]), // top left
            Vertex::new([ 1.0,  1.0, 0.0], [1.0, 0.0]), // top right
            Vertex::new([ 1.0, -1.0, 0.0], [1.0, 1.0]), // bottom right
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        Self { vertices, indices }
    }

    /// `(n + 1)^2` vertices at integer `(col, row, 0)`, row-major, with
    /// texture coordinates `(col / n, row / n)`; `6 * n^2` indices.
    ///
    /// Only reached through [`GeometryBuffer::generate`], which bounds `n` to
    /// `1..=MAX_GRID_SUBDIVISIONS`.
    fn grid(n: u32) -> Self {
        let per_row = n + 1;
        let mut vertices = Vec::with_capacity((per_row * per_row) as usize);
        for row in 0..per_row {
            for col in 0..per_row {
                vertices.push(Vertex::new(
                    [col as f32, row as f32, 0.0],
                    [col as f32 / n as f32, row as f32 / n as f32],
                ));
            }
        }

        let mut indices = Vec::with_capacity((n * n * 6) as usize);
        for row in 0..n {
            for col in 0..n {
                let top_left = row * per_row + col;
                let top_right = top_left + 1;
                let bottom_left = top_left + per_row;
                let bottom_right = bottom_left + 1;

                indices.extend_from_slice(&[
                    top_left,
                    bottom_left,
                    top_right,
                    top_right,
                    bottom_left,
                    bottom_right,
                ]);
            }
        }

        Self { vertices, indices }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Static vertex/index buffers on the GPU.
pub struct Mesh<B: GpuBackend> {
    vertex_buffer: B::Buffer,
    index_buffer: B::Buffer,
    vertex_count: u32,
    index_count: u32,
}

impl<B: GpuBackend> Mesh<B> {
    pub fn build(backend: &mut B, spec: &GeometrySpec) -> Result<Self, ResourceCreationError> {
        let geometry = GeometryBuffer::generate(spec)?;
        tracing::debug!(
            ?spec,
            vertices = geometry.vertex_count(),
            indices = geometry.index_count(),
            "geometry generated"
        );
        Self::from_geometry(backend, &geometry)
    }

    /// Upload once; the GPU copies are never rewritten.
    pub fn from_geometry(
        backend: &mut B,
        geometry: &GeometryBuffer,
    ) -> Result<Self, ResourceCreationError> {
        let vertex_buffer =
            backend.create_vertex_buffer("vertex buffer", bytemuck::cast_slice(geometry.vertices()))?;
        let index_buffer =
            backend.create_index_buffer("index buffer", bytemuck::cast_slice(geometry.indices()))?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: geometry.vertex_count(),
            index_count: geometry.index_count(),
        })
    }

    /// Put the buffers on the input assembler as a triangle list.
    pub fn bind(&self, backend: &mut B) {
        backend.set_vertex_buffer(&self.vertex_buffer, Vertex::LAYOUT.stride);
        backend.set_index_buffer(&self.index_buffer);
        backend.set_topology(Topology::TriangleList);
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}
