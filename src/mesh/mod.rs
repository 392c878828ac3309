//! Mesh data for imported body and wing models
//!
//! The asset importer hands over plain arrays; this module validates them into
//! single-owner vertex/index buffers. A mesh carries a state marker (`Raw` or
//! `Calibrated`) so the wing correction can only ever be applied once.

mod transform;

pub use transform::ModelTransform;

use bytemuck::{Pod, Zeroable};
use std::marker::PhantomData;

/// Vertex layout shared with the GPU
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Position in model units (inches)
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// Tangent (zero when the asset has no texture coordinates)
    pub tangent: [f32; 3],
    /// Bitangent (zero when the asset has no texture coordinates)
    pub bitangent: [f32; 3],
}

impl MeshVertex {
    /// Size of vertex in bytes
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Vertex buffer layout for wgpu
    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // normal
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // uv
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // tangent
                wgpu::VertexAttribute {
                    offset: 32,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // bitangent
                wgpu::VertexAttribute {
                    offset: 44,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Marker: geometry exactly as imported
#[derive(Debug, Clone, Copy)]
pub struct Raw;

/// Marker: geometry corrected by the wing calibration
#[derive(Debug, Clone, Copy)]
pub struct Calibrated;

/// Errors for imported mesh arrays that cannot form a mesh
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("mesh '{name}' has no vertices")]
    Empty { name: String },
    #[error("mesh '{name}': {attribute} has {actual} entries, expected {expected}")]
    AttributeLength {
        name: String,
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("mesh '{name}': index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        name: String,
        index: u32,
        vertex_count: usize,
    },
    #[error("mesh '{name}': {index_count} indices do not form whole triangles")]
    NotTriangulated { name: String, index_count: usize },
}

/// Arrays delivered by the external scene importer for one mesh
#[derive(Debug, Clone, Default)]
pub struct MeshArrays {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub tangents: Option<Vec<[f32; 3]>>,
    pub bitangents: Option<Vec<[f32; 3]>>,
    /// Triangle list indices
    pub indices: Vec<u32>,
    /// Material diffuse color (linear RGB, 0..1)
    pub diffuse: [f32; 3],
}

/// Triangle mesh with a per-mesh diffuse color
#[derive(Debug, Clone)]
pub struct Mesh<S = Raw> {
    name: String,
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    diffuse: [f32; 3],
    state: PhantomData<S>,
}

fn check_len<T>(
    name: &str,
    attribute: &'static str,
    values: &Option<Vec<T>>,
    expected: usize,
) -> Result<(), MeshError> {
    match values {
        Some(v) if v.len() != expected => Err(MeshError::AttributeLength {
            name: name.to_string(),
            attribute,
            expected,
            actual: v.len(),
        }),
        _ => Ok(()),
    }
}

impl Mesh<Raw> {
    /// Validate imported arrays into a raw mesh.
    ///
    /// Missing optional attributes are zero-filled.
    pub fn from_arrays(arrays: MeshArrays) -> Result<Self, MeshError> {
        let MeshArrays {
            name,
            positions,
            normals,
            uvs,
            tangents,
            bitangents,
            indices,
            diffuse,
        } = arrays;

        let count = positions.len();
        if count == 0 {
            return Err(MeshError::Empty { name });
        }
        check_len(&name, "normals", &normals, count)?;
        check_len(&name, "uvs", &uvs, count)?;
        check_len(&name, "tangents", &tangents, count)?;
        check_len(&name, "bitangents", &bitangents, count)?;

        if indices.len() % 3 != 0 {
            return Err(MeshError::NotTriangulated {
                name,
                index_count: indices.len(),
            });
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= count) {
            return Err(MeshError::IndexOutOfRange {
                name,
                index,
                vertex_count: count,
            });
        }

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| MeshVertex {
                position,
                normal: normals.as_ref().map_or([0.0; 3], |n| n[i]),
                uv: uvs.as_ref().map_or([0.0; 2], |t| t[i]),
                tangent: tangents.as_ref().map_or([0.0; 3], |t| t[i]),
                bitangent: bitangents.as_ref().map_or([0.0; 3], |b| b[i]),
            })
            .collect();

        Ok(Self {
            name,
            vertices,
            indices,
            diffuse,
            state: PhantomData,
        })
    }

    /// Rewrite every vertex and mark the mesh calibrated.
    pub(crate) fn correct<E>(
        mut self,
        mut f: impl FnMut(usize, &mut MeshVertex) -> Result<(), E>,
    ) -> Result<Mesh<Calibrated>, E> {
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            f(i, vertex)?;
        }
        Ok(Mesh {
            name: self.name,
            vertices: self.vertices,
            indices: self.indices,
            diffuse: self.diffuse,
            state: PhantomData,
        })
    }
}

impl<S> Mesh<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[MeshVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn diffuse(&self) -> [f32; 3] {
        self.diffuse
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// A named collection of meshes (one imported asset)
#[derive(Debug, Clone)]
pub struct Model<S = Raw> {
    name: String,
    meshes: Vec<Mesh<S>>,
}

impl Model<Raw> {
    /// Collect importer results; failed meshes are reported and dropped.
    pub fn assemble(
        name: impl Into<String>,
        imports: impl IntoIterator<Item = Result<Mesh<Raw>, MeshError>>,
    ) -> Self {
        let name = name.into();
        let mut meshes = Vec::new();
        for import in imports {
            match import {
                Ok(mesh) => meshes.push(mesh),
                Err(e) => tracing::warn!(model = %name, "Discarding mesh: {}", e),
            }
        }
        tracing::info!(
            model = %name,
            meshes = meshes.len(),
            vertices = meshes.iter().map(Mesh::vertex_count).sum::<usize>(),
            "Model assembled"
        );
        Self { name, meshes }
    }
}

impl<S> Model<S> {
    pub fn new(name: impl Into<String>, meshes: Vec<Mesh<S>>) -> Self {
        Self {
            name: name.into(),
            meshes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meshes(&self) -> &[Mesh<S>] {
        &self.meshes
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }

    pub(crate) fn into_meshes(self) -> (String, Vec<Mesh<S>>) {
        (self.name, self.meshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(name: &str) -> MeshArrays {
        MeshArrays {
            name: name.to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: Some(vec![[0.0, 0.0, 1.0]; 3]),
            indices: vec![0, 1, 2],
            diffuse: [0.8, 0.2, 0.1],
            ..Default::default()
        }
    }

    #[test]
    fn test_vertex_layout_size() {
        assert_eq!(MeshVertex::SIZE, 56);
        let layout = MeshVertex::buffer_layout();
        assert_eq!(layout.attributes.len(), 5);
        assert_eq!(layout.attributes[4].offset, 44);
    }

    #[test]
    fn test_from_arrays_fills_missing_attributes() {
        let mesh = Mesh::from_arrays(triangle("wing")).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.vertices()[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices()[1].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices()[1].uv, [0.0, 0.0]);
        assert_eq!(mesh.diffuse(), [0.8, 0.2, 0.1]);
    }

    #[test]
    fn test_from_arrays_rejects_bad_input() {
        let mut arrays = triangle("a");
        arrays.indices = vec![0, 1, 3];
        assert!(matches!(
            Mesh::from_arrays(arrays),
            Err(MeshError::IndexOutOfRange { index: 3, .. })
        ));

        let mut arrays = triangle("b");
        arrays.uvs = Some(vec![[0.0, 0.0]; 2]);
        assert!(matches!(
            Mesh::from_arrays(arrays),
            Err(MeshError::AttributeLength { attribute: "uvs", .. })
        ));

        let mut arrays = triangle("c");
        arrays.indices = vec![0, 1];
        assert!(matches!(
            Mesh::from_arrays(arrays),
            Err(MeshError::NotTriangulated { .. })
        ));

        assert!(matches!(
            Mesh::from_arrays(MeshArrays::default()),
            Err(MeshError::Empty { .. })
        ));
    }

    #[test]
    fn test_assemble_discards_failed_imports() {
        let mut broken = triangle("broken");
        broken.indices = vec![7, 8, 9];
        let model = Model::assemble(
            "body",
            vec![
                Mesh::from_arrays(triangle("thorax")),
                Mesh::from_arrays(broken),
                Mesh::from_arrays(triangle("abdomen")),
            ],
        );
        assert_eq!(model.meshes().len(), 2);
        assert_eq!(model.meshes()[1].name(), "abdomen");
        assert_eq!(model.vertex_count(), 6);
    }
}
