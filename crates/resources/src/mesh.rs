//! Meshes and procedural mesh recipes.
//!
//! A [`Mesh`] records where already uploaded geometry lives on the GPU plus
//! the named index ranges ([`Submesh`]) drawn from it. Procedural shapes are
//! described by a [`MeshRecipe`] and turned into CPU-side [`MeshData`] by
//! [`MeshRecipe::build`]; uploading that data is the asset loader's job.
//!
//! # Example
//!
//! ```
//! use pbr_resources::MeshRecipe;
//! use pbr_rhi::vertex::IndexFormat;
//!
//! let sphere = MeshRecipe::Sphere { radius: 1.0, slices: 20, stacks: 20 }
//!     .build()
//!     .unwrap();
//! assert_eq!(sphere.vertices.len(), 2 + 19 * 21);
//! assert_eq!(sphere.index_format(), IndexFormat::U16);
//! ```

use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};
use pbr_rhi::vertex::{IndexBufferView, IndexFormat, Vertex, VertexBufferView};
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Most slices or stacks a sphere may have.
pub const MAX_SPHERE_DIVISIONS: u32 = 250;

/// Most subdivision passes applied to a box.
pub const MAX_BOX_SUBDIVISIONS: u32 = 6;

/// Parameters of a procedural shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeshRecipe {
    /// UV sphere centered at the origin.
    Sphere { radius: f32, slices: u32, stacks: u32 },
    /// Planar grid spanning `min` to `max`, with `rows` x `columns` vertices.
    Grid {
        min: Vec3,
        max: Vec3,
        rows: u32,
        columns: u32,
    },
    /// Single quad spanning `min` to `max`.
    Quad { min: Vec3, max: Vec3 },
    /// Axis-aligned box centered at the origin.
    Box {
        width: f32,
        height: f32,
        depth: f32,
        subdivisions: u32,
    },
}

impl MeshRecipe {
    /// Default submesh name for the shape.
    pub fn submesh_name(&self) -> &'static str {
        match self {
            MeshRecipe::Sphere { .. } => "sphere",
            MeshRecipe::Grid { .. } => "grid",
            MeshRecipe::Quad { .. } => "quad",
            MeshRecipe::Box { .. } => "box",
        }
    }

    /// Generates vertices and indices.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidRecipe`] for degenerate parameters:
    /// spheres need 3..=250 slices and 2..=250 stacks, grids at least two
    /// rows and columns.
    pub fn build(&self) -> ResourceResult<MeshData> {
        let data = match *self {
            MeshRecipe::Sphere {
                radius,
                slices,
                stacks,
            } => {
                if !(3..=MAX_SPHERE_DIVISIONS).contains(&slices)
                    || !(2..=MAX_SPHERE_DIVISIONS).contains(&stacks)
                {
                    return Err(ResourceError::InvalidRecipe(format!(
                        "sphere needs 3..={0} slices and 2..={0} stacks, got {1} x {2}",
                        MAX_SPHERE_DIVISIONS, slices, stacks
                    )));
                }
                build_sphere(radius, slices, stacks)
            }
            MeshRecipe::Grid {
                min,
                max,
                rows,
                columns,
            } => {
                if rows < 2 || columns < 2 {
                    return Err(ResourceError::InvalidRecipe(format!(
                        "grid needs at least 2 x 2 vertices, got {} x {}",
                        rows, columns
                    )));
                }
                build_grid(min, max, rows, columns)
            }
            MeshRecipe::Quad { min, max } => build_grid(min, max, 2, 2),
            MeshRecipe::Box {
                width,
                height,
                depth,
                subdivisions,
            } => {
                let mut data = build_box(width, height, depth);
                for _ in 0..subdivisions.min(MAX_BOX_SUBDIVISIONS) {
                    data = subdivide(&data);
                }
                data
            }
        };

        debug!(
            "Built {} mesh: {} vertices, {} indices",
            self.submesh_name(),
            data.vertices.len(),
            data.indices.len()
        );
        Ok(data)
    }
}

/// CPU-side geometry ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Narrowest index format able to address every vertex.
    pub fn index_format(&self) -> IndexFormat {
        if self.vertices.len() <= 0xFFFF {
            IndexFormat::U16
        } else {
            IndexFormat::U32
        }
    }

    /// Index buffer contents in [`MeshData::index_format`].
    pub fn index_bytes(&self) -> Vec<u8> {
        match self.index_format() {
            IndexFormat::U16 => {
                let narrow: Vec<u16> = self.indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexFormat::U32 => bytemuck::cast_slice(&self.indices).to_vec(),
        }
    }

    /// Vertex buffer contents.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// A submesh covering all indices.
    pub fn whole(&self, name: &str) -> Submesh {
        Submesh {
            name: name.to_string(),
            index_count: self.indices.len() as u32,
            start_index: 0,
            base_vertex: 0,
        }
    }
}

/// A named index range of a mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submesh {
    pub name: String,
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
}

/// GPU-resident geometry.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: VertexBufferView,
    pub index_buffer: IndexBufferView,
    pub submeshes: Vec<Submesh>,
}

impl Mesh {
    /// Index of the submesh called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownSubmesh`] if there is none.
    pub fn submesh_index(&self, name: &str) -> ResourceResult<usize> {
        self.submeshes
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ResourceError::UnknownSubmesh {
                mesh: self.name.clone(),
                submesh: name.to_string(),
            })
    }
}

/// Handle to a mesh in a [`MeshRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(u32);

impl MeshId {
    /// Position of the mesh in its registry.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena of meshes addressed by [`MeshId`].
#[derive(Debug, Default)]
pub struct MeshRegistry {
    meshes: Vec<Mesh>,
    by_name: HashMap<String, MeshId>,
}

impl MeshRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an uploaded mesh.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateName`] if the name is taken.
    pub fn register(&mut self, mesh: Mesh) -> ResourceResult<MeshId> {
        if self.by_name.contains_key(&mesh.name) {
            return Err(ResourceError::DuplicateName {
                kind: "mesh",
                name: mesh.name,
            });
        }
        let id = MeshId(self.meshes.len() as u32);
        debug!(
            "Registered mesh '{}' with {} submesh(es)",
            mesh.name,
            mesh.submeshes.len()
        );
        self.by_name.insert(mesh.name.clone(), id);
        self.meshes.push(mesh);
        Ok(id)
    }

    /// Returns a mesh.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different registry.
    pub fn get(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.index()]
    }

    /// Looks a mesh up by name.
    pub fn find(&self, name: &str) -> Option<MeshId> {
        self.by_name.get(name).copied()
    }

    /// Number of meshes.
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

// =============================================================================
// Generators
// =============================================================================

fn build_sphere(radius: f32, slices: u32, stacks: u32) -> MeshData {
    let mut vertices = Vec::with_capacity((2 + (stacks - 1) * (slices + 1)) as usize);

    vertices.push(Vertex::new(
        Vec3::new(0.0, radius, 0.0),
        Vec3::Y,
        Vec3::X,
        Vec3::NEG_Z,
        Vec2::ZERO,
    ));

    let delta_phi = PI / stacks as f32;
    let delta_theta = TAU / slices as f32;

    for i in 1..stacks {
        let phi = i as f32 * delta_phi;
        for j in 0..=slices {
            let theta = j as f32 * delta_theta;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let (sin_theta, cos_theta) = theta.sin_cos();

            let position = Vec3::new(
                radius * sin_phi * cos_theta,
                radius * cos_phi,
                radius * sin_phi * sin_theta,
            );
            let normal = position.normalize_or_zero();
            // dP/dtheta
            let tangent = Vec3::new(
                -radius * sin_phi * sin_theta,
                0.0,
                radius * sin_phi * cos_theta,
            );
            let bitangent = normal.cross(tangent);
            let tex_coord = Vec2::new(theta / TAU, phi / PI);

            vertices.push(Vertex::new(position, normal, tangent, bitangent, tex_coord));
        }
    }

    vertices.push(Vertex::new(
        Vec3::new(0.0, -radius, 0.0),
        Vec3::NEG_Y,
        Vec3::X,
        Vec3::Z,
        Vec2::new(0.0, 1.0),
    ));

    let mut indices = Vec::with_capacity((6 * slices * (stacks - 1)) as usize);

    // Top cap.
    for i in 1..=slices {
        indices.extend_from_slice(&[0, i + 1, i]);
    }

    // Inner stacks.
    let base = 1;
    let ring = slices + 1;
    for i in 0..stacks - 2 {
        for j in 0..slices {
            indices.extend_from_slice(&[
                base + i * ring + j,
                base + i * ring + j + 1,
                base + (i + 1) * ring + j,
                base + (i + 1) * ring + j,
                base + i * ring + j + 1,
                base + (i + 1) * ring + j + 1,
            ]);
        }
    }

    // Bottom cap.
    let south = vertices.len() as u32 - 1;
    let base = south - ring;
    for i in 0..slices {
        indices.extend_from_slice(&[south, base + i, base + i + 1]);
    }

    MeshData { vertices, indices }
}

fn build_grid(min: Vec3, max: Vec3, rows: u32, columns: u32) -> MeshData {
    let span = max - min;
    let delta = Vec3::new(
        span.x / (columns - 1) as f32,
        span.y / (rows - 1) as f32,
        span.z / (rows - 1) as f32,
    );
    let delta_uv = Vec2::new(1.0 / (columns - 1) as f32, 1.0 / (rows - 1) as f32);

    // Rows run from the max corner's y/z towards the min corner's.
    let min_corner = Vec3::new(max.x, min.y, min.z);
    let max_corner = Vec3::new(min.x, max.y, max.z);
    let normal = (max - min).cross(min_corner - min).normalize_or_zero();
    let tangent = Vec3::X;
    let bitangent = normal.cross(tangent);

    let mut vertices = Vec::with_capacity((rows * columns) as usize);
    for i in 0..rows {
        for j in 0..columns {
            let position = Vec3::new(
                max_corner.x + j as f32 * delta.x,
                max_corner.y - i as f32 * delta.y,
                max_corner.z - i as f32 * delta.z,
            );
            let tex_coord = Vec2::new(j as f32 * delta_uv.x, i as f32 * delta_uv.y);
            vertices.push(Vertex::new(position, normal, tangent, bitangent, tex_coord));
        }
    }

    let mut indices = Vec::with_capacity(((rows - 1) * (columns - 1) * 6) as usize);
    for i in 0..rows - 1 {
        for j in 0..columns - 1 {
            indices.extend_from_slice(&[
                i * columns + j,
                i * columns + j + 1,
                (i + 1) * columns + j,
                (i + 1) * columns + j,
                i * columns + j + 1,
                (i + 1) * columns + j + 1,
            ]);
        }
    }

    MeshData { vertices, indices }
}

fn build_box(width: f32, height: f32, depth: f32) -> MeshData {
    let (w, h, d) = (0.5 * width, 0.5 * height, 0.5 * depth);

    // (normal, tangent, four corners with their UVs) per face
    let faces: [(Vec3, Vec3, [(Vec3, Vec2); 4]); 6] = [
        (
            Vec3::NEG_Z,
            Vec3::X,
            [
                (Vec3::new(-w, -h, -d), Vec2::new(0.0, 1.0)),
                (Vec3::new(-w, h, -d), Vec2::new(0.0, 0.0)),
                (Vec3::new(w, h, -d), Vec2::new(1.0, 0.0)),
                (Vec3::new(w, -h, -d), Vec2::new(1.0, 1.0)),
            ],
        ),
        (
            Vec3::Z,
            Vec3::NEG_X,
            [
                (Vec3::new(-w, -h, d), Vec2::new(1.0, 1.0)),
                (Vec3::new(w, -h, d), Vec2::new(0.0, 1.0)),
                (Vec3::new(w, h, d), Vec2::new(0.0, 0.0)),
                (Vec3::new(-w, h, d), Vec2::new(1.0, 0.0)),
            ],
        ),
        (
            Vec3::Y,
            Vec3::X,
            [
                (Vec3::new(-w, h, -d), Vec2::new(0.0, 1.0)),
                (Vec3::new(-w, h, d), Vec2::new(0.0, 0.0)),
                (Vec3::new(w, h, d), Vec2::new(1.0, 0.0)),
                (Vec3::new(w, h, -d), Vec2::new(1.0, 1.0)),
            ],
        ),
        (
            Vec3::NEG_Y,
            Vec3::NEG_X,
            [
                (Vec3::new(-w, -h, -d), Vec2::new(1.0, 1.0)),
                (Vec3::new(w, -h, -d), Vec2::new(0.0, 1.0)),
                (Vec3::new(w, -h, d), Vec2::new(0.0, 0.0)),
                (Vec3::new(-w, -h, d), Vec2::new(1.0, 0.0)),
            ],
        ),
        (
            Vec3::NEG_X,
            Vec3::NEG_Z,
            [
                (Vec3::new(-w, -h, d), Vec2::new(0.0, 1.0)),
                (Vec3::new(-w, h, d), Vec2::new(0.0, 0.0)),
                (Vec3::new(-w, h, -d), Vec2::new(1.0, 0.0)),
                (Vec3::new(-w, -h, -d), Vec2::new(1.0, 1.0)),
            ],
        ),
        (
            Vec3::X,
            Vec3::Z,
            [
                (Vec3::new(w, -h, -d), Vec2::new(0.0, 1.0)),
                (Vec3::new(w, h, -d), Vec2::new(0.0, 0.0)),
                (Vec3::new(w, h, d), Vec2::new(1.0, 0.0)),
                (Vec3::new(w, -h, d), Vec2::new(1.0, 1.0)),
            ],
        ),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent, corners) in faces {
        let base = vertices.len() as u32;
        let bitangent = normal.cross(tangent);
        for (position, tex_coord) in corners {
            vertices.push(Vertex::new(position, normal, tangent, bitangent, tex_coord));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData { vertices, indices }
}

/// Splits every triangle into four.
fn subdivide(input: &MeshData) -> MeshData {
    let triangles = input.indices.len() / 3;
    let mut vertices = Vec::with_capacity(triangles * 6);
    let mut indices = Vec::with_capacity(triangles * 12);

    for (t, tri) in input.indices.chunks_exact(3).enumerate() {
        let v0 = input.vertices[tri[0] as usize];
        let v1 = input.vertices[tri[1] as usize];
        let v2 = input.vertices[tri[2] as usize];

        vertices.extend_from_slice(&[
            v0,
            v1,
            v2,
            midpoint(&v0, &v1),
            midpoint(&v1, &v2),
            midpoint(&v0, &v2),
        ]);

        let b = (t * 6) as u32;
        indices.extend_from_slice(&[
            b,
            b + 3,
            b + 5,
            b + 3,
            b + 4,
            b + 5,
            b + 5,
            b + 4,
            b + 2,
            b + 3,
            b + 1,
            b + 4,
        ]);
    }

    MeshData { vertices, indices }
}

fn midpoint(a: &Vertex, b: &Vertex) -> Vertex {
    Vertex::new(
        0.5 * (a.position + b.position),
        (0.5 * (a.normal + b.normal)).normalize_or_zero(),
        (0.5 * (a.tangent + b.tangent)).normalize_or_zero(),
        (0.5 * (a.bitangent + b.bitangent)).normalize_or_zero(),
        0.5 * (a.tex_coord + b.tex_coord),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(slices: u32, stacks: u32) -> MeshData {
        MeshRecipe::Sphere {
            radius: 1.0,
            slices,
            stacks,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn test_sphere_counts() {
        let data = sphere(20, 20);
        assert_eq!(data.vertices.len(), 2 + 19 * 21);
        assert_eq!(data.indices.len(), 6 * 20 * 19);
        assert!(data.indices.iter().all(|&i| (i as usize) < data.vertices.len()));
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let data = MeshRecipe::Sphere {
            radius: 2.0,
            slices: 8,
            stacks: 6,
        }
        .build()
        .unwrap();
        for vertex in &data.vertices {
            assert!((vertex.position.length() - 2.0).abs() < 1e-4);
            assert!((vertex.normal.length() - 1.0).abs() < 1e-4);
            assert!(vertex.tex_coord.x >= 0.0 && vertex.tex_coord.x <= 1.0 + 1e-5);
        }
        assert_eq!(data.vertices[0].position, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(data.vertices.last().unwrap().position, Vec3::new(0.0, -2.0, 0.0));
    }

    #[test]
    fn test_sphere_rejects_bad_divisions() {
        for (slices, stacks) in [(2, 10), (10, 1), (251, 10), (10, 251)] {
            let recipe = MeshRecipe::Sphere {
                radius: 1.0,
                slices,
                stacks,
            };
            assert!(matches!(recipe.build(), Err(ResourceError::InvalidRecipe(_))));
        }
    }

    #[test]
    fn test_largest_sphere_fits_16_bit_indices() {
        let data = sphere(MAX_SPHERE_DIVISIONS, MAX_SPHERE_DIVISIONS);
        assert_eq!(data.index_format(), IndexFormat::U16);
        assert_eq!(data.index_bytes().len(), data.indices.len() * 2);
    }

    #[test]
    fn test_grid_counts() {
        let data = MeshRecipe::Grid {
            min: Vec3::new(-1.0, 0.0, -1.0),
            max: Vec3::new(1.0, 0.0, 1.0),
            rows: 4,
            columns: 5,
        }
        .build()
        .unwrap();
        assert_eq!(data.vertices.len(), 20);
        assert_eq!(data.indices.len(), 3 * 4 * 6);
        assert_eq!(data.vertices[0].tex_coord, Vec2::ZERO);
        assert!(data.vertices[19].tex_coord.abs_diff_eq(Vec2::ONE, 1e-5));
    }

    #[test]
    fn test_grid_rejects_single_row() {
        let recipe = MeshRecipe::Grid {
            min: Vec3::ZERO,
            max: Vec3::ONE,
            rows: 1,
            columns: 4,
        };
        assert!(recipe.build().is_err());
    }

    #[test]
    fn test_quad_is_two_triangles() {
        let data = MeshRecipe::Quad {
            min: Vec3::new(-1.0, -1.0, 0.0),
            max: Vec3::new(1.0, 1.0, 0.0),
        }
        .build()
        .unwrap();
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices.len(), 6);
        let normal = data.vertices[0].normal;
        assert!((normal.length() - 1.0).abs() < 1e-5);
        assert!(normal.z.abs() > 0.99);
    }

    #[test]
    fn test_box_and_subdivision() {
        let plain = MeshRecipe::Box {
            width: 1.0,
            height: 2.0,
            depth: 3.0,
            subdivisions: 0,
        }
        .build()
        .unwrap();
        assert_eq!(plain.vertices.len(), 24);
        assert_eq!(plain.indices.len(), 36);

        let once = MeshRecipe::Box {
            width: 1.0,
            height: 2.0,
            depth: 3.0,
            subdivisions: 1,
        }
        .build()
        .unwrap();
        assert_eq!(once.indices.len(), 36 * 4);
        assert_eq!(once.vertices.len(), 12 * 6);
    }

    #[test]
    fn test_whole_submesh() {
        let data = sphere(4, 3);
        let submesh = data.whole("sphere");
        assert_eq!(submesh.index_count as usize, data.indices.len());
        assert_eq!(submesh.start_index, 0);
    }

    #[test]
    fn test_mesh_registry() {
        let mut meshes = MeshRegistry::new();
        let mesh = Mesh {
            name: "sphere".to_string(),
            vertex_buffer: VertexBufferView::default(),
            index_buffer: IndexBufferView {
                buffer: 1,
                offset: 0,
                size: 12,
                format: IndexFormat::U16,
            },
            submeshes: vec![sphere(4, 3).whole("sphere")],
        };
        let id = meshes.register(mesh.clone()).unwrap();
        assert_eq!(meshes.find("sphere"), Some(id));
        assert_eq!(meshes.get(id).submesh_index("sphere").unwrap(), 0);
        assert!(matches!(
            meshes.get(id).submesh_index("box"),
            Err(ResourceError::UnknownSubmesh { .. })
        ));
        assert!(meshes.register(mesh).is_err());
    }
}
