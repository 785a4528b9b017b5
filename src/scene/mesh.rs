//! Mesh Data Model
//!
//! CPU-side description of a mesh and its instances, immutable after load.
//! The scene builder keys meshes by a stable string name; at build time the
//! name map is collapsed into dense [`MeshId`] indices and dropped, so the
//! frame loop only ever touches integer ids.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Dense mesh identifier, assigned at scene build.
///
/// Occluder meshes always receive the lowest ids so that the occluder subset
/// of the indirect command table is a contiguous prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

impl MeshId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Smallest box enclosing every position of `vertices`.
    #[must_use]
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for v in vertices {
            let p = Vec3::from_array(v.position);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-size along each axis.
    #[must_use]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The eight corner points.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// World-space box enclosing this box under `matrix`.
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for corner in self.corners() {
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

/// Per-vertex data, matching the vertex record of the binary scene cache:
/// position, normal, texcoord, tangent. 44-byte stride.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
    pub tangent: [f32; 3],
}

impl Vertex {
    /// Vertex buffer layout for the main and occluder pipelines.
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Float32x3,
            2 => Float32x2,
            3 => Float32x3,
        ],
    };
}

/// Per-instance record, built once at scene load and never mutated.
///
/// 144 bytes; the trailing words pad the record to 16-byte alignment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub world: [[f32; 4]; 4],
    pub tex_transform: [[f32; 4]; 4],
    pub material_index: u32,
    pub _pad: [u32; 3],
}

impl InstanceData {
    #[must_use]
    pub fn new(world: Mat4, tex_transform: Mat4, material_index: u32) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            tex_transform: tex_transform.to_cols_array_2d(),
            material_index,
            _pad: [0; 3],
        }
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world)
    }
}

/// A mesh as produced by the scene loader: geometry, transforms, material
/// binding, occluder flag, and the instance list attached by the builder.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material_index: u32,
    /// Load-time world matrix, baked into the cache. Instances carry their
    /// own world transforms; this one seeds the default instance.
    pub world: Mat4,
    pub tex_transform: Mat4,
    /// Occluders are rasterized into the Hi-Z pyramid and never culled.
    pub occluder: bool,
    pub instances: Vec<InstanceData>,
}

impl MeshData {
    #[must_use]
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            material_index: 0,
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
            occluder: false,
            instances: Vec::new(),
        }
    }

    /// Object-space bounding box over the vertex positions.
    #[must_use]
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_vertices(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_is_44_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
    }

    #[test]
    fn instance_data_is_144_bytes() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 144);
        assert_eq!(std::mem::offset_of!(InstanceData, material_index), 128);
    }

    #[test]
    fn aabb_transform_encloses_rotated_corners() {
        let aabb = Aabb {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        };
        let m = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let world = aabb.transform(&m);
        // A 45° rotation widens the box to sqrt(2) along x and z.
        let s = 2.0_f32.sqrt();
        assert!((world.max.x - s).abs() < 1e-5);
        assert!((world.max.z - s).abs() < 1e-5);
        assert!((world.max.y - 1.0).abs() < 1e-5);
    }
}
