//! GPU Scene Residency
//!
//! Uploads the dense scene description into the buffers the frame loop
//! draws from. Geometry lives in one mega vertex buffer and one mega index
//! buffer with per-mesh ranges; instances live in a single pool whose first
//! half holds the immutable source instances and whose second half holds
//! the per-mesh compacted regions the culling pass appends into. A
//! dedicated buffer of one `u32` per mesh carries the append counters.
//!
//! Everything here is created once at load and lives until shutdown.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::scene::builder::SceneDescription;
use crate::scene::mesh::{Aabb, InstanceData, MeshId};

/// Uniform-buffer slot stride for the per-mesh culling parameters; one slot
/// per mesh, addressed with a dynamic offset.
pub const CULL_PARAMS_STRIDE: u32 = 256;

/// Per-mesh culling parameters as the compute shader sees them: the
/// instance count, the pool offsets of the mesh's source and compacted
/// regions, its counter slot, and the object-space bounding box.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CullParams {
    pub instance_count: u32,
    /// First element of the mesh's source region in the instance pool.
    pub source_base: u32,
    /// First element of the mesh's compacted region in the instance pool.
    pub compacted_base: u32,
    /// Index of the mesh's append counter.
    pub counter_index: u32,
    pub bbox_center: [f32; 3],
    pub _pad0: f32,
    pub bbox_extents: [f32; 3],
    pub _pad1: f32,
}

/// Immutable per-mesh GPU ranges and culling inputs.
#[derive(Debug, Clone)]
pub struct MeshRecord {
    pub name: String,
    pub vertex_count: u32,
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    /// Source-region base element in the instance pool.
    pub first_instance: u32,
    /// Source instance count; the compacted count never exceeds it.
    pub instance_count: u32,
    pub aabb: Aabb,
    pub occluder: bool,
    pub material_index: u32,
}

/// GPU-resident scene: mega buffers, instance pool, counters, and the dense
/// mesh table (occluders first).
pub struct GpuScene {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    /// `[source instances (N)] ++ [compacted regions (N)]`, element stride
    /// `size_of::<InstanceData>()`.
    pub instance_pool: wgpu::Buffer,
    /// One append counter word per mesh.
    pub counters: wgpu::Buffer,
    /// Per-mesh [`CullParams`] at [`CULL_PARAMS_STRIDE`] intervals.
    pub cull_params: wgpu::Buffer,
    pub meshes: Vec<MeshRecord>,
    pub occluder_count: u32,
    /// Total source instances N; also the element offset of the compacted
    /// half of the pool.
    pub total_instances: u32,
}

impl GpuScene {
    /// Upload a finished scene description.
    #[must_use]
    pub fn new(device: &wgpu::Device, scene: &SceneDescription) -> Self {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        let mut source_instances: Vec<InstanceData> = Vec::new();
        let mut meshes = Vec::with_capacity(scene.meshes.len());

        for mesh in &scene.meshes {
            let record = MeshRecord {
                name: mesh.name.clone(),
                vertex_count: mesh.vertices.len() as u32,
                index_count: mesh.indices.len() as u32,
                first_index: indices.len() as u32,
                base_vertex: vertices.len() as i32,
                first_instance: source_instances.len() as u32,
                instance_count: mesh.instances.len() as u32,
                aabb: mesh.bounding_box(),
                occluder: mesh.occluder,
                material_index: mesh.material_index,
            };
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend_from_slice(&mesh.indices);
            source_instances.extend_from_slice(&mesh.instances);
            meshes.push(record);
        }

        let total_instances = source_instances.len() as u32;

        // Pool = source half + zeroed compacted half of equal size.
        let mut pool = source_instances;
        pool.resize(2 * total_instances as usize, InstanceData::zeroed());

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let instance_pool = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Pool"),
            contents: bytemuck::cast_slice(&pool),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let counters = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Counters"),
            size: u64::from(meshes.len().max(1) as u32) * 4,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut params_bytes = vec![0u8; meshes.len() * CULL_PARAMS_STRIDE as usize];
        for (i, record) in meshes.iter().enumerate() {
            let params = CullParams {
                instance_count: record.instance_count,
                source_base: record.first_instance,
                compacted_base: total_instances + record.first_instance,
                counter_index: i as u32,
                bbox_center: record.aabb.center().to_array(),
                _pad0: 0.0,
                bbox_extents: record.aabb.extents().to_array(),
                _pad1: 0.0,
            };
            let at = i * CULL_PARAMS_STRIDE as usize;
            params_bytes[at..at + std::mem::size_of::<CullParams>()]
                .copy_from_slice(bytemuck::bytes_of(&params));
        }
        let cull_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cull Params"),
            contents: &params_bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        log::info!(
            "uploaded scene: {} vertices, {} indices, {} instances across {} meshes",
            vertices.len(),
            indices.len(),
            total_instances,
            meshes.len()
        );

        Self {
            vertex_buffer,
            index_buffer,
            instance_pool,
            counters,
            cull_params,
            meshes,
            occluder_count: scene.occluder_count,
            total_instances,
        }
    }

    #[must_use]
    pub fn mesh_count(&self) -> u32 {
        self.meshes.len() as u32
    }

    /// Element index of the mesh's compacted region in the instance pool.
    #[must_use]
    pub fn compacted_base(&self, id: MeshId) -> u32 {
        self.total_instances + self.meshes[id.index()].first_instance
    }

    /// Byte offset of the mesh's append counter in [`Self::counters`].
    #[must_use]
    pub fn counter_offset(&self, id: MeshId) -> u64 {
        u64::from(id.0) * 4
    }

    /// Dynamic offset of the mesh's [`CullParams`] slot.
    #[must_use]
    pub fn cull_params_offset(&self, id: MeshId) -> u32 {
        id.0 * CULL_PARAMS_STRIDE
    }

    /// Ids of the non-occluder meshes (the culled set).
    pub fn culled_meshes(&self) -> impl Iterator<Item = MeshId> + '_ {
        (self.occluder_count..self.mesh_count()).map(MeshId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cull_params_fit_the_uniform_slot() {
        assert_eq!(std::mem::size_of::<CullParams>(), 48);
        assert!(std::mem::size_of::<CullParams>() <= CULL_PARAMS_STRIDE as usize);
        assert_eq!(std::mem::offset_of!(CullParams, bbox_center), 16);
        assert_eq!(std::mem::offset_of!(CullParams, bbox_extents), 32);
    }
}
