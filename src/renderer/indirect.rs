//! Indirect Command Table
//!
//! One command record per mesh, occluders first. The CPU-side table uses
//! the published 60-byte wire record (vertex-buffer view, index-buffer
//! view, instance-view address, draw-indexed arguments); the GPU consumes
//! its trailing 20-byte draw-argument block from a tightly packed args
//! buffer driven by `multi_draw_indexed_indirect`.
//!
//! With culling enabled, the `instance_count` word of every non-occluder
//! record is replaced each frame by a 4-byte buffer copy from the mesh's
//! append counter. Toggling culling rewrites every non-occluder record's
//! instance-view address (source vs compacted pool region) and re-uploads
//! the args buffer on the next recorded frame.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::errors::{Result, VeldtError};
use crate::renderer::scene_gpu::{GpuScene, MeshRecord};
use crate::scene::mesh::{InstanceData, MeshId, Vertex};

/// Index format tag in the wire record: 32-bit unsigned indices.
pub const INDEX_FORMAT_UINT32: u32 = 1;

/// 64-bit buffer address stored as two little-endian words so the record
/// stays 4-byte aligned and exactly 60 bytes long.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuAddress {
    pub lo: u32,
    pub hi: u32,
}

impl GpuAddress {
    #[must_use]
    pub fn new(addr: u64) -> Self {
        Self {
            lo: addr as u32,
            hi: (addr >> 32) as u32,
        }
    }

    #[must_use]
    pub fn get(self) -> u64 {
        u64::from(self.lo) | (u64::from(self.hi) << 32)
    }
}

/// Vertex-buffer binding in the wire record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct VertexBufferView {
    pub addr: GpuAddress,
    pub size: u32,
    pub stride: u32,
}

/// Index-buffer binding in the wire record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct IndexBufferView {
    pub addr: GpuAddress,
    pub size: u32,
    pub format: u32,
}

/// Draw-indexed argument block; identical to the packed record the GPU
/// multi-draw dispatcher reads from the args buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedArgs {
    pub index_count_per_instance: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
    pub start_instance_location: u32,
}

/// Published per-mesh command record, 60 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectCommand {
    pub vertex_buffer_view: VertexBufferView,
    pub index_buffer_view: IndexBufferView,
    /// Byte offset of the record's instance region within the instance
    /// pool: the source region, or the compacted region when culling is on.
    pub instances_shader_view: GpuAddress,
    pub draw_arguments: DrawIndexedArgs,
}

/// Byte offset of `instance_count` within [`IndirectCommand`]; the target
/// of the per-frame counter copies in wire-record terms.
pub const INSTANCE_COUNT_OFFSET: usize = std::mem::offset_of!(IndirectCommand, draw_arguments)
    + std::mem::offset_of!(DrawIndexedArgs, instance_count);

/// Stride of one GPU draw-args record.
pub const ARGS_STRIDE: u64 = std::mem::size_of::<DrawIndexedArgs>() as u64;

/// Byte offset of `instance_count` within one GPU args record.
pub const ARGS_INSTANCE_COUNT_OFFSET: u64 =
    std::mem::offset_of!(DrawIndexedArgs, instance_count) as u64;

/// Build the wire record for one mesh under the given culling mode.
#[must_use]
pub fn command_for_mesh(scene: &GpuScene, id: MeshId, culling: bool) -> IndirectCommand {
    command_for_record(&scene.meshes[id.index()], scene.total_instances, culling)
}

/// Record-level command construction; `pool_split` is the element offset of
/// the compacted half of the instance pool.
#[must_use]
pub fn command_for_record(
    record: &MeshRecord,
    pool_split: u32,
    culling: bool,
) -> IndirectCommand {
    let instance_stride = std::mem::size_of::<InstanceData>() as u64;
    let vertex_stride = std::mem::size_of::<Vertex>() as u32;

    // Occluders always draw their full source instance list.
    let instance_base = if culling && !record.occluder {
        pool_split + record.first_instance
    } else {
        record.first_instance
    };

    IndirectCommand {
        vertex_buffer_view: VertexBufferView {
            addr: GpuAddress::new(u64::from(record.base_vertex as u32) * u64::from(vertex_stride)),
            size: record.vertex_count * vertex_stride,
            stride: vertex_stride,
        },
        index_buffer_view: IndexBufferView {
            addr: GpuAddress::new(u64::from(record.first_index) * 4),
            size: record.index_count * 4,
            format: INDEX_FORMAT_UINT32,
        },
        instances_shader_view: GpuAddress::new(u64::from(instance_base) * instance_stride),
        draw_arguments: DrawIndexedArgs {
            index_count_per_instance: record.index_count,
            instance_count: record.instance_count,
            start_index_location: record.first_index,
            base_vertex_location: record.base_vertex,
            start_instance_location: instance_base,
        },
    }
}

/// The per-mesh command table and its GPU projections.
pub struct CommandTable {
    commands: Vec<IndirectCommand>,
    /// Packed draw-args records, one per mesh; patched per frame.
    pub args_buffer: wgpu::Buffer,
    /// Draw-args for the occluder prefix only, consumed by the Hi-Z
    /// occluder pass. Never patched: occluders are not culled.
    pub occluder_args: wgpu::Buffer,
    /// One `u32` per mesh for the HUD totals, copied from the patched args.
    readback: wgpu::Buffer,
    culling: bool,
    just_toggled: bool,
    mesh_count: u32,
    occluder_count: u32,
}

impl CommandTable {
    #[must_use]
    pub fn new(device: &wgpu::Device, scene: &GpuScene, culling: bool) -> Self {
        let commands: Vec<IndirectCommand> = (0..scene.mesh_count())
            .map(|i| command_for_mesh(scene, MeshId(i), culling))
            .collect();

        let args: Vec<DrawIndexedArgs> = commands.iter().map(|c| c.draw_arguments).collect();
        let args_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Indirect Args"),
            contents: bytemuck::cast_slice(&args),
            usage: wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });

        // Occluder prefix drawn by the Hi-Z pass; source instances always.
        let mut occluder_records: Vec<DrawIndexedArgs> = (0..scene.occluder_count)
            .map(|i| command_for_mesh(scene, MeshId(i), false).draw_arguments)
            .collect();
        if occluder_records.is_empty() {
            // Zero-sized buffers are invalid; a single zeroed record draws
            // nothing when the occluder pass is skipped anyway.
            occluder_records.push(DrawIndexedArgs::zeroed());
        }
        let occluder_args = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Occluder Indirect Args"),
            contents: bytemuck::cast_slice(&occluder_records),
            usage: wgpu::BufferUsages::INDIRECT,
        });

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Drawn Instances Readback"),
            size: u64::from(scene.mesh_count().max(1)) * 4,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            commands,
            args_buffer,
            occluder_args,
            readback,
            culling,
            just_toggled: false,
            mesh_count: scene.mesh_count(),
            occluder_count: scene.occluder_count,
        }
    }

    #[must_use]
    pub fn culling_enabled(&self) -> bool {
        self.culling
    }

    /// Published wire records in mesh-id order.
    #[must_use]
    pub fn commands(&self) -> &[IndirectCommand] {
        &self.commands
    }

    /// Arm a culling-mode transition; the one-shot flag is consumed during
    /// the next frame's recording, which rewrites the table.
    pub fn set_culling(&mut self, enabled: bool) {
        if self.culling != enabled {
            self.culling = enabled;
            self.just_toggled = true;
        }
    }

    /// Consume the toggle flag; rewrite every record for the new mode and
    /// re-upload the full args buffer. No-op when the mode is unchanged.
    pub fn apply_mode_transition(&mut self, queue: &wgpu::Queue, scene: &GpuScene) {
        if !self.just_toggled {
            return;
        }
        self.just_toggled = false;

        for (i, command) in self.commands.iter_mut().enumerate() {
            *command = command_for_mesh(scene, MeshId(i as u32), self.culling);
        }
        let args: Vec<DrawIndexedArgs> = self.commands.iter().map(|c| c.draw_arguments).collect();
        queue.write_buffer(&self.args_buffer, 0, bytemuck::cast_slice(&args));
        log::debug!(
            "command table rewritten for {} records (culling {})",
            self.commands.len(),
            if self.culling { "on" } else { "off" }
        );
    }

    /// Record the per-mesh counter → `instance_count` copies. Must run
    /// after the culling dispatches and before the main indirect draw.
    pub fn record_count_patches(&self, encoder: &mut wgpu::CommandEncoder, scene: &GpuScene) {
        for id in scene.culled_meshes() {
            encoder.copy_buffer_to_buffer(
                &scene.counters,
                scene.counter_offset(id),
                &self.args_buffer,
                u64::from(id.0) * ARGS_STRIDE + ARGS_INSTANCE_COUNT_OFFSET,
                4,
            );
        }
    }

    /// Copy every record's (patched) `instance_count` into the readback
    /// buffer for the HUD.
    pub fn record_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        for i in 0..self.mesh_count {
            encoder.copy_buffer_to_buffer(
                &self.args_buffer,
                u64::from(i) * ARGS_STRIDE + ARGS_INSTANCE_COUNT_OFFSET,
                &self.readback,
                u64::from(i) * 4,
                4,
            );
        }
    }

    /// Map the readback buffer and return the per-mesh drawn-instance
    /// counts of the most recently completed frame. Blocks on the GPU.
    pub fn read_drawn_instances(&self, device: &wgpu::Device) -> Result<Vec<u32>> {
        let slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| VeldtError::DeviceLost(format!("poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| VeldtError::DeviceLost("map callback dropped".into()))?
            .map_err(|e| VeldtError::DeviceLost(format!("readback map failed: {e:?}")))?;

        let counts: Vec<u32> = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&view).to_vec()
        };
        self.readback.unmap();
        Ok(counts[..self.mesh_count as usize].to_vec())
    }

    #[must_use]
    pub fn occluder_count(&self) -> u32 {
        self.occluder_count
    }

    #[must_use]
    pub fn mesh_count(&self) -> u32 {
        self.mesh_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_record_is_60_bytes() {
        assert_eq!(std::mem::size_of::<IndirectCommand>(), 60);
        assert_eq!(std::mem::size_of::<DrawIndexedArgs>(), 20);
        assert_eq!(INSTANCE_COUNT_OFFSET, 44);
        assert_eq!(std::mem::offset_of!(IndirectCommand, index_buffer_view), 16);
        assert_eq!(
            std::mem::offset_of!(IndirectCommand, instances_shader_view),
            32
        );
        assert_eq!(std::mem::offset_of!(IndirectCommand, draw_arguments), 40);
    }

    #[test]
    fn gpu_address_round_trips() {
        let addr = GpuAddress::new(0x1234_5678_9abc_def0);
        assert_eq!(addr.get(), 0x1234_5678_9abc_def0);
        assert_eq!(addr.lo, 0x9abc_def0);
        assert_eq!(addr.hi, 0x1234_5678);
    }
}
