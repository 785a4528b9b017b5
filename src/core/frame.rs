//! Frame Resource Ring
//!
//! One set of upload buffers per pipeline slot: the scene constants and
//! the material table. Rotation is strict round-robin; the context's slot
//! gate guarantees the GPU has retired a slot before the CPU rewrites it.
//! Material rows are re-copied only while their dirty counter is armed, so
//! an edit propagates into every in-flight slot exactly once.

use crate::renderer::constants::SceneConstants;
use crate::scene::material::{Material, MaterialData};

/// Scene-constant buffer size, rounded up to constant-buffer alignment.
const SCENE_CONSTANTS_SIZE: u64 =
    (std::mem::size_of::<SceneConstants>() as u64).next_multiple_of(256);

struct FrameSlot {
    scene_constants: wgpu::Buffer,
    material_table: wgpu::Buffer,
}

pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    material_stride: u64,
}

impl FrameSlots {
    #[must_use]
    pub fn new(device: &wgpu::Device, pipeline_depth: u32, material_count: u32) -> Self {
        let material_stride = std::mem::size_of::<MaterialData>() as u64;
        let slots = (0..pipeline_depth.max(1))
            .map(|i| FrameSlot {
                scene_constants: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Scene Constants [{i}]")),
                    size: SCENE_CONSTANTS_SIZE,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                material_table: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Material Table [{i}]")),
                    size: u64::from(material_count.max(1)) * material_stride,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
            })
            .collect();
        Self {
            slots,
            material_stride,
        }
    }

    #[must_use]
    pub fn scene_constants(&self, slot: u32) -> &wgpu::Buffer {
        &self.slots[slot as usize].scene_constants
    }

    #[must_use]
    pub fn material_table(&self, slot: u32) -> &wgpu::Buffer {
        &self.slots[slot as usize].material_table
    }

    #[must_use]
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn write_scene_constants(
        &self,
        queue: &wgpu::Queue,
        slot: u32,
        constants: &SceneConstants,
    ) {
        queue.write_buffer(
            self.scene_constants(slot),
            0,
            bytemuck::bytes_of(constants),
        );
    }

    /// Upload rows whose dirty counter is still armed, decrementing each.
    pub fn write_dirty_materials(
        &self,
        queue: &wgpu::Queue,
        slot: u32,
        materials: &mut [Material],
    ) {
        let table = self.material_table(slot);
        for material in materials.iter_mut() {
            if material.frames_dirty == 0 {
                continue;
            }
            queue.write_buffer(
                table,
                u64::from(material.table_index) * self.material_stride,
                bytemuck::bytes_of(&material.data),
            );
            material.frames_dirty -= 1;
        }
    }
}
