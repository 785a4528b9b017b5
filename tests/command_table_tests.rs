//! Indirect Command Table Tests
//!
//! Tests for:
//! - The published 60-byte wire layout of [`IndirectCommand`]
//! - Source vs compacted instance addressing per culling mode
//! - Occluder records never switching to compacted regions
//! - Toggle round-trip: two transitions restore the original record bytes

use veldt::renderer::indirect::{
    command_for_record, DrawIndexedArgs, IndirectCommand, ARGS_INSTANCE_COUNT_OFFSET, ARGS_STRIDE,
    INDEX_FORMAT_UINT32, INSTANCE_COUNT_OFFSET,
};
use veldt::renderer::scene_gpu::MeshRecord;
use veldt::scene::mesh::{Aabb, InstanceData, Vertex};

fn record(name: &str, occluder: bool) -> MeshRecord {
    MeshRecord {
        name: name.into(),
        vertex_count: 300,
        index_count: 900,
        first_index: 1200,
        base_vertex: 400,
        first_instance: 64,
        instance_count: 512,
        aabb: Aabb {
            min: glam::Vec3::splat(-1.0),
            max: glam::Vec3::splat(1.0),
        },
        occluder,
        material_index: 2,
    }
}

const POOL_SPLIT: u32 = 4096;

// ============================================================================
// Wire Layout
// ============================================================================

#[test]
fn wire_record_layout_is_published_exactly() {
    assert_eq!(std::mem::size_of::<IndirectCommand>(), 60);
    assert_eq!(std::mem::size_of::<DrawIndexedArgs>(), 20);
    assert_eq!(INSTANCE_COUNT_OFFSET, 44);
    assert_eq!(ARGS_STRIDE, 20);
    assert_eq!(ARGS_INSTANCE_COUNT_OFFSET, 4);
}

#[test]
fn instance_count_lands_at_offset_44_in_record_bytes() {
    let mut command = command_for_record(&record("stones", false), POOL_SPLIT, false);
    command.draw_arguments.instance_count = 0xDEAD_BEEF;
    let bytes = bytemuck::bytes_of(&command);
    assert_eq!(
        &bytes[INSTANCE_COUNT_OFFSET..INSTANCE_COUNT_OFFSET + 4],
        &0xDEAD_BEEFu32.to_le_bytes()
    );
}

// ============================================================================
// Addressing Per Mode
// ============================================================================

#[test]
fn source_mode_uses_source_region() {
    let command = command_for_record(&record("stones", false), POOL_SPLIT, false);
    let stride = std::mem::size_of::<InstanceData>() as u64;

    assert_eq!(command.draw_arguments.start_instance_location, 64);
    assert_eq!(command.draw_arguments.instance_count, 512);
    assert_eq!(command.instances_shader_view.get(), 64 * stride);
}

#[test]
fn culling_mode_uses_compacted_region() {
    let command = command_for_record(&record("stones", false), POOL_SPLIT, true);
    let stride = std::mem::size_of::<InstanceData>() as u64;

    assert_eq!(
        command.draw_arguments.start_instance_location,
        POOL_SPLIT + 64
    );
    assert_eq!(
        command.instances_shader_view.get(),
        u64::from(POOL_SPLIT + 64) * stride
    );
    // The count starts at the source total; the per-frame counter copy
    // overwrites it on the GPU.
    assert_eq!(command.draw_arguments.instance_count, 512);
}

#[test]
fn occluder_record_is_mode_independent() {
    let off = command_for_record(&record("terrain", true), POOL_SPLIT, false);
    let on = command_for_record(&record("terrain", true), POOL_SPLIT, true);
    assert_eq!(bytemuck::bytes_of(&off), bytemuck::bytes_of(&on));
    assert_eq!(on.draw_arguments.start_instance_location, 64);
}

#[test]
fn geometry_ranges_are_carried_through() {
    let command = command_for_record(&record("stones", false), POOL_SPLIT, false);
    let vstride = std::mem::size_of::<Vertex>() as u32;

    assert_eq!(command.vertex_buffer_view.stride, vstride);
    assert_eq!(command.vertex_buffer_view.size, 300 * vstride);
    assert_eq!(command.vertex_buffer_view.addr.get(), u64::from(400u32) * u64::from(vstride));
    assert_eq!(command.index_buffer_view.format, INDEX_FORMAT_UINT32);
    assert_eq!(command.index_buffer_view.size, 900 * 4);
    assert_eq!(command.index_buffer_view.addr.get(), 1200 * 4);
    assert_eq!(command.draw_arguments.index_count_per_instance, 900);
    assert_eq!(command.draw_arguments.start_index_location, 1200);
    assert_eq!(command.draw_arguments.base_vertex_location, 400);
}

// ============================================================================
// Toggle Stability
// ============================================================================

#[test]
fn toggling_twice_restores_record_bytes() {
    for occluder in [false, true] {
        let r = record("fir", occluder);
        let original = command_for_record(&r, POOL_SPLIT, false);
        let toggled = command_for_record(&r, POOL_SPLIT, true);
        let restored = command_for_record(&r, POOL_SPLIT, false);
        assert_eq!(bytemuck::bytes_of(&original), bytemuck::bytes_of(&restored));
        if !occluder {
            assert_ne!(bytemuck::bytes_of(&original), bytemuck::bytes_of(&toggled));
        }
    }
}
