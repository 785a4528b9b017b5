//! Culling Reference Tests
//!
//! The CPU mirror of the culling compute shader, run over the scenarios
//! the GPU path must reproduce:
//! - Trivial scene: a single instance in front of the camera survives
//! - Frustum line: 10 instances along x, only those inside a 30° half-angle
//!   frustum survive
//! - Occlusion: instances behind a full-screen occluder are all rejected,
//!   while the occluder itself is never culled
//! - A far-away background never occludes anything

use glam::{Mat4, Vec3};

use veldt::renderer::cull::reference::{cull_instances, hiz_occluded, HiZChain};
use veldt::renderer::hiz::reference_chain;
use veldt::scene::mesh::{Aabb, InstanceData};
use veldt::scene::view::FrameView;

fn unit_box() -> Aabb {
    Aabb {
        min: Vec3::splat(-0.5),
        max: Vec3::splat(0.5),
    }
}

fn instance_at(p: Vec3) -> InstanceData {
    InstanceData::new(Mat4::from_translation(p), Mat4::IDENTITY, 0)
}

/// Camera at `eye` looking toward +z, square aspect, 60° vertical fov
/// (30° horizontal half-angle), near 1, far 2100.
fn forward_view(eye: Vec3) -> FrameView {
    FrameView {
        view: Mat4::look_at_rh(eye, eye + Vec3::Z, Vec3::Y),
        proj: Mat4::perspective_rh(60.0_f32.to_radians(), 1.0, 1.0, 2100.0),
        eye,
    }
}

// ============================================================================
// Scenario: trivial scene
// ============================================================================

#[test]
fn single_instance_in_front_of_camera_survives() {
    let view = forward_view(Vec3::new(0.0, 0.0, -5.0));
    let survivors = cull_instances(&view, &unit_box(), &[instance_at(Vec3::ZERO)], None);
    assert_eq!(survivors, vec![0]);
}

#[test]
fn single_instance_behind_camera_is_rejected() {
    let view = forward_view(Vec3::new(0.0, 0.0, -5.0));
    let survivors = cull_instances(
        &view,
        &unit_box(),
        &[instance_at(Vec3::new(0.0, 0.0, -20.0))],
        None,
    );
    assert!(survivors.is_empty());
}

// ============================================================================
// Scenario: frustum line
// ============================================================================

#[test]
fn frustum_line_keeps_two_to_four_of_ten() {
    let view = forward_view(Vec3::ZERO);
    let half_angle_tan = 30.0_f32.to_radians().tan();
    let z = 50.0;

    let instances: Vec<InstanceData> = (0..10)
        .map(|i| instance_at(Vec3::new(-90.0 + 20.0 * i as f32, 0.0, z)))
        .collect();

    let survivors = cull_instances(&view, &unit_box(), &instances, None);
    assert!(
        (2..=4).contains(&survivors.len()),
        "expected 2..=4 survivors, got {}",
        survivors.len()
    );

    // Every survivor's center must lie within the horizontal half-angle,
    // up to the conservative slack of its own half-extent.
    for &i in &survivors {
        let x = -90.0 + 20.0 * i as f32;
        assert!(
            x.abs() <= half_angle_tan * z + 0.5 + 1e-3,
            "survivor at x={x} is outside the 30° half-angle"
        );
    }
}

// ============================================================================
// Scenario: occlusion
// ============================================================================

/// Depth of a world-space point in normalized [0, 1] terms.
fn depth_of(view: &FrameView, p: Vec3) -> f32 {
    let clip = view.view_projection() * p.extend(1.0);
    clip.z / clip.w
}

#[test]
fn instances_behind_full_screen_occluder_are_rejected() {
    let view = forward_view(Vec3::new(0.0, 0.0, -5.0));
    let (w, h, mips) = (256u32, 192u32, 8u32);

    // A 100x100 quad at z = 10 fills the whole viewport from this camera;
    // its rasterized depth is uniform across the base level.
    let quad_depth = depth_of(&view, Vec3::new(0.0, 0.0, 10.0));
    let levels = reference_chain(vec![quad_depth; (w * h) as usize], w, h, mips);
    let chain = HiZChain {
        levels: &levels,
        base_size: (w, h),
    };

    let point_box = Aabb {
        min: Vec3::splat(-0.01),
        max: Vec3::splat(0.01),
    };
    let instances: Vec<InstanceData> = (0..1000)
        .map(|i| {
            let dx = (i % 100) as f32 * 0.1 - 5.0;
            let dy = (i / 100) as f32 * 0.1 - 0.5;
            instance_at(Vec3::new(dx, dy, 50.0))
        })
        .collect();

    let survivors = cull_instances(&view, &point_box, &instances, Some(&chain));
    assert!(
        survivors.is_empty(),
        "{} instances leaked through the occluder",
        survivors.len()
    );

    // The same instances pass with no occlusion data: the rejection above
    // is the pyramid's doing, not the frustum's.
    let unoccluded = cull_instances(&view, &point_box, &instances, None);
    assert_eq!(unoccluded.len(), 1000);
}

#[test]
fn occluder_in_front_of_geometry_does_not_reject_nearer_instances() {
    let view = forward_view(Vec3::new(0.0, 0.0, -5.0));
    let (w, h, mips) = (256u32, 192u32, 8u32);

    let quad_depth = depth_of(&view, Vec3::new(0.0, 0.0, 10.0));
    let levels = reference_chain(vec![quad_depth; (w * h) as usize], w, h, mips);
    let chain = HiZChain {
        levels: &levels,
        base_size: (w, h),
    };

    // An instance nearer than the occluder survives.
    let survivors = cull_instances(
        &view,
        &unit_box(),
        &[instance_at(Vec3::new(0.0, 0.0, 2.0))],
        Some(&chain),
    );
    assert_eq!(survivors, vec![0]);
}

#[test]
fn far_background_never_occludes() {
    let view = forward_view(Vec3::new(0.0, 0.0, -5.0));
    let (w, h, mips) = (128u32, 128u32, 6u32);

    // Cleared pyramid: everything at the far plane.
    let levels = reference_chain(vec![1.0; (w * h) as usize], w, h, mips);
    let chain = HiZChain {
        levels: &levels,
        base_size: (w, h),
    };

    for z in [0.0f32, 10.0, 100.0, 1000.0] {
        let aabb = unit_box().transform(&Mat4::from_translation(Vec3::new(0.0, 0.0, z)));
        assert!(
            !hiz_occluded(&chain, &view.view_projection(), &aabb),
            "far-plane pyramid should never occlude (z={z})"
        );
    }
}

#[test]
fn box_straddling_the_eye_is_never_occluded() {
    let view = forward_view(Vec3::ZERO);
    let (w, h) = (64u32, 64u32);
    let levels = reference_chain(vec![0.0; (w * h) as usize], w, h, 4);
    let chain = HiZChain {
        levels: &levels,
        base_size: (w, h),
    };

    // A box reaching behind the eye has an unbounded footprint; the test
    // must conservatively keep it even against an all-near pyramid.
    let huge = Aabb {
        min: Vec3::splat(-10.0),
        max: Vec3::splat(10.0),
    };
    assert!(!hiz_occluded(&chain, &view.view_projection(), &huge));
}
