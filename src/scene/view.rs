//! Frame View
//!
//! Per-frame view inputs supplied by the host (which owns the camera and the
//! window loop), plus the frustum extracted from them. The frustum is used
//! by the CPU reference culler and mirrors the plane test the culling
//! compute shader performs on the GPU.

use glam::{Mat4, Vec3, Vec4};

use crate::scene::mesh::Aabb;

/// Everything the renderer needs from the host per frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView {
    pub view: Mat4,
    pub proj: Mat4,
    pub eye: Vec3,
}

impl FrameView {
    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.proj * self.view
    }

    #[must_use]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(self.view_projection())
    }
}

/// View frustum as six planes in `ax + by + cz + d >= 0` form.
///
/// Extraction follows the Gribb-Hartmann row method for a depth range of
/// [0, 1] (near maps to z = 0, far to z = 1, matching the Hi-Z convention
/// where larger depth is further from the camera).
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0], // Left:   w + x
            rows[3] - rows[0], // Right:  w - x
            rows[3] + rows[1], // Bottom: w + y
            rows[3] - rows[1], // Top:    w - y
            rows[2],           // Near:   z >= 0 in [0,1] clip space
            rows[3] - rows[2], // Far:    w - z
        ];

        for plane in &mut planes {
            let length = Vec3::new(plane.x, plane.y, plane.z).length();
            if length > 1e-6 {
                *plane /= length;
            } else {
                // Degenerate plane: never rejects.
                *plane = Vec4::ZERO;
            }
        }

        Self { planes }
    }

    /// Plane-AABB test; `false` only when the box is fully outside some
    /// plane, so intersecting and contained boxes both pass.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let extents = aabb.extents();
        for plane in &self.planes {
            if plane.x == 0.0 && plane.y == 0.0 && plane.z == 0.0 {
                continue;
            }
            let normal = Vec3::new(plane.x, plane.y, plane.z);
            let distance = normal.dot(center) + plane.w;
            let radius = extents.dot(normal.abs());
            if distance < -radius {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_view() -> FrameView {
        FrameView {
            view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y),
            proj: Mat4::perspective_rh(60.0_f32.to_radians(), 4.0 / 3.0, 1.0, 2100.0),
            eye: Vec3::new(0.0, 0.0, -5.0),
        }
    }

    fn unit_box_at(p: Vec3) -> Aabb {
        Aabb {
            min: p - Vec3::splat(0.5),
            max: p + Vec3::splat(0.5),
        }
    }

    #[test]
    fn box_in_front_of_camera_is_inside() {
        let frustum = test_view().frustum();
        assert!(frustum.intersects_aabb(&unit_box_at(Vec3::ZERO)));
    }

    #[test]
    fn box_behind_camera_is_outside() {
        let frustum = test_view().frustum();
        assert!(!frustum.intersects_aabb(&unit_box_at(Vec3::new(0.0, 0.0, -50.0))));
    }

    #[test]
    fn box_far_to_the_side_is_outside() {
        let frustum = test_view().frustum();
        assert!(!frustum.intersects_aabb(&unit_box_at(Vec3::new(500.0, 0.0, 10.0))));
    }

    #[test]
    fn box_straddling_a_plane_is_kept() {
        let frustum = test_view().frustum();
        // Near-plane straddler: half in front, half behind the near plane.
        assert!(frustum.intersects_aabb(&Aabb {
            min: Vec3::new(-0.5, -0.5, -4.5),
            max: Vec3::new(0.5, 0.5, -3.0),
        }));
    }
}
