//! Scene Constant Layout
//!
//! Bit-exact GPU layout of the per-frame scene constants: view/projection
//! matrices, viewport, eye position, ambient term and a bounded light
//! array. The byte layout is part of the external shader contract and is
//! locked down by tests.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::scene::view::FrameView;

/// Maximum number of lights in the scene constant block.
pub const MAX_LIGHTS: usize = 16;

/// One light record, 48 bytes. Directional lights use `direction` and
/// `strength`; point/spot lights additionally use position, falloff range
/// and spot power.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub strength: [f32; 3],
    pub falloff_start: f32,
    pub direction: [f32; 3],
    pub falloff_end: f32,
    pub position: [f32; 3],
    pub spot_power: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            strength: [0.5, 0.5, 0.5],
            falloff_start: 1.0,
            direction: [0.0, -1.0, 0.0],
            falloff_end: 10.0,
            position: [0.0, 0.0, 0.0],
            spot_power: 64.0,
        }
    }
}

impl Light {
    #[must_use]
    pub fn directional(direction: [f32; 3], strength: [f32; 3]) -> Self {
        Self {
            direction,
            strength,
            ..Self::default()
        }
    }
}

/// Ambient term plus light array, owned by the renderer and writable by the
/// host between frames.
#[derive(Debug, Clone, Copy)]
pub struct Lighting {
    pub ambient: [f32; 4],
    pub lights: [Light; MAX_LIGHTS],
}

impl Default for Lighting {
    /// Three-directional-light outdoor rig.
    fn default() -> Self {
        let mut lights = [Light {
            strength: [0.0; 3],
            ..Light::default()
        }; MAX_LIGHTS];
        lights[0] = Light::directional([0.577_35, -0.577_35, 0.577_35], [0.8, 0.8, 0.8]);
        lights[1] = Light::directional([-0.577_35, -0.577_35, 0.577_35], [0.4, 0.4, 0.4]);
        lights[2] = Light::directional([0.0, -0.707, -0.707], [0.2, 0.2, 0.2]);
        Self {
            ambient: [0.25, 0.25, 0.35, 1.0],
            lights,
        }
    }
}

/// Per-frame scene constants, 944 bytes, written each frame into the
/// current upload-ring slot. Matrices are column-major as WGSL expects.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneConstants {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub viewport_size: [f32; 4],
    pub eye_pos: [f32; 3],
    pub _pad: f32,
    pub ambient: [f32; 4],
    pub lights: [Light; MAX_LIGHTS],
}

impl SceneConstants {
    #[must_use]
    pub fn new(view: &FrameView, viewport: (f32, f32), lighting: &Lighting) -> Self {
        Self {
            view: view.view.to_cols_array_2d(),
            proj: view.proj.to_cols_array_2d(),
            viewport_size: [viewport.0, viewport.1, 0.0, 0.0],
            eye_pos: view.eye.to_array(),
            _pad: 0.0,
            ambient: lighting.ambient,
            lights: lighting.lights,
        }
    }

    #[must_use]
    pub fn eye(&self) -> Vec3 {
        Vec3::from_array(self.eye_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_is_48_bytes() {
        assert_eq!(std::mem::size_of::<Light>(), 48);
        assert_eq!(std::mem::offset_of!(Light, direction), 16);
        assert_eq!(std::mem::offset_of!(Light, spot_power), 44);
    }

    #[test]
    fn scene_constants_layout_is_bit_exact() {
        assert_eq!(std::mem::size_of::<SceneConstants>(), 944);
        assert_eq!(std::mem::offset_of!(SceneConstants, proj), 64);
        assert_eq!(std::mem::offset_of!(SceneConstants, viewport_size), 128);
        assert_eq!(std::mem::offset_of!(SceneConstants, eye_pos), 144);
        assert_eq!(std::mem::offset_of!(SceneConstants, ambient), 160);
        assert_eq!(std::mem::offset_of!(SceneConstants, lights), 176);
    }
}
