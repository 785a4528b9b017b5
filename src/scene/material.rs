//! Materials and Texture References
//!
//! The material table lives in a per-frame upload buffer indexed by each
//! instance's material index. Texture decoding is the loader's job; the
//! core only tracks stable integer indices into the host's diffuse and
//! normal map sets.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// GPU material record, indexed by `InstanceData::material_index`.
///
/// Field order matches the persisted cache record: albedo, Fresnel R0,
/// roughness, material transform, map indices, padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    pub diffuse_albedo: [f32; 4],
    pub fresnel_r0: [f32; 3],
    pub roughness: f32,
    pub mat_transform: [[f32; 4]; 4],
    pub diffuse_map_index: u32,
    pub normal_map_index: u32,
    pub _pad: [u32; 2],
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            diffuse_albedo: [1.0, 1.0, 1.0, 1.0],
            fresnel_r0: [0.01, 0.01, 0.01],
            roughness: 0.5,
            mat_transform: Mat4::IDENTITY.to_cols_array_2d(),
            diffuse_map_index: 0,
            normal_map_index: 0,
            _pad: [0; 2],
        }
    }
}

/// A named material plus its slot in the GPU material table.
///
/// `frames_dirty` starts at the pipeline depth so that every in-flight
/// upload ring slot re-copies the row once; mutating the data re-arms it.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub table_index: u32,
    pub frames_dirty: u32,
    pub data: MaterialData,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>, table_index: u32, pipeline_depth: u32) -> Self {
        Self {
            name: name.into(),
            table_index,
            frames_dirty: pipeline_depth,
            data: MaterialData::default(),
        }
    }

    /// Mutate the material data and re-arm per-slot re-upload.
    pub fn update(&mut self, pipeline_depth: u32, f: impl FnOnce(&mut MaterialData)) {
        f(&mut self.data);
        self.frames_dirty = pipeline_depth;
    }
}

/// Reference to a texture the host loader owns: file name, lookup name and
/// the stable index the material table records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRef {
    pub filename: String,
    pub name: String,
    pub index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_data_is_112_bytes() {
        assert_eq!(std::mem::size_of::<MaterialData>(), 112);
        assert_eq!(std::mem::offset_of!(MaterialData, mat_transform), 32);
        assert_eq!(std::mem::offset_of!(MaterialData, diffuse_map_index), 96);
    }

    #[test]
    fn update_rearms_dirty_counter() {
        let mut mat = Material::new("bark", 0, 3);
        mat.frames_dirty = 0;
        mat.update(3, |d| d.roughness = 0.25);
        assert_eq!(mat.frames_dirty, 3);
        assert!((mat.data.roughness - 0.25).abs() < f32::EPSILON);
    }
}
