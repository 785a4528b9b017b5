//! Scene Builder
//!
//! Load-time assembly phase. Meshes arrive keyed by the stable string names
//! the loader produced; the builder attaches instance data, marks occluders,
//! then collapses everything into a dense, occluders-first mesh list. The
//! name map only exists here: once [`SceneBuilder::finish`] runs, the frame
//! loop deals in integer [`MeshId`]s exclusively.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::errors::{Result, VeldtError};
use crate::scene::cache::{CachedMaterial, SceneCache};
use crate::scene::material::{Material, TextureRef};
use crate::scene::mesh::{InstanceData, MeshData, MeshId};

/// Immutable output of the builder: meshes in dense id order (occluders
/// first), the material table, and the host's texture references.
#[derive(Debug)]
pub struct SceneDescription {
    pub meshes: Vec<MeshData>,
    pub materials: Vec<Material>,
    pub diffuse_maps: Vec<TextureRef>,
    pub normal_maps: Vec<TextureRef>,
    /// Number of occluder meshes; they occupy ids `0..occluder_count`.
    pub occluder_count: u32,
}

impl SceneDescription {
    #[must_use]
    pub fn mesh_count(&self) -> u32 {
        self.meshes.len() as u32
    }

    #[must_use]
    pub fn is_occluder(&self, id: MeshId) -> bool {
        id.0 < self.occluder_count
    }

    /// Total instances across all meshes.
    #[must_use]
    pub fn total_instances(&self) -> u32 {
        self.meshes.iter().map(|m| m.instances.len() as u32).sum()
    }
}

/// Mutable scene assembly staging area.
pub struct SceneBuilder {
    meshes: Vec<MeshData>,
    by_name: FxHashMap<String, usize>,
    materials: Vec<Material>,
    diffuse_maps: Vec<TextureRef>,
    normal_maps: Vec<TextureRef>,
    occluder_names: Vec<String>,
}

impl SceneBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            meshes: Vec::new(),
            by_name: FxHashMap::default(),
            materials: Vec::new(),
            diffuse_maps: Vec::new(),
            normal_maps: Vec::new(),
            occluder_names: Vec::new(),
        }
    }

    /// Seed the builder from a decoded scene cache.
    #[must_use]
    pub fn from_cache(cache: SceneCache, pipeline_depth: u32) -> Self {
        let mut builder = Self::new();
        builder.diffuse_maps = cache.diffuse_maps;
        builder.normal_maps = cache.normal_maps;

        let mut materials: Vec<Material> = cache
            .materials
            .into_iter()
            .map(|m| {
                let mut mat = Material::new(m.name, m.table_index, pipeline_depth);
                mat.data = m.data;
                mat
            })
            .collect();
        materials.sort_by_key(|m| m.table_index);
        builder.materials = materials;

        for mesh in cache.meshes {
            builder.add_mesh(mesh);
        }
        builder
    }

    /// Register a mesh. Later registrations under the same name replace the
    /// earlier mesh, keeping its position in the table.
    pub fn add_mesh(&mut self, mesh: MeshData) -> &mut Self {
        match self.by_name.get(&mesh.name) {
            Some(&slot) => self.meshes[slot] = mesh,
            None => {
                self.by_name.insert(mesh.name.clone(), self.meshes.len());
                self.meshes.push(mesh);
            }
        }
        self
    }

    pub fn add_material(&mut self, material: Material) -> &mut Self {
        self.materials.push(material);
        self
    }

    /// Name the meshes that should be rasterized into the Hi-Z pyramid.
    /// The loader decides what occludes; nothing is hard-wired to a
    /// particular mesh name.
    pub fn set_occluders<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        self.occluder_names = names.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    fn mesh_mut(&mut self, name: &str) -> Result<&mut MeshData> {
        match self.by_name.get(name) {
            Some(&slot) => Ok(&mut self.meshes[slot]),
            None => Err(VeldtError::MeshNotFound(name.to_owned())),
        }
    }

    /// Attach one instance to a mesh by name.
    pub fn add_instance(&mut self, name: &str, world: Mat4) -> Result<()> {
        let mesh = self.mesh_mut(name)?;
        let instance = InstanceData::new(world, mesh.tex_transform, mesh.material_index);
        mesh.instances.push(instance);
        Ok(())
    }

    /// Scatter instances of a mesh at the given world positions with a
    /// uniform scale, the pattern used to spread trees, animals and stones
    /// over terrain vertices. Positions are host-supplied so placement stays
    /// deterministic.
    pub fn scatter(&mut self, name: &str, positions: &[Vec3], scale: f32) -> Result<()> {
        let mesh = self.mesh_mut(name)?;
        mesh.instances.reserve(positions.len());
        for &p in positions {
            let world = Mat4::from_translation(p) * Mat4::from_scale(Vec3::splat(scale));
            mesh.instances
                .push(InstanceData::new(world, mesh.tex_transform, mesh.material_index));
        }
        Ok(())
    }

    /// Persistable snapshot of the current meshes and tables.
    #[must_use]
    pub fn to_cache(&self) -> SceneCache {
        SceneCache {
            meshes: self.meshes.clone(),
            diffuse_maps: self.diffuse_maps.clone(),
            normal_maps: self.normal_maps.clone(),
            materials: self
                .materials
                .iter()
                .map(|m| CachedMaterial {
                    name: m.name.clone(),
                    table_index: m.table_index,
                    data: m.data,
                })
                .collect(),
        }
    }

    /// Validate and produce the dense scene description.
    ///
    /// Occluder meshes are moved to the front of the table so the occluder
    /// subset of the indirect command table is the prefix `0..occluder_count`.
    /// Meshes with no attached instances get a single default instance from
    /// their load-time world matrix. The name map dies here.
    pub fn finish(mut self) -> Result<SceneDescription> {
        for name in &self.occluder_names {
            let slot = self
                .by_name
                .get(name)
                .copied()
                .ok_or_else(|| VeldtError::MeshNotFound(name.clone()))?;
            self.meshes[slot].occluder = true;
        }

        let material_count = self.materials.len() as u32;
        for mesh in &mut self.meshes {
            if mesh.vertices.is_empty() || mesh.indices.is_empty() {
                return Err(VeldtError::SceneBuild(format!(
                    "mesh '{}' has no geometry",
                    mesh.name
                )));
            }
            if material_count > 0 && mesh.material_index >= material_count {
                return Err(VeldtError::SceneBuild(format!(
                    "mesh '{}' references material {} of {}",
                    mesh.name, mesh.material_index, material_count
                )));
            }
            if mesh.instances.is_empty() {
                log::debug!("mesh '{}' has no instances; adding default", mesh.name);
                mesh.instances.push(InstanceData::new(
                    mesh.world,
                    mesh.tex_transform,
                    mesh.material_index,
                ));
            }
        }

        // Stable partition: occluders first, original order preserved within
        // each group so cached command tables stay reproducible.
        let (occluders, others): (Vec<MeshData>, Vec<MeshData>) =
            self.meshes.into_iter().partition(|m| m.occluder);
        let occluder_count = occluders.len() as u32;

        let mut meshes = occluders;
        meshes.extend(others);

        log::info!(
            "scene built: {} meshes ({} occluders), {} materials",
            meshes.len(),
            occluder_count,
            self.materials.len()
        );

        Ok(SceneDescription {
            meshes,
            materials: self.materials,
            diffuse_maps: self.diffuse_maps,
            normal_maps: self.normal_maps,
            occluder_count,
        })
    }
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self::new()
    }
}
