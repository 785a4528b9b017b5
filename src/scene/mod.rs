//! Scene Data and Assembly
//!
//! CPU-side scene model: meshes, instances, materials, the binary scene
//! cache, and the build phase that turns name-keyed loader output into the
//! dense id-indexed tables the frame loop consumes.

pub mod builder;
pub mod cache;
pub mod material;
pub mod mesh;
pub mod view;

pub use builder::{SceneBuilder, SceneDescription};
pub use cache::{CachedMaterial, SceneCache};
pub use material::{Material, MaterialData, TextureRef};
pub use mesh::{Aabb, InstanceData, MeshData, MeshId, Vertex};
pub use view::{FrameView, Frustum};
