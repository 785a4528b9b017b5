#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! GPU-driven indirect-draw occlusion culling for large instanced outdoor
//! scenes: a per-mesh indirect command table dispatched with one multi-draw
//! per frame, fed by a compute pass that tests every instance against the
//! view frustum and a hierarchical max-depth pyramid built from a small set
//! of occluder meshes.

pub mod core;
pub mod errors;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use crate::core::{GpuTimings, RenderContext};
pub use errors::{Result, VeldtError};
pub use renderer::constants::{Light, Lighting, SceneConstants, MAX_LIGHTS};
pub use renderer::indirect::{DrawIndexedArgs, IndirectCommand};
pub use renderer::{FrameStats, Renderer};
pub use scene::{
    Aabb, FrameView, InstanceData, Material, MaterialData, MeshData, MeshId, SceneBuilder,
    SceneCache, SceneDescription, TextureRef, Vertex,
};
pub use settings::RenderSettings;
