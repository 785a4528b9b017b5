//! Render Settings Configuration
//!
//! This module defines the configuration options for the rendering system.
//!
//! # Example
//!
//! ```rust,ignore
//! use veldt::RenderSettings;
//!
//! let settings = RenderSettings {
//!     vsync: false,
//!     pipeline_depth: 3,
//!     enable_culling: true,
//!     ..Default::default()
//! };
//! ```

/// Configuration options for the rendering system.
///
/// # Fields
///
/// | Field | Description | Default |
/// |-------|-------------|---------|
/// | `pipeline_depth` | Frames in flight (upload-ring slots) | `3` |
/// | `hiz_size` | Hi-Z pyramid base dimensions | `(1024, 768)` |
/// | `hiz_mip_count` | Hi-Z mip levels | `8` |
/// | `enable_culling` | Start with GPU culling on | `true` |
/// | `vsync` | Vertical sync enabled | `true` |
/// | `clear_color` | Background clear color | White |
/// | `power_preference` | GPU selection preference | `HighPerformance` |
/// | `required_features` | Required wgpu features | multi-draw + first-instance |
/// | `required_limits` | Required wgpu limits | Default |
/// | `depth_format` | Depth buffer format | `Depth32Float` |
/// | `enable_timestamps` | Request GPU timestamp queries | `true` |
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Number of frames that may be in flight. Per-frame upload buffers and
    /// the submission gate are sized by this value.
    pub pipeline_depth: u32,

    /// Base dimensions of the Hi-Z pyramid. Independent of the window size;
    /// the pyramid is recreated only through [`Renderer::resize_hiz`].
    ///
    /// [`Renderer::resize_hiz`]: crate::renderer::Renderer::resize_hiz
    pub hiz_size: (u32, u32),

    /// Number of mip levels in the Hi-Z pyramid. Each level must be at least
    /// one texel in both dimensions at the base size.
    pub hiz_mip_count: u32,

    /// Whether GPU occlusion/frustum culling starts enabled.
    pub enable_culling: bool,

    /// Enable vertical synchronization.
    pub vsync: bool,

    /// Background clear color for the main render target.
    pub clear_color: wgpu::Color,

    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Required wgpu features. Indirect multi-draw and first-instance
    /// addressing are non-negotiable for this renderer: the command table
    /// is one multi-draw, and each record's `first_instance` selects the
    /// mesh's region of the instance pool.
    pub required_features: wgpu::Features,

    /// Required wgpu limits.
    pub required_limits: wgpu::Limits,

    /// Depth buffer texture format for the main pass and the occluder pass.
    pub depth_format: wgpu::TextureFormat,

    /// Add `TIMESTAMP_QUERY` to the requested features when the adapter
    /// offers it, and resolve per-pass GPU timings each frame.
    pub enable_timestamps: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            pipeline_depth: 3,
            hiz_size: (1024, 768),
            hiz_mip_count: 8,
            enable_culling: true,
            vsync: true,
            clear_color: wgpu::Color {
                r: 1.0,
                g: 1.0,
                b: 1.0,
                a: 1.0,
            },
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::MULTI_DRAW_INDIRECT
                | wgpu::Features::INDIRECT_FIRST_INSTANCE,
            required_limits: wgpu::Limits::default(),
            depth_format: wgpu::TextureFormat::Depth32Float,
            enable_timestamps: true,
        }
    }
}
