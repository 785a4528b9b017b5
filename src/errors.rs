//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`VeldtError`] covers all failure modes including:
//! - GPU initialization failures
//! - Device loss detected at submit or present time
//! - Scene assembly errors
//! - Binary scene-cache decoding errors
//!
//! All public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, VeldtError>`.

use thiserror::Error;

/// The main error type for the Veldt renderer.
#[derive(Error, Debug)]
pub enum VeldtError {
    // ========================================================================
    // GPU & Rendering Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// The device was lost or reset. The context flags itself sticky and the
    /// host must tear down and reinitialize; see
    /// [`RenderContext::is_device_lost`](crate::core::RenderContext::is_device_lost).
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Window system error.
    #[error("Window system error: {0}")]
    WindowError(#[from] raw_window_handle::HandleError),

    // ========================================================================
    // Scene Assembly Errors
    // ========================================================================
    /// A mesh was referenced by name before being registered.
    #[error("Mesh not found: {0}")]
    MeshNotFound(String),

    /// The scene description is inconsistent (bad material index, empty
    /// mesh, occluder name without a mesh).
    #[error("Scene build error: {0}")]
    SceneBuild(String),

    // ========================================================================
    // I/O & Cache Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The binary scene cache is corrupt or truncated. The loader must fall
    /// back to reparsing source assets and rewriting the cache.
    #[error("Scene cache decode error at byte {offset}: {reason}")]
    CacheDecode {
        /// Byte offset at which decoding failed.
        offset: u64,
        /// What went wrong.
        reason: String,
    },
}

/// Alias for `Result<T, VeldtError>`.
pub type Result<T> = std::result::Result<T, VeldtError>;
