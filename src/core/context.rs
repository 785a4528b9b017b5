//! Render Context
//!
//! Owns the GPU device, queue, surface and the frame-pacing state: a
//! monotonic frame counter, one remembered submission per pipeline slot
//! (the fence-value-per-slot of a classic frames-in-flight scheme), the
//! sticky device-loss flag, and the optional timestamp query set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use winit::window::Window;

use crate::errors::{Result, VeldtError};
use crate::settings::RenderSettings;

/// GPU timestamp plumbing: a four-entry query set shared by the cull pass
/// (entries 2,3) and the main pass (entries 0,1). Each begin/end pair is
/// scoped to a single pass.
pub struct TimestampQueries {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    staging: wgpu::Buffer,
    period_ns: f32,
}

/// Resolved per-frame GPU timings in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuTimings {
    pub draw_ms: f32,
    pub cull_ms: f32,
}

impl TimestampQueries {
    const COUNT: u32 = 4;

    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let query_set = device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("Frame Timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: Self::COUNT,
        });
        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Timestamp Resolve"),
            size: u64::from(Self::COUNT) * 8,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Timestamp Staging"),
            size: u64::from(Self::COUNT) * 8,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            query_set,
            resolve_buffer,
            staging,
            period_ns: queue.get_timestamp_period(),
        }
    }

    /// Timestamp writes bracketing the main render pass.
    #[must_use]
    pub fn render_pass_writes(&self) -> wgpu::RenderPassTimestampWrites<'_> {
        wgpu::RenderPassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(0),
            end_of_pass_write_index: Some(1),
        }
    }

    /// Timestamp writes bracketing the culling compute pass.
    #[must_use]
    pub fn compute_pass_writes(&self) -> wgpu::ComputePassTimestampWrites<'_> {
        wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(2),
            end_of_pass_write_index: Some(3),
        }
    }

    /// Resolve the query set and stage it for readback; recorded at the
    /// tail of the frame's encoder.
    pub fn record_resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.resolve_query_set(&self.query_set, 0..Self::COUNT, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            0,
            &self.staging,
            0,
            u64::from(Self::COUNT) * 8,
        );
    }

    /// Read back the most recently resolved timings. Blocks on the GPU.
    pub fn read(&self, device: &wgpu::Device) -> Result<GpuTimings> {
        let slice = self.staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| VeldtError::DeviceLost(format!("poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| VeldtError::DeviceLost("map callback dropped".into()))?
            .map_err(|e| VeldtError::DeviceLost(format!("timestamp map failed: {e:?}")))?;

        let ticks: [u64; 4] = {
            let view = slice.get_mapped_range();
            let words: &[u64] = bytemuck::cast_slice(&view[..]);
            [words[0], words[1], words[2], words[3]]
        };
        self.staging.unmap();

        let to_ms = |begin: u64, end: u64| {
            (end.saturating_sub(begin) as f32) * self.period_ns / 1_000_000.0
        };
        Ok(GpuTimings {
            draw_ms: to_ms(ticks[0], ticks[1]),
            cull_ms: to_ms(ticks[2], ticks[3]),
        })
    }
}

/// WGPU core context plus frame pacing.
pub struct RenderContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,

    pub depth_format: wgpu::TextureFormat,
    pub depth_texture_view: wgpu::TextureView,
    pub clear_color: wgpu::Color,

    pipeline_depth: u32,
    frame_number: u64,
    slot_submissions: Vec<Option<wgpu::SubmissionIndex>>,
    device_lost: AtomicBool,
    timestamps: Option<TimestampQueries>,
}

impl RenderContext {
    pub async fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| VeldtError::AdapterRequestFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| VeldtError::AdapterRequestFailed(e.to_string()))?;

        let mut features = settings.required_features;
        let timestamps_supported = adapter
            .features()
            .contains(wgpu::Features::TIMESTAMP_QUERY);
        if settings.enable_timestamps && timestamps_supported {
            features |= wgpu::Features::TIMESTAMP_QUERY;
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: features,
                required_limits: settings.required_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let mut config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| {
                VeldtError::AdapterRequestFailed("Surface not supported by adapter".to_string())
            })?;
        config.present_mode = if settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        config.desired_maximum_frame_latency = settings.pipeline_depth;
        surface.configure(&device, &config);

        let depth_texture_view = Self::create_depth_texture(&device, &config, settings.depth_format);

        let timestamps = (settings.enable_timestamps && timestamps_supported)
            .then(|| TimestampQueries::new(&device, &queue));

        Ok(Self {
            device,
            queue,
            surface,
            config,
            depth_format: settings.depth_format,
            depth_texture_view,
            clear_color: settings.clear_color,
            pipeline_depth: settings.pipeline_depth.max(1),
            frame_number: 0,
            slot_submissions: vec![None; settings.pipeline_depth.max(1) as usize],
            device_lost: AtomicBool::new(false),
            timestamps,
        })
    }

    /// Blocking constructor for hosts without an async runtime.
    pub fn new_blocking(window: Arc<Window>, settings: &RenderSettings) -> Result<Self> {
        pollster::block_on(Self::new(window, settings))
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        format: wgpu::TextureFormat,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture_view =
                Self::create_depth_texture(&self.device, &self.config, self.depth_format);
        }
    }

    /// Advance to the next pipeline slot, blocking until the submission
    /// that last used it has retired. Returns the slot index.
    pub fn begin_frame(&mut self) -> Result<u32> {
        let slot = slot_for_frame(self.frame_number, self.pipeline_depth) as usize;
        if let Some(submission) = self.slot_submissions[slot].take() {
            self.device
                .poll(wgpu::PollType::WaitForSubmissionIndex(submission))
                .map_err(|e| self.flag_lost(format!("slot wait failed: {e}")))?;
        }
        Ok(slot as u32)
    }

    /// Record the submission that owns the current slot and advance the
    /// frame counter. Call once per frame, after `queue.submit`.
    pub fn end_frame(&mut self, submission: wgpu::SubmissionIndex) {
        let slot = slot_for_frame(self.frame_number, self.pipeline_depth) as usize;
        self.slot_submissions[slot] = Some(submission);
        self.frame_number += 1;
    }

    /// Acquire the next swap-chain image. Outdated/lost surfaces are
    /// reconfigured and retried once; fatal errors set the sticky flag.
    pub fn acquire_frame(&mut self) -> Result<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost/outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface.get_current_texture().map_err(|e| {
                    self.flag_lost(format!("surface unrecoverable after reconfigure: {e}"))
                })
            }
            Err(wgpu::SurfaceError::Timeout) => Err(VeldtError::DeviceLost(
                "surface acquire timed out; frame skipped".into(),
            )),
            Err(e) => Err(self.flag_lost(format!("surface acquire failed: {e}"))),
        }
    }

    /// Hard host-side barrier: wait for every submitted command to retire.
    /// Used at startup, shutdown and around resource-graph rebuilds.
    pub fn wait_for_gpu(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| {
                self.device_lost.store(true, Ordering::Relaxed);
                VeldtError::DeviceLost(format!("wait failed: {e}"))
            })
            .map(|_| ())
    }

    fn flag_lost(&self, reason: String) -> VeldtError {
        self.device_lost.store(true, Ordering::Relaxed);
        log::error!("device lost: {reason}");
        VeldtError::DeviceLost(reason)
    }

    /// Sticky flag: once set, frames must stop and the host must rebuild
    /// the context. Distinct from recoverable surface reconfiguration.
    #[must_use]
    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    #[must_use]
    pub fn pipeline_depth(&self) -> u32 {
        self.pipeline_depth
    }

    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[must_use]
    pub fn timestamps(&self) -> Option<&TimestampQueries> {
        self.timestamps.as_ref()
    }
}

/// Round-robin pipeline slot for a frame number.
#[inline]
#[must_use]
pub fn slot_for_frame(frame_number: u64, pipeline_depth: u32) -> u32 {
    (frame_number % u64::from(pipeline_depth.max(1))) as u32
}

#[cfg(test)]
mod tests {
    use super::slot_for_frame;

    #[test]
    fn slots_rotate_round_robin() {
        let slots: Vec<u32> = (0..7).map(|f| slot_for_frame(f, 3)).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn slot_reuse_distance_equals_pipeline_depth() {
        let depth = 3u32;
        for frame in 0..1000u64 {
            // The slot used by frame n is next touched by frame n + depth,
            // so at most `depth` frames are ever in flight.
            assert_eq!(
                slot_for_frame(frame, depth),
                slot_for_frame(frame + u64::from(depth), depth)
            );
        }
    }

    #[test]
    fn zero_depth_clamps_to_one() {
        assert_eq!(slot_for_frame(41, 0), 0);
    }
}
