//! Culling Compute Pass
//!
//! One dispatch per non-occluder mesh. Each thread transforms one
//! instance's object-space bounding box to world space, tests it against
//! the view frustum and the Hi-Z pyramid, and appends survivors to the mesh's
//! compacted region via its atomic counter. Counters are reset to zero at
//! the start of every culling pass.
//!
//! The [`reference`] submodule is the CPU mirror of the shader's test; the
//! invariant suite compares drawn-instance totals against it.

use std::borrow::Cow;

use crate::renderer::hiz::HiZPyramid;
use crate::renderer::scene_gpu::{CullParams, GpuScene};

/// Compute shader thread-block size; dispatches are `ceil(n / 64)` groups.
pub const THREAD_BLOCK_SIZE: u32 = 64;

pub struct CullPass {
    pipeline: wgpu::ComputePipeline,
    scene_layout: wgpu::BindGroupLayout,
    hiz_layout: wgpu::BindGroupLayout,
    hiz_bind_group: wgpu::BindGroup,
    data_bind_group: wgpu::BindGroup,
    params_bind_group: wgpu::BindGroup,
}

impl CullPass {
    #[must_use]
    pub fn new(device: &wgpu::Device, hiz: &HiZPyramid, scene: &GpuScene) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/cull.wgsl"))),
        });

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cull Scene Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let hiz_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cull HiZ Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let data_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cull Data Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cull Params Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<CullParams>() as u64
                    ),
                },
                count: None,
            }],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cull Pipeline"),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Cull Pipeline Layout"),
                    bind_group_layouts: &[&scene_layout, &hiz_layout, &data_layout, &params_layout],
                    immediate_size: 0,
                }),
            ),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let hiz_bind_group = Self::build_hiz_bind_group(device, &hiz_layout, hiz);

        let data_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cull Data BG"),
            layout: &data_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene.instance_pool.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: scene.counters.as_entire_binding(),
                },
            ],
        });

        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cull Params BG"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &scene.cull_params,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<CullParams>() as u64),
                }),
            }],
        });

        Self {
            pipeline,
            scene_layout,
            hiz_layout,
            hiz_bind_group,
            data_bind_group,
            params_bind_group,
        }
    }

    fn build_hiz_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        hiz: &HiZPyramid,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cull HiZ BG"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(hiz.chain_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(hiz.sampler()),
                },
            ],
        })
    }

    /// The pyramid views died with a resize; re-point the bind group.
    pub fn rebind_hiz(&mut self, device: &wgpu::Device, hiz: &HiZPyramid) {
        self.hiz_bind_group = Self::build_hiz_bind_group(device, &self.hiz_layout, hiz);
    }

    #[must_use]
    pub fn scene_layout(&self) -> &wgpu::BindGroupLayout {
        &self.scene_layout
    }

    /// Reset every append counter, then dispatch one cull per non-occluder
    /// mesh. Must be recorded after the Hi-Z mip build and before the
    /// command-table patches.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &GpuScene,
        scene_bind_group: &wgpu::BindGroup,
        timestamp_writes: Option<wgpu::ComputePassTimestampWrites<'_>>,
    ) {
        encoder.clear_buffer(&scene.counters, 0, None);

        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Cull Pass"),
            timestamp_writes,
        });
        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, scene_bind_group, &[]);
        cpass.set_bind_group(1, &self.hiz_bind_group, &[]);
        cpass.set_bind_group(2, &self.data_bind_group, &[]);

        for id in scene.culled_meshes() {
            let record = &scene.meshes[id.index()];
            if record.instance_count == 0 {
                continue;
            }
            cpass.set_bind_group(3, &self.params_bind_group, &[scene.cull_params_offset(id)]);
            let groups = record.instance_count.div_ceil(THREAD_BLOCK_SIZE);
            cpass.dispatch_workgroups(groups, 1, 1);
        }
    }
}

/// CPU mirror of the culling shader, used to predict GPU results in tests
/// and to validate drawn-instance totals against a reference.
pub mod reference {
    use glam::{Mat4, Vec2, Vec3};

    use crate::scene::mesh::{Aabb, InstanceData};
    use crate::scene::view::{FrameView, Frustum};

    /// A CPU copy of the Hi-Z chain: per level, texels row-major.
    pub struct HiZChain<'a> {
        pub levels: &'a [Vec<f32>],
        pub base_size: (u32, u32),
    }

    impl HiZChain<'_> {
        fn level_size(&self, level: usize) -> (u32, u32) {
            (
                (self.base_size.0 >> level).max(1),
                (self.base_size.1 >> level).max(1),
            )
        }

        fn sample(&self, level: usize, uv: Vec2) -> f32 {
            let (w, h) = self.level_size(level);
            let x = ((uv.x * w as f32) as i64).clamp(0, i64::from(w) - 1) as usize;
            let y = ((uv.y * h as f32) as i64).clamp(0, i64::from(h) - 1) as usize;
            self.levels[level][y * w as usize + x]
        }
    }

    /// Screen-space footprint of a world-space box: uv rectangle and the
    /// nearest normalized depth. `None` when the box reaches behind the eye.
    fn footprint(view_proj: &Mat4, aabb: &Aabb) -> Option<(Vec2, Vec2, f32)> {
        let mut uv_min = Vec2::splat(1.0);
        let mut uv_max = Vec2::splat(0.0);
        let mut nearest_z = 1.0f32;
        for corner in aabb.corners() {
            let clip = *view_proj * corner.extend(1.0);
            if clip.w <= 0.0 {
                return None;
            }
            let ndc = Vec3::new(clip.x, clip.y, clip.z) / clip.w;
            let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
            uv_min = uv_min.min(uv);
            uv_max = uv_max.max(uv);
            nearest_z = nearest_z.min(ndc.z);
        }
        Some((
            uv_min.clamp(Vec2::ZERO, Vec2::ONE),
            uv_max.clamp(Vec2::ZERO, Vec2::ONE),
            nearest_z.max(0.0),
        ))
    }

    /// Mirror of the shader's Hi-Z rejection test.
    #[must_use]
    pub fn hiz_occluded(chain: &HiZChain<'_>, view_proj: &Mat4, world_aabb: &Aabb) -> bool {
        let Some((uv_min, uv_max, nearest_z)) = footprint(view_proj, world_aabb) else {
            return false;
        };

        let size_px = (uv_max - uv_min) * Vec2::new(chain.base_size.0 as f32, chain.base_size.1 as f32);
        let max_px = size_px.x.max(size_px.y).max(1.0);
        let lod = (max_px.log2().ceil() as usize).clamp(0, chain.levels.len() - 1);

        let max_depth = chain
            .sample(lod, uv_min)
            .max(chain.sample(lod, Vec2::new(uv_max.x, uv_min.y)))
            .max(chain.sample(lod, Vec2::new(uv_min.x, uv_max.y)))
            .max(chain.sample(lod, uv_max));

        max_depth < nearest_z
    }

    /// Indices of the instances that survive the frustum test (and the
    /// Hi-Z test when a chain is supplied), in source order. This is the
    /// set the GPU pass appends, up to append ordering.
    #[must_use]
    pub fn cull_instances(
        view: &FrameView,
        object_aabb: &Aabb,
        instances: &[InstanceData],
        chain: Option<&HiZChain<'_>>,
    ) -> Vec<usize> {
        let frustum = Frustum::from_matrix(view.view_projection());
        let view_proj = view.view_projection();

        instances
            .iter()
            .enumerate()
            .filter_map(|(i, inst)| {
                let world_aabb = object_aabb.transform(&inst.world_matrix());
                if !frustum.intersects_aabb(&world_aabb) {
                    return None;
                }
                if let Some(chain) = chain {
                    if hiz_occluded(chain, &view_proj, &world_aabb) {
                        return None;
                    }
                }
                Some(i)
            })
            .collect()
    }
}
