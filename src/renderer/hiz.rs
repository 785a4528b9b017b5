//! Hi-Z Pyramid
//!
//! A single-channel float texture whose mip chain stores, per texel, the
//! maximum (furthest) depth of the four corresponding finer texels. Mip 0
//! is produced by rasterizing the occluder subset of the command table;
//! the remaining levels are built by repeated fullscreen max-downsample
//! passes, each sampling mip k-1 while rendering mip k. The finished chain
//! is sampled by the culling compute pass.

use std::borrow::Cow;

use crate::renderer::scene_gpu::GpuScene;
use crate::scene::mesh::Vertex;

pub struct HiZPyramid {
    width: u32,
    height: u32,
    mip_count: u32,

    hiz: wgpu::Texture,
    /// Full mip chain, sampled by the culling pass.
    chain_view: wgpu::TextureView,
    /// One view per level, render-attachment + sampled.
    mip_views: Vec<wgpu::TextureView>,
    hiz_depth_view: wgpu::TextureView,
    /// Point-clamp sampler the culling pass uses on the chain.
    sampler: wgpu::Sampler,

    depth_pipeline: wgpu::RenderPipeline,
    scene_layout: wgpu::BindGroupLayout,
    instance_layout: wgpu::BindGroupLayout,

    downsample_pipeline: wgpu::RenderPipeline,
    downsample_layout: wgpu::BindGroupLayout,
    /// Bind group k sources mip k; it feeds the pass that renders mip k+1.
    downsample_bind_groups: Vec<wgpu::BindGroup>,
}

impl HiZPyramid {
    #[must_use]
    pub fn new(device: &wgpu::Device, size: (u32, u32), mip_count: u32) -> Self {
        let depth_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("HiZ Depth Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/hiz_depth.wgsl"))),
        });
        let downsample_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("HiZ Downsample Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "shaders/hiz_downsample.wgsl"
            ))),
        });

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HiZ Scene Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let instance_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HiZ Instance Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let depth_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("HiZ Depth Pipeline"),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("HiZ Depth Pipeline Layout"),
                    bind_group_layouts: &[&scene_layout, &instance_layout],
                    immediate_size: 0,
                }),
            ),
            vertex: wgpu::VertexState {
                module: &depth_shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &depth_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R32Float,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let downsample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("HiZ Downsample Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let downsample_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("HiZ Downsample Pipeline"),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("HiZ Downsample Pipeline Layout"),
                    bind_group_layouts: &[&downsample_layout],
                    immediate_size: 0,
                }),
            ),
            vertex: wgpu::VertexState {
                module: &downsample_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &downsample_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R32Float,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("HiZ Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let (hiz, chain_view, mip_views, hiz_depth_view, downsample_bind_groups) =
            Self::create_targets(device, size, mip_count, &downsample_layout);

        Self {
            width: size.0,
            height: size.1,
            mip_count,
            hiz,
            chain_view,
            mip_views,
            hiz_depth_view,
            sampler,
            depth_pipeline,
            scene_layout,
            instance_layout,
            downsample_pipeline,
            downsample_layout,
            downsample_bind_groups,
        }
    }

    fn create_targets(
        device: &wgpu::Device,
        size: (u32, u32),
        mip_count: u32,
        downsample_layout: &wgpu::BindGroupLayout,
    ) -> (
        wgpu::Texture,
        wgpu::TextureView,
        Vec<wgpu::TextureView>,
        wgpu::TextureView,
        Vec<wgpu::BindGroup>,
    ) {
        let extent = wgpu::Extent3d {
            width: size.0,
            height: size.1,
            depth_or_array_layers: 1,
        };
        let hiz = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("HiZ Pyramid"),
            size: extent,
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let chain_view = hiz.create_view(&wgpu::TextureViewDescriptor::default());

        let mip_views: Vec<wgpu::TextureView> = (0..mip_count)
            .map(|level| {
                hiz.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("HiZ Mip"),
                    format: None,
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    aspect: wgpu::TextureAspect::All,
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    base_array_layer: 0,
                    array_layer_count: Some(1),
                    usage: None,
                })
            })
            .collect();

        let hiz_depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("HiZ Depth"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let hiz_depth_view = hiz_depth.create_view(&wgpu::TextureViewDescriptor::default());

        let downsample_bind_groups: Vec<wgpu::BindGroup> = (0..mip_count)
            .map(|level| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("HiZ Downsample BG"),
                    layout: downsample_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&mip_views[level as usize]),
                    }],
                })
            })
            .collect();

        (hiz, chain_view, mip_views, hiz_depth_view, downsample_bind_groups)
    }

    /// Drop and recreate the pyramid textures at a new base size. The
    /// caller must have drained the GPU first.
    pub fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        let (hiz, chain_view, mip_views, hiz_depth_view, downsample_bind_groups) =
            Self::create_targets(device, size, self.mip_count, &self.downsample_layout);
        self.width = size.0;
        self.height = size.1;
        self.hiz = hiz;
        self.chain_view = chain_view;
        self.mip_views = mip_views;
        self.hiz_depth_view = hiz_depth_view;
        self.downsample_bind_groups = downsample_bind_groups;
        log::info!("HiZ pyramid resized to {}x{}", size.0, size.1);
    }

    /// Rasterize the occluder subset into mip 0. Both targets clear to 1.0
    /// (far); occluders draw with their full source instance lists.
    pub fn record_occluder_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &GpuScene,
        scene_bind_group: &wgpu::BindGroup,
        instance_bind_group: &wgpu::BindGroup,
        occluder_args: &wgpu::Buffer,
    ) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("HiZ Occluder Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.mip_views[0],
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.hiz_depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.depth_pipeline);
        rpass.set_bind_group(0, scene_bind_group, &[]);
        rpass.set_bind_group(1, instance_bind_group, &[]);
        rpass.set_vertex_buffer(0, scene.vertex_buffer.slice(..));
        rpass.set_index_buffer(scene.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        rpass.multi_draw_indexed_indirect(occluder_args, 0, scene.occluder_count);
    }

    /// Build mips 1..M by repeated max-downsample.
    pub fn record_mip_build(&self, encoder: &mut wgpu::CommandEncoder) {
        for level in 1..self.mip_count {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("HiZ Downsample Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.mip_views[level as usize],
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(&self.downsample_pipeline);
            rpass.set_bind_group(0, &self.downsample_bind_groups[(level - 1) as usize], &[]);
            rpass.draw(0..3, 0..1);
        }
    }

    #[must_use]
    pub fn chain_view(&self) -> &wgpu::TextureView {
        &self.chain_view
    }

    #[must_use]
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    #[must_use]
    pub fn scene_layout(&self) -> &wgpu::BindGroupLayout {
        &self.scene_layout
    }

    #[must_use]
    pub fn instance_layout(&self) -> &wgpu::BindGroupLayout {
        &self.instance_layout
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }
}

/// CPU reference of the max-downsample used by the mip-build pass; the
/// monotonicity property tests run against this.
#[must_use]
pub fn downsample_max(src: &[f32], src_w: u32, src_h: u32) -> (Vec<f32>, u32, u32) {
    let dst_w = (src_w / 2).max(1);
    let dst_h = (src_h / 2).max(1);
    let mut dst = vec![0.0f32; (dst_w * dst_h) as usize];
    for y in 0..dst_h {
        for x in 0..dst_w {
            let limit_x = src_w - 1;
            let limit_y = src_h - 1;
            let x0 = (2 * x).min(limit_x);
            let y0 = (2 * y).min(limit_y);
            let x1 = (2 * x + 1).min(limit_x);
            let y1 = (2 * y + 1).min(limit_y);
            let sample = |sx: u32, sy: u32| src[(sy * src_w + sx) as usize];
            dst[(y * dst_w + x) as usize] = sample(x0, y0)
                .max(sample(x1, y0))
                .max(sample(x0, y1))
                .max(sample(x1, y1));
        }
    }
    (dst, dst_w, dst_h)
}

/// Build the full reference chain, mip 0 included.
#[must_use]
pub fn reference_chain(base: Vec<f32>, width: u32, height: u32, mip_count: u32) -> Vec<Vec<f32>> {
    let mut levels = Vec::with_capacity(mip_count as usize);
    let mut current = base;
    let (mut w, mut h) = (width, height);
    for _ in 1..mip_count {
        let (next, nw, nh) = downsample_max(&current, w, h);
        levels.push(current);
        current = next;
        w = nw;
        h = nh;
    }
    levels.push(current);
    levels
}
