//! Renderer
//!
//! The frame orchestrator. Per frame it advances the upload-ring slot,
//! writes the scene constants and dirty material rows, records the Hi-Z
//! occluder pass, the mip build and the culling dispatches when culling is
//! enabled, patches the indirect command table from the append counters,
//! issues one multi-draw-indexed-indirect over every mesh, copies the
//! patched counts for the HUD, submits and presents.
//!
//! Ordering inside the frame (occluders, then mip build, then culling,
//! then patching, then the main draw) is carried by the recording order
//! of the frame's single submission.

pub mod constants;
pub mod cull;
pub mod hiz;
pub mod indirect;
pub mod scene_gpu;

use std::borrow::Cow;

use crate::core::context::{RenderContext, TimestampQueries};
use crate::core::frame::FrameSlots;
use crate::errors::{Result, VeldtError};
use crate::scene::builder::SceneDescription;
use crate::scene::material::Material;
use crate::scene::mesh::Vertex;
use crate::scene::view::FrameView;
use crate::settings::RenderSettings;

use constants::{Lighting, SceneConstants};
use cull::CullPass;
use hiz::HiZPyramid;
use indirect::CommandTable;
use scene_gpu::GpuScene;

/// Summary of one rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    pub frame_number: u64,
    pub slot: u32,
    pub culling_enabled: bool,
}

pub struct Renderer {
    scene: GpuScene,
    hiz: HiZPyramid,
    cull: CullPass,
    commands: CommandTable,
    frames: FrameSlots,
    materials: Vec<Material>,
    pub lighting: Lighting,

    main_pipeline: wgpu::RenderPipeline,
    main_scene_bind_groups: Vec<wgpu::BindGroup>,
    main_instance_bind_group: wgpu::BindGroup,
    hiz_scene_bind_groups: Vec<wgpu::BindGroup>,
    hiz_instance_bind_group: wgpu::BindGroup,
    cull_scene_bind_groups: Vec<wgpu::BindGroup>,
}

impl Renderer {
    pub fn new(
        ctx: &RenderContext,
        settings: &RenderSettings,
        description: &SceneDescription,
    ) -> Result<Self> {
        let device = &ctx.device;

        if description.meshes.is_empty() {
            return Err(VeldtError::SceneBuild("scene has no meshes".into()));
        }

        let scene = GpuScene::new(device, description);
        let hiz = HiZPyramid::new(device, settings.hiz_size, settings.hiz_mip_count);
        let cull = CullPass::new(device, &hiz, &scene);
        let commands = CommandTable::new(device, &scene, settings.enable_culling);
        let frames = FrameSlots::new(
            device,
            ctx.pipeline_depth(),
            description.materials.len() as u32,
        );
        let mut materials = description.materials.clone();
        // Every slot uploads every row once on the first frames.
        for material in &mut materials {
            material.frames_dirty = ctx.pipeline_depth();
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/scene.wgsl"))),
        });

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let instance_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Instance Layout"),
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

        let main_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(
                &device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Scene Pipeline Layout"),
                    bind_group_layouts: &[&scene_layout, &instance_layout],
                    immediate_size: 0,
                }),
            ),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.color_format(),
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
                format: ctx.depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let slot_count = frames.slot_count();
        let main_scene_bind_groups = (0..slot_count)
            .map(|slot| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Scene BG"),
                    layout: &scene_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: frames.scene_constants(slot).as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: frames.material_table(slot).as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();
        let main_instance_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Instance BG"),
            layout: &instance_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene.instance_pool.as_entire_binding(),
            }],
        });

        let hiz_scene_bind_groups = (0..slot_count)
            .map(|slot| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("HiZ Scene BG"),
                    layout: hiz.scene_layout(),
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: frames.scene_constants(slot).as_entire_binding(),
                    }],
                })
            })
            .collect();
        let hiz_instance_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("HiZ Instance BG"),
            layout: hiz.instance_layout(),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene.instance_pool.as_entire_binding(),
            }],
        });

        let cull_scene_bind_groups = (0..slot_count)
            .map(|slot| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Cull Scene BG"),
                    layout: cull.scene_layout(),
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: frames.scene_constants(slot).as_entire_binding(),
                    }],
                })
            })
            .collect();

        Ok(Self {
            scene,
            hiz,
            cull,
            commands,
            frames,
            materials,
            lighting: Lighting::default(),
            main_pipeline,
            main_scene_bind_groups,
            main_instance_bind_group,
            hiz_scene_bind_groups,
            hiz_instance_bind_group,
            cull_scene_bind_groups,
        })
    }

    /// Toggle GPU culling. The command table is rewritten during the next
    /// frame's recording.
    pub fn set_culling(&mut self, enabled: bool) {
        self.commands.set_culling(enabled);
    }

    #[must_use]
    pub fn culling_enabled(&self) -> bool {
        self.commands.culling_enabled()
    }

    #[must_use]
    pub fn gpu_scene(&self) -> &GpuScene {
        &self.scene
    }

    #[must_use]
    pub fn command_table(&self) -> &CommandTable {
        &self.commands
    }

    /// Mutable access to the material list; edited rows re-upload into
    /// every in-flight slot on the following frames.
    pub fn materials_mut(&mut self) -> &mut [Material] {
        &mut self.materials
    }

    /// Per-mesh drawn-instance counts of the most recent completed frame,
    /// as copied into the readback buffer for the HUD.
    pub fn drawn_instances(&self, ctx: &RenderContext) -> Result<Vec<u32>> {
        self.commands.read_drawn_instances(&ctx.device)
    }

    /// Sum of the per-mesh drawn-instance counts.
    pub fn total_drawn_instances(&self, ctx: &RenderContext) -> Result<u32> {
        Ok(self.drawn_instances(ctx)?.iter().sum())
    }

    /// Most recent per-pass GPU timings, when timestamp queries are on.
    pub fn gpu_timings(&self, ctx: &RenderContext) -> Option<Result<crate::core::GpuTimings>> {
        ctx.timestamps().map(|t| t.read(&ctx.device))
    }

    /// Recreate the Hi-Z pyramid at a new base size. Hard-syncs the GPU.
    pub fn resize_hiz(&mut self, ctx: &RenderContext, size: (u32, u32)) -> Result<()> {
        ctx.wait_for_gpu()?;
        self.hiz.resize(&ctx.device, size);
        self.cull.rebind_hiz(&ctx.device, &self.hiz);
        Ok(())
    }

    /// Render one frame.
    pub fn render_frame(&mut self, ctx: &mut RenderContext, view: &FrameView) -> Result<FrameStats> {
        if ctx.is_device_lost() {
            return Err(VeldtError::DeviceLost(
                "context is flagged lost; reinitialize before rendering".into(),
            ));
        }

        let slot = ctx.begin_frame()?;
        let frame_number = ctx.frame_number();
        let culling = self.commands.culling_enabled();

        // 1. Upload per-frame constants into this slot's ring buffers.
        let (width, height) = ctx.size();
        let constants = SceneConstants::new(view, (width as f32, height as f32), &self.lighting);
        self.frames.write_scene_constants(&ctx.queue, slot, &constants);
        self.frames
            .write_dirty_materials(&ctx.queue, slot, &mut self.materials);

        // 2. Consume a pending culling toggle: rewrite the command table
        //    before this frame's copies and draws are recorded.
        self.commands.apply_mode_transition(&ctx.queue, &self.scene);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // 3. Occluders -> mip chain -> culling -> counter patches.
        if culling {
            self.hiz.record_occluder_pass(
                &mut encoder,
                &self.scene,
                &self.hiz_scene_bind_groups[slot as usize],
                &self.hiz_instance_bind_group,
                &self.commands.occluder_args,
            );
            self.hiz.record_mip_build(&mut encoder);
            self.cull.record(
                &mut encoder,
                &self.scene,
                &self.cull_scene_bind_groups[slot as usize],
                ctx.timestamps().map(TimestampQueries::compute_pass_writes),
            );
            self.commands.record_count_patches(&mut encoder, &self.scene);
        }

        // 4. Main pass: one indirect multi-draw over every mesh.
        let frame = ctx.acquire_frame()?;
        let surface_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Main Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(ctx.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &ctx.depth_texture_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: ctx.timestamps().map(TimestampQueries::render_pass_writes),
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
            rpass.set_scissor_rect(0, 0, width, height);
            rpass.set_pipeline(&self.main_pipeline);
            rpass.set_bind_group(0, &self.main_scene_bind_groups[slot as usize], &[]);
            rpass.set_bind_group(1, &self.main_instance_bind_group, &[]);
            rpass.set_vertex_buffer(0, self.scene.vertex_buffer.slice(..));
            rpass.set_index_buffer(self.scene.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            rpass.multi_draw_indexed_indirect(
                &self.commands.args_buffer,
                0,
                self.scene.mesh_count(),
            );
        }

        // 5. HUD readback of the patched counts, then timestamp resolve.
        self.commands.record_readback(&mut encoder);
        if let Some(timestamps) = ctx.timestamps() {
            timestamps.record_resolve(&mut encoder);
        }

        let submission = ctx.queue.submit(Some(encoder.finish()));
        frame.present();
        ctx.end_frame(submission);

        Ok(FrameStats {
            frame_number,
            slot,
            culling_enabled: culling,
        })
    }
}
