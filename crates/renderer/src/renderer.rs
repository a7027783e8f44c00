//! The deferred renderer.
//!
//! Owns the whole GPU context and drives the per-frame protocol: wait
//! on the frame slot, acquire, claim the image, refresh the uniform
//! payload, re-record the overlay, submit, present. Swapchain-extent-
//! dependent objects live in [`FrameResources`], which is dropped and
//! rebuilt as a unit on recreate; its field order is the teardown
//! order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec2, Vec3, Vec4};
use tracing::{debug, info, warn};

use deferred_core::Timer;
use deferred_overlay::{Overlay, OverlayParams};
use deferred_platform::{Surface, Window, get_required_extensions};
use deferred_resources::{Model, TextureData};
use deferred_rhi::buffer::{Buffer, BufferUsage};
use deferred_rhi::command::{CommandBuffer, CommandPool};
use deferred_rhi::descriptor::{
    self, DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout,
};
use deferred_rhi::device::Device;
use deferred_rhi::instance::Instance;
use deferred_rhi::physical_device::select_physical_device;
use deferred_rhi::pipeline::{
    CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use deferred_rhi::render_pass::{Framebuffer, RenderPass};
use deferred_rhi::sampler::Sampler;
use deferred_rhi::shader::{Shader, ShaderStage};
use deferred_rhi::swapchain::Swapchain;
use deferred_rhi::texture::Texture;
use deferred_rhi::vertex::Vertex;
use deferred_rhi::{RhiError, RhiResult};

use crate::error::RendererResult;
use crate::frame_sync::FrameSyncController;
use crate::gbuffer::GBuffer;
use crate::ubo::SceneUbo;

/// World-space light position folded into the light matrix.
const LIGHT_POSITION: Vec3 = Vec3::new(10.0, 10.0, 10.0);

/// Startup configuration for [`Renderer::new`].
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Path to the OBJ model to load.
    pub model_path: PathBuf,
    /// Explicit diffuse texture path. When absent, the material's
    /// map_Kd (resolved next to the model) is used, then a 1x1 white
    /// fallback.
    pub texture_path: Option<PathBuf>,
    /// Directory holding the compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
    /// Request the Khronos validation layer.
    pub enable_validation: bool,
}

/// Scene assets that survive swapchain recreation.
struct SceneResources {
    geometry_vert: Shader,
    geometry_frag: Shader,
    lighting_vert: Shader,
    lighting_frag: Shader,
    geometry_set_layout: DescriptorSetLayout,
    lighting_set_layout: DescriptorSetLayout,
    sampler: Sampler,
    texture: Texture,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

/// Everything sized to the swapchain extent.
///
/// Field order is teardown order: pipelines and framebuffers before
/// the render passes they target, descriptor sets (plain handles)
/// before their pool, the G-buffer last of the attachments.
struct FrameResources {
    main_commands: Vec<CommandBuffer>,
    overlay_commands: Vec<CommandBuffer>,
    framebuffers: Vec<Framebuffer>,
    overlay_framebuffers: Vec<Framebuffer>,
    geometry_pipeline: Pipeline,
    lighting_pipeline: Pipeline,
    geometry_pipeline_layout: PipelineLayout,
    lighting_pipeline_layout: PipelineLayout,
    deferred_pass: RenderPass,
    overlay_pass: RenderPass,
    geometry_sets: Vec<vk::DescriptorSet>,
    lighting_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
    uniform_buffers: Vec<Buffer>,
    gbuffer: GBuffer,
}

impl FrameResources {
    fn new(
        device: Arc<Device>,
        instance: &ash::Instance,
        swapchain: &Swapchain,
        command_pool: &CommandPool,
        overlay_pool: &CommandPool,
        scene: &SceneResources,
    ) -> RhiResult<Self> {
        let extent = swapchain.extent();
        let image_count = swapchain.image_count() as usize;

        let gbuffer = GBuffer::new(device.clone(), instance, command_pool, extent)?;

        let deferred_pass = RenderPass::new_deferred(
            device.clone(),
            swapchain.format(),
            gbuffer.depth_format(),
        )?;
        let overlay_pass = RenderPass::new_overlay(device.clone(), swapchain.format())?;

        let mut framebuffers = Vec::with_capacity(image_count);
        let mut overlay_framebuffers = Vec::with_capacity(image_count);
        for i in 0..image_count {
            framebuffers.push(Framebuffer::new(
                device.clone(),
                &deferred_pass,
                &[
                    swapchain.image_view(i),
                    gbuffer.albedo_view(),
                    gbuffer.normal_view(),
                    gbuffer.depth_view(),
                ],
                extent,
            )?);
            overlay_framebuffers.push(Framebuffer::new(
                device.clone(),
                &overlay_pass,
                &[swapchain.image_view(i)],
                extent,
            )?);
        }

        let geometry_pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[scene.geometry_set_layout.handle()],
            &[],
        )?;
        let lighting_pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[scene.lighting_set_layout.handle()],
            &[],
        )?;

        let geometry_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&scene.geometry_vert)
            .fragment_shader(&scene.geometry_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .depth_test(vk::CompareOp::LESS, true)
            .color_attachment_count(2)
            .render_pass(deferred_pass.handle(), 0)
            .build(device.clone(), &geometry_pipeline_layout)?;

        // Fullscreen triangle: vertices come from the vertex index, no
        // buffer bound and nothing to cull.
        let lighting_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&scene.lighting_vert)
            .fragment_shader(&scene.lighting_frag)
            .cull_mode(CullMode::None)
            .render_pass(deferred_pass.handle(), 1)
            .build(device.clone(), &lighting_pipeline_layout)?;

        let mut uniform_buffers = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            uniform_buffers.push(Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                SceneUbo::SIZE as vk::DeviceSize,
            )?);
        }

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(2 * image_count as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(image_count as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::INPUT_ATTACHMENT)
                .descriptor_count(3 * image_count as u32),
        ];
        let descriptor_pool =
            DescriptorPool::new(device.clone(), 2 * image_count as u32, &pool_sizes)?;

        let geometry_layouts = vec![scene.geometry_set_layout.handle(); image_count];
        let lighting_layouts = vec![scene.lighting_set_layout.handle(); image_count];
        let geometry_sets = descriptor_pool.allocate(&geometry_layouts)?;
        let lighting_sets = descriptor_pool.allocate(&lighting_layouts)?;

        for i in 0..image_count {
            write_descriptor_sets(
                &device,
                geometry_sets[i],
                lighting_sets[i],
                &uniform_buffers[i],
                scene,
                &gbuffer,
            );
        }

        let mut main_commands = Vec::with_capacity(image_count);
        let mut overlay_commands = Vec::with_capacity(image_count);
        for i in 0..image_count {
            let cmd = CommandBuffer::new(device.clone(), command_pool)?;
            record_main_commands(
                &cmd,
                extent,
                &deferred_pass,
                &framebuffers[i],
                &geometry_pipeline,
                &lighting_pipeline,
                &geometry_pipeline_layout,
                &lighting_pipeline_layout,
                geometry_sets[i],
                lighting_sets[i],
                scene,
            )?;
            main_commands.push(cmd);
            overlay_commands.push(CommandBuffer::new(device.clone(), overlay_pool)?);
        }

        debug!(
            "Built frame resources: {} image(s), {}x{}",
            image_count, extent.width, extent.height
        );

        Ok(Self {
            main_commands,
            overlay_commands,
            framebuffers,
            overlay_framebuffers,
            geometry_pipeline,
            lighting_pipeline,
            geometry_pipeline_layout,
            lighting_pipeline_layout,
            deferred_pass,
            overlay_pass,
            geometry_sets,
            lighting_sets,
            descriptor_pool,
            uniform_buffers,
            gbuffer,
        })
    }
}

/// Points one image's geometry and lighting sets at their resources.
fn write_descriptor_sets(
    device: &Device,
    geometry_set: vk::DescriptorSet,
    lighting_set: vk::DescriptorSet,
    uniform_buffer: &Buffer,
    scene: &SceneResources,
    gbuffer: &GBuffer,
) {
    let ubo_info = [descriptor::buffer_info(
        uniform_buffer.handle(),
        0,
        SceneUbo::SIZE as vk::DeviceSize,
    )];
    let texture_info = [descriptor::image_info(
        scene.sampler.handle(),
        scene.texture.view(),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )];
    let albedo_info = [descriptor::image_info(
        vk::Sampler::null(),
        gbuffer.albedo_view(),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )];
    let normal_info = [descriptor::image_info(
        vk::Sampler::null(),
        gbuffer.normal_view(),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )];
    let depth_info = [descriptor::image_info(
        vk::Sampler::null(),
        gbuffer.depth_view(),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )];

    // Lighting bindings are 0, 1, 2, 4. Binding 3 is reserved by the
    // compiled shaders and must stay unused.
    let writes = [
        vk::WriteDescriptorSet::default()
            .dst_set(geometry_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&ubo_info),
        vk::WriteDescriptorSet::default()
            .dst_set(geometry_set)
            .dst_binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&texture_info),
        vk::WriteDescriptorSet::default()
            .dst_set(lighting_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&ubo_info),
        vk::WriteDescriptorSet::default()
            .dst_set(lighting_set)
            .dst_binding(1)
            .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
            .image_info(&albedo_info),
        vk::WriteDescriptorSet::default()
            .dst_set(lighting_set)
            .dst_binding(2)
            .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
            .image_info(&normal_info),
        vk::WriteDescriptorSet::default()
            .dst_set(lighting_set)
            .dst_binding(4)
            .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
            .image_info(&depth_info),
    ];
    descriptor::update_descriptor_sets(device, &writes);
}

/// Records one image's static geometry + lighting command buffer.
///
/// Recorded once per rebuild and resubmitted every frame that lands on
/// this image.
#[allow(clippy::too_many_arguments)]
fn record_main_commands(
    cmd: &CommandBuffer,
    extent: vk::Extent2D,
    deferred_pass: &RenderPass,
    framebuffer: &Framebuffer,
    geometry_pipeline: &Pipeline,
    lighting_pipeline: &Pipeline,
    geometry_layout: &PipelineLayout,
    lighting_layout: &PipelineLayout,
    geometry_set: vk::DescriptorSet,
    lighting_set: vk::DescriptorSet,
    scene: &SceneResources,
) -> RhiResult<()> {
    cmd.begin_reusable()?;

    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        },
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 0.0],
            },
        },
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 0.0],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };

    cmd.begin_render_pass(
        deferred_pass.handle(),
        framebuffer.handle(),
        render_area,
        &clear_values,
    );

    cmd.set_viewport(&vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    });
    cmd.set_scissor(&render_area);

    cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, geometry_pipeline.handle());
    cmd.bind_vertex_buffers(0, &[scene.vertex_buffer.handle()], &[0]);
    cmd.bind_index_buffer(scene.index_buffer.handle(), 0, vk::IndexType::UINT32);
    cmd.bind_descriptor_sets(
        vk::PipelineBindPoint::GRAPHICS,
        geometry_layout.handle(),
        0,
        &[geometry_set],
        &[],
    );
    cmd.draw_indexed(scene.index_count, 1, 0, 0, 0);

    cmd.next_subpass();

    cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, lighting_pipeline.handle());
    cmd.set_viewport(&vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    });
    cmd.set_scissor(&render_area);
    cmd.bind_descriptor_sets(
        vk::PipelineBindPoint::GRAPHICS,
        lighting_layout.handle(),
        0,
        &[lighting_set],
        &[],
    );
    cmd.draw(3, 1, 0, 0);

    cmd.end_render_pass();
    cmd.end()
}

/// The renderer: GPU context, scene assets, per-frame protocol.
///
/// Field order doubles as teardown order; every wrapper also holds the
/// device `Arc`, so the logical device outlives them all.
pub struct Renderer {
    overlay: Overlay,
    frame_sync: FrameSyncController,
    frame_resources: Option<FrameResources>,
    scene: SceneResources,
    overlay_pool: CommandPool,
    command_pool: CommandPool,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
    timer: Timer,
    framebuffer_resized: bool,
}

impl Renderer {
    /// Creates the full rendering context for `window` and uploads the
    /// scene assets.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal: no capable adapter, missing assets,
    /// or a failed Vulkan object creation.
    pub fn new(window: &Window, config: &RendererConfig) -> RendererResult<Self> {
        let display_handle = window
            .display_handle()
            .map_err(|e| deferred_core::Error::Window(format!("No display handle: {}", e)))?;
        let surface_extensions = get_required_extensions(display_handle.as_raw())?;

        let instance = Instance::new(config.enable_validation, &surface_extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
        )?;
        let device = Device::new(&instance, &physical)?;

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let overlay_pool = CommandPool::new(device.clone(), graphics_family)?;

        let (scene, material) = load_scene(device.clone(), &command_pool, config)?;

        let frame_resources = FrameResources::new(
            device.clone(),
            instance.handle(),
            &swapchain,
            &command_pool,
            &overlay_pool,
            &scene,
        )?;

        let frame_sync =
            FrameSyncController::new(device.clone(), swapchain.image_count() as usize)?;

        let params = OverlayParams::with_material(
            material.ambient.to_array(),
            material.diffuse.to_array(),
            material.specular.to_array(),
            material.emission.to_array(),
            material.shininess,
        );
        let overlay = Overlay::new(
            device.clone(),
            window.inner(),
            frame_resources.overlay_pass.handle(),
            swapchain.image_count() as usize,
            &config.shader_dir,
            params,
        )?;

        info!("Renderer initialized ({}x{})", width, height);

        Ok(Self {
            overlay,
            frame_sync,
            frame_resources: Some(frame_resources),
            scene,
            overlay_pool,
            command_pool,
            swapchain,
            device,
            surface,
            instance,
            timer: Timer::new(),
            framebuffer_resized: false,
        })
    }

    /// Forwards a window event to the overlay.
    ///
    /// Returns true when the overlay consumed it.
    pub fn on_window_event(
        &mut self,
        window: &Window,
        event: &winit::event::WindowEvent,
    ) -> bool {
        self.overlay.on_window_event(window.inner(), event)
    }

    /// Flags that the window was resized; consumed on the next present.
    pub fn note_resize(&mut self) {
        self.framebuffer_resized = true;
    }

    /// Renders and presents one frame.
    ///
    /// Presentation staleness is recovered internally via the
    /// swapchain recreate path and is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error on any non-recoverable Vulkan failure.
    pub fn render_frame(&mut self, window: &Window) -> RendererResult<()> {
        self.frame_sync.wait_current()?;

        let image_available = self.frame_sync.current().image_available_handle();
        let render_finished = self.frame_sync.current().render_finished_handle();
        let fence = self.frame_sync.current().in_flight_fence_handle();

        // Frame aborted here leaves the slot fence signaled, so the
        // next iteration's wait returns immediately.
        let (image_index, suboptimal) = match self.swapchain.acquire_next_image(image_available) {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain(window)?;
                return Ok(());
            }
            Err(e) => return Err(RhiError::VulkanError(e).into()),
        };
        let image = image_index as usize;

        self.frame_sync.wait_image_claimant(image)?;
        self.frame_sync.claim(image);

        let extent = self.swapchain.extent();
        let frame = self
            .frame_resources
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("Frame resources missing".to_string()))?;

        let ubo = build_scene_ubo(&self.overlay.params, self.timer.elapsed_secs(), extent);
        frame.uniform_buffers[image].write_data(0, ubo.as_bytes())?;

        let overlay_frame = self.overlay.prepare_frame(window.inner());
        let overlay_cmd = &frame.overlay_commands[image];
        overlay_cmd.reset()?;
        overlay_cmd.begin()?;
        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }];
        overlay_cmd.begin_render_pass(
            frame.overlay_pass.handle(),
            frame.overlay_framebuffers[image].handle(),
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            &clear,
        );
        self.overlay
            .paint(&self.overlay_pool, overlay_cmd, overlay_frame, image, extent)?;
        overlay_cmd.end_render_pass();
        overlay_cmd.end()?;

        self.frame_sync.reset_current()?;

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [
            frame.main_commands[image].handle(),
            frame.overlay_commands[image].handle(),
        ];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { self.device.submit_graphics(&[submit_info], fence)? };

        let present_result =
            self.swapchain
                .present(self.device.present_queue(), image_index, render_finished);

        match present_result {
            Ok(present_suboptimal) => {
                if suboptimal || present_suboptimal || self.framebuffer_resized {
                    self.recreate_swapchain(window)?;
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain(window)?;
            }
            Err(e) => return Err(RhiError::VulkanError(e).into()),
        }

        self.frame_sync.advance();
        Ok(())
    }

    /// Tears down and rebuilds everything sized to the swapchain.
    ///
    /// A zero-size framebuffer (minimized window) defers the rebuild:
    /// the resize flag stays set and the next redraw retries.
    fn recreate_swapchain(&mut self, window: &Window) -> RendererResult<()> {
        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            self.framebuffer_resized = true;
            return Ok(());
        }
        self.framebuffer_resized = false;

        self.device.wait_idle()?;

        // Dropping the aggregate tears down in its declared order.
        self.frame_resources = None;

        self.swapchain
            .recreate(&self.instance, self.surface.handle(), width, height)?;

        let frame_resources = FrameResources::new(
            self.device.clone(),
            self.instance.handle(),
            &self.swapchain,
            &self.command_pool,
            &self.overlay_pool,
            &self.scene,
        )?;

        let image_count = self.swapchain.image_count() as usize;
        self.overlay.rebuild(
            &self.overlay_pool,
            frame_resources.overlay_pass.handle(),
            image_count,
        )?;
        self.frame_sync.reset_images(image_count);
        self.frame_resources = Some(frame_resources);

        info!("Recreated swapchain resources: {}x{}", width, height);
        Ok(())
    }

    /// Blocks until the GPU finished all submitted work.
    ///
    /// Call before dropping the renderer on shutdown.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // No submitted work may outlive the objects it references.
        if let Err(e) = self.device.wait_idle() {
            warn!("Device wait failed during renderer teardown: {}", e);
        }
    }
}

/// Loads the model and texture and creates the static GPU assets.
///
/// Also returns the model's material so the overlay pickers can be
/// seeded from it.
fn load_scene(
    device: Arc<Device>,
    command_pool: &CommandPool,
    config: &RendererConfig,
) -> RendererResult<(SceneResources, deferred_resources::Material)> {
    let model = Model::load(&config.model_path)?;

    let vertex_buffer = Buffer::new_device_local_with_data(
        device.clone(),
        command_pool,
        BufferUsage::Vertex,
        bytemuck::cast_slice(&model.vertices),
    )?;
    let index_buffer = Buffer::new_device_local_with_data(
        device.clone(),
        command_pool,
        BufferUsage::Index,
        bytemuck::cast_slice(&model.indices),
    )?;

    let texture_path = config.texture_path.clone().or_else(|| {
        model.material.diffuse_texture.as_ref().map(|name| {
            config
                .model_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(name)
        })
    });
    let texture = match texture_path {
        Some(path) => {
            let data = TextureData::load(&path)?;
            Texture::from_rgba8(
                device.clone(),
                command_pool,
                &data.pixels,
                data.width,
                data.height,
            )?
        }
        None => {
            debug!("No diffuse texture, using 1x1 white fallback");
            Texture::from_rgba8(device.clone(), command_pool, &[255, 255, 255, 255], 1, 1)?
        }
    };

    let sampler = Sampler::new_linear_repeat(device.clone())?;

    let shader = |name: &str, stage| {
        Shader::from_spirv_file(device.clone(), &config.shader_dir.join(name), stage, "main")
    };
    let geometry_vert = shader("geometry.vert.spv", ShaderStage::Vertex)?;
    let geometry_frag = shader("geometry.frag.spv", ShaderStage::Fragment)?;
    let lighting_vert = shader("lighting.vert.spv", ShaderStage::Vertex)?;
    let lighting_frag = shader("lighting.frag.spv", ShaderStage::Fragment)?;

    let geometry_set_layout =
        DescriptorSetLayout::new(device.clone(), &geometry_layout_bindings())?;
    let lighting_set_layout =
        DescriptorSetLayout::new(device.clone(), &lighting_layout_bindings())?;

    let scene = SceneResources {
        geometry_vert,
        geometry_frag,
        lighting_vert,
        lighting_frag,
        geometry_set_layout,
        lighting_set_layout,
        sampler,
        texture,
        vertex_buffer,
        index_buffer,
        index_count: model.indices.len() as u32,
    };
    Ok((scene, model.material))
}

/// Geometry pass descriptor bindings: uniform block and the material
/// texture sampler.
fn geometry_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        DescriptorBindingBuilder::uniform_buffer(
            0,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        ),
        DescriptorBindingBuilder::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
    ]
}

/// Lighting pass descriptor bindings.
///
/// Binding 3 is intentionally absent. The compiled lighting shaders
/// number their input attachments 1, 2 and 4, so the gap is part of
/// the interface and must not be renumbered away.
fn lighting_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 4] {
    [
        DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT),
        DescriptorBindingBuilder::input_attachment(1, vk::ShaderStageFlags::FRAGMENT),
        DescriptorBindingBuilder::input_attachment(2, vk::ShaderStageFlags::FRAGMENT),
        DescriptorBindingBuilder::input_attachment(4, vk::ShaderStageFlags::FRAGMENT),
    ]
}

/// Fills the uniform payload from the overlay parameters.
fn build_scene_ubo(params: &OverlayParams, elapsed_secs: f32, extent: vk::Extent2D) -> SceneUbo {
    let model = Mat4::from_rotation_z(elapsed_secs * 25.0_f32.to_radians())
        * Mat4::from_scale(Vec3::splat(params.scale));
    let eye = Vec3::splat(params.zoom / 3.0_f32.sqrt());
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Z);
    let aspect = extent.width as f32 / (extent.height as f32).max(1.0);
    let mut proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 100.0);
    // GL-convention projection; Vulkan's clip space points Y down.
    proj.y_axis.y *= -1.0;

    SceneUbo {
        model,
        view,
        proj,
        light: Mat4::from_translation(LIGHT_POSITION),
        ambient_color: color(params.ambient_color),
        diffuse_color: color(params.diffuse_color),
        specular_color: color(params.specular_color),
        emission_color: color(params.emission_color),
        shininess: params.shininess,
        model_stage_on: params.model_stage as i32,
        texture_stage_on: params.texture_stage as i32,
        lighting_stage_on: params.lighting_stage as i32,
        specular_on: params.specular as i32,
        diffuse_on: params.diffuse as i32,
        ambient_on: params.ambient as i32,
        display_mode: params.display_mode.as_i32(),
        win_dim: Vec2::new(extent.width as f32, extent.height as f32),
        _padding: [0.0; 2],
    }
}

#[inline]
fn color(rgb: [f32; 3]) -> Vec4 {
    Vec4::new(rgb[0], rgb[1], rgb[2], 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deferred_overlay::DisplayMode;

    #[test]
    fn test_lighting_bindings_skip_index_three() {
        let bindings = lighting_layout_bindings();
        let numbers: Vec<u32> = bindings.iter().map(|b| b.binding).collect();
        assert_eq!(numbers, vec![0, 1, 2, 4]);
        assert_eq!(
            bindings[1].descriptor_type,
            vk::DescriptorType::INPUT_ATTACHMENT
        );
        assert_eq!(
            bindings[3].descriptor_type,
            vk::DescriptorType::INPUT_ATTACHMENT
        );
    }

    #[test]
    fn test_geometry_bindings() {
        let bindings = geometry_layout_bindings();
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(
            bindings[0].descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(
            bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_scene_ubo_reflects_params() {
        let params = OverlayParams {
            lighting_stage: true,
            specular: true,
            shininess: 64.0,
            display_mode: DisplayMode::Normal,
            ..Default::default()
        };
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        let ubo = build_scene_ubo(&params, 0.0, extent);
        assert_eq!(ubo.lighting_stage_on, 1);
        assert_eq!(ubo.specular_on, 1);
        assert_eq!(ubo.diffuse_on, 0);
        assert_eq!(ubo.shininess, 64.0);
        assert_eq!(ubo.display_mode, 2);
        assert_eq!(ubo.win_dim, Vec2::new(1920.0, 1080.0));
    }

    #[test]
    fn test_projection_flips_y_for_vulkan() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let ubo = build_scene_ubo(&OverlayParams::default(), 0.0, extent);
        assert!(ubo.proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_model_matrix_is_identity_at_start_with_unit_scale() {
        let extent = vk::Extent2D {
            width: 100,
            height: 100,
        };
        let ubo = build_scene_ubo(&OverlayParams::default(), 0.0, extent);
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }
}
