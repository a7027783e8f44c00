//! Vulkan mesh backend for the overlay.
//!
//! Consumes egui's tessellated output: uploads texture deltas through
//! one-shot staged copies, streams vertex/index data into host-visible
//! buffers, and records textured triangle draws with per-primitive
//! scissor rectangles.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use deferred_rhi::buffer::{Buffer, BufferUsage};
use deferred_rhi::command::{CommandBuffer, CommandPool};
use deferred_rhi::descriptor::{
    self, DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout,
};
use deferred_rhi::device::Device;
use deferred_rhi::pipeline::{
    ColorBlendAttachment, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use deferred_rhi::sampler::Sampler;
use deferred_rhi::shader::{Shader, ShaderStage};
use deferred_rhi::texture::Texture;
use deferred_rhi::{RhiError, RhiResult};

/// Descriptor budget per type, sized generously so the backend never
/// has to grow the pool.
const POOL_SIZE_PER_TYPE: u32 = 1000;

/// Stride of egui's tessellated vertex (pos2 + uv2 + rgba8).
const OVERLAY_VERTEX_STRIDE: u32 = 20;

/// One texture the overlay registered: the GPU resource, its
/// descriptor set, and a CPU copy of the pixels so partial deltas and
/// swapchain rebuilds can re-upload without egui resending data.
struct OverlayTexture {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    texture: Texture,
    set: vk::DescriptorSet,
}

/// Per-frame-slot streaming buffers for overlay geometry.
#[derive(Default)]
struct FrameGeometry {
    vertex: Option<Buffer>,
    index: Option<Buffer>,
}

/// Records overlay draw data into an already-begun render pass.
pub struct MeshRenderer {
    device: Arc<Device>,
    set_layout: DescriptorSetLayout,
    pipeline_layout: PipelineLayout,
    pipeline: Pipeline,
    sampler: Sampler,
    descriptor_pool: DescriptorPool,
    textures: HashMap<egui::TextureId, OverlayTexture>,
    frames: Vec<FrameGeometry>,
    vertex_shader: Shader,
    fragment_shader: Shader,
}

impl MeshRenderer {
    /// Creates the backend against a compatible render pass.
    ///
    /// `frame_count` sizes the streaming buffer ring and must cover the
    /// presentable image count.
    ///
    /// # Errors
    ///
    /// Returns an error if shader loading or any Vulkan object creation
    /// fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        frame_count: usize,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join("overlay.vert.spv"),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join("overlay.frag.spv"),
            ShaderStage::Fragment,
            "main",
        )?;

        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            &[DescriptorBindingBuilder::combined_image_sampler(
                0,
                vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;

        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(std::mem::size_of::<[f32; 2]>() as u32);
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[set_layout.handle()],
            &[push_constant_range],
        )?;

        let pipeline = build_pipeline(
            device.clone(),
            &pipeline_layout,
            &vertex_shader,
            &fragment_shader,
            render_pass,
        )?;

        let sampler = Sampler::new_linear_repeat(device.clone())?;
        let descriptor_pool = create_descriptor_pool(device.clone())?;

        let mut frames = Vec::with_capacity(frame_count);
        frames.resize_with(frame_count, FrameGeometry::default);

        Ok(Self {
            device,
            set_layout,
            pipeline_layout,
            pipeline,
            sampler,
            descriptor_pool,
            textures: HashMap::new(),
            frames,
            vertex_shader,
            fragment_shader,
        })
    }

    /// Rebuilds the pipeline against a new render pass and re-uploads
    /// every registered texture from its CPU copy.
    ///
    /// Called from the swapchain recreate path, after the device is
    /// idle.
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline creation or a texture upload fails.
    pub fn rebuild(
        &mut self,
        pool: &CommandPool,
        render_pass: vk::RenderPass,
        frame_count: usize,
    ) -> RhiResult<()> {
        self.pipeline = build_pipeline(
            self.device.clone(),
            &self.pipeline_layout,
            &self.vertex_shader,
            &self.fragment_shader,
            render_pass,
        )?;

        self.frames.clear();
        self.frames.resize_with(frame_count, FrameGeometry::default);

        for entry in self.textures.values_mut() {
            entry.texture = Texture::from_rgba8(
                self.device.clone(),
                pool,
                &entry.pixels,
                entry.width,
                entry.height,
            )?;
            write_texture_set(&self.device, entry.set, &self.sampler, entry.texture.view());
        }

        debug!(
            "Rebuilt overlay backend: {} texture(s), {} frame slot(s)",
            self.textures.len(),
            frame_count
        );

        Ok(())
    }

    /// Applies egui's texture delta: uploads new/changed textures and
    /// frees retired ones.
    ///
    /// # Errors
    ///
    /// Returns an error if an upload or descriptor operation fails.
    pub fn update_textures(
        &mut self,
        pool: &CommandPool,
        delta: &egui::TexturesDelta,
    ) -> RhiResult<()> {
        for (id, image_delta) in &delta.set {
            self.apply_image_delta(pool, *id, image_delta)?;
        }

        for id in &delta.free {
            if let Some(entry) = self.textures.remove(id) {
                self.descriptor_pool.free(&[entry.set])?;
                debug!("Freed overlay texture {:?}", id);
            }
        }

        Ok(())
    }

    fn apply_image_delta(
        &mut self,
        pool: &CommandPool,
        id: egui::TextureId,
        image_delta: &egui::epaint::ImageDelta,
    ) -> RhiResult<()> {
        let patch = rgba_bytes(&image_delta.image);
        let [patch_width, patch_height] = [
            image_delta.image.width() as u32,
            image_delta.image.height() as u32,
        ];

        match image_delta.pos {
            None => {
                // Full upload, replaces any previous contents.
                let texture = Texture::from_rgba8(
                    self.device.clone(),
                    pool,
                    &patch,
                    patch_width,
                    patch_height,
                )?;

                let set = match self.textures.get(&id) {
                    Some(existing) => existing.set,
                    None => self.descriptor_pool.allocate(&[self.set_layout.handle()])?[0],
                };
                write_texture_set(&self.device, set, &self.sampler, texture.view());

                self.textures.insert(
                    id,
                    OverlayTexture {
                        pixels: patch,
                        width: patch_width,
                        height: patch_height,
                        texture,
                        set,
                    },
                );
            }
            Some([x, y]) => {
                // Partial update: patch the CPU copy, re-upload whole.
                let entry = self.textures.get_mut(&id).ok_or_else(|| {
                    RhiError::InvalidHandle(format!(
                        "Partial update for unregistered overlay texture {:?}",
                        id
                    ))
                })?;

                blit_pixels(
                    &mut entry.pixels,
                    entry.width,
                    &patch,
                    patch_width,
                    patch_height,
                    x as u32,
                    y as u32,
                );

                entry.texture = Texture::from_rgba8(
                    self.device.clone(),
                    pool,
                    &entry.pixels,
                    entry.width,
                    entry.height,
                )?;
                write_texture_set(&self.device, entry.set, &self.sampler, entry.texture.view());
            }
        }

        Ok(())
    }

    /// Records the tessellated primitives into `cmd`.
    ///
    /// Must be called inside the overlay render pass, after the
    /// matching frame slot's fence has signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if streaming buffer creation or a write fails.
    pub fn record(
        &mut self,
        cmd: &CommandBuffer,
        frame_index: usize,
        extent: vk::Extent2D,
        pixels_per_point: f32,
        primitives: &[egui::ClippedPrimitive],
    ) -> RhiResult<()> {
        let meshes: Vec<&egui::epaint::Mesh> = primitives
            .iter()
            .filter_map(|p| match &p.primitive {
                egui::epaint::Primitive::Mesh(mesh) => Some(mesh),
                egui::epaint::Primitive::Callback(_) => None,
            })
            .collect();
        if meshes.is_empty() {
            return Ok(());
        }

        let mut vertex_bytes = Vec::new();
        let mut index_bytes = Vec::new();
        for mesh in &meshes {
            vertex_bytes.extend_from_slice(bytemuck::cast_slice(&mesh.vertices));
            index_bytes.extend_from_slice(bytemuck::cast_slice(&mesh.indices));
        }

        let frame = self.frames.get_mut(frame_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("Overlay frame index {} out of range", frame_index))
        })?;
        ensure_capacity(
            &self.device,
            &mut frame.vertex,
            BufferUsage::HostVertex,
            vertex_bytes.len(),
        )?;
        ensure_capacity(
            &self.device,
            &mut frame.index,
            BufferUsage::HostIndex,
            index_bytes.len(),
        )?;
        let (vertex_buffer, index_buffer) = match (&frame.vertex, &frame.index) {
            (Some(v), Some(i)) => (v, i),
            _ => unreachable!("ensure_capacity always fills the slot"),
        };
        vertex_buffer.write_data(0, &vertex_bytes)?;
        index_buffer.write_data(0, &index_bytes)?;

        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
        cmd.bind_vertex_buffers(0, &[vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(index_buffer.handle(), 0, vk::IndexType::UINT32);
        cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });

        let screen_size_points = [
            extent.width as f32 / pixels_per_point,
            extent.height as f32 / pixels_per_point,
        ];
        cmd.push_constants(
            self.pipeline_layout.handle(),
            vk::ShaderStageFlags::VERTEX,
            0,
            &screen_size_points,
        );

        let mut vertex_offset = 0i32;
        let mut index_offset = 0u32;
        let mut mesh_iter = meshes.iter();
        for primitive in primitives {
            let egui::epaint::Primitive::Mesh(_) = &primitive.primitive else {
                continue;
            };
            let mesh = match mesh_iter.next() {
                Some(mesh) => mesh,
                None => break,
            };

            let Some(entry) = self.textures.get(&mesh.texture_id) else {
                warn!("Overlay mesh references unknown texture {:?}", mesh.texture_id);
                vertex_offset += mesh.vertices.len() as i32;
                index_offset += mesh.indices.len() as u32;
                continue;
            };

            cmd.set_scissor(&clip_to_scissor(
                primitive.clip_rect,
                pixels_per_point,
                extent,
            ));
            cmd.bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout.handle(),
                0,
                &[entry.set],
                &[],
            );
            cmd.draw_indexed(mesh.indices.len() as u32, 1, index_offset, vertex_offset, 0);

            vertex_offset += mesh.vertices.len() as i32;
            index_offset += mesh.indices.len() as u32;
        }

        Ok(())
    }
}

/// Builds the overlay graphics pipeline for the given render pass.
fn build_pipeline(
    device: Arc<Device>,
    layout: &PipelineLayout,
    vertex_shader: &Shader,
    fragment_shader: &Shader,
    render_pass: vk::RenderPass,
) -> RhiResult<Pipeline> {
    let binding = vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(OVERLAY_VERTEX_STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX);
    let attributes = [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(0),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(8),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R8G8B8A8_UNORM)
            .offset(16),
    ];

    GraphicsPipelineBuilder::new()
        .vertex_shader(vertex_shader)
        .fragment_shader(fragment_shader)
        .vertex_binding(binding)
        .vertex_attributes(&attributes)
        .cull_mode(CullMode::None)
        .color_blend_attachment(ColorBlendAttachment::premultiplied_alpha())
        .render_pass(render_pass, 0)
        .build(device, layout)
}

/// Creates the shared descriptor pool with a generous per-type budget.
fn create_descriptor_pool(device: Arc<Device>) -> RhiResult<DescriptorPool> {
    let types = [
        vk::DescriptorType::SAMPLER,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        vk::DescriptorType::SAMPLED_IMAGE,
        vk::DescriptorType::STORAGE_IMAGE,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
        vk::DescriptorType::INPUT_ATTACHMENT,
    ];
    let pool_sizes: Vec<vk::DescriptorPoolSize> = types
        .iter()
        .map(|&ty| {
            vk::DescriptorPoolSize::default()
                .ty(ty)
                .descriptor_count(POOL_SIZE_PER_TYPE)
        })
        .collect();

    DescriptorPool::new(
        device,
        POOL_SIZE_PER_TYPE * types.len() as u32,
        &pool_sizes,
    )
}

/// Points a texture descriptor set at the given view.
fn write_texture_set(
    device: &Device,
    set: vk::DescriptorSet,
    sampler: &Sampler,
    view: vk::ImageView,
) {
    let image_info = [descriptor::image_info(
        sampler.handle(),
        view,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_info);
    descriptor::update_descriptor_sets(device, &[write]);
}

/// Flattens an egui image into tightly packed RGBA8 bytes.
fn rgba_bytes(image: &egui::epaint::ImageData) -> Vec<u8> {
    match image {
        egui::epaint::ImageData::Color(color) => color
            .pixels
            .iter()
            .flat_map(|c| c.to_array())
            .collect(),
        egui::epaint::ImageData::Font(font) => font
            .srgba_pixels(None)
            .flat_map(|c| c.to_array())
            .collect(),
    }
}

/// Copies a patch of RGBA8 rows into a larger canvas at (x, y).
fn blit_pixels(
    canvas: &mut [u8],
    canvas_width: u32,
    patch: &[u8],
    patch_width: u32,
    patch_height: u32,
    x: u32,
    y: u32,
) {
    let canvas_stride = canvas_width as usize * 4;
    let patch_stride = patch_width as usize * 4;
    for row in 0..patch_height as usize {
        let src = &patch[row * patch_stride..(row + 1) * patch_stride];
        let dst_start = (y as usize + row) * canvas_stride + x as usize * 4;
        canvas[dst_start..dst_start + patch_stride].copy_from_slice(src);
    }
}

/// Converts a clip rectangle in points into a scissor clamped to the
/// framebuffer.
fn clip_to_scissor(
    clip_rect: egui::Rect,
    pixels_per_point: f32,
    extent: vk::Extent2D,
) -> vk::Rect2D {
    let min_x = (clip_rect.min.x * pixels_per_point).max(0.0) as u32;
    let min_y = (clip_rect.min.y * pixels_per_point).max(0.0) as u32;
    let max_x = ((clip_rect.max.x * pixels_per_point) as u32).min(extent.width);
    let max_y = ((clip_rect.max.y * pixels_per_point) as u32).min(extent.height);

    vk::Rect2D {
        offset: vk::Offset2D {
            x: min_x as i32,
            y: min_y as i32,
        },
        extent: vk::Extent2D {
            width: max_x.saturating_sub(min_x),
            height: max_y.saturating_sub(min_y),
        },
    }
}

/// Recreates `slot` when it cannot hold `needed` bytes.
fn ensure_capacity(
    device: &Arc<Device>,
    slot: &mut Option<Buffer>,
    usage: BufferUsage,
    needed: usize,
) -> RhiResult<()> {
    let needed = needed as vk::DeviceSize;
    let adequate = slot.as_ref().is_some_and(|b| b.size() >= needed);
    if !adequate {
        // Grow with headroom so steady UI growth doesn't reallocate
        // every frame.
        let size = (needed * 2).max(4096);
        *slot = Some(Buffer::new(device.clone(), usage, size)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_to_scissor_clamps_to_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let clip = egui::Rect::from_min_max(
            egui::pos2(-10.0, -10.0),
            egui::pos2(10_000.0, 10_000.0),
        );
        let scissor = clip_to_scissor(clip, 1.0, extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_clip_to_scissor_scales_by_dpi() {
        let extent = vk::Extent2D {
            width: 1600,
            height: 1200,
        };
        let clip = egui::Rect::from_min_max(egui::pos2(10.0, 20.0), egui::pos2(110.0, 220.0));
        let scissor = clip_to_scissor(clip, 2.0, extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 20, y: 40 });
        assert_eq!(
            scissor.extent,
            vk::Extent2D {
                width: 200,
                height: 400
            }
        );
    }

    #[test]
    fn test_blit_pixels_places_patch() {
        // 4x2 canvas, 2x1 patch at (1, 1).
        let mut canvas = vec![0u8; 4 * 2 * 4];
        let patch = vec![255u8; 2 * 4];
        blit_pixels(&mut canvas, 4, &patch, 2, 1, 1, 1);

        let row1 = &canvas[4 * 4..];
        assert_eq!(&row1[0..4], &[0, 0, 0, 0]);
        assert_eq!(&row1[4..12], &[255u8; 8][..]);
        assert_eq!(&row1[12..16], &[0, 0, 0, 0]);
        assert_eq!(&canvas[..4 * 4], &[0u8; 16][..]);
    }

    #[test]
    fn test_overlay_vertex_stride_matches_epaint() {
        assert_eq!(
            OVERLAY_VERTEX_STRIDE as usize,
            std::mem::size_of::<egui::epaint::Vertex>()
        );
    }
}
