//! Render pass and framebuffer management.
//!
//! This module builds the two passes the frame graph needs: a deferred
//! pass whose geometry subpass fills the G-buffer and whose lighting
//! subpass composites it into the swapchain image, and an overlay pass
//! that draws UI on top of the lit image without clearing it.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Format of the G-buffer albedo attachment.
pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Format of the G-buffer normal attachment.
///
/// Signed 16-bit floats keep world-space normals without the bias and
/// scale round trip an UNORM target would force.
pub const NORMAL_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Attachment indices within the deferred render pass.
pub const DEFERRED_ATTACHMENT_SWAPCHAIN: u32 = 0;
pub const DEFERRED_ATTACHMENT_ALBEDO: u32 = 1;
pub const DEFERRED_ATTACHMENT_NORMAL: u32 = 2;
pub const DEFERRED_ATTACHMENT_DEPTH: u32 = 3;

/// Subpass indices within the deferred render pass.
pub const SUBPASS_GEOMETRY: u32 = 0;
pub const SUBPASS_LIGHTING: u32 = 1;

/// Vulkan render pass wrapper.
pub struct RenderPass {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan render pass handle.
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Creates the deferred render pass.
    ///
    /// Attachment layout:
    ///
    /// | Index | Attachment | Geometry subpass  | Lighting subpass |
    /// |-------|-----------|--------------------|------------------|
    /// | 0     | swapchain | unused             | color output     |
    /// | 1     | albedo    | color output       | input attachment |
    /// | 2     | normal    | color output       | input attachment |
    /// | 3     | depth     | depth/stencil      | input attachment |
    ///
    /// The subpass dependency between geometry and lighting is
    /// `BY_REGION` so tilers can keep the G-buffer on chip.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new_deferred(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let attachments = deferred_attachment_descriptions(color_format, depth_format);

        let swapchain_ref = [vk::AttachmentReference::default()
            .attachment(DEFERRED_ATTACHMENT_SWAPCHAIN)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let gbuffer_color_refs = [
            vk::AttachmentReference::default()
                .attachment(DEFERRED_ATTACHMENT_ALBEDO)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            vk::AttachmentReference::default()
                .attachment(DEFERRED_ATTACHMENT_NORMAL)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        ];
        let depth_write_ref = vk::AttachmentReference::default()
            .attachment(DEFERRED_ATTACHMENT_DEPTH)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let input_refs = [
            vk::AttachmentReference::default()
                .attachment(DEFERRED_ATTACHMENT_ALBEDO)
                .layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            vk::AttachmentReference::default()
                .attachment(DEFERRED_ATTACHMENT_NORMAL)
                .layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            vk::AttachmentReference::default()
                .attachment(DEFERRED_ATTACHMENT_DEPTH)
                .layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ];

        let subpasses = [
            vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&gbuffer_color_refs)
                .depth_stencil_attachment(&depth_write_ref),
            vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&swapchain_ref)
                .input_attachments(&input_refs),
        ];

        let dependencies = [
            // Wait for previous-frame reads before the geometry
            // subpass starts clearing attachments.
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(SUBPASS_GEOMETRY)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
            // G-buffer writes must land before the lighting subpass
            // reads them as input attachments.
            vk::SubpassDependency::default()
                .src_subpass(SUBPASS_GEOMETRY)
                .dst_subpass(SUBPASS_LIGHTING)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                )
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ)
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        ];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!(
            "Created deferred render pass (color: {:?}, depth: {:?})",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
        })
    }

    /// Creates the overlay render pass.
    ///
    /// Loads the already-lit swapchain image instead of clearing it, so
    /// UI geometry composites over the scene.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new_overlay(device: Arc<Device>, color_format: vk::Format) -> RhiResult<Self> {
        let attachments = [overlay_attachment_description(color_format)];

        let color_ref = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref)];

        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            )];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!("Created overlay render pass (color: {:?})", color_format);

        Ok(Self {
            device,
            render_pass,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass");
    }
}

/// Builds the four attachment descriptions for the deferred pass.
fn deferred_attachment_descriptions(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 4] {
    [
        // Swapchain color, written by the lighting subpass only.
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        // Albedo, written in geometry and consumed in lighting. The
        // contents die with the pass, so no store.
        vk::AttachmentDescription::default()
            .format(ALBEDO_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        // Normal.
        vk::AttachmentDescription::default()
            .format(NORMAL_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        // Depth.
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
    ]
}

/// Builds the single attachment description for the overlay pass.
fn overlay_attachment_description(color_format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::LOAD)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Vulkan framebuffer wrapper.
pub struct Framebuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan framebuffer handle.
    framebuffer: vk::Framebuffer,
    /// Framebuffer dimensions.
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a framebuffer binding the given views to a render pass.
    ///
    /// The views must match the render pass attachment order.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Returns the framebuffer dimensions.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbuffer_formats() {
        assert_eq!(ALBEDO_FORMAT, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(NORMAL_FORMAT, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn test_deferred_attachments_clear_on_load() {
        let attachments = deferred_attachment_descriptions(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(attachments.len(), 4);
        for attachment in &attachments {
            assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        }
    }

    #[test]
    fn test_deferred_only_swapchain_stored() {
        let attachments = deferred_attachment_descriptions(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(
            attachments[DEFERRED_ATTACHMENT_SWAPCHAIN as usize].store_op,
            vk::AttachmentStoreOp::STORE
        );
        for attachment in &attachments[1..] {
            assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
        }
    }

    #[test]
    fn test_deferred_gbuffer_readable_after_pass() {
        let attachments = deferred_attachment_descriptions(
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::D32_SFLOAT,
        );
        for index in [
            DEFERRED_ATTACHMENT_ALBEDO,
            DEFERRED_ATTACHMENT_NORMAL,
            DEFERRED_ATTACHMENT_DEPTH,
        ] {
            assert_eq!(
                attachments[index as usize].final_layout,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            );
        }
    }

    #[test]
    fn test_overlay_attachment_preserves_scene() {
        let attachment = overlay_attachment_description(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            attachment.initial_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }
}
