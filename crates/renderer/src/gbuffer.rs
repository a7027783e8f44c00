//! Offscreen attachment set for the deferred pass.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use deferred_rhi::command::{CommandPool, OneShot};
use deferred_rhi::device::Device;
use deferred_rhi::image::{cmd_transition_image_layout, find_depth_format, Image};
use deferred_rhi::render_pass::{ALBEDO_FORMAT, NORMAL_FORMAT};
use deferred_rhi::RhiResult;

/// Albedo, normal and depth attachments sized to the current swapchain
/// extent.
///
/// Lives and dies with the swapchain: never resized in place, always
/// dropped and rebuilt as a unit on recreate.
pub struct GBuffer {
    albedo: Image,
    normal: Image,
    depth: Image,
    depth_format: vk::Format,
}

impl GBuffer {
    /// Creates the attachment set and moves the depth image into its
    /// attachment layout.
    ///
    /// # Errors
    ///
    /// Returns an error if no supported depth format exists or any
    /// image creation or transition fails.
    pub fn new(
        device: Arc<Device>,
        instance: &ash::Instance,
        pool: &CommandPool,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let albedo = Image::new(
            device.clone(),
            extent.width,
            extent.height,
            ALBEDO_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::ImageAspectFlags::COLOR,
        )?;

        let normal = Image::new(
            device.clone(),
            extent.width,
            extent.height,
            NORMAL_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::ImageAspectFlags::COLOR,
        )?;

        let depth_format = find_depth_format(instance, device.physical_device())?;
        let depth = Image::new(
            device.clone(),
            extent.width,
            extent.height,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::ImageAspectFlags::DEPTH,
        )?;

        let one_shot = OneShot::begin(pool)?;
        cmd_transition_image_layout(
            one_shot.cmd(),
            depth.handle(),
            depth_format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;
        one_shot.submit_and_wait()?;

        debug!(
            "Created G-buffer {}x{} (depth: {:?})",
            extent.width, extent.height, depth_format
        );

        Ok(Self {
            albedo,
            normal,
            depth,
            depth_format,
        })
    }

    /// Albedo attachment view.
    #[inline]
    pub fn albedo_view(&self) -> vk::ImageView {
        self.albedo.view()
    }

    /// Normal attachment view.
    #[inline]
    pub fn normal_view(&self) -> vk::ImageView {
        self.normal.view()
    }

    /// Depth attachment view.
    #[inline]
    pub fn depth_view(&self) -> vk::ImageView {
        self.depth.view()
    }

    /// Selected depth attachment format.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}
