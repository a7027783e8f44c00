//! Sampled texture creation with staging upload.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::Buffer;
use crate::command::{CommandPool, OneShot};
use crate::device::Device;
use crate::error::RhiResult;
use crate::image::{cmd_transition_image_layout, Image};

/// Device-local sampled texture.
///
/// Pixel data is uploaded through a host-visible staging buffer and a
/// blocking one-shot command buffer that transitions the image to
/// `TRANSFER_DST_OPTIMAL`, copies, then transitions to
/// `SHADER_READ_ONLY_OPTIMAL`.
pub struct Texture {
    image: Image,
}

impl Texture {
    /// Creates an RGBA8 texture from raw pixel data.
    ///
    /// `pixels` must hold `width * height * 4` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if resource creation, the upload, or a layout
    /// transition fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let format = vk::Format::R8G8B8A8_UNORM;

        let staging = Buffer::new_staging(device.clone(), pixels.len() as vk::DeviceSize)?;
        staging.write_data(0, pixels)?;

        let image = Image::new(
            device.clone(),
            width,
            height,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::ImageAspectFlags::COLOR,
        )?;

        let one_shot = OneShot::begin(pool)?;
        cmd_transition_image_layout(
            one_shot.cmd(),
            image.handle(),
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        one_shot.cmd().copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        cmd_transition_image_layout(
            one_shot.cmd(),
            image.handle(),
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        one_shot.submit_and_wait()?;

        debug!("Texture uploaded ({}x{})", width, height);

        Ok(Self { image })
    }

    /// Returns the image view used for sampling.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Returns the underlying image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image.handle()
    }
}
