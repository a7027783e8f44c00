//! Device-local images, views, and layout transitions.
//!
//! # Overview
//!
//! - [`Image`] wraps a VkImage plus its dedicated memory allocation
//! - [`transition_barrier`] maps a legal layout-transition edge to its
//!   barrier parameters
//! - [`find_depth_format`] picks a supported depth attachment format
//!
//! Layout transitions form a deliberate three-edge state machine. Uploads
//! move an image undefined -> transfer-dst, then transfer-dst ->
//! shader-read-only; depth attachments move undefined ->
//! depth-attachment-optimal on creation. Any other requested pair is a
//! programming error and is rejected before any barrier is recorded.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::allocate_memory;

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: &[vk::Format] = &[
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// A 2D device image with its own memory allocation and view.
///
/// # Resource Destruction
///
/// Resources are destroyed in the following order:
/// 1. Image view
/// 2. Image
/// 3. Memory
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Image {
    /// Creates an image and binds freshly allocated memory to it.
    ///
    /// The view is created over the given aspect (color or depth).
    ///
    /// # Errors
    ///
    /// Returns an error if image creation, memory selection/allocation,
    /// binding, or view creation fails.
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let memory = match allocate_memory(&device, requirements, memory_flags) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        unsafe {
            device.handle().bind_image_memory(image, memory, 0)?;
        }

        let view = create_image_view(&device, image, format, aspect)?;

        debug!("Created {}x{} image ({:?})", width, height, format);

        Ok(Self {
            device,
            image,
            memory,
            view,
            format,
            extent: vk::Extent2D { width, height },
        })
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view handle.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
            self.device.handle().free_memory(self.memory, None);
        }
        debug!(
            "Destroyed {}x{} image ({:?})",
            self.extent.width, self.extent.height, self.format
        );
    }
}

/// Creates a 2D image view over a single mip level and array layer.
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.handle().create_image_view(&view_info, None)? };
    Ok(view)
}

/// Barrier parameters for one legal layout-transition edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionBarrier {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// Maps a layout-transition pair to its barrier parameters.
///
/// Exactly three edges are legal:
/// - undefined -> transfer-dst (enables copy writes)
/// - transfer-dst -> shader-read-only (enables sampling)
/// - undefined -> depth-attachment-optimal (enables depth writes)
///
/// # Errors
///
/// Any other pair returns [`RhiError::UnsupportedLayoutTransition`]. The
/// function is pure; a rejected transition has no side effects.
pub fn transition_barrier(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionBarrier> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(TransitionBarrier {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
                aspect: vk::ImageAspectFlags::COLOR,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionBarrier {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                aspect: vk::ImageAspectFlags::COLOR,
            })
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            Ok(TransitionBarrier {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                aspect: vk::ImageAspectFlags::DEPTH,
            })
        }
        _ => Err(RhiError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Records a layout transition barrier for `image` into `cmd`.
///
/// For depth transitions on formats carrying a stencil component the
/// stencil aspect is included in the subresource range.
///
/// # Errors
///
/// Returns an error for any pair outside the legal transition set, without
/// recording anything.
pub fn cmd_transition_image_layout(
    cmd: &CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<()> {
    let params = transition_barrier(old, new)?;

    let mut aspect = params.aspect;
    if aspect == vk::ImageAspectFlags::DEPTH && has_stencil_component(format) {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(params.src_access)
        .dst_access_mask(params.dst_access);

    cmd.pipeline_barrier(params.src_stage, params.dst_stage, &[barrier]);
    Ok(())
}

/// Returns true if the format carries a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Picks the first of `candidates` supporting the requested optimal-tiling
/// features on this adapter.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedFormat`] if none qualify; for depth
/// attachments this is a fatal contract violation.
pub fn find_supported_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    features: vk::FormatFeatureFlags,
) -> RhiResult<vk::Format> {
    for &format in candidates {
        let props =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        if props.optimal_tiling_features.contains(features) {
            return Ok(format);
        }
    }

    Err(RhiError::UnsupportedFormat(format!("{:?}", candidates)))
}

/// Picks a depth attachment format from [`DEPTH_FORMAT_CANDIDATES`].
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    find_supported_format(
        instance,
        physical_device,
        DEPTH_FORMAT_CANDIDATES,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_undefined_to_transfer_dst() {
        let params = transition_barrier(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

        assert_eq!(params.src_access, vk::AccessFlags::empty());
        assert_eq!(params.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(params.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(params.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(params.aspect, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_transition_transfer_dst_to_shader_read() {
        let params = transition_barrier(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

        assert_eq!(params.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(params.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(params.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_transition_undefined_to_depth_attachment() {
        let params = transition_barrier(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();

        assert_eq!(params.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            params.dst_stage,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        );
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        // Every pair outside the three-edge set must fail, including
        // reversals of legal edges and self-transitions.
        let layouts = [
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::GENERAL,
        ];

        let legal = [
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ),
            (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
        ];

        for old in layouts {
            for new in layouts {
                let result = transition_barrier(old, new);
                if legal.contains(&(old, new)) {
                    assert!(result.is_ok(), "expected {:?} -> {:?} legal", old, new);
                } else {
                    assert!(
                        matches!(
                            result,
                            Err(RhiError::UnsupportedLayoutTransition { .. })
                        ),
                        "expected {:?} -> {:?} rejected",
                        old,
                        new
                    );
                }
            }
        }
    }

    #[test]
    fn test_rejected_transition_reports_the_pair() {
        let err = transition_barrier(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();

        match err {
            RhiError::UnsupportedLayoutTransition { old, new } => {
                assert_eq!(old, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                assert_eq!(new, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_stencil_component_detection() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(!has_stencil_component(vk::Format::B8G8R8A8_SRGB));
    }

    #[test]
    fn test_depth_candidates_order() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert_eq!(DEPTH_FORMAT_CANDIDATES.len(), 3);
    }
}
