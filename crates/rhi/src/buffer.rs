//! GPU buffer management.
//!
//! This module handles vertex, index, uniform, and staging buffers. Each
//! buffer owns a dedicated memory allocation selected by
//! [`crate::memory::find_memory_type`] and bound at offset zero.
//!
//! # Overview
//!
//! - [`BufferUsage`] defines how a buffer will be used (vertex, index,
//!   uniform, staging)
//! - [`Buffer`] wraps VkBuffer with its own VkDeviceMemory
//!
//! Host-visible buffers are persistently mapped at creation. Device-local
//! vertex and index buffers are filled through
//! [`Buffer::new_device_local_with_data`], which stages through a
//! host-visible buffer and a blocking one-shot copy.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::{CommandPool, OneShot};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::allocate_memory;

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which determines the Vulkan
/// usage flags and the memory properties requested for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer - device local, filled via staging
    Vertex,
    /// Index buffer - device local, filled via staging
    Index,
    /// Uniform buffer - host visible, updated every frame
    Uniform,
    /// Staging buffer - host visible transfer source
    Staging,
    /// Host-visible vertex buffer, rewritten every frame (overlay geometry)
    HostVertex,
    /// Host-visible index buffer, rewritten every frame (overlay geometry)
    HostIndex,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::HostVertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::HostIndex => vk::BufferUsageFlags::INDEX_BUFFER,
        }
    }

    /// Returns the memory properties requested for this buffer type.
    pub fn memory_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Uniform
            | BufferUsage::Staging
            | BufferUsage::HostVertex
            | BufferUsage::HostIndex => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
            BufferUsage::HostVertex => "host vertex",
            BufferUsage::HostIndex => "host index",
        }
    }
}

/// GPU buffer wrapper with a dedicated memory allocation.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe. Synchronize access externally
/// when sharing between threads.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Dedicated memory allocation.
    memory: vk::DeviceMemory,
    /// Persistent mapping for host-visible buffers.
    mapped: Option<*mut u8>,
    /// Buffer size in bytes.
    size: vk::DeviceSize,
    /// Buffer usage type.
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a new buffer with the specified size.
    ///
    /// Host-visible buffers (uniform, staging) are mapped once here and
    /// stay mapped for their lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation, memory selection/allocation,
    /// binding, or mapping fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };
        let memory = match allocate_memory(&device, requirements, usage.memory_flags()) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        unsafe {
            device.handle().bind_buffer_memory(buffer, memory, 0)?;
        }

        let mapped = if usage
            .memory_flags()
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            let ptr = unsafe {
                device
                    .handle()
                    .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())?
            };
            Some(ptr as *mut u8)
        } else {
            None
        };

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            memory,
            mapped,
            size,
            usage,
        })
    }

    /// Creates a host-visible staging buffer.
    pub fn new_staging(device: Arc<Device>, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::new(device, BufferUsage::Staging, size)
    }

    /// Creates a device-local buffer and fills it with `data` through a
    /// staging buffer.
    ///
    /// The copy is submitted on a one-shot command buffer and this function
    /// blocks until the graphics queue is idle, so the staging buffer can
    /// be destroyed on return.
    ///
    /// # Errors
    ///
    /// Returns an error if any buffer creation, the write, or the copy
    /// submission fails.
    pub fn new_device_local_with_data(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;

        let staging = Self::new_staging(device.clone(), size)?;
        staging.write_data(0, data)?;

        let buffer = Self::new(device, usage, size)?;

        let one_shot = OneShot::begin(pool)?;
        let region = vk::BufferCopy::default().size(size);
        one_shot
            .cmd()
            .copy_buffer(staging.handle(), buffer.handle(), &[region]);
        one_shot.submit_and_wait()?;

        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// The buffer must be host visible.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer memory is not mapped
    /// - The write would exceed the buffer size
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped = self.mapped.ok_or_else(|| {
            RhiError::InvalidHandle("Buffer memory is not mapped".to_string())
        })?;

        unsafe {
            let dst = mapped.add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.handle().unmap_memory(self.memory);
            }
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn test_device_local_buffers_accept_transfers() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_DST)
        );
    }

    #[test]
    fn test_buffer_usage_memory_flags() {
        assert_eq!(
            BufferUsage::Vertex.memory_flags(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert_eq!(
            BufferUsage::Index.memory_flags(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert!(
            BufferUsage::Uniform
                .memory_flags()
                .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        );
        assert!(
            BufferUsage::Staging
                .memory_flags()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        );
        assert!(
            BufferUsage::HostVertex
                .memory_flags()
                .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        );
        assert!(
            BufferUsage::HostIndex
                .memory_flags()
                .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        );
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }
}
