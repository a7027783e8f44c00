//! Device memory selection and allocation.
//!
//! Buffers and images in this crate follow one allocation contract: create
//! the handle, query its memory requirements, find a memory type index
//! satisfying both the requirement's type-filter bitmask and the requested
//! property flags, allocate, bind. There is no suballocator; every resource
//! owns its own `vk::DeviceMemory` block.

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Finds the lowest-indexed memory type satisfying the given filter and
/// property flags.
///
/// `type_filter` is the `memory_type_bits` mask from a
/// `vk::MemoryRequirements` query; bit `i` permits memory type `i`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableMemoryType`] if no memory type satisfies
/// both constraints. This is unrecoverable for the resource being created.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    for i in 0..memory_properties.memory_type_count {
        let type_matches = type_filter & (1 << i) != 0;
        let props_match = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        if type_matches && props_match {
            return Ok(i);
        }
    }

    Err(RhiError::NoSuitableMemoryType {
        type_filter,
        properties,
    })
}

/// Allocates a device memory block satisfying `requirements` with the given
/// property flags.
///
/// # Errors
///
/// Returns an error if no matching memory type exists or the allocation
/// call fails.
pub fn allocate_memory(
    device: &Device,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> RhiResult<vk::DeviceMemory> {
    let memory_type_index =
        find_memory_type(device.memory_properties(), requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.handle().allocate_memory(&alloc_info, None)? };

    debug!(
        "Allocated {} bytes from memory type {}",
        requirements.size, memory_type_index
    );

    Ok(memory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn test_find_memory_type_returns_lowest_index() {
        // Types 1 and 2 both satisfy; the lowest index wins.
        let props = mock_memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &props,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();

        assert_eq!(index, 1);
    }

    #[test]
    fn test_find_memory_type_respects_type_filter() {
        // Type 0 satisfies the properties but is excluded by the filter.
        let props = mock_memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        let index =
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();

        assert_eq!(index, 1);
    }

    #[test]
    fn test_find_memory_type_requires_all_property_flags() {
        let props = mock_memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);

        let result = find_memory_type(
            &props,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );

        assert!(matches!(
            result,
            Err(RhiError::NoSuitableMemoryType { .. })
        ));
    }

    #[test]
    fn test_find_memory_type_fails_when_nothing_matches() {
        let props = mock_memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        let result = find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(
            result,
            Err(RhiError::NoSuitableMemoryType { .. })
        ));
    }

    #[test]
    fn test_find_memory_type_superset_flags_match() {
        // A type carrying more flags than requested still satisfies.
        let props = mock_memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        let index =
            find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap();
        assert_eq!(index, 0);
    }
}
