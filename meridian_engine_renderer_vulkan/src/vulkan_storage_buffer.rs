/// VulkanStorageBuffer - growable shader-visible buffer with host shadow
///
/// A write past the current capacity releases the GPU buffer and allocates a
/// new one sized to the write, then re-uploads the whole shadow so data below
/// the write offset survives the reallocation. Binding tables pick up the new
/// handle on the next material apply.

use meridian_engine::meridian::render::{MemoryClass, ReflectedStorageBuffer, StorageBuffer};
use meridian_engine::meridian::{Error, Result};
use meridian_engine::engine_debug;
use ash::vk;
use std::sync::{Arc, Mutex};

use crate::vulkan_allocator::BufferAllocation;
use crate::vulkan_context::GpuContext;
use crate::vulkan_transfer::TransferService;

struct StorageState {
    allocation: Option<BufferAllocation>,
    shadow: Vec<u8>,
    capacity: u64,
}

/// Vulkan storage buffer implementation
pub struct VulkanStorageBuffer {
    ctx: Arc<GpuContext>,
    state: Mutex<StorageState>,
    set: u32,
    binding: u32,
    class: MemoryClass,
    debug_name: String,
}

impl VulkanStorageBuffer {
    pub fn new(
        ctx: Arc<GpuContext>,
        desc: &ReflectedStorageBuffer,
        initial_capacity: u64,
        class: MemoryClass,
    ) -> Result<Self> {
        let capacity = initial_capacity.max(1);
        let allocation = Self::allocate(&ctx, &desc.name, capacity, class)?;
        Ok(Self {
            ctx,
            state: Mutex::new(StorageState {
                allocation: Some(allocation),
                shadow: vec![0u8; capacity as usize],
                capacity,
            }),
            set: desc.set,
            binding: desc.binding,
            class,
            debug_name: desc.name.clone(),
        })
    }

    fn allocate(
        ctx: &Arc<GpuContext>,
        name: &str,
        capacity: u64,
        class: MemoryClass,
    ) -> Result<BufferAllocation> {
        let create_info = vk::BufferCreateInfo::default()
            .size(capacity)
            .usage(
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        ctx.allocator.allocate_buffer(name, &create_info, class)
    }

    /// Current buffer handle, read by descriptor writes. Changes when the
    /// buffer grows.
    pub(crate) fn raw(&self) -> vk::Buffer {
        self.state
            .lock()
            .unwrap()
            .allocation
            .as_ref()
            .map(|a| a.buffer)
            .unwrap_or(vk::Buffer::null())
    }

    /// Copy the GPU contents back to the host through the transfer service
    pub fn read_back(&self) -> Result<Vec<u8>> {
        let (buffer, capacity) = {
            let state = self.state.lock().unwrap();
            match state.allocation.as_ref() {
                Some(a) => (a.buffer, state.capacity),
                None => return Ok(Vec::new()),
            }
        };
        TransferService::new(self.ctx.clone()).download_from_buffer(buffer, 0, capacity)
    }

    fn write_gpu(&self, allocation: &BufferAllocation, data: &[u8], offset: u64) -> Result<()> {
        match self.class {
            MemoryClass::CpuToGpu => unsafe {
                let mapped_ptr = allocation
                    .allocation
                    .mapped_ptr()
                    .ok_or_else(|| {
                        Error::BackendError(format!(
                            "Storage buffer '{}' is not CPU-accessible",
                            self.debug_name
                        ))
                    })?
                    .as_ptr() as *mut u8;
                std::ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    mapped_ptr.offset(offset as isize),
                    data.len(),
                );
                Ok(())
            },
            MemoryClass::GpuOnly => TransferService::new(self.ctx.clone()).upload_to_buffer(
                data,
                allocation.buffer,
                offset,
            ),
        }
    }
}

impl StorageBuffer for VulkanStorageBuffer {
    fn set_data(&self, data: &[u8], offset: u64) -> Result<()> {
        let Some(end) = offset.checked_add(data.len() as u64) else {
            return Err(Error::InvalidResource(format!(
                "Storage buffer '{}': write of {} bytes at offset {} overflows",
                self.debug_name,
                data.len(),
                offset
            )));
        };
        let mut state = self.state.lock().unwrap();

        if end > state.capacity {
            // Grow: new buffer sized to the write, old data preserved via
            // the shadow
            engine_debug!(
                "meridian::vulkan",
                "Storage buffer '{}': growing {} -> {} bytes",
                self.debug_name,
                state.capacity,
                end
            );
            let new_allocation = Self::allocate(&self.ctx, &self.debug_name, end, self.class)?;
            if let Some(old) = state.allocation.take() {
                self.ctx.allocator.destroy_buffer(old);
            }
            state.capacity = end;
            state.shadow.resize(end as usize, 0);
            state.shadow[offset as usize..end as usize].copy_from_slice(data);

            let result = self.write_gpu(&new_allocation, &state.shadow, 0);
            state.allocation = Some(new_allocation);
            return result;
        }

        state.shadow[offset as usize..end as usize].copy_from_slice(data);
        let Some(allocation) = state.allocation.as_ref() else {
            return Err(Error::InvalidResource(format!(
                "Storage buffer '{}' has no GPU allocation",
                self.debug_name
            )));
        };
        self.write_gpu(allocation, data, offset)
    }

    fn size(&self) -> u64 {
        self.state.lock().unwrap().capacity
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }

    fn shadow(&self) -> Vec<u8> {
        self.state.lock().unwrap().shadow.clone()
    }
}

impl Drop for VulkanStorageBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.state.lock().unwrap().allocation.take() {
            self.ctx.allocator.destroy_buffer(allocation);
        }
    }
}
