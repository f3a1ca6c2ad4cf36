/// VulkanUniformBuffer - fixed-size shader-visible buffer with host shadow
///
/// The GPU buffer is created once at the size the shader declares and never
/// reallocated. Every accepted write lands in the host shadow first, then in
/// GPU memory: mapped memcpy for CpuToGpu, staging upload for GpuOnly.

use meridian_engine::meridian::render::{MemoryClass, ReflectedUniformBuffer, UniformBuffer};
use meridian_engine::meridian::{Error, Result};
use meridian_engine::engine_error;
use ash::vk;
use std::sync::{Arc, Mutex};

use crate::vulkan_allocator::BufferAllocation;
use crate::vulkan_context::GpuContext;
use crate::vulkan_transfer::TransferService;

/// Vulkan uniform buffer implementation
pub struct VulkanUniformBuffer {
    /// Shared GPU context (device, allocator, queue, command pool)
    ctx: Arc<GpuContext>,
    allocation: Mutex<Option<BufferAllocation>>,
    shadow: Mutex<Vec<u8>>,
    size: u64,
    set: u32,
    binding: u32,
    class: MemoryClass,
    debug_name: String,
}

impl VulkanUniformBuffer {
    pub fn new(
        ctx: Arc<GpuContext>,
        desc: &ReflectedUniformBuffer,
        class: MemoryClass,
    ) -> Result<Self> {
        if desc.size == 0 {
            engine_error!(
                "meridian::vulkan",
                "Uniform buffer '{}' declared with zero size",
                desc.name
            );
            return Err(Error::InvalidResource(format!(
                "Uniform buffer '{}' declared with zero size",
                desc.name
            )));
        }

        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(
                vk::BufferUsageFlags::UNIFORM_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let allocation = ctx.allocator.allocate_buffer(&desc.name, &create_info, class)?;

        Ok(Self {
            ctx,
            allocation: Mutex::new(Some(allocation)),
            shadow: Mutex::new(vec![0u8; desc.size as usize]),
            size: desc.size,
            set: desc.set,
            binding: desc.binding,
            class,
            debug_name: desc.name.clone(),
        })
    }

    /// Current buffer handle, read by descriptor writes
    pub(crate) fn raw(&self) -> vk::Buffer {
        self.allocation
            .lock()
            .unwrap()
            .as_ref()
            .map(|a| a.buffer)
            .unwrap_or(vk::Buffer::null())
    }

    /// Copy the GPU contents back to the host through the transfer service
    pub fn read_back(&self) -> Result<Vec<u8>> {
        let buffer = self.raw();
        TransferService::new(self.ctx.clone()).download_from_buffer(buffer, 0, self.size)
    }
}

impl UniformBuffer for VulkanUniformBuffer {
    fn set_data(&self, data: &[u8], offset: u64) -> Result<()> {
        // checked_add: a pathological offset must reject, not wrap past the
        // bounds check into a panic
        let end = offset.checked_add(data.len() as u64).unwrap_or(u64::MAX);
        if end > self.size {
            engine_error!(
                "meridian::vulkan",
                "Uniform buffer '{}': write of {} bytes at offset {} exceeds size {}",
                self.debug_name,
                data.len(),
                offset,
                self.size
            );
            return Err(Error::InvalidResource(format!(
                "Uniform buffer '{}': write of {} bytes at offset {} exceeds size {}",
                self.debug_name,
                data.len(),
                offset,
                self.size
            )));
        }

        let allocation = self.allocation.lock().unwrap();
        let Some(allocation) = allocation.as_ref() else {
            return Err(Error::InvalidResource(format!(
                "Uniform buffer '{}' has no GPU allocation",
                self.debug_name
            )));
        };

        // Shadow lock held across the GPU write keeps shadow and GPU
        // contents in step under concurrent setters
        let mut shadow = self.shadow.lock().unwrap();
        shadow[offset as usize..end as usize].copy_from_slice(data);

        match self.class {
            MemoryClass::CpuToGpu => unsafe {
                let mapped_ptr = allocation
                    .allocation
                    .mapped_ptr()
                    .ok_or_else(|| {
                        Error::BackendError(format!(
                            "Uniform buffer '{}' is not CPU-accessible",
                            self.debug_name
                        ))
                    })?
                    .as_ptr() as *mut u8;
                std::ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    mapped_ptr.offset(offset as isize),
                    data.len(),
                );
            },
            MemoryClass::GpuOnly => {
                TransferService::new(self.ctx.clone()).upload_to_buffer(
                    data,
                    allocation.buffer,
                    offset,
                )?;
            }
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }

    fn shadow(&self) -> Vec<u8> {
        self.shadow.lock().unwrap().clone()
    }
}

impl Drop for VulkanUniformBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.lock().unwrap().take() {
            self.ctx.allocator.destroy_buffer(allocation);
        }
    }
}
