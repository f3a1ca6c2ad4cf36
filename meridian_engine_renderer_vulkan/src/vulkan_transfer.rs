/// TransferService - synchronous one-shot GPU transfers
///
/// Records commands into a transient command buffer from the shared upload
/// pool, submits them to the graphics queue and blocks on a fence until the
/// GPU is done. Used for creation-time and resize-time uploads; per-frame
/// CpuToGpu writes bypass this entirely and go through mapped memory.

use meridian_engine::meridian::render::MemoryClass;
use meridian_engine::meridian::{Error, Result};
use meridian_engine::{engine_err, engine_error};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Synchronous transfer front-end over the shared upload command pool
pub struct TransferService {
    ctx: Arc<GpuContext>,
}

impl TransferService {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self { ctx }
    }

    /// Record commands via `record`, submit them and wait for completion.
    ///
    /// The upload pool mutex is held for the whole flush, so concurrent
    /// transfers serialize instead of corrupting the pool.
    pub fn flush<F>(&self, what: &str, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let device = &self.ctx.device;
        let pool_guard = self.ctx.upload_command_pool.lock().unwrap();
        let pool = *pool_guard;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffers = device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| {
                    engine_err!(
                        "meridian::vulkan",
                        "Failed to allocate command buffer for {}: {:?}",
                        what,
                        e
                    )
                })?;
            let command_buffer = command_buffers[0];

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            let result = (|| -> Result<()> {
                device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(|e| {
                        engine_err!(
                            "meridian::vulkan",
                            "Failed to begin command buffer for {}: {:?}",
                            what,
                            e
                        )
                    })?;

                record(device, command_buffer);

                device.end_command_buffer(command_buffer).map_err(|e| {
                    engine_err!(
                        "meridian::vulkan",
                        "Failed to end command buffer for {}: {:?}",
                        what,
                        e
                    )
                })?;

                let fence = device
                    .create_fence(&vk::FenceCreateInfo::default(), None)
                    .map_err(|e| {
                        engine_err!(
                            "meridian::vulkan",
                            "Failed to create transfer fence for {}: {:?}",
                            what,
                            e
                        )
                    })?;

                let command_buffers_submit = [command_buffer];
                let submit_info =
                    vk::SubmitInfo::default().command_buffers(&command_buffers_submit);

                let submit_result = device
                    .queue_submit(self.ctx.graphics_queue, &[submit_info], fence)
                    .map_err(|e| {
                        engine_error!(
                            "meridian::vulkan",
                            "Failed to submit {} to GPU queue: {:?}",
                            what,
                            e
                        );
                        Error::TransferFailed(format!("Submit failed for {}: {:?}", what, e))
                    })
                    .and_then(|_| {
                        device
                            .wait_for_fences(&[fence], true, u64::MAX)
                            .map_err(|e| {
                                engine_error!(
                                    "meridian::vulkan",
                                    "Failed to wait for {} completion: {:?}",
                                    what,
                                    e
                                );
                                Error::TransferFailed(format!(
                                    "Fence wait failed for {}: {:?}",
                                    what, e
                                ))
                            })
                    });

                device.destroy_fence(fence, None);
                submit_result
            })();

            device.free_command_buffers(pool, &command_buffers);
            result
        }
    }

    /// Copy `data` into `dst` at `dst_offset` through a staging buffer
    pub fn upload_to_buffer(&self, data: &[u8], dst: vk::Buffer, dst_offset: u64) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let staging_create_info = vk::BufferCreateInfo::default()
            .size(data.len() as u64)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let staging = self.ctx.allocator.allocate_buffer(
            "transfer_staging_buffer",
            &staging_create_info,
            MemoryClass::CpuToGpu,
        )?;

        let result = (|| -> Result<()> {
            let mapped_ptr = staging
                .allocation
                .mapped_ptr()
                .ok_or_else(|| {
                    engine_err!("meridian::vulkan", "Transfer staging buffer is not mapped")
                })?
                .as_ptr() as *mut u8;
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr, data.len());
            }

            let region = vk::BufferCopy::default()
                .src_offset(0)
                .dst_offset(dst_offset)
                .size(data.len() as u64);

            let staging_buffer = staging.buffer;
            self.flush("buffer upload", |device, command_buffer| unsafe {
                device.cmd_copy_buffer(command_buffer, staging_buffer, dst, &[region]);
            })
        })();

        self.ctx.allocator.destroy_buffer(staging);
        result
    }

    /// Copy `len` bytes out of `src` at `src_offset` through a staging buffer
    pub fn download_from_buffer(
        &self,
        src: vk::Buffer,
        src_offset: u64,
        len: u64,
    ) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let staging_create_info = vk::BufferCreateInfo::default()
            .size(len)
            .usage(vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let staging = self.ctx.allocator.allocate_buffer(
            "transfer_readback_buffer",
            &staging_create_info,
            MemoryClass::CpuToGpu,
        )?;

        let result = (|| -> Result<Vec<u8>> {
            let region = vk::BufferCopy::default()
                .src_offset(src_offset)
                .dst_offset(0)
                .size(len);

            let staging_buffer = staging.buffer;
            self.flush("buffer read-back", |device, command_buffer| unsafe {
                device.cmd_copy_buffer(command_buffer, src, staging_buffer, &[region]);
            })?;

            let mapped_ptr = staging
                .allocation
                .mapped_ptr()
                .ok_or_else(|| {
                    engine_err!("meridian::vulkan", "Read-back staging buffer is not mapped")
                })?
                .as_ptr() as *const u8;
            let mut data = vec![0u8; len as usize];
            unsafe {
                std::ptr::copy_nonoverlapping(mapped_ptr, data.as_mut_ptr(), len as usize);
            }
            Ok(data)
        })();

        self.ctx.allocator.destroy_buffer(staging);
        result
    }
}
