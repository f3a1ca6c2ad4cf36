/*!
# Meridian Engine - Vulkan Renderer Backend

Vulkan implementation of the Meridian engine's GPU resource layer.

This crate implements the meridian_engine traits using the Ash library for
Vulkan bindings and gpu-allocator for memory management. The device runs
headless: it owns an instance, a logical device and a graphics queue, but no
surface or swapchain.
*/

// Vulkan implementation modules
mod vulkan_allocator;
mod vulkan_context;
mod vulkan_device;
mod vulkan_image;
mod vulkan_material_backend;
mod vulkan_shader;
mod vulkan_storage_buffer;
mod vulkan_table_pool;
mod vulkan_transfer;
mod vulkan_uniform_buffer;
mod vulkan_uniform_image;

#[cfg(feature = "vulkan-validation")]
mod debug;

// Main meridian namespace module
pub mod meridian {
    pub use crate::vulkan_allocator::{BufferAllocation, DeviceAllocator, ImageAllocation};
    pub use crate::vulkan_device::{Config, VulkanRenderDevice};
    pub use crate::vulkan_image::{VulkanImage2D, VulkanImageCube};
    pub use crate::vulkan_shader::VulkanShader;
    pub use crate::vulkan_storage_buffer::VulkanStorageBuffer;
    pub use crate::vulkan_transfer::TransferService;
    pub use crate::vulkan_uniform_buffer::VulkanUniformBuffer;
}
