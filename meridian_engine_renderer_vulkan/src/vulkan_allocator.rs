/// DeviceAllocator - tag-tracked GPU memory allocation
///
/// Thin layer over gpu-allocator that pairs every buffer/image with its
/// memory in one call, maps engine memory classes to allocator locations,
/// and keeps a tag -> size map of live allocations so shutdown can report
/// leaks by name.

use meridian_engine::meridian::render::MemoryClass;
use meridian_engine::meridian::{Error, Result};
use meridian_engine::{engine_err, engine_error, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A buffer with its bound memory, destroyed through `destroy_buffer`
pub struct BufferAllocation {
    pub buffer: vk::Buffer,
    pub allocation: Allocation,
    pub size: u64,
    id: u64,
}

/// An image with its bound memory, destroyed through `destroy_image`
pub struct ImageAllocation {
    pub image: vk::Image,
    pub allocation: Allocation,
    id: u64,
}

struct TrackedAllocation {
    tag: String,
    size: u64,
}

/// Device memory allocator shared by all resources of one device
pub struct DeviceAllocator {
    device: ash::Device,
    allocator: Arc<Mutex<Allocator>>,
    tracked: Mutex<FxHashMap<u64, TrackedAllocation>>,
    next_id: AtomicU64,
}

fn memory_class_to_location(class: MemoryClass) -> MemoryLocation {
    match class {
        MemoryClass::CpuToGpu => MemoryLocation::CpuToGpu,
        MemoryClass::GpuOnly => MemoryLocation::GpuOnly,
    }
}

impl DeviceAllocator {
    pub fn new(device: ash::Device, allocator: Allocator) -> Self {
        Self {
            device,
            allocator: Arc::new(Mutex::new(allocator)),
            tracked: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a buffer and bind freshly allocated memory to it.
    ///
    /// `tag` names the allocation in leak reports and allocator debug output.
    pub fn allocate_buffer(
        &self,
        tag: &str,
        create_info: &vk::BufferCreateInfo,
        class: MemoryClass,
    ) -> Result<BufferAllocation> {
        unsafe {
            let buffer = self
                .device
                .create_buffer(create_info, None)
                .map_err(|e| {
                    engine_err!(
                        "meridian::vulkan",
                        "Failed to create buffer '{}' of size {} bytes: {:?}",
                        tag,
                        create_info.size,
                        e
                    )
                })?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let allocation = match self.allocator.lock().unwrap().allocate(&AllocationCreateDesc {
                name: tag,
                requirements,
                location: memory_class_to_location(class),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(_e) => {
                    self.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!(
                        "meridian::vulkan",
                        "Out of GPU memory for buffer '{}' (required: {:.2} MB)",
                        tag,
                        size_mb
                    );
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) =
                self.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            {
                self.allocator.lock().unwrap().free(allocation).ok();
                self.device.destroy_buffer(buffer, None);
                return Err(engine_err!(
                    "meridian::vulkan",
                    "Failed to bind buffer memory for '{}': {:?}",
                    tag,
                    e
                ));
            }

            let id = self.track(tag, requirements.size);
            Ok(BufferAllocation {
                buffer,
                allocation,
                size: create_info.size,
                id,
            })
        }
    }

    /// Create an image and bind freshly allocated memory to it
    pub fn allocate_image(
        &self,
        tag: &str,
        create_info: &vk::ImageCreateInfo,
        class: MemoryClass,
    ) -> Result<ImageAllocation> {
        unsafe {
            let image = self.device.create_image(create_info, None).map_err(|e| {
                engine_err!(
                    "meridian::vulkan",
                    "Failed to create image '{}': {:?}",
                    tag,
                    e
                )
            })?;

            let requirements = self.device.get_image_memory_requirements(image);

            let allocation = match self.allocator.lock().unwrap().allocate(&AllocationCreateDesc {
                name: tag,
                requirements,
                location: memory_class_to_location(class),
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(_e) => {
                    self.device.destroy_image(image, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!(
                        "meridian::vulkan",
                        "Out of GPU memory for image '{}' (required: {:.2} MB)",
                        tag,
                        size_mb
                    );
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) =
                self.device
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
            {
                self.allocator.lock().unwrap().free(allocation).ok();
                self.device.destroy_image(image, None);
                return Err(engine_err!(
                    "meridian::vulkan",
                    "Failed to bind image memory for '{}': {:?}",
                    tag,
                    e
                ));
            }

            let id = self.track(tag, requirements.size);
            Ok(ImageAllocation {
                image,
                allocation,
                id,
            })
        }
    }

    /// Free a buffer and its memory
    pub fn destroy_buffer(&self, buffer: BufferAllocation) {
        self.untrack(buffer.id);
        // Don't panic if the lock fails, the buffer still has to go
        if let Ok(mut allocator) = self.allocator.lock() {
            allocator.free(buffer.allocation).ok();
        }
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
    }

    /// Free an image and its memory
    pub fn destroy_image(&self, image: ImageAllocation) {
        self.untrack(image.id);
        if let Ok(mut allocator) = self.allocator.lock() {
            allocator.free(image.allocation).ok();
        }
        unsafe {
            self.device.destroy_image(image.image, None);
        }
    }

    /// Number of live allocations made through this allocator
    pub fn live_allocation_count(&self) -> usize {
        self.tracked.lock().unwrap().len()
    }

    /// Total bytes of live allocations
    pub fn live_allocation_bytes(&self) -> u64 {
        self.tracked.lock().unwrap().values().map(|t| t.size).sum()
    }

    /// Log one warning per allocation still alive. Called at device
    /// shutdown; silent when everything was released.
    pub fn report_leaks(&self) {
        let tracked = self.tracked.lock().unwrap();
        for info in tracked.values() {
            engine_warn!(
                "meridian::vulkan::DeviceAllocator",
                "Allocation '{}' still alive at shutdown ({} bytes)",
                info.tag,
                info.size
            );
        }
        if !tracked.is_empty() {
            engine_warn!(
                "meridian::vulkan::DeviceAllocator",
                "{} allocation(s) leaked, {} bytes total",
                tracked.len(),
                tracked.values().map(|t| t.size).sum::<u64>()
            );
        }
    }

    fn track(&self, tag: &str, size: u64) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tracked.lock().unwrap().insert(
            id,
            TrackedAllocation {
                tag: tag.to_string(),
                size,
            },
        );
        id
    }

    fn untrack(&self, id: u64) {
        self.tracked.lock().unwrap().remove(&id);
    }
}
