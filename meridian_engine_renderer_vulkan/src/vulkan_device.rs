/// VulkanRenderDevice - headless Vulkan device implementing `RenderDevice`
///
/// Central object of the backend: owns the instance, logical device,
/// allocator, upload command pool, binding-table manager (one descriptor
/// pool per in-flight frame slot) and the fallback placeholder images.
/// Runs without a surface or swapchain; presentation lives elsewhere.

use meridian_engine::meridian::material::{Material, MaterialBackend};
use meridian_engine::meridian::render::{
    BindingTableManager, Image2D, ImageCube, ImageSpec, MemoryClass, ReflectedSampledImage,
    ReflectedStorageBuffer, ReflectedUniformBuffer, RenderDevice, Shader, ShaderReflection,
    StorageBuffer, UniformBuffer, UniformImage2D, UniformImageCube,
};
use meridian_engine::meridian::{Error, FrameContext, Result};
use meridian_engine::{engine_error, engine_info};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::vulkan_allocator::DeviceAllocator;
use crate::vulkan_context::GpuContext;
use crate::vulkan_image::{FallbackImages, VulkanImage2D, VulkanImageCube};
use crate::vulkan_material_backend::{SharedTableManager, VulkanMaterialBackend};
use crate::vulkan_shader::{ShaderRegistry, VulkanShader};
use crate::vulkan_storage_buffer::VulkanStorageBuffer;
use crate::vulkan_table_pool::{DescriptorSource, DescriptorWrite, VulkanTablePool};
use crate::vulkan_uniform_buffer::VulkanUniformBuffer;
use crate::vulkan_uniform_image::{VulkanUniformImage2D, VulkanUniformImageCube};

/// Device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name reported to the driver
    pub app_name: String,

    /// Number of frame slots rotated through (typically 2)
    pub frames_in_flight: u32,

    /// Enable Vulkan validation layers (requires the `vulkan-validation`
    /// feature; ignored without it)
    pub enable_validation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Meridian Application".to_string(),
            frames_in_flight: 2,
            enable_validation: false,
        }
    }
}

/// Headless Vulkan render device
pub struct VulkanRenderDevice {
    /// Vulkan entry, kept alive for the instance's lifetime
    _entry: ash::Entry,
    instance: ash::Instance,
    #[allow(dead_code)]
    physical_device: vk::PhysicalDevice,
    device: ash::Device,

    /// Device allocator reference (also stored in GpuContext)
    allocator: ManuallyDrop<Arc<DeviceAllocator>>,

    registry: ShaderRegistry,

    /// Binding-table manager, dropped before the device (pool destruction
    /// needs a live device)
    manager: ManuallyDrop<SharedTableManager>,

    /// 1x1 white placeholders, dropped before the device
    fallbacks: ManuallyDrop<FallbackImages>,

    frames_in_flight: u32,

    /// Shared GPU context for all resources
    gpu_context: Arc<GpuContext>,
}

impl VulkanRenderDevice {
    /// Create a new headless Vulkan device on the first GPU with a graphics
    /// queue.
    pub fn new(config: Config) -> Result<Self> {
        let frames_in_flight = config.frames_in_flight.max(1);
        let enable_validation =
            config.enable_validation && cfg!(feature = "vulkan-validation");

        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!(
                    "meridian::vulkan",
                    "Failed to load Vulkan library: {:?}",
                    e
                );
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = CString::new(config.app_name.as_str()).map_err(|_| {
                Error::InitializationFailed("Application name contains a NUL byte".to_string())
            })?;

            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Meridian")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let mut extension_names: Vec<*const std::ffi::c_char> = Vec::new();
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if enable_validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_error!(
                    "meridian::vulkan",
                    "Failed to create Vulkan instance: {:?}",
                    e
                );
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            // Setup debug messenger if validation is enabled
            #[cfg(feature = "vulkan-validation")]
            let (debug_utils_loader, debug_messenger) = if enable_validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(
                        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                    )
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

                let messenger = debug_utils
                    .create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| {
                        engine_error!(
                            "meridian::vulkan",
                            "Failed to create debug messenger: {:?}",
                            e
                        );
                        Error::InitializationFailed(format!(
                            "Failed to create debug messenger: {:?}",
                            e
                        ))
                    })?;

                (Some(debug_utils), Some(messenger))
            } else {
                (None, None)
            };
            #[cfg(not(feature = "vulkan-validation"))]
            let (debug_utils_loader, debug_messenger) = (None, None);

            // Pick the first GPU with a graphics queue family
            let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
                engine_error!(
                    "meridian::vulkan",
                    "Failed to enumerate physical devices: {:?}",
                    e
                );
                Error::InitializationFailed(format!(
                    "Failed to enumerate physical devices: {:?}",
                    e
                ))
            })?;

            let (physical_device, graphics_family_index) = physical_devices
                .into_iter()
                .find_map(|pd| {
                    instance
                        .get_physical_device_queue_family_properties(pd)
                        .iter()
                        .enumerate()
                        .find(|(_, qf)| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                        .map(|(i, _)| (pd, i as u32))
                })
                .ok_or_else(|| {
                    engine_error!("meridian::vulkan", "No GPU with a graphics queue found");
                    Error::InitializationFailed("No GPU with a graphics queue found".to_string())
                })?;

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .queue_priorities(&queue_priorities)];

            let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_features(&device_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!(
                        "meridian::vulkan",
                        "Failed to create logical device: {:?}",
                        e
                    );
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!(
                    "meridian::vulkan",
                    "Failed to create GPU allocator: {:?}",
                    e
                );
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let device_allocator = Arc::new(DeviceAllocator::new(device.clone(), allocator));

            // Upload command pool (TRANSIENT + RESET for reusable one-shot uploads)
            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .flags(
                    vk::CommandPoolCreateFlags::TRANSIENT
                        | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                );

            let upload_command_pool = device
                .create_command_pool(&upload_pool_create_info, None)
                .map_err(|e| {
                    engine_error!(
                        "meridian::vulkan",
                        "Failed to create upload command pool: {:?}",
                        e
                    );
                    Error::InitializationFailed(format!(
                        "Failed to create upload command pool: {:?}",
                        e
                    ))
                })?;

            let gpu_context = Arc::new(GpuContext::new(
                device.clone(),
                Arc::clone(&device_allocator),
                graphics_queue,
                graphics_family_index,
                upload_command_pool,
                instance.clone(),
                debug_utils_loader,
                debug_messenger,
            ));

            let registry = ShaderRegistry::default();
            let mut pools = Vec::with_capacity(frames_in_flight as usize);
            for _ in 0..frames_in_flight {
                pools.push(VulkanTablePool::new(
                    Arc::clone(&gpu_context),
                    registry.clone(),
                )?);
            }
            let manager: SharedTableManager = Arc::new(Mutex::new(BindingTableManager::new(pools)));

            let fallbacks = FallbackImages::new(Arc::clone(&gpu_context))?;

            engine_info!(
                "meridian::vulkan",
                "Vulkan device ready ({} frame slot(s), validation: {})",
                frames_in_flight,
                enable_validation
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                allocator: ManuallyDrop::new(device_allocator),
                registry,
                manager: ManuallyDrop::new(manager),
                fallbacks: ManuallyDrop::new(fallbacks),
                frames_in_flight,
                gpu_context,
            })
        }
    }

    /// Create a backend shader from reflection data and register it with
    /// the device's table pools.
    pub fn create_shader(
        &self,
        name: &str,
        reflection: ShaderReflection,
    ) -> Result<Arc<dyn Shader>> {
        let shader = Arc::new(VulkanShader::new(
            Arc::clone(&self.gpu_context),
            name,
            reflection,
        )?);
        self.registry.register(&shader);
        Ok(shader)
    }

    fn resolve_shader(&self, shader: &Arc<dyn Shader>) -> Result<Arc<VulkanShader>> {
        self.registry.resolve(shader.id()).ok_or_else(|| {
            Error::InvalidResource(format!(
                "Shader '{}' was not created by this device",
                shader.name()
            ))
        })
    }

    /// Bind a material's tables and push constants for draw recording.
    ///
    /// `material.apply(frame)` must have run for this frame first, so the
    /// slot's tables exist and are up to date.
    pub fn bind_material(
        &self,
        frame: &FrameContext,
        material: &Material,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
    ) -> Result<()> {
        let shader = self.resolve_shader(material.shader())?;
        let manager = self.manager.lock().unwrap();

        for set_index in 0..shader.reflection().set_count() {
            let Some(table) = manager.last(frame.slot(), shader.id(), set_index) else {
                return Err(Error::InvalidResource(format!(
                    "Material '{}': set {} has no table for frame slot {} (apply not called?)",
                    material.name(),
                    set_index,
                    frame.slot()
                )));
            };
            unsafe {
                self.device.cmd_bind_descriptor_sets(
                    command_buffer,
                    bind_point,
                    shader.pipeline_layout,
                    set_index,
                    &[table],
                    &[],
                );
            }
        }

        if let Some(bytes) = material.push_constant_data() {
            if let Some(pc) = &shader.reflection().push_constants {
                unsafe {
                    self.device.cmd_push_constants(
                        command_buffer,
                        shader.pipeline_layout,
                        crate::vulkan_shader::stages_to_vk(pc.stages),
                        0,
                        &bytes,
                    );
                }
            }
        }
        Ok(())
    }

    /// Record a storage buffer binding against `frame`'s slot.
    ///
    /// Storage buffers are not material properties; systems that own one
    /// record it here and the next `flush_binding_updates` (or any material
    /// flush on the same slot) commits it.
    pub fn record_storage_buffer(
        &self,
        frame: &FrameContext,
        shader: &Arc<dyn Shader>,
        buffer: &Arc<dyn StorageBuffer>,
    ) -> Result<()> {
        let vulkan_shader = self.resolve_shader(shader)?;
        let vulkan_buffer = unsafe { &*(Arc::as_ptr(buffer) as *const VulkanStorageBuffer) };
        let mut manager = self.manager.lock().unwrap();
        let (table, _) =
            manager.get_or_allocate(frame.slot(), vulkan_shader.id(), buffer.set_index())?;
        manager.record_update(
            frame.slot(),
            DescriptorWrite {
                set: table,
                binding: buffer.binding(),
                source: DescriptorSource::StorageBuffer {
                    buffer: vulkan_buffer.raw(),
                },
            },
        )
    }

    /// Commit every binding update recorded for `frame`'s slot
    pub fn flush_binding_updates(&self, frame: &FrameContext) -> Result<()> {
        self.manager.lock().unwrap().flush_updates(frame.slot())
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle().map_err(|e| {
                Error::BackendError(format!("Failed to wait idle: {:?}", e))
            })
        }
    }

    /// Number of live allocations, exposed for leak tests
    pub fn live_allocation_count(&self) -> usize {
        self.allocator.live_allocation_count()
    }
}

impl RenderDevice for VulkanRenderDevice {
    fn create_uniform_buffer(
        &self,
        desc: &ReflectedUniformBuffer,
        class: MemoryClass,
    ) -> Result<Arc<dyn UniformBuffer>> {
        Ok(Arc::new(VulkanUniformBuffer::new(
            Arc::clone(&self.gpu_context),
            desc,
            class,
        )?))
    }

    fn create_storage_buffer(
        &self,
        desc: &ReflectedStorageBuffer,
        initial_capacity: u64,
        class: MemoryClass,
    ) -> Result<Arc<dyn StorageBuffer>> {
        Ok(Arc::new(VulkanStorageBuffer::new(
            Arc::clone(&self.gpu_context),
            desc,
            initial_capacity,
            class,
        )?))
    }

    fn create_image_2d(&self, spec: &ImageSpec, data: Option<&[u8]>) -> Result<Arc<dyn Image2D>> {
        Ok(Arc::new(VulkanImage2D::new(
            Arc::clone(&self.gpu_context),
            spec,
            data,
        )?))
    }

    fn create_image_cube(
        &self,
        spec: &ImageSpec,
        data: Option<&[u8]>,
    ) -> Result<Arc<dyn ImageCube>> {
        Ok(Arc::new(VulkanImageCube::new(
            Arc::clone(&self.gpu_context),
            spec,
            data,
        )?))
    }

    fn create_uniform_image_2d(
        &self,
        slot: &ReflectedSampledImage,
    ) -> Result<Arc<dyn UniformImage2D>> {
        Ok(Arc::new(VulkanUniformImage2D::new(
            slot,
            Arc::clone(&self.fallbacks.white_2d),
        )))
    }

    fn create_uniform_image_cube(
        &self,
        slot: &ReflectedSampledImage,
    ) -> Result<Arc<dyn UniformImageCube>> {
        Ok(Arc::new(VulkanUniformImageCube::new(
            slot,
            Arc::clone(&self.fallbacks.white_cube),
        )))
    }

    fn create_material_backend(
        &self,
        shader: &Arc<dyn Shader>,
    ) -> Result<Box<dyn MaterialBackend>> {
        let vulkan_shader = self.resolve_shader(shader)?;
        Ok(Box::new(VulkanMaterialBackend::new(
            vulkan_shader,
            Arc::clone(&self.manager),
        )))
    }

    fn begin_frame(&self, frame: &FrameContext) -> Result<()> {
        self.manager.lock().unwrap().cleanup_frame(frame.slot())
    }

    fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }
}

impl Drop for VulkanRenderDevice {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.device.device_wait_idle().ok();

            // 1. Fallback images release their allocations while the
            //    allocator and device are alive
            ManuallyDrop::drop(&mut self.fallbacks);

            // 2. Table manager: VulkanTablePool::drop destroys the
            //    descriptor pools through the shared context
            ManuallyDrop::drop(&mut self.manager);

            // 3. Destroy upload command pool from GpuContext
            {
                let mut pool = self.gpu_context.upload_command_pool.lock().unwrap();
                if *pool != vk::CommandPool::null() {
                    self.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // 4. Anything still alive here is a leak
            self.allocator.report_leaks();

            // 5. Drop allocator: free VkDeviceMemory pages BEFORE destroying
            //    the device. First this Arc, then GpuContext's ManuallyDrop Arc.
            ManuallyDrop::drop(&mut self.allocator);
            if let Some(ctx) = Arc::get_mut(&mut self.gpu_context) {
                ManuallyDrop::drop(&mut ctx.allocator);
            }

            // 6. Destroy debug messenger BEFORE device and instance
            if let (Some(debug_utils), Some(messenger)) = (
                &self.gpu_context.debug_utils_loader,
                &self.gpu_context.debug_messenger,
            ) {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            // 7. Destroy device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
