/// VulkanTablePool - descriptor pool backing one in-flight frame slot
///
/// Implements the backend half of binding-table management: tables are
/// descriptor sets, updates are descriptor writes. Pools grow on demand when
/// allocation reports out-of-pool-memory; reset reclaims every set from every
/// pool in one call per pool.

use meridian_engine::meridian::render::{Shader, ShaderId, TablePool};
use meridian_engine::meridian::Result;
use meridian_engine::{engine_debug, engine_err};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_shader::ShaderRegistry;

const POOL_MAX_SETS: u32 = 1024;
const POOL_COMBINED_IMAGE_SAMPLERS: u32 = 2048;
const POOL_UNIFORM_BUFFERS: u32 = 1024;
const POOL_STORAGE_BUFFERS: u32 = 1024;

/// What a descriptor write points at
pub(crate) enum DescriptorSource {
    UniformBuffer { buffer: vk::Buffer },
    StorageBuffer { buffer: vk::Buffer },
    SampledImage { view: vk::ImageView, sampler: vk::Sampler },
}

/// One recorded descriptor write, committed in a batch
pub(crate) struct DescriptorWrite {
    pub(crate) set: vk::DescriptorSet,
    pub(crate) binding: u32,
    pub(crate) source: DescriptorSource,
}

/// Descriptor pool(s) for one frame slot
pub(crate) struct VulkanTablePool {
    ctx: Arc<GpuContext>,
    registry: ShaderRegistry,
    pools: Vec<vk::DescriptorPool>,
}

impl VulkanTablePool {
    pub(crate) fn new(ctx: Arc<GpuContext>, registry: ShaderRegistry) -> Result<Self> {
        let mut pool = Self {
            ctx,
            registry,
            pools: Vec::new(),
        };
        pool.grow()?;
        Ok(pool)
    }

    fn grow(&mut self) -> Result<()> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: POOL_COMBINED_IMAGE_SAMPLERS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: POOL_UNIFORM_BUFFERS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: POOL_STORAGE_BUFFERS,
            },
        ];

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(POOL_MAX_SETS);

        let pool = unsafe {
            self.ctx
                .device
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| {
                    engine_err!(
                        "meridian::vulkan",
                        "Failed to create descriptor pool: {:?}",
                        e
                    )
                })?
        };

        if !self.pools.is_empty() {
            engine_debug!(
                "meridian::vulkan",
                "Descriptor pool exhausted, growing to {} pool(s)",
                self.pools.len() + 1
            );
        }
        self.pools.push(pool);
        Ok(())
    }

    fn try_allocate(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let set_layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        unsafe {
            self.ctx
                .device
                .allocate_descriptor_sets(&allocate_info)
                .map(|sets| sets[0])
        }
    }
}

impl TablePool for VulkanTablePool {
    type Table = vk::DescriptorSet;
    type Update = DescriptorWrite;

    fn allocate(&mut self, shader: ShaderId, set_index: u32) -> Result<Self::Table> {
        let Some(vulkan_shader) = self.registry.resolve(shader) else {
            return Err(engine_err!(
                "meridian::vulkan",
                "Shader id {} was not created by this device",
                shader.raw()
            ));
        };
        let Some(&layout) = vulkan_shader.set_layouts.get(set_index as usize) else {
            return Err(engine_err!(
                "meridian::vulkan",
                "Shader '{}' has no binding table {}",
                vulkan_shader.name(),
                set_index
            ));
        };

        let current = *self.pools.last().expect("pool list is never empty");
        match self.try_allocate(current, layout) {
            Ok(set) => Ok(set),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.grow()?;
                let fresh = *self.pools.last().expect("pool list is never empty");
                self.try_allocate(fresh, layout).map_err(|e| {
                    engine_err!(
                        "meridian::vulkan",
                        "Failed to allocate descriptor set for shader '{}' set {}: {:?}",
                        vulkan_shader.name(),
                        set_index,
                        e
                    )
                })
            }
            Err(e) => Err(engine_err!(
                "meridian::vulkan",
                "Failed to allocate descriptor set for shader '{}' set {}: {:?}",
                vulkan_shader.name(),
                set_index,
                e
            )),
        }
    }

    fn commit(&mut self, updates: Vec<Self::Update>) -> Result<()> {
        // Two passes: the write structs borrow the info structs, so all
        // infos are placed first and never moved afterwards.
        let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::new();
        let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::new();

        for update in &updates {
            match update.source {
                DescriptorSource::UniformBuffer { buffer }
                | DescriptorSource::StorageBuffer { buffer } => {
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(buffer)
                            .offset(0)
                            .range(vk::WHOLE_SIZE),
                    );
                }
                DescriptorSource::SampledImage { view, sampler } => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                            .image_view(view)
                            .sampler(sampler),
                    );
                }
            }
        }

        let mut writes: Vec<vk::WriteDescriptorSet> = Vec::with_capacity(updates.len());
        let mut buffer_index = 0;
        let mut image_index = 0;

        for update in &updates {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(update.set)
                .dst_binding(update.binding)
                .dst_array_element(0)
                .descriptor_count(1);
            let write = match update.source {
                DescriptorSource::UniformBuffer { .. } => {
                    let info = &buffer_infos[buffer_index];
                    buffer_index += 1;
                    write
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(std::slice::from_ref(info))
                }
                DescriptorSource::StorageBuffer { .. } => {
                    let info = &buffer_infos[buffer_index];
                    buffer_index += 1;
                    write
                        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                        .buffer_info(std::slice::from_ref(info))
                }
                DescriptorSource::SampledImage { .. } => {
                    let info = &image_infos[image_index];
                    image_index += 1;
                    write
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(info))
                }
            };
            writes.push(write);
        }

        unsafe {
            self.ctx.device.update_descriptor_sets(&writes, &[]);
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        for &pool in &self.pools {
            unsafe {
                self.ctx
                    .device
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                    .map_err(|e| {
                        engine_err!(
                            "meridian::vulkan",
                            "Failed to reset descriptor pool: {:?}",
                            e
                        )
                    })?;
            }
        }
        Ok(())
    }
}

impl Drop for VulkanTablePool {
    fn drop(&mut self) {
        unsafe {
            for pool in self.pools.drain(..) {
                self.ctx.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}
