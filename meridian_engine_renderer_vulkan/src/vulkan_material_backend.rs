/// VulkanMaterialBackend - materials' view of the binding-table manager
///
/// One instance per material, created by `create_material_backend`. Shares
/// the device's table manager; `prepare` walks the shader's reflected sets
/// through `get_or_allocate`, `apply_*` turn properties into descriptor
/// writes, `flush_updates` commits the slot's batch.
///
/// The `apply_*` downcasts hold because every resource reaching a material
/// was created by this same device (`create_material_backend` refuses
/// foreign shaders, and properties are built from this device's factories).

use meridian_engine::meridian::material::{
    MaterialBackend, Texture2DProperty, TextureCubeProperty, UniformBufferProperty,
};
use meridian_engine::meridian::render::{
    BindingTableManager, Shader, UniformBuffer, UniformImage2D, UniformImageCube,
};
use meridian_engine::meridian::{Error, FrameContext, Result};
use ash::vk;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex};

use crate::vulkan_shader::VulkanShader;
use crate::vulkan_table_pool::{DescriptorSource, DescriptorWrite, VulkanTablePool};
use crate::vulkan_uniform_buffer::VulkanUniformBuffer;
use crate::vulkan_uniform_image::{VulkanUniformImage2D, VulkanUniformImageCube};

pub(crate) type SharedTableManager = Arc<Mutex<BindingTableManager<VulkanTablePool>>>;

pub struct VulkanMaterialBackend {
    shader: Arc<VulkanShader>,
    manager: SharedTableManager,

    /// Tables of the slot `prepare` saw last, by set index
    tables: FxHashMap<u32, vk::DescriptorSet>,

    /// Slots whose fresh tables have not been committed yet. A slot stays
    /// fresh until a flush for it succeeds, so a failed flush re-records
    /// clean properties on the next apply instead of leaving the new
    /// tables unwritten.
    fresh_slots: FxHashSet<u32>,
}

impl VulkanMaterialBackend {
    pub(crate) fn new(shader: Arc<VulkanShader>, manager: SharedTableManager) -> Self {
        Self {
            shader,
            manager,
            tables: FxHashMap::default(),
            fresh_slots: FxHashSet::default(),
        }
    }

    fn table_for_set(&self, set_index: u32) -> Result<vk::DescriptorSet> {
        self.tables.get(&set_index).copied().ok_or_else(|| {
            Error::InvalidResource(format!(
                "Shader '{}': no binding table prepared for set {}",
                self.shader.name(),
                set_index
            ))
        })
    }
}

impl MaterialBackend for VulkanMaterialBackend {
    fn prepare(&mut self, frame: &FrameContext) -> Result<bool> {
        let mut manager = self.manager.lock().unwrap();
        self.tables.clear();
        for set_index in 0..self.shader.reflection().set_count() {
            let (table, newly_allocated) =
                manager.get_or_allocate(frame.slot(), self.shader.id(), set_index)?;
            self.tables.insert(set_index, table);
            if newly_allocated {
                self.fresh_slots.insert(frame.slot());
            }
        }
        Ok(self.fresh_slots.contains(&frame.slot()))
    }

    fn apply_uniform_buffer(
        &mut self,
        frame: &FrameContext,
        property: &UniformBufferProperty,
    ) -> Result<()> {
        let buffer = property.buffer();
        let vulkan_buffer = unsafe { &*(Arc::as_ptr(buffer) as *const VulkanUniformBuffer) };
        let table = self.table_for_set(buffer.set_index())?;
        self.manager.lock().unwrap().record_update(
            frame.slot(),
            DescriptorWrite {
                set: table,
                binding: buffer.binding(),
                source: DescriptorSource::UniformBuffer {
                    buffer: vulkan_buffer.raw(),
                },
            },
        )
    }

    fn apply_texture_2d(
        &mut self,
        frame: &FrameContext,
        property: &Texture2DProperty,
    ) -> Result<()> {
        let uniform = property.uniform();
        let vulkan_uniform = unsafe { &*(Arc::as_ptr(uniform) as *const VulkanUniformImage2D) };
        let (view, sampler) = vulkan_uniform.descriptor_source();
        let table = self.table_for_set(uniform.set_index())?;
        self.manager.lock().unwrap().record_update(
            frame.slot(),
            DescriptorWrite {
                set: table,
                binding: uniform.binding(),
                source: DescriptorSource::SampledImage { view, sampler },
            },
        )
    }

    fn apply_texture_cube(
        &mut self,
        frame: &FrameContext,
        property: &TextureCubeProperty,
    ) -> Result<()> {
        let uniform = property.uniform();
        let vulkan_uniform = unsafe { &*(Arc::as_ptr(uniform) as *const VulkanUniformImageCube) };
        let (view, sampler) = vulkan_uniform.descriptor_source();
        let table = self.table_for_set(uniform.set_index())?;
        self.manager.lock().unwrap().record_update(
            frame.slot(),
            DescriptorWrite {
                set: table,
                binding: uniform.binding(),
                source: DescriptorSource::SampledImage { view, sampler },
            },
        )
    }

    fn flush_updates(&mut self, frame: &FrameContext) -> Result<()> {
        self.manager.lock().unwrap().flush_updates(frame.slot())?;
        self.fresh_slots.remove(&frame.slot());
        Ok(())
    }
}
