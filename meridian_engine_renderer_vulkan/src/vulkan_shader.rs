/// VulkanShader - descriptor set layouts and pipeline layout from reflection
///
/// The resource layer treats shaders as identity plus reflection; this type
/// adds the Vulkan layout objects table pools and draw recording need. Module
/// compilation and pipeline creation live with the pipeline code, not here.

use meridian_engine::meridian::render::{Shader, ShaderId, ShaderReflection, ShaderStages};
use meridian_engine::meridian::Result;
use meridian_engine::{engine_debug, engine_err};
use ash::vk;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::vulkan_context::GpuContext;

pub(crate) fn stages_to_vk(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

/// A shader program with its Vulkan layout objects
pub struct VulkanShader {
    ctx: Arc<GpuContext>,
    id: ShaderId,
    name: String,
    reflection: ShaderReflection,
    pub(crate) set_layouts: Vec<vk::DescriptorSetLayout>,
    pub(crate) pipeline_layout: vk::PipelineLayout,
}

impl VulkanShader {
    pub fn new(ctx: Arc<GpuContext>, name: &str, reflection: ShaderReflection) -> Result<Self> {
        let set_count = reflection.set_count();
        let mut set_layouts: Vec<vk::DescriptorSetLayout> = Vec::with_capacity(set_count as usize);

        for set in 0..set_count {
            let mut bindings: Vec<vk::DescriptorSetLayoutBinding> = Vec::new();

            for ub in reflection.uniform_buffers.iter().filter(|ub| ub.set == set) {
                bindings.push(
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(ub.binding)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .descriptor_count(1)
                        .stage_flags(stages_to_vk(ub.stages)),
                );
            }
            for sb in reflection.storage_buffers.iter().filter(|sb| sb.set == set) {
                bindings.push(
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(sb.binding)
                        .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                        .descriptor_count(1)
                        .stage_flags(stages_to_vk(sb.stages)),
                );
            }
            for img in reflection
                .images_2d
                .iter()
                .chain(reflection.images_cube.iter())
                .filter(|img| img.set == set)
            {
                bindings.push(
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(img.binding)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .descriptor_count(1)
                        .stage_flags(stages_to_vk(img.stages)),
                );
            }

            let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            let layout = unsafe {
                match ctx.device.create_descriptor_set_layout(&layout_info, None) {
                    Ok(layout) => layout,
                    Err(e) => {
                        for layout in set_layouts.drain(..) {
                            ctx.device.destroy_descriptor_set_layout(layout, None);
                        }
                        return Err(engine_err!(
                            "meridian::vulkan",
                            "Failed to create set layout {} for shader '{}': {:?}",
                            set,
                            name,
                            e
                        ));
                    }
                }
            };
            set_layouts.push(layout);
        }

        let mut push_constant_ranges: Vec<vk::PushConstantRange> = Vec::new();
        if let Some(pc) = &reflection.push_constants {
            push_constant_ranges.push(
                vk::PushConstantRange::default()
                    .stage_flags(stages_to_vk(pc.stages))
                    .offset(0)
                    .size(pc.size),
            );
        }

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let pipeline_layout = unsafe {
            match ctx.device.create_pipeline_layout(&layout_info, None) {
                Ok(layout) => layout,
                Err(e) => {
                    for layout in set_layouts.drain(..) {
                        ctx.device.destroy_descriptor_set_layout(layout, None);
                    }
                    return Err(engine_err!(
                        "meridian::vulkan",
                        "Failed to create pipeline layout for shader '{}': {:?}",
                        name,
                        e
                    ));
                }
            }
        };

        let id = ShaderId::next();
        engine_debug!(
            "meridian::vulkan",
            "Created shader '{}' (id {}, {} binding table(s))",
            name,
            id.raw(),
            set_count
        );

        Ok(Self {
            ctx,
            id,
            name: name.to_string(),
            reflection,
            set_layouts,
            pipeline_layout,
        })
    }
}

impl Shader for VulkanShader {
    fn id(&self) -> ShaderId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.ctx
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            for layout in self.set_layouts.drain(..) {
                self.ctx.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

/// Weak map from shader id to the backend shader that owns its layouts.
///
/// Table pools only see `ShaderId` when they allocate; the registry turns
/// that id back into set layouts. Weak references keep the registry from
/// pinning shaders the caller has dropped.
#[derive(Clone, Default)]
pub(crate) struct ShaderRegistry {
    entries: Arc<Mutex<FxHashMap<u64, Weak<VulkanShader>>>>,
}

impl ShaderRegistry {
    pub(crate) fn register(&self, shader: &Arc<VulkanShader>) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.insert(shader.id().raw(), Arc::downgrade(shader));
    }

    pub(crate) fn resolve(&self, id: ShaderId) -> Option<Arc<VulkanShader>> {
        self.entries
            .lock()
            .unwrap()
            .get(&id.raw())
            .and_then(Weak::upgrade)
    }
}
