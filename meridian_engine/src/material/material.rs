/// Material - named shader properties over a backend strategy
///
/// A Material is created from a shader's reflection data: one property per
/// shader-visible binding, plus an optional push-constant block. Setters
/// only touch host state and dirty flags; `apply` is the single point where
/// binding-table updates are recorded and flushed.
///
/// Architecture:
/// - Property storage: Vec + name->index map per property kind
/// - Dirty tracking: per property, cleared only after a successful flush
/// - Backend strategy: all table work goes through `MaterialBackend`

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::{engine_debug, engine_error};
use crate::error::{Error, Result};
use crate::frame::FrameContext;
use crate::material::backend::MaterialBackend;
use crate::material::property::{
    MaterialProperty, Texture2DProperty, TextureCubeProperty, UniformBufferProperty,
};
use crate::reflection::Shader;
use crate::resources::{Image2D, ImageCube, MemoryClass, RenderDevice};

/// Push constant block size limit, the portable Vulkan minimum
pub const MAX_PUSH_CONSTANT_SIZE: usize = 128;

/// CPU-side push constant block, applied at draw time
struct PushConstantBlock {
    bytes: [u8; MAX_PUSH_CONSTANT_SIZE],
    size: usize,
}

/// Material: named, dirty-tracked properties for one shader
pub struct Material {
    name: String,
    shader: Arc<dyn Shader>,

    uniform_buffers: Vec<Arc<UniformBufferProperty>>,
    uniform_buffer_names: HashMap<String, usize>,

    textures_2d: Vec<Arc<Texture2DProperty>>,
    texture_2d_names: HashMap<String, usize>,

    textures_cube: Vec<Arc<TextureCubeProperty>>,
    texture_cube_names: HashMap<String, usize>,

    push_constants: Mutex<PushConstantBlock>,

    backend: Mutex<Box<dyn MaterialBackend>>,
}

impl Material {
    /// Create a material for `shader`, instantiating one GPU resource per
    /// reflected binding through `device`.
    pub fn new(
        name: impl Into<String>,
        shader: Arc<dyn Shader>,
        device: &dyn RenderDevice,
    ) -> Result<Self> {
        let name = name.into();
        let reflection = shader.reflection();

        // ========== VALIDATION 1: No duplicate binding names ==========
        let mut seen_names = HashSet::new();
        let all_names = reflection
            .uniform_buffers
            .iter()
            .map(|ub| &ub.name)
            .chain(reflection.images_2d.iter().map(|img| &img.name))
            .chain(reflection.images_cube.iter().map(|img| &img.name));
        for binding_name in all_names {
            if !seen_names.insert(binding_name) {
                engine_error!(
                    "meridian::Material",
                    "Material '{}': duplicate binding name '{}'",
                    name,
                    binding_name
                );
                return Err(Error::InvalidResource(format!(
                    "Duplicate binding name '{}'",
                    binding_name
                )));
            }
        }

        // ========== VALIDATION 2: Push constant block fits the limit ==========
        if let Some(pc) = &reflection.push_constants {
            if pc.size as usize > MAX_PUSH_CONSTANT_SIZE {
                engine_error!(
                    "meridian::Material",
                    "Material '{}': push constant block of {} bytes exceeds {} byte limit",
                    name,
                    pc.size,
                    MAX_PUSH_CONSTANT_SIZE
                );
                return Err(Error::InvalidResource(format!(
                    "Push constant block of {} bytes exceeds {} byte limit",
                    pc.size, MAX_PUSH_CONSTANT_SIZE
                )));
            }
        }

        let backend = device.create_material_backend(&shader)?;

        // ========== BUILD PROPERTIES FROM REFLECTION ==========
        let mut uniform_buffers = Vec::with_capacity(reflection.uniform_buffers.len());
        let mut uniform_buffer_names = HashMap::new();
        for (index, ub) in reflection.uniform_buffers.iter().enumerate() {
            let buffer = device.create_uniform_buffer(ub, MemoryClass::CpuToGpu)?;
            engine_debug!(
                "meridian::Material",
                "Material '{}': uniform buffer '{}' ({} bytes, set {}, binding {})",
                name,
                ub.name,
                ub.size,
                ub.set,
                ub.binding
            );
            uniform_buffer_names.insert(ub.name.clone(), index);
            uniform_buffers.push(Arc::new(UniformBufferProperty::new(ub.name.clone(), buffer)));
        }

        let mut textures_2d = Vec::with_capacity(reflection.images_2d.len());
        let mut texture_2d_names = HashMap::new();
        for (index, img) in reflection.images_2d.iter().enumerate() {
            let uniform = device.create_uniform_image_2d(img)?;
            engine_debug!(
                "meridian::Material",
                "Material '{}': 2D texture '{}' (set {}, binding {})",
                name,
                img.name,
                img.set,
                img.binding
            );
            texture_2d_names.insert(img.name.clone(), index);
            textures_2d.push(Arc::new(Texture2DProperty::new(img.name.clone(), uniform)));
        }

        let mut textures_cube = Vec::with_capacity(reflection.images_cube.len());
        let mut texture_cube_names = HashMap::new();
        for (index, img) in reflection.images_cube.iter().enumerate() {
            let uniform = device.create_uniform_image_cube(img)?;
            engine_debug!(
                "meridian::Material",
                "Material '{}': cube texture '{}' (set {}, binding {})",
                name,
                img.name,
                img.set,
                img.binding
            );
            texture_cube_names.insert(img.name.clone(), index);
            textures_cube.push(Arc::new(TextureCubeProperty::new(img.name.clone(), uniform)));
        }

        Ok(Self {
            name,
            shader,
            uniform_buffers,
            uniform_buffer_names,
            textures_2d,
            texture_2d_names,
            textures_cube,
            texture_cube_names,
            push_constants: Mutex::new(PushConstantBlock {
                bytes: [0u8; MAX_PUSH_CONSTANT_SIZE],
                size: 0,
            }),
            backend: Mutex::new(backend),
        })
    }

    // ===== PROPERTY ACCESS =====

    /// Get a uniform buffer property by name
    pub fn uniform_buffer_property(&self, name: &str) -> Result<Arc<UniformBufferProperty>> {
        self.uniform_buffer_names
            .get(name)
            .map(|&idx| self.uniform_buffers[idx].clone())
            .ok_or_else(|| Error::NotFoundInMaterial(name.to_string()))
    }

    /// Get a 2D texture property by name
    pub fn texture_2d_property(&self, name: &str) -> Result<Arc<Texture2DProperty>> {
        self.texture_2d_names
            .get(name)
            .map(|&idx| self.textures_2d[idx].clone())
            .ok_or_else(|| Error::NotFoundInMaterial(name.to_string()))
    }

    /// Get a cube texture property by name
    pub fn texture_cube_property(&self, name: &str) -> Result<Arc<TextureCubeProperty>> {
        self.texture_cube_names
            .get(name)
            .map(|&idx| self.textures_cube[idx].clone())
            .ok_or_else(|| Error::NotFoundInMaterial(name.to_string()))
    }

    /// Get number of uniform buffer properties
    pub fn uniform_buffer_count(&self) -> usize {
        self.uniform_buffers.len()
    }

    /// Get number of 2D texture properties
    pub fn texture_2d_count(&self) -> usize {
        self.textures_2d.len()
    }

    /// Get number of cube texture properties
    pub fn texture_cube_count(&self) -> usize {
        self.textures_cube.len()
    }

    // ===== CONVENIENCE SETTERS =====

    /// Write into a named uniform buffer property
    pub fn set_data(&self, name: &str, data: &[u8], offset: u64) -> Result<()> {
        self.uniform_buffer_property(name)?.set_data(data, offset)
    }

    /// Stage a 2D texture on a named property
    pub fn set_texture_2d(&self, name: &str, image: Arc<dyn Image2D>) -> Result<()> {
        self.texture_2d_property(name)?.set_texture(image);
        Ok(())
    }

    /// Stage a cube texture on a named property
    pub fn set_texture_cube(&self, name: &str, image: Arc<dyn ImageCube>) -> Result<()> {
        self.texture_cube_property(name)?.set_texture(image);
        Ok(())
    }

    // ===== PUSH CONSTANTS =====

    /// Replace the push constant block contents.
    ///
    /// `data` must fit the range the shader declares; an oversized write is
    /// rejected and leaves the block unchanged.
    pub fn push_constant(&self, data: &[u8]) -> Result<()> {
        let declared = self.shader.reflection().push_constants.as_ref().ok_or_else(|| {
            Error::InvalidResource(format!(
                "Material '{}': shader declares no push constants",
                self.name
            ))
        })?;

        if data.len() > declared.size as usize {
            engine_error!(
                "meridian::Material",
                "Material '{}': push constant write of {} bytes exceeds declared {} bytes",
                self.name,
                data.len(),
                declared.size
            );
            return Err(Error::InvalidResource(format!(
                "Push constant write of {} bytes exceeds declared {} bytes",
                data.len(),
                declared.size
            )));
        }

        let mut block = self.push_constants.lock().unwrap();
        block.bytes[..data.len()].copy_from_slice(data);
        block.size = data.len();
        Ok(())
    }

    /// Snapshot of the push constant block (None until the first write).
    /// Read by the backend at draw time.
    pub fn push_constant_data(&self) -> Option<Vec<u8>> {
        let block = self.push_constants.lock().unwrap();
        if block.size == 0 {
            None
        } else {
            Some(block.bytes[..block.size].to_vec())
        }
    }

    // ===== APPLICATION =====

    /// Push property changes into this frame slot's binding tables.
    ///
    /// Freshly allocated tables get every property re-applied; existing
    /// tables get only the dirty ones. Dirty flags are cleared only after
    /// `flush_updates` succeeds, so a failed flush retries next apply.
    pub fn apply(&self, frame: &FrameContext) -> Result<()> {
        let mut backend = self.backend.lock().unwrap();
        let fresh = backend.prepare(frame)?;

        let mut flushed: Vec<&dyn MaterialProperty> = Vec::new();

        for prop in &self.uniform_buffers {
            let dirty = prop.is_dirty();
            if fresh || dirty {
                backend.apply_uniform_buffer(frame, prop)?;
                if dirty {
                    flushed.push(prop.as_ref());
                }
            }
        }

        for prop in &self.textures_2d {
            let dirty = prop.is_dirty();
            if fresh || dirty {
                if let Some(image) = prop.take_pending() {
                    prop.uniform().bind_image(&image)?;
                }
                backend.apply_texture_2d(frame, prop)?;
                if dirty {
                    flushed.push(prop.as_ref());
                }
            }
        }

        for prop in &self.textures_cube {
            let dirty = prop.is_dirty();
            if fresh || dirty {
                if let Some(image) = prop.take_pending() {
                    prop.uniform().bind_image(&image)?;
                }
                backend.apply_texture_cube(frame, prop)?;
                if dirty {
                    flushed.push(prop.as_ref());
                }
            }
        }

        backend.flush_updates(frame)?;

        // Flush succeeded: now (and only now) the applied changes are clean
        for prop in flushed {
            prop.mark_clean();
        }
        Ok(())
    }

    // ===== ACCESSORS =====

    /// Material debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shader this material was built for
    pub fn shader(&self) -> &Arc<dyn Shader> {
        &self.shader
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "material_tests.rs"]
mod tests;
