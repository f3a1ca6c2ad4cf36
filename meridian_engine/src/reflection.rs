//! Shader reflection model
//!
//! Reflection data is an input to this layer: the asset pipeline (or an
//! offline tool) parses compiled shaders and hands the engine an already
//! structured description of every shader-visible binding. Nothing here
//! reads SPIR-V.

use std::sync::atomic::{AtomicU64, Ordering};

bitflags::bitflags! {
    /// Pipeline stages a binding is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

/// A uniform buffer binding declared by a shader
#[derive(Debug, Clone)]
pub struct ReflectedUniformBuffer {
    /// Binding name as declared in the shader source
    pub name: String,

    /// Declared size in bytes
    pub size: u64,

    /// Binding-table (descriptor set) index
    pub set: u32,

    /// Binding index inside the table
    pub binding: u32,

    /// Stages that read this buffer
    pub stages: ShaderStages,
}

/// A storage buffer binding declared by a shader
#[derive(Debug, Clone)]
pub struct ReflectedStorageBuffer {
    /// Binding name as declared in the shader source
    pub name: String,

    /// Binding-table (descriptor set) index
    pub set: u32,

    /// Binding index inside the table
    pub binding: u32,

    /// Stages that access this buffer
    pub stages: ShaderStages,
}

/// A combined image/sampler binding declared by a shader
#[derive(Debug, Clone)]
pub struct ReflectedSampledImage {
    /// Binding name as declared in the shader source
    pub name: String,

    /// Binding-table (descriptor set) index
    pub set: u32,

    /// Binding index inside the table
    pub binding: u32,

    /// Stages that sample this image
    pub stages: ShaderStages,
}

/// Push constant range declared by a shader
#[derive(Debug, Clone)]
pub struct ReflectedPushConstants {
    /// Range size in bytes
    pub size: u32,

    /// Stages that read the range
    pub stages: ShaderStages,
}

/// Complete binding description of one shader program
#[derive(Debug, Clone, Default)]
pub struct ShaderReflection {
    pub uniform_buffers: Vec<ReflectedUniformBuffer>,
    pub storage_buffers: Vec<ReflectedStorageBuffer>,
    pub images_2d: Vec<ReflectedSampledImage>,
    pub images_cube: Vec<ReflectedSampledImage>,
    pub push_constants: Option<ReflectedPushConstants>,
}

impl ShaderReflection {
    /// Look up a uniform buffer binding by name
    pub fn uniform_buffer(&self, name: &str) -> Option<&ReflectedUniformBuffer> {
        self.uniform_buffers.iter().find(|ub| ub.name == name)
    }

    /// Look up a storage buffer binding by name
    pub fn storage_buffer(&self, name: &str) -> Option<&ReflectedStorageBuffer> {
        self.storage_buffers.iter().find(|sb| sb.name == name)
    }

    /// Look up a 2D sampled image binding by name
    pub fn image_2d(&self, name: &str) -> Option<&ReflectedSampledImage> {
        self.images_2d.iter().find(|img| img.name == name)
    }

    /// Look up a cube sampled image binding by name
    pub fn image_cube(&self, name: &str) -> Option<&ReflectedSampledImage> {
        self.images_cube.iter().find(|img| img.name == name)
    }

    /// Number of binding tables this shader uses (highest set index + 1)
    pub fn set_count(&self) -> u32 {
        let mut max_set = None;
        let sets = self
            .uniform_buffers
            .iter()
            .map(|ub| ub.set)
            .chain(self.storage_buffers.iter().map(|sb| sb.set))
            .chain(self.images_2d.iter().map(|img| img.set))
            .chain(self.images_cube.iter().map(|img| img.set));
        for set in sets {
            max_set = Some(max_set.map_or(set, |m: u32| m.max(set)));
        }
        max_set.map_or(0, |m| m + 1)
    }
}

/// Process-unique shader identity
///
/// Binding tables are cached per (shader, frame slot, set index); the id is
/// the cache key, not the shader module handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(u64);

impl ShaderId {
    /// Allocate the next unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ShaderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value (stable for the life of the process)
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A shader program as seen by the resource layer: identity plus reflection
pub trait Shader: Send + Sync {
    /// Process-unique identity used as the binding-table cache key
    fn id(&self) -> ShaderId;

    /// Debug name
    fn name(&self) -> &str;

    /// Reflection data describing every shader-visible binding
    fn reflection(&self) -> &ShaderReflection;
}

#[cfg(test)]
#[path = "reflection_tests.rs"]
mod tests;
