//! GPU resource traits
//!
//! Backend-agnostic traits for the shader-visible resources a material can
//! reference, plus the `RenderDevice` factory that creates them. Backends
//! (Vulkan, ...) provide concrete types behind `Arc<dyn ...>`.

use crate::error::Result;
use crate::frame::FrameContext;
use crate::material::MaterialBackend;
use crate::reflection::{
    ReflectedSampledImage, ReflectedStorageBuffer, ReflectedUniformBuffer, Shader,
};
use std::sync::Arc;

/// Where a buffer's memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryClass {
    /// Host-visible, written directly by the CPU every frame
    CpuToGpu,

    /// Device-local, filled through staging uploads
    GpuOnly,
}

/// Pixel formats supported by the resource layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ImageFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    R32G32B32A32_FLOAT,
}

impl ImageFormat {
    /// Bytes per pixel for upload size computation
    pub fn bytes_per_pixel(&self) -> u64 {
        match self {
            ImageFormat::R8G8B8A8_UNORM => 4,
            ImageFormat::R8G8B8A8_SRGB => 4,
            ImageFormat::B8G8R8A8_UNORM => 4,
            ImageFormat::R32G32B32A32_FLOAT => 16,
        }
    }
}

/// Image creation parameters
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,

    /// Name used in allocation tags and log messages
    pub debug_name: String,
}

/// Immutable image properties, queryable after creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Fixed-size shader-visible buffer with a host shadow copy
///
/// The size is the size declared by the shader; writes past the end are
/// rejected and leave both the shadow and the GPU contents untouched.
pub trait UniformBuffer: Send + Sync {
    /// Write `data` at `offset`, updating the host shadow and GPU memory
    fn set_data(&self, data: &[u8], offset: u64) -> Result<()>;

    /// Declared size in bytes
    fn size(&self) -> u64;

    /// Binding-table (descriptor set) index this buffer binds to
    fn set_index(&self) -> u32;

    /// Binding index inside the table
    fn binding(&self) -> u32;

    /// Snapshot of the host shadow copy
    fn shadow(&self) -> Vec<u8>;
}

/// Growable shader-visible buffer with a host shadow copy
///
/// A write larger than the current capacity releases the GPU buffer and
/// allocates a new one sized to the write.
pub trait StorageBuffer: Send + Sync {
    /// Write `data` at `offset`, growing the buffer if `offset + len` exceeds
    /// the current capacity
    fn set_data(&self, data: &[u8], offset: u64) -> Result<()>;

    /// Current capacity in bytes
    fn size(&self) -> u64;

    /// Binding-table (descriptor set) index this buffer binds to
    fn set_index(&self) -> u32;

    /// Binding index inside the table
    fn binding(&self) -> u32;

    /// Snapshot of the host shadow copy
    fn shadow(&self) -> Vec<u8>;
}

/// Sampled 2D image
pub trait Image2D: Send + Sync {
    fn info(&self) -> ImageInfo;
}

/// Sampled cube image (6 faces, uploaded +X -X +Y -Y +Z -Z)
pub trait ImageCube: Send + Sync {
    fn info(&self) -> ImageInfo;
}

/// Shader-visible 2D image slot
///
/// Holds the view/sampler pair a binding-table update reads; rebinding an
/// image only changes what the next recorded update points at.
pub trait UniformImage2D: Send + Sync {
    /// Point the slot at `image`
    fn bind_image(&self, image: &Arc<dyn Image2D>) -> Result<()>;

    /// Binding-table (descriptor set) index
    fn set_index(&self) -> u32;

    /// Binding index inside the table
    fn binding(&self) -> u32;
}

/// Shader-visible cube image slot
pub trait UniformImageCube: Send + Sync {
    /// Point the slot at `image`
    fn bind_image(&self, image: &Arc<dyn ImageCube>) -> Result<()>;

    /// Binding-table (descriptor set) index
    fn set_index(&self) -> u32;

    /// Binding index inside the table
    fn binding(&self) -> u32;
}

/// Factory trait for GPU resources
///
/// One instance per logical GPU. All `create_*` methods hand back shared
/// handles; resources keep the backend alive through their own context
/// references, not through this trait object.
pub trait RenderDevice: Send + Sync {
    /// Create a uniform buffer for a reflected binding
    fn create_uniform_buffer(
        &self,
        desc: &ReflectedUniformBuffer,
        class: MemoryClass,
    ) -> Result<Arc<dyn UniformBuffer>>;

    /// Create a storage buffer with `initial_capacity` bytes
    fn create_storage_buffer(
        &self,
        desc: &ReflectedStorageBuffer,
        initial_capacity: u64,
        class: MemoryClass,
    ) -> Result<Arc<dyn StorageBuffer>>;

    /// Create a 2D image, optionally uploading `data` (tightly packed pixels)
    fn create_image_2d(&self, spec: &ImageSpec, data: Option<&[u8]>) -> Result<Arc<dyn Image2D>>;

    /// Create a cube image, optionally uploading `data` (6 faces, contiguous)
    fn create_image_cube(&self, spec: &ImageSpec, data: Option<&[u8]>)
        -> Result<Arc<dyn ImageCube>>;

    /// Create a shader-visible 2D image slot for a reflected binding
    fn create_uniform_image_2d(
        &self,
        slot: &ReflectedSampledImage,
    ) -> Result<Arc<dyn UniformImage2D>>;

    /// Create a shader-visible cube image slot for a reflected binding
    fn create_uniform_image_cube(
        &self,
        slot: &ReflectedSampledImage,
    ) -> Result<Arc<dyn UniformImageCube>>;

    /// Create the per-material backend strategy for `shader`
    fn create_material_backend(&self, shader: &Arc<dyn Shader>) -> Result<Box<dyn MaterialBackend>>;

    /// Reclaim per-frame state for the slot `frame` is about to reuse
    ///
    /// Must be called once per frame, after the GPU has finished the previous
    /// use of the slot (fence waited) and before any material is applied.
    fn begin_frame(&self, frame: &FrameContext) -> Result<()>;

    /// Number of frames in flight this device was created with
    fn frames_in_flight(&self) -> u32;
}
