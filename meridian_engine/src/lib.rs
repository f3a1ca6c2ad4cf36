/*!
# Meridian Engine

Core traits and types for the Meridian rendering engine's GPU resource layer.

This crate provides the backend-agnostic API for GPU resource management using
trait-based dynamic polymorphism. Backend implementations (Vulkan today,
others later) supply concrete types behind these traits.

## Architecture

- **RenderDevice**: Factory trait for creating GPU resources
- **UniformBuffer / StorageBuffer**: Shader-visible buffer traits with host shadows
- **Image2D / ImageCube**: Sampled image traits
- **UniformImage2D / UniformImageCube**: Shader-visible image slot traits
- **BindingTableManager**: Frames-in-flight binding-table bookkeeping, generic
  over a backend `TablePool`
- **Material**: Named property store with dirty tracking, driven through a
  backend `MaterialBackend` strategy

Backend implementations provide concrete types that implement these traits.
*/

// Internal modules
mod binding_table;
mod error;
mod frame;
pub mod log;
pub mod material;
mod reflection;
mod resources;

// Main meridian namespace module
pub mod meridian {
    // Error types
    pub use crate::error::{Error, Result};

    // Frame context (explicitly threaded, no global frame state)
    pub use crate::frame::FrameContext;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
        // Note: engine_* macros are NOT re-exported here - they are internal only
    }

    // Render sub-module with resource traits and the binding-table manager
    pub mod render {
        pub use crate::binding_table::{BindingTableManager, TablePool};
        pub use crate::reflection::{
            ReflectedPushConstants, ReflectedSampledImage, ReflectedUniformBuffer,
            ReflectedStorageBuffer, Shader, ShaderId, ShaderReflection, ShaderStages,
        };
        pub use crate::resources::{
            Image2D, ImageCube, ImageFormat, ImageInfo, ImageSpec, MemoryClass,
            RenderDevice, StorageBuffer, UniformBuffer, UniformImage2D, UniformImageCube,
        };
    }

    // Material sub-module
    pub mod material {
        pub use crate::material::{
            Material, MaterialBackend, MaterialProperty, Texture2DProperty,
            TextureCubeProperty, UniformBufferProperty, MAX_PUSH_CONSTANT_SIZE,
        };
    }
}

// Re-export math library at crate root
pub use glam;
