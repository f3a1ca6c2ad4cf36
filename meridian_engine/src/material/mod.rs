//! Material system - named shader properties with dirty tracking
//!
//! A `Material` owns one property per shader-visible binding its shader
//! declares (uniform buffers, 2D textures, cube textures). Properties track
//! dirtiness; `Material::apply` pushes only what changed through a
//! backend-provided `MaterialBackend` strategy.

mod backend;
mod material;
mod property;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::MaterialBackend;
pub use material::{Material, MAX_PUSH_CONSTANT_SIZE};
pub use property::{
    MaterialProperty, Texture2DProperty, TextureCubeProperty, UniformBufferProperty,
};
