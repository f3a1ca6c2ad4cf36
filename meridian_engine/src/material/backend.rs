/// Backend strategy for material application
///
/// `Material` owns the properties and the dirty bookkeeping; everything that
/// touches binding tables goes through this trait. The backend is created
/// per material by `RenderDevice::create_material_backend` and already knows
/// its shader.

use crate::error::Result;
use crate::frame::FrameContext;
use crate::material::property::{Texture2DProperty, TextureCubeProperty, UniformBufferProperty};

/// Per-material backend strategy
pub trait MaterialBackend: Send {
    /// Make sure every binding table the shader needs exists for `frame`'s
    /// slot.
    ///
    /// Returns `true` when at least one table was freshly allocated (the
    /// slot was reclaimed since the material last applied), in which case
    /// the caller must re-apply every property, not just dirty ones.
    fn prepare(&mut self, frame: &FrameContext) -> Result<bool>;

    /// Record the binding update for a uniform buffer property
    fn apply_uniform_buffer(
        &mut self,
        frame: &FrameContext,
        property: &UniformBufferProperty,
    ) -> Result<()>;

    /// Record the binding update for a 2D texture property
    fn apply_texture_2d(
        &mut self,
        frame: &FrameContext,
        property: &Texture2DProperty,
    ) -> Result<()>;

    /// Record the binding update for a cube texture property
    fn apply_texture_cube(
        &mut self,
        frame: &FrameContext,
        property: &TextureCubeProperty,
    ) -> Result<()>;

    /// Commit every update recorded since the last flush in one backend call
    fn flush_updates(&mut self, frame: &FrameContext) -> Result<()>;
}
