/// Material properties - one per shader-visible binding
///
/// Each property pairs a GPU resource with a dirty flag. Setters take
/// `&self` (materials are shared via `Arc`); dirtiness is an `AtomicBool`
/// so concurrent setters stay safe without a lock around the whole
/// property.

use crate::error::Result;
use crate::resources::{Image2D, ImageCube, UniformBuffer, UniformImage2D, UniformImageCube};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Common dirty-tracking surface of every material property
pub trait MaterialProperty {
    /// Binding name as declared in the shader
    fn name(&self) -> &str;

    /// Whether this property has changes not yet flushed to a binding table
    fn is_dirty(&self) -> bool;

    /// Clear the dirty flag. Called by `Material::apply` after a successful
    /// flush, never before.
    fn mark_clean(&self);
}

/// A uniform buffer exposed as a named material property
pub struct UniformBufferProperty {
    name: String,
    buffer: Arc<dyn UniformBuffer>,
    dirty: AtomicBool,
}

impl UniformBufferProperty {
    /// New properties start dirty so the first apply records their binding
    pub fn new(name: String, buffer: Arc<dyn UniformBuffer>) -> Self {
        Self {
            name,
            buffer,
            dirty: AtomicBool::new(true),
        }
    }

    /// Write `data` at `offset` and mark the property dirty.
    ///
    /// A rejected write (out of bounds, backend failure) leaves the dirty
    /// flag untouched.
    pub fn set_data(&self, data: &[u8], offset: u64) -> Result<()> {
        self.buffer.set_data(data, offset)?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// The underlying GPU buffer
    pub fn buffer(&self) -> &Arc<dyn UniformBuffer> {
        &self.buffer
    }
}

impl MaterialProperty for UniformBufferProperty {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

/// A 2D texture slot exposed as a named material property
///
/// `set_texture` only stages the image; the view/sampler is bound into the
/// underlying uniform-image slot during `Material::apply`, right before the
/// binding update is recorded.
pub struct Texture2DProperty {
    name: String,
    uniform: Arc<dyn UniformImage2D>,
    pending: Mutex<Option<Arc<dyn Image2D>>>,
    dirty: AtomicBool,
}

impl Texture2DProperty {
    pub fn new(name: String, uniform: Arc<dyn UniformImage2D>) -> Self {
        Self {
            name,
            uniform,
            pending: Mutex::new(None),
            dirty: AtomicBool::new(true),
        }
    }

    /// Stage `image` as the texture to bind on the next apply
    pub fn set_texture(&self, image: Arc<dyn Image2D>) {
        *self.pending.lock().unwrap() = Some(image);
        self.dirty.store(true, Ordering::Release);
    }

    /// The shader-visible slot this property binds into
    pub fn uniform(&self) -> &Arc<dyn UniformImage2D> {
        &self.uniform
    }

    /// Take the staged image, if any (consumed by `Material::apply`)
    pub(crate) fn take_pending(&self) -> Option<Arc<dyn Image2D>> {
        self.pending.lock().unwrap().take()
    }
}

impl MaterialProperty for Texture2DProperty {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

/// A cube texture slot exposed as a named material property
pub struct TextureCubeProperty {
    name: String,
    uniform: Arc<dyn UniformImageCube>,
    pending: Mutex<Option<Arc<dyn ImageCube>>>,
    dirty: AtomicBool,
}

impl TextureCubeProperty {
    pub fn new(name: String, uniform: Arc<dyn UniformImageCube>) -> Self {
        Self {
            name,
            uniform,
            pending: Mutex::new(None),
            dirty: AtomicBool::new(true),
        }
    }

    /// Stage `image` as the texture to bind on the next apply
    pub fn set_texture(&self, image: Arc<dyn ImageCube>) {
        *self.pending.lock().unwrap() = Some(image);
        self.dirty.store(true, Ordering::Release);
    }

    /// The shader-visible slot this property binds into
    pub fn uniform(&self) -> &Arc<dyn UniformImageCube> {
        &self.uniform
    }

    /// Take the staged image, if any (consumed by `Material::apply`)
    pub(crate) fn take_pending(&self) -> Option<Arc<dyn ImageCube>> {
        self.pending.lock().unwrap().take()
    }
}

impl MaterialProperty for TextureCubeProperty {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}
