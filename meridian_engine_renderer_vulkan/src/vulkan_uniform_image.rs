/// Shader-visible image slots backed by combined image/sampler descriptors
///
/// A slot stores which image the material last bound; the descriptor write
/// recorded at apply time reads the view/sampler pair from that image, or
/// from the 1x1 white fallback while nothing is bound.

use meridian_engine::meridian::render::{Image2D, ImageCube, UniformImage2D, UniformImageCube};
use meridian_engine::meridian::render::ReflectedSampledImage;
use meridian_engine::meridian::Result;
use ash::vk;
use std::sync::{Arc, Mutex};

use crate::vulkan_image::{VulkanImage2D, VulkanImageCube};

/// Vulkan 2D image slot
pub struct VulkanUniformImage2D {
    bound: Mutex<Option<Arc<dyn Image2D>>>,
    fallback: Arc<VulkanImage2D>,
    set: u32,
    binding: u32,
}

impl VulkanUniformImage2D {
    pub fn new(slot: &ReflectedSampledImage, fallback: Arc<VulkanImage2D>) -> Self {
        Self {
            bound: Mutex::new(None),
            fallback,
            set: slot.set,
            binding: slot.binding,
        }
    }

    /// View/sampler pair for the next descriptor write.
    ///
    /// Valid only for images created by this backend; the material layer
    /// never hands a slot an image from another device.
    pub(crate) fn descriptor_source(&self) -> (vk::ImageView, vk::Sampler) {
        let bound = self.bound.lock().unwrap();
        match bound.as_ref() {
            Some(image) => {
                let vulkan_image =
                    unsafe { &*(Arc::as_ptr(image) as *const VulkanImage2D) };
                (vulkan_image.view, vulkan_image.sampler)
            }
            None => (self.fallback.view, self.fallback.sampler),
        }
    }
}

impl UniformImage2D for VulkanUniformImage2D {
    fn bind_image(&self, image: &Arc<dyn Image2D>) -> Result<()> {
        *self.bound.lock().unwrap() = Some(image.clone());
        Ok(())
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }
}

/// Vulkan cube image slot
pub struct VulkanUniformImageCube {
    bound: Mutex<Option<Arc<dyn ImageCube>>>,
    fallback: Arc<VulkanImageCube>,
    set: u32,
    binding: u32,
}

impl VulkanUniformImageCube {
    pub fn new(slot: &ReflectedSampledImage, fallback: Arc<VulkanImageCube>) -> Self {
        Self {
            bound: Mutex::new(None),
            fallback,
            set: slot.set,
            binding: slot.binding,
        }
    }

    /// View/sampler pair for the next descriptor write
    pub(crate) fn descriptor_source(&self) -> (vk::ImageView, vk::Sampler) {
        let bound = self.bound.lock().unwrap();
        match bound.as_ref() {
            Some(image) => {
                let vulkan_image =
                    unsafe { &*(Arc::as_ptr(image) as *const VulkanImageCube) };
                (vulkan_image.view, vulkan_image.sampler)
            }
            None => (self.fallback.view, self.fallback.sampler),
        }
    }
}

impl UniformImageCube for VulkanUniformImageCube {
    fn bind_image(&self, image: &Arc<dyn ImageCube>) -> Result<()> {
        *self.bound.lock().unwrap() = Some(image.clone());
        Ok(())
    }

    fn set_index(&self) -> u32 {
        self.set
    }

    fn binding(&self) -> u32 {
        self.binding
    }
}
