/// Vulkan sampled images (2D and cube) with creation-time upload
///
/// Images are always GpuOnly: pixel data goes through a staging buffer and
/// the synchronous transfer service, with layout transitions to
/// SHADER_READ_ONLY_OPTIMAL. Each image carries its own view and sampler;
/// descriptor writes read those directly.

use meridian_engine::meridian::render::{
    Image2D, ImageCube, ImageFormat, ImageInfo, ImageSpec, MemoryClass,
};
use meridian_engine::meridian::{Error, Result};
use meridian_engine::{engine_err, engine_error};
use ash::vk;
use std::sync::{Arc, Mutex};

use crate::vulkan_allocator::ImageAllocation;
use crate::vulkan_context::GpuContext;
use crate::vulkan_transfer::TransferService;

pub(crate) fn image_format_to_vk(format: ImageFormat) -> vk::Format {
    match format {
        ImageFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        ImageFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        ImageFormat::R32G32B32A32_FLOAT => vk::Format::R32G32B32A32_SFLOAT,
    }
}

struct ImageParts {
    allocation: ImageAllocation,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

/// Create image + view + sampler and run the initial upload/transition
fn create_image_parts(
    ctx: &Arc<GpuContext>,
    spec: &ImageSpec,
    data: Option<&[u8]>,
    layers: u32,
    cube: bool,
) -> Result<ImageParts> {
    if spec.width == 0 || spec.height == 0 {
        engine_error!(
            "meridian::vulkan",
            "Image '{}': zero extent {}x{}",
            spec.debug_name,
            spec.width,
            spec.height
        );
        return Err(Error::InvalidResource(format!(
            "Image '{}': zero extent {}x{}",
            spec.debug_name, spec.width, spec.height
        )));
    }

    if let Some(data) = data {
        let expected =
            spec.width as u64 * spec.height as u64 * spec.format.bytes_per_pixel() * layers as u64;
        if data.len() as u64 != expected {
            engine_error!(
                "meridian::vulkan",
                "Image '{}': upload of {} bytes does not match expected {} bytes",
                spec.debug_name,
                data.len(),
                expected
            );
            return Err(Error::InvalidResource(format!(
                "Image '{}': upload of {} bytes does not match expected {} bytes",
                spec.debug_name,
                data.len(),
                expected
            )));
        }
    }

    let flags = if cube {
        vk::ImageCreateFlags::CUBE_COMPATIBLE
    } else {
        vk::ImageCreateFlags::empty()
    };

    let create_info = vk::ImageCreateInfo::default()
        .flags(flags)
        .image_type(vk::ImageType::TYPE_2D)
        .format(image_format_to_vk(spec.format))
        .extent(vk::Extent3D {
            width: spec.width,
            height: spec.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(layers)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let allocation = ctx
        .allocator
        .allocate_image(&spec.debug_name, &create_info, MemoryClass::GpuOnly)?;
    let image = allocation.image;

    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: layers,
    };

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(if cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        })
        .format(image_format_to_vk(spec.format))
        .subresource_range(subresource_range);

    let view = unsafe {
        match ctx.device.create_image_view(&view_info, None) {
            Ok(view) => view,
            Err(e) => {
                ctx.allocator.destroy_image(allocation);
                return Err(engine_err!(
                    "meridian::vulkan",
                    "Failed to create image view for '{}': {:?}",
                    spec.debug_name,
                    e
                ));
            }
        }
    };

    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .anisotropy_enable(true)
        .max_anisotropy(16.0);

    let sampler = unsafe {
        match ctx.device.create_sampler(&sampler_info, None) {
            Ok(sampler) => sampler,
            Err(e) => {
                ctx.device.destroy_image_view(view, None);
                ctx.allocator.destroy_image(allocation);
                return Err(engine_err!(
                    "meridian::vulkan",
                    "Failed to create sampler for '{}': {:?}",
                    spec.debug_name,
                    e
                ));
            }
        }
    };

    let upload_result = match data {
        Some(data) => upload_pixels(ctx, spec, data, image, layers, subresource_range),
        None => transition_only(ctx, image, subresource_range),
    };

    if let Err(e) = upload_result {
        unsafe {
            ctx.device.destroy_sampler(sampler, None);
            ctx.device.destroy_image_view(view, None);
        }
        ctx.allocator.destroy_image(allocation);
        return Err(e);
    }

    Ok(ImageParts {
        allocation,
        view,
        sampler,
    })
}

/// Stage pixels, copy into every layer and transition to shader-read
fn upload_pixels(
    ctx: &Arc<GpuContext>,
    spec: &ImageSpec,
    data: &[u8],
    image: vk::Image,
    layers: u32,
    subresource_range: vk::ImageSubresourceRange,
) -> Result<()> {
    let staging_create_info = vk::BufferCreateInfo::default()
        .size(data.len() as u64)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let staging = ctx.allocator.allocate_buffer(
        "image_staging_buffer",
        &staging_create_info,
        MemoryClass::CpuToGpu,
    )?;

    let result = (|| -> Result<()> {
        let mapped_ptr = staging
            .allocation
            .mapped_ptr()
            .ok_or_else(|| {
                engine_err!(
                    "meridian::vulkan",
                    "Image staging buffer is not mapped for '{}'",
                    spec.debug_name
                )
            })?
            .as_ptr() as *mut u8;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr, data.len());
        }

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: layers,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: spec.width,
                height: spec.height,
                depth: 1,
            });

        let staging_buffer = staging.buffer;
        TransferService::new(ctx.clone()).flush("image upload", |device, command_buffer| unsafe {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource_range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            device.cmd_copy_buffer_to_image(
                command_buffer,
                staging_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            let to_shader = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource_range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_shader],
            );
        })
    })();

    ctx.allocator.destroy_buffer(staging);
    result
}

/// No data to upload: transition straight to shader-read
fn transition_only(
    ctx: &Arc<GpuContext>,
    image: vk::Image,
    subresource_range: vk::ImageSubresourceRange,
) -> Result<()> {
    TransferService::new(ctx.clone()).flush("image layout transition", |device, command_buffer| unsafe {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::SHADER_READ);

        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    })
}

/// Vulkan 2D sampled image
pub struct VulkanImage2D {
    ctx: Arc<GpuContext>,
    allocation: Mutex<Option<ImageAllocation>>,
    pub(crate) view: vk::ImageView,
    pub(crate) sampler: vk::Sampler,
    info: ImageInfo,
}

impl VulkanImage2D {
    pub fn new(ctx: Arc<GpuContext>, spec: &ImageSpec, data: Option<&[u8]>) -> Result<Self> {
        let parts = create_image_parts(&ctx, spec, data, 1, false)?;
        Ok(Self {
            ctx,
            allocation: Mutex::new(Some(parts.allocation)),
            view: parts.view,
            sampler: parts.sampler,
            info: ImageInfo {
                width: spec.width,
                height: spec.height,
                format: spec.format,
            },
        })
    }
}

impl Image2D for VulkanImage2D {
    fn info(&self) -> ImageInfo {
        self.info
    }
}

impl Drop for VulkanImage2D {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
            self.ctx.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.lock().unwrap().take() {
            self.ctx.allocator.destroy_image(allocation);
        }
    }
}

/// Vulkan cube sampled image (6 layers, uploaded +X -X +Y -Y +Z -Z)
pub struct VulkanImageCube {
    ctx: Arc<GpuContext>,
    allocation: Mutex<Option<ImageAllocation>>,
    pub(crate) view: vk::ImageView,
    pub(crate) sampler: vk::Sampler,
    info: ImageInfo,
}

impl VulkanImageCube {
    pub fn new(ctx: Arc<GpuContext>, spec: &ImageSpec, data: Option<&[u8]>) -> Result<Self> {
        let parts = create_image_parts(&ctx, spec, data, 6, true)?;
        Ok(Self {
            ctx,
            allocation: Mutex::new(Some(parts.allocation)),
            view: parts.view,
            sampler: parts.sampler,
            info: ImageInfo {
                width: spec.width,
                height: spec.height,
                format: spec.format,
            },
        })
    }
}

impl ImageCube for VulkanImageCube {
    fn info(&self) -> ImageInfo {
        self.info
    }
}

impl Drop for VulkanImageCube {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
            self.ctx.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.lock().unwrap().take() {
            self.ctx.allocator.destroy_image(allocation);
        }
    }
}

/// 1x1 white fallback images bound wherever a material has not assigned a
/// texture yet, so no table ever references a missing image.
pub(crate) struct FallbackImages {
    pub(crate) white_2d: Arc<VulkanImage2D>,
    pub(crate) white_cube: Arc<VulkanImageCube>,
}

impl FallbackImages {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        let spec_2d = ImageSpec {
            width: 1,
            height: 1,
            format: ImageFormat::R8G8B8A8_UNORM,
            debug_name: "fallback_white_2d".to_string(),
        };
        let white_2d = Arc::new(VulkanImage2D::new(ctx.clone(), &spec_2d, Some(&[255u8; 4]))?);

        let spec_cube = ImageSpec {
            width: 1,
            height: 1,
            format: ImageFormat::R8G8B8A8_UNORM,
            debug_name: "fallback_white_cube".to_string(),
        };
        let white_cube = Arc::new(VulkanImageCube::new(ctx, &spec_cube, Some(&[255u8; 24]))?);

        Ok(Self {
            white_2d,
            white_cube,
        })
    }
}
