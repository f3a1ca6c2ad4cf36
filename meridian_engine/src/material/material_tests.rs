//! Unit tests for Material
//!
//! Driven entirely through the mock render device; the binding-table
//! manager in the middle is the production implementation.

use crate::error::Error;
use crate::frame::FrameContext;
use crate::material::mock::{MockRenderDevice, MockShader, MockUniformImage2D, MockUpdateKind};
use crate::material::{Material, MaterialProperty};
use crate::reflection::{
    ReflectedPushConstants, ReflectedSampledImage, ReflectedUniformBuffer, ShaderReflection,
    ShaderStages,
};
use crate::resources::{ImageFormat, ImageSpec, RenderDevice};

// ============================================================================
// HELPERS
// ============================================================================

/// One uniform buffer + one 2D texture, both in set 0
fn simple_reflection() -> ShaderReflection {
    ShaderReflection {
        uniform_buffers: vec![ReflectedUniformBuffer {
            name: "u_Camera".to_string(),
            size: 64,
            set: 0,
            binding: 0,
            stages: ShaderStages::VERTEX,
        }],
        storage_buffers: vec![],
        images_2d: vec![ReflectedSampledImage {
            name: "t_Albedo".to_string(),
            set: 0,
            binding: 1,
            stages: ShaderStages::FRAGMENT,
        }],
        images_cube: vec![],
        push_constants: Some(ReflectedPushConstants {
            size: 64,
            stages: ShaderStages::VERTEX,
        }),
    }
}

fn image_spec(name: &str) -> ImageSpec {
    ImageSpec {
        width: 4,
        height: 4,
        format: ImageFormat::R8G8B8A8_UNORM,
        debug_name: name.to_string(),
    }
}

fn make_material(device: &MockRenderDevice) -> Material {
    let shader = MockShader::new("test_shader", simple_reflection());
    Material::new("test_material", shader, device).unwrap()
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_material_creation_builds_properties_from_reflection() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);

    assert_eq!(material.uniform_buffer_count(), 1);
    assert_eq!(material.texture_2d_count(), 1);
    assert_eq!(material.texture_cube_count(), 0);

    let camera = material.uniform_buffer_property("u_Camera").unwrap();
    assert_eq!(camera.buffer().size(), 64);
    assert_eq!(camera.buffer().set_index(), 0);
    assert_eq!(camera.buffer().binding(), 0);

    // New properties start dirty so the first apply binds everything
    assert!(camera.is_dirty());
    assert!(material.texture_2d_property("t_Albedo").unwrap().is_dirty());
}

#[test]
fn test_unknown_property_lookup_fails() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);

    match material.uniform_buffer_property("u_Missing") {
        Err(Error::NotFoundInMaterial(name)) => assert_eq!(name, "u_Missing"),
        other => panic!("Expected NotFoundInMaterial, got {:?}", other.map(|_| ())),
    }
    assert!(material.texture_2d_property("u_Camera").is_err());
    assert!(material.texture_cube_property("t_Albedo").is_err());
}

#[test]
fn test_duplicate_binding_name_rejected() {
    let device = MockRenderDevice::new(2);
    let mut reflection = simple_reflection();
    reflection.images_2d.push(ReflectedSampledImage {
        name: "u_Camera".to_string(), // clashes with the uniform buffer
        set: 0,
        binding: 2,
        stages: ShaderStages::FRAGMENT,
    });

    let shader = MockShader::new("dup_shader", reflection);
    let result = Material::new("dup_material", shader, &device);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

// ============================================================================
// UNIFORM DATA WRITES
// ============================================================================

#[test]
fn test_uniform_write_updates_shadow_and_marks_dirty() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);

    // First apply cleans the initial dirtiness
    material.apply(&frame).unwrap();
    let camera = material.uniform_buffer_property("u_Camera").unwrap();
    assert!(!camera.is_dirty());

    material.set_data("u_Camera", &[7u8; 16], 8).unwrap();

    assert!(camera.is_dirty());
    let shadow = camera.buffer().shadow();
    assert_eq!(&shadow[8..24], &[7u8; 16]);
    assert_eq!(&shadow[0..8], &[0u8; 8]);
}

#[test]
fn test_oversized_uniform_write_rejected_without_side_effects() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);
    material.apply(&frame).unwrap();

    let camera = material.uniform_buffer_property("u_Camera").unwrap();
    material.set_data("u_Camera", &[1u8; 8], 0).unwrap();
    material.apply(&frame).unwrap();
    assert!(!camera.is_dirty());

    // 60 bytes at offset 8 overruns the 64-byte buffer
    let result = material.set_data("u_Camera", &[9u8; 60], 8);
    assert!(matches!(result, Err(Error::InvalidResource(_))));

    // Shadow untouched, dirty flag untouched
    assert_eq!(&camera.buffer().shadow()[0..8], &[1u8; 8]);
    assert!(!camera.is_dirty());
}

// ============================================================================
// APPLY / DIRTY TRACKING
// ============================================================================

#[test]
fn test_first_apply_flushes_every_property_in_one_commit() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);

    material.set_data("u_Camera", &[1u8; 64], 0).unwrap();
    let image = device.create_image_2d(&image_spec("albedo"), None).unwrap();
    material.set_texture_2d("t_Albedo", image).unwrap();

    material.apply(&frame).unwrap();

    // Exactly one update per property, all in a single commit
    let committed = device.committed.lock().unwrap().clone();
    assert_eq!(committed.len(), 2);
    assert_eq!(*device.commit_calls.lock().unwrap(), 1);
    assert!(committed.iter().any(|u| u.kind == MockUpdateKind::UniformBuffer && u.binding == 0));
    assert!(committed.iter().any(|u| u.kind == MockUpdateKind::Texture2D && u.binding == 1));
}

#[test]
fn test_reapply_without_changes_flushes_nothing() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);

    material.apply(&frame).unwrap();
    let after_first = device.committed_count();
    let calls_after_first = *device.commit_calls.lock().unwrap();

    material.apply(&frame).unwrap();

    assert_eq!(device.committed_count(), after_first);
    assert_eq!(*device.commit_calls.lock().unwrap(), calls_after_first);
}

#[test]
fn test_apply_after_single_write_flushes_one_update() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);
    material.apply(&frame).unwrap();

    let before = device.committed_count();
    material.set_data("u_Camera", &[3u8; 4], 0).unwrap();
    material.apply(&frame).unwrap();

    assert_eq!(device.committed_count(), before + 1);
}

#[test]
fn test_slot_cleanup_forces_full_reapply() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);
    material.apply(&frame).unwrap();
    let before = device.committed_count();

    // Slot reclaimed: tables are gone, clean properties must still re-bind
    device.begin_frame(&frame).unwrap();
    material.apply(&frame).unwrap();

    assert_eq!(device.committed_count(), before + 2);
}

#[test]
fn test_failed_flush_keeps_properties_dirty_and_retries() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);

    device
        .fail_commit
        .store(true, std::sync::atomic::Ordering::Release);
    assert!(material.apply(&frame).is_err());

    let camera = material.uniform_buffer_property("u_Camera").unwrap();
    assert!(camera.is_dirty());
    assert_eq!(device.committed_count(), 0);

    // Next apply re-records and succeeds
    device
        .fail_commit
        .store(false, std::sync::atomic::Ordering::Release);
    material.apply(&frame).unwrap();
    assert!(!camera.is_dirty());
    assert_eq!(device.committed_count(), 2);
}

#[test]
fn test_fresh_tables_recover_after_failed_flush() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);
    material.apply(&frame).unwrap();
    let before = device.committed_count();

    // Slot reclaimed, then the full re-application fails to flush
    device.begin_frame(&frame).unwrap();
    device
        .fail_commit
        .store(true, std::sync::atomic::Ordering::Release);
    assert!(material.apply(&frame).is_err());
    assert_eq!(device.committed_count(), before);

    // Clean properties must still be re-recorded on the retry, or the
    // slot's fresh tables would be bound with nothing ever written
    device
        .fail_commit
        .store(false, std::sync::atomic::Ordering::Release);
    material.apply(&frame).unwrap();
    assert_eq!(device.committed_count(), before + 2);

    // The committed slot is no longer treated as fresh
    material.apply(&frame).unwrap();
    assert_eq!(device.committed_count(), before + 2);
}

#[test]
fn test_uniform_write_offset_overflow_rejected() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);

    // offset + len wraps around u64; must reject, not panic
    let result = material.set_data("u_Camera", &[1u8; 8], u64::MAX - 4);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_staged_texture_binds_during_apply() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);
    let frame = FrameContext::new(2);

    let albedo = material.texture_2d_property("t_Albedo").unwrap();
    let mock_uniform =
        unsafe { &*(std::sync::Arc::as_ptr(albedo.uniform()) as *const MockUniformImage2D) };
    assert!(!mock_uniform.has_bound_image());

    let image = device.create_image_2d(&image_spec("albedo"), None).unwrap();
    material.set_texture_2d("t_Albedo", image).unwrap();
    assert!(!mock_uniform.has_bound_image());

    material.apply(&frame).unwrap();
    assert!(mock_uniform.has_bound_image());
}

// ============================================================================
// PUSH CONSTANTS
// ============================================================================

#[test]
fn test_push_constant_round_trip() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);

    assert!(material.push_constant_data().is_none());

    let data: Vec<u8> = (0..32).collect();
    material.push_constant(&data).unwrap();
    assert_eq!(material.push_constant_data().unwrap(), data);
}

#[test]
fn test_push_constant_oversized_write_rejected() {
    let device = MockRenderDevice::new(2);
    let material = make_material(&device);

    // Declared range is 64 bytes
    let result = material.push_constant(&[0u8; 65]);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert!(material.push_constant_data().is_none());
}

#[test]
fn test_push_constant_requires_declared_range() {
    let device = MockRenderDevice::new(2);
    let mut reflection = simple_reflection();
    reflection.push_constants = None;
    let shader = MockShader::new("no_pc_shader", reflection);
    let material = Material::new("no_pc_material", shader, &device).unwrap();

    assert!(material.push_constant(&[0u8; 4]).is_err());
}
