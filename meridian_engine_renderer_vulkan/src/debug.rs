/// Validation-layer debug messenger callback
///
/// Routes Vulkan validation messages into the engine log, so driver
/// diagnostics show up alongside engine output with the same severity
/// model. Compiled only with the `vulkan-validation` feature.

use meridian_engine::{engine_debug, engine_error, engine_info, engine_warn};
use ash::vk;
use std::ffi::CStr;

pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let category = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        engine_error!(
            "meridian::vulkan::debug",
            "[{}] {}: {}",
            category,
            message_id_name,
            message
        );
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        engine_warn!(
            "meridian::vulkan::debug",
            "[{}] {}: {}",
            category,
            message_id_name,
            message
        );
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        engine_info!(
            "meridian::vulkan::debug",
            "[{}] {}: {}",
            category,
            message_id_name,
            message
        );
    } else {
        engine_debug!(
            "meridian::vulkan::debug",
            "[{}] {}: {}",
            category,
            message_id_name,
            message
        );
    }

    // Never abort the Vulkan call that triggered the message
    vk::FALSE
}
