//! Instance creation: a host graphics instance with validation optionally enabled,
//! trimmed to what this backend actually needs (no portability subset, no debug-utils
//! message severity tuning beyond on/off).

use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;

use crate::error::{Error, Result};

/// Read once at startup, not re-read per call.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub validation: bool,
    pub preferred_gpu_index: Option<u32>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        InstanceConfig { validation: false, preferred_gpu_index: None }
    }
}

pub(crate) struct InstanceShared {
    pub(crate) entry: ash::Entry,
    pub(crate) raw: ash::Instance,
    pub(crate) debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            if let Some((ext, messenger)) = self.debug_utils.take() {
                ext.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

pub struct Instance {
    pub(crate) shared: Arc<InstanceShared>,
}

unsafe extern "system" fn debug_utils_messenger_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let data = &*callback_data;
    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        CStr::from_ptr(data.p_message).to_string_lossy()
    };
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!(target: "gpu-hal::validation", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!(target: "gpu-hal::validation", "{message}");
    } else {
        log::debug!(target: "gpu-hal::validation", "{message}");
    }
    vk::FALSE
}

impl Instance {
    pub fn init(config: &InstanceConfig) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new("rpcsx-gpu-rs").unwrap();
        let engine_name = CString::new("gpu-hal").unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .engine_name(&engine_name)
            .api_version(vk::API_VERSION_1_2);

        let mut layer_names = Vec::new();
        let mut extension_names = vec![ash::extensions::ext::DebugUtils::name().as_ptr()];
        let validation_name = CStr::from_bytes_with_nul(b"VK_LAYER_KHRONOS_validation\0").unwrap();
        if config.validation {
            layer_names.push(validation_name.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        let raw = unsafe { entry.create_instance(&create_info, None)? };

        let debug_utils = if config.validation {
            let ext = ash::extensions::ext::DebugUtils::new(&entry, &raw);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                )
                .message_type(vk::DebugUtilsMessageTypeFlagsEXT::all())
                .pfn_user_callback(Some(debug_utils_messenger_callback));
            let messenger =
                unsafe { ext.create_debug_utils_messenger(&messenger_info, None)? };
            Some((ext, messenger))
        } else {
            None
        };
        extension_names.clear();

        Ok(Instance { shared: Arc::new(InstanceShared { entry, raw, debug_utils }) })
    }

    /// Enumerates physical devices and picks the one at `preferred_gpu_index` if set,
    /// else the first discrete GPU, else the first device at all.
    pub fn select_physical_device(&self, config: &InstanceConfig) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { self.shared.raw.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(Error::NoMatchingAdapter(config.preferred_gpu_index.unwrap_or(0)));
        }

        if let Some(index) = config.preferred_gpu_index {
            return devices
                .get(index as usize)
                .copied()
                .ok_or(Error::NoMatchingAdapter(index));
        }

        let discrete = devices.iter().find(|&&pd| {
            let props = unsafe { self.shared.raw.get_physical_device_properties(pd) };
            props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
        });
        Ok(*discrete.unwrap_or(&devices[0]))
    }

    pub(crate) fn raw(&self) -> &ash::Instance {
        &self.shared.raw
    }

    pub(crate) fn entry(&self) -> &ash::Entry {
        &self.shared.entry
    }
}
