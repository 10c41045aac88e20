use std::{
    collections::HashSet,
    ffi::{CStr, CString, c_char},
};

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::foundation::debug_messenger::GfxDebugMsger;

pub struct GfxInstance {
    pub(crate) ash_instance: ash::Instance,
}

// new & init
impl GfxInstance {
    /// 设置所需的 layers 和 extensions，创建 vk instance
    pub fn new(
        vk_entry: &ash::Entry,
        app_name: &str,
        engine_name: &str,
        extra_instance_exts: &[&'static CStr],
        enable_validation: bool,
    ) -> anyhow::Result<Self> {
        let app_name = CString::new(app_name)?;
        let engine_name = CString::new(engine_name)?;
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // dynamic rendering 与 synchronization2 需要 1.3
            .application_name(app_name.as_c_str())
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name.as_c_str())
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let enabled_extensions = Self::get_extensions(vk_entry, extra_instance_exts)?;
        log::info!(
            "instance extensions: {}",
            enabled_extensions.iter().map(|ext| format!("\n\t{:?}", unsafe { CStr::from_ptr(*ext) })).join("")
        );

        let enabled_layers = Self::get_layers(vk_entry, enable_validation)?;
        log::info!(
            "instance layers: {}",
            enabled_layers.iter().map(|layer| format!("\n\t{:?}", unsafe { CStr::from_ptr(*layer) })).join("")
        );

        // 为 instance info 添加 debug messenger，覆盖 instance 创建与销毁过程
        let mut debug_utils_messenger_ci = GfxDebugMsger::debug_utils_messenger_ci();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers)
            .push_next(&mut debug_utils_messenger_ci);

        let ash_instance =
            unsafe { vk_entry.create_instance(&instance_ci, None).context("failed to create vulkan instance")? };

        Ok(Self { ash_instance })
    }

    /// instance 所需的，且受支持的 extension
    fn get_extensions(
        vk_entry: &ash::Entry,
        extra_instance_exts: &[&'static CStr],
    ) -> anyhow::Result<Vec<*const c_char>> {
        let all_ext_props = unsafe { vk_entry.enumerate_instance_extension_properties(None)? };
        let mut enabled_extensions: HashSet<&'static CStr> = HashSet::new();

        let basic_exts = [
            // 1. debug messenger
            // 2. 为 vulkan object 设置 debug name
            // 3. 使用 label 标记 command buffer 中的 section
            vk::EXT_DEBUG_UTILS_NAME,
        ];

        for ext in extra_instance_exts.iter().chain(basic_exts.iter()) {
            let supported = all_ext_props
                .iter()
                .any(|supported_ext| *ext == unsafe { CStr::from_ptr(supported_ext.extension_name.as_ptr()) });
            anyhow::ensure!(supported, "required instance extension {:?} is missing", ext);
            enabled_extensions.insert(*ext);
        }

        Ok(enabled_extensions.iter().map(|ext| ext.as_ptr()).collect_vec())
    }

    /// validation layer 缺失时只给出警告，不阻止启动
    fn get_layers(vk_entry: &ash::Entry, enable_validation: bool) -> anyhow::Result<Vec<*const c_char>> {
        const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

        if !enable_validation {
            return Ok(Vec::new());
        }

        let all_layer_props = unsafe { vk_entry.enumerate_instance_layer_properties()? };
        let supported = all_layer_props
            .iter()
            .any(|layer| VALIDATION_LAYER == unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) });
        if supported {
            Ok(vec![VALIDATION_LAYER.as_ptr()])
        } else {
            log::warn!("validation requested but {:?} is not installed", VALIDATION_LAYER);
            Ok(Vec::new())
        }
    }
}
// getters
impl GfxInstance {
    #[inline]
    pub fn ash_instance(&self) -> &ash::Instance {
        &self.ash_instance
    }

    #[inline]
    pub fn vk_instance(&self) -> vk::Instance {
        self.ash_instance.handle()
    }
}
// destroy
impl GfxInstance {
    pub fn destroy(self) {
        log::info!("destroying instance");
        unsafe {
            self.ash_instance.destroy_instance(None);
        }
    }
}
