use std::path::{Path, PathBuf};

use anyhow::Context;
use ash::vk;
use ember_crate_tools::resource::EmberPath;
use serde::Deserialize;

/// 渲染器默认配置
pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    /// 同时在 GPU 上执行的帧数
    pub const FRAME_OVERLAP: usize = 2;

    /// 离屏渲染使用的 HDR 格式
    pub const DRAW_IMAGE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

    /// 帧 fence 的等待上限，超时视为设备丢失
    pub const FRAME_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;
    pub const ACQUIRE_IMAGE_TIMEOUT_NS: u64 = 1_000_000_000;

    /// background compute shader 的 local size
    pub const COMPUTE_GROUP_SIZE: u32 = 16;

    /// 每个材质常量在 uniform buffer 中占用的最小字节数
    pub const MATERIAL_CONSTANTS_SIZE: vk::DeviceSize = 256;

    pub const MIN_RENDER_SCALE: f32 = 0.3;
    pub const MAX_RENDER_SCALE: f32 = 1.0;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentModeConfig {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

impl PresentModeConfig {
    #[inline]
    pub fn vk_present_mode(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// 启动时加载的场景
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SceneConfig {
    pub name: String,
    /// 相对路径基于工作区根目录
    pub path: PathBuf,
}

/// 运行时配置，从 toml 文件读取，缺失的字段使用默认值
///
/// ```toml
/// title = "scene viewer"
/// window_width = 1280
/// present_mode = "mailbox"
///
/// [[scenes]]
/// name = "structure"
/// path = "assets/structure.glb"
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub present_mode: PresentModeConfig,

    /// 编译后的 SPIR-V 所在目录
    pub shader_dir: PathBuf,
    pub scenes: Vec<SceneConfig>,

    pub camera_position: [f32; 3],
    /// draw image 相对于 swapchain 的缩放
    pub render_scale: f32,
    /// 启动时使用的 background effect
    pub background_effect: usize,

    pub enable_validation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            window_width: 1700,
            window_height: 900,
            present_mode: PresentModeConfig::Fifo,
            shader_dir: EmberPath::shader_build_dir(),
            scenes: vec![SceneConfig {
                name: "structure".to_string(),
                path: PathBuf::from("assets/structure.glb"),
            }],
            camera_position: [30.0, 0.0, -85.0],
            render_scale: 1.0,
            background_effect: 0,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// 没有指定文件或者文件不存在时使用默认配置；文件格式错误时返回 Err
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            log::info!("config file {} not found, use default config", path.display());
            return Ok(Self::default());
        }

        let text =
            std::fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&text).with_context(|| format!("invalid config file {}", path.display()))?;
        log::info!("load config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        anyhow::ensure!(config.window_width > 0 && config.window_height > 0, "window extent must not be zero");
        Ok(config)
    }

    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.window_width,
            height: self.window_height,
        }
    }

    #[inline]
    pub fn camera_position(&self) -> glam::Vec3 {
        glam::Vec3::from_array(self.camera_position)
    }

    #[inline]
    pub fn render_scale(&self) -> f32 {
        self.render_scale.clamp(DefaultRendererSettings::MIN_RENDER_SCALE, DefaultRendererSettings::MAX_RENDER_SCALE)
    }

    /// shader_dir 下的 SPIR-V 文件，自动追加 `.spv` 后缀
    pub fn shader_path(&self, name: &str) -> PathBuf {
        EmberPath::resolve(&self.shader_dir).join(format!("{name}.spv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            title = "viewer"
            present_mode = "mailbox"

            [[scenes]]
            name = "sponza"
            path = "assets/sponza.gltf"
            "#,
        )
        .unwrap();

        assert_eq!(config.title, "viewer");
        assert_eq!(config.present_mode.vk_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.window_extent(), vk::Extent2D { width: 1700, height: 900 });
        assert_eq!(config.scenes.len(), 1);
        assert_eq!(config.scenes[0].name, "sponza");
    }

    #[test]
    fn test_malformed_config_is_error() {
        assert!(EngineConfig::from_toml_str("window_width = \"wide\"").is_err());
        assert!(EngineConfig::from_toml_str("present_mode = \"vsync\"").is_err());
        assert!(EngineConfig::from_toml_str("window_height = 0").is_err());
    }

    #[test]
    fn test_missing_file_uses_default() {
        let config = EngineConfig::load(Some(Path::new("/definitely/not/here/ember.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(EngineConfig::load(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_render_scale_is_clamped() {
        let mut config = EngineConfig::default();
        config.render_scale = 4.0;
        assert_eq!(config.render_scale(), 1.0);
        config.render_scale = 0.0;
        assert_eq!(config.render_scale(), DefaultRendererSettings::MIN_RENDER_SCALE);
    }

    #[test]
    fn test_shader_path_appends_spv() {
        let config = EngineConfig::default();
        assert!(config.shader_path("mesh.vert").ends_with("shader/.build/mesh.vert.spv"));
    }
}
