use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// ```ignore
/// let scene = EmberPath::assets_path("structure.glb"); // assets/structure.glb
/// let shader = EmberPath::shader_build_path("mesh.vert"); // shader/.build/mesh.vert.spv
/// ```
pub struct EmberPath;

impl EmberPath {
    /// 工作区根目录
    pub fn workspace_path() -> PathBuf {
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| manifest_dir.to_path_buf())
    }

    /// `assets/` 目录下的文件
    pub fn assets_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("assets").join(filename)
    }

    pub fn shader_root_path() -> PathBuf {
        Self::workspace_path().join("shader")
    }

    /// 编译后的 SPIR-V 所在的目录
    pub fn shader_build_dir() -> PathBuf {
        Self::shader_root_path().join(".build")
    }

    /// `shader/.build/` 目录下的着色器（自动追加 `.spv` 后缀）
    pub fn shader_build_path(filename: &str) -> PathBuf {
        Self::shader_build_dir().join(format!("{filename}.spv"))
    }

    /// 相对路径视为相对于工作区根目录
    pub fn resolve(path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() { path.to_path_buf() } else { Self::workspace_path().join(path) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_build_path_appends_spv() {
        let path = EmberPath::shader_build_path("mesh.vert");
        assert!(path.ends_with("shader/.build/mesh.vert.spv"));
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let abs = EmberPath::workspace_path().join("assets/a.glb");
        assert_eq!(EmberPath::resolve(&abs), abs);
        assert_eq!(EmberPath::resolve("assets/a.glb"), abs);
    }
}
