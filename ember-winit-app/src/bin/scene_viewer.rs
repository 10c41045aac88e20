use std::path::PathBuf;

use ember_crate_tools::resource::EmberPath;
use ember_renderer::settings::EngineConfig;
use ember_winit_app::app::WinitApp;

/// 用法：scene-viewer [config.toml]，默认读取工作区根目录下的 ember.toml
fn main() {
    WinitApp::init_env();

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| EmberPath::resolve("ember.toml"));
    let result = EngineConfig::load(Some(&config_path)).and_then(WinitApp::run);
    if let Err(e) = result {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}
