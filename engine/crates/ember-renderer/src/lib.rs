//! 渲染核心
//!
//! 在 `ember-gfx` 之上组织一帧的完整流程：帧环同步、延迟销毁、场景遍历、材质绑定与 glTF 场景加载。

pub mod compute_effect;
pub mod default_resources;
pub mod engine;
pub mod frame_data;
pub mod gltf_loader;
pub mod gpu_data;
pub mod loaded_scene;
pub mod material_binder;
pub mod overlay;
pub mod settings;
pub mod stats;
pub mod upload;
