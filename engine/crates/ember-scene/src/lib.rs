//! CPU 端的场景数据
//!
//! 这里的类型只持有 GPU 对象的 handle，不负责创建与销毁；
//! GPU 对象的所有权属于加载它们的场景容器或者引擎本身。

pub mod bounds;
pub mod camera;
pub mod draw_context;
pub mod material;
pub mod mesh;
pub mod scene_graph;
pub mod visibility;
