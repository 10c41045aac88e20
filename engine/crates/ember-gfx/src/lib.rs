//! Vulkan GFX 抽象层
//!
//! 提供对 Vulkan API 的封装，包括设备管理、命令缓冲、同步原语、描述符、管线、交换链等。
//! 所有入口都显式接收 [`gfx::Gfx`] 上下文的引用，不存在全局可变状态。

pub mod basic;
pub mod commands;
pub mod deletion_queue;
pub mod descriptors;
pub mod foundation;
pub mod gfx;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
