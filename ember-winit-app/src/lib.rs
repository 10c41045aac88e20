pub mod app;
pub mod camera_controller;
pub mod input_state;
