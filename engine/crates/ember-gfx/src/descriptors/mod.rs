pub mod allocator;
pub mod backend;
pub mod layout;
pub mod writer;
