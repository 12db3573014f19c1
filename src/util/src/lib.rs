pub mod debug;
pub mod mem;
