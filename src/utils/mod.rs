pub mod debug_log;
pub mod paths;
pub mod process;
