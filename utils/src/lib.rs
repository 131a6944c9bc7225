pub mod cancel;
pub mod task_manager;

pub use cancel::*;
pub use task_manager::*;
