pub mod naming;
pub mod temp;

pub use naming::{auto_save, next_auto_save_path};
pub use temp::ScopedFiles;
