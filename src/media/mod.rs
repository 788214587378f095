pub mod audio;

pub use audio::{merge, merge_and_remove_sources};
