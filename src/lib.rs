pub mod config;
pub mod fetch;
pub mod merge;
pub mod process;

pub use config::Config;
pub use fetch::Loader;
pub use merge::{Dashboard, DatasetMerger, Window};
