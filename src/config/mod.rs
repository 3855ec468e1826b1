mod loader;

pub use loader::{Config, OutputConfig, ReductionConfig};
