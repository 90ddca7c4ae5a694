pub mod cli;
pub mod config;
pub mod file;
pub mod types;

pub use config::Config;
pub use file::{ConfigError, FileConfig};
pub use types::LogLevel;
