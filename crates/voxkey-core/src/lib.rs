pub mod config;
pub mod error;
pub mod pcm;
pub mod protocol;
pub mod types;

pub use config::VoxConfig;
pub use error::{Result, VoxError};
pub use types::*;
