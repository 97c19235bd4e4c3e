pub mod app;
pub mod body;
pub mod cell;
pub mod collide;
pub mod comm;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod init_config;
pub mod octree;
pub mod partition;
pub mod profiler;
pub mod units;

pub use error::{Error, Result};

#[cfg(feature = "profiling")]
use once_cell::sync::Lazy;
#[cfg(feature = "profiling")]
use parking_lot::Mutex;

#[cfg(feature = "profiling")]
pub static PROFILER: Lazy<Mutex<profiler::Profiler>> =
    Lazy::new(|| Mutex::new(profiler::Profiler::new()));
