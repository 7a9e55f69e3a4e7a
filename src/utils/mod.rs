//! Cross-platform utilities and helpers
//!
//! - [`fs`] - atomic writes and configuration discovery
//! - [`paths`] - forward-slash relative path manipulation for dependency names
//! - [`platform`] - executable lookup for git, cipd and hook interpreters
//! - [`progress`] - progress bar shown during sync

pub mod fs;
pub mod paths;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir, find_config_root};
