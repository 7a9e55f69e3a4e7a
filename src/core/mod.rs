//! Core types for gsync
//!
//! This module holds the error taxonomy shared by every other module:
//! - [`GsyncError`] - enumerated failure modes of the checkout engine
//! - [`ErrorContext`] - user-facing wrapper with suggestions and details
//! - [`user_friendly_error`] - convert any [`anyhow::Error`] for display
//! - [`exit_code_for`] - process exit status, distinguishing hook failures
//!
//! # Examples
//!
//! ```rust
//! use gsync_cli::core::{GsyncError, exit_code_for};
//!
//! let error = anyhow::Error::from(GsyncError::Interrupted);
//! assert_eq!(exit_code_for(&error), 1);
//! ```

pub mod error;

pub use error::{ErrorContext, GsyncError, exit_code_for, user_friendly_error};
