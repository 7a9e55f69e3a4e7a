//! Error handling for gsync
//!
//! This module provides the error taxonomy of the checkout engine and the
//! user-friendly rendering used by the CLI. The error system follows two
//! principles:
//! 1. **Strongly-typed errors** so callers can tell a configuration problem
//!    from a checkout failure or a failing hook script
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Configuration**: [`GsyncError::Configuration`], [`GsyncError::DuplicateDependency`],
//!   [`GsyncError::ConfigNotFound`]
//! - **Manifests**: [`GsyncError::ManifestSyntax`], [`GsyncError::ManifestSemantic`],
//!   [`GsyncError::ManifestNotFound`]
//! - **Checkouts**: [`GsyncError::Checkout`]
//! - **Hooks**: [`GsyncError::HookExecution`], which maps to its own exit code
//! - **Conditions**: [`GsyncError::Evaluation`]
//! - **Scheduling**: [`GsyncError::RequirementsDeadlock`], [`GsyncError::Interrupted`]
//!
//! Use [`user_friendly_error`] to convert any [`anyhow::Error`] into an
//! [`ErrorContext`] with contextual suggestions, and [`exit_code_for`] to pick
//! the process exit status.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gsync_cli::core::{GsyncError, ErrorContext};
//!
//! let context = ErrorContext::new(GsyncError::ConfigNotFound {
//!     searched_from: ".".to_string(),
//! })
//! .with_suggestion("Run 'gsync config <url>' to create one");
//! context.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::constants::{GENERIC_FAILURE_EXIT_CODE, HOOK_FAILURE_EXIT_CODE};

/// The main error type for gsync operations.
///
/// Every variant carries enough context (node names, hierarchy paths, file
/// names) for the operator to find where the problem originates.
#[derive(Error, Debug, Clone)]
pub enum GsyncError {
    /// Malformed or self-contradictory client configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the problem
        message: String,
    },

    /// The same dependency name is declared twice with different urls.
    ///
    /// Both declarations are reported together with the chain of nodes that
    /// led to them.
    #[error(
        "Dependency '{name}' specified more than once:\n  {first_url} (from {first_path})\n  {second_url} (from {second_path})"
    )]
    DuplicateDependency {
        /// Conflicting dependency name
        name: String,
        /// Url of the declaration already in the tree
        first_url: String,
        /// Hierarchy of the declaration already in the tree
        first_path: String,
        /// Url of the rejected declaration
        second_url: String,
        /// Hierarchy of the rejected declaration
        second_path: String,
    },

    /// No client configuration file was found.
    #[error("No .gsync configuration found (searched from {searched_from})")]
    ConfigNotFound {
        /// Directory the upward search started from
        searched_from: String,
    },

    /// A manifest could not be parsed as TOML of the expected shape.
    #[error("Invalid manifest for '{node}' ({file}): {reason}")]
    ManifestSyntax {
        /// Node whose manifest failed
        node: String,
        /// Manifest file name
        file: String,
        /// Parser message
        reason: String,
    },

    /// A manifest parsed but is self-contradictory.
    #[error("Invalid manifest for '{node}': {reason}")]
    ManifestSemantic {
        /// Node whose manifest failed
        node: String,
        /// Description of the contradiction
        reason: String,
    },

    /// A manifest that was explicitly requested does not exist.
    #[error("Manifest for '{node}' not found; looked for {candidates}")]
    ManifestNotFound {
        /// Node whose manifest is missing
        node: String,
        /// Candidate paths that were tried
        candidates: String,
    },

    /// A checkout operation failed.
    #[error("Failed to {operation} '{node}': {reason}")]
    Checkout {
        /// Node being checked out
        node: String,
        /// Operation (sync, revert, status, ...)
        operation: String,
        /// Underlying failure
        reason: String,
    },

    /// A hook script exited non-zero or could not be started.
    #[error("Hook '{hook}' failed ({status}): {command}")]
    HookExecution {
        /// Hook name, or its command when unnamed
        hook: String,
        /// Full command line
        command: String,
        /// Exit status description
        status: String,
        /// Combined stdout and stderr
        output: String,
    },

    /// A condition or template referenced an undefined variable or used an
    /// unsupported construct.
    #[error("Failed to evaluate '{expression}': {reason}")]
    Evaluation {
        /// Offending expression
        expression: String,
        /// What went wrong
        reason: String,
    },

    /// Pending nodes remain but none can ever become ready.
    #[error("Dependency requirements can never be satisfied for: {pending}")]
    RequirementsDeadlock {
        /// Names of the stuck nodes
        pending: String,
    },

    /// The user interrupted the run.
    #[error("Interrupted")]
    Interrupted,

    /// I/O failure.
    #[error("I/O error: {message}")]
    Io {
        /// Rendered io error
        message: String,
    },

    /// Any other failure.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl From<std::io::Error> for GsyncError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

impl GsyncError {
    /// Shorthand for [`GsyncError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for [`GsyncError::Evaluation`].
    pub fn evaluation(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`GsyncError::ManifestSemantic`].
    pub fn semantic(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestSemantic {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a checkout failure that `--ignore-errors` may
    /// downgrade to a warning.
    #[must_use]
    pub const fn is_checkout_error(&self) -> bool {
        matches!(self, Self::Checkout { .. })
    }

    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::HookExecution { .. } => HOOK_FAILURE_EXIT_CODE,
            _ => GENERIC_FAILURE_EXIT_CODE,
        }
    }
}

/// Exit code for an arbitrary error chain.
///
/// Looks through the chain so a hook failure wrapped in context still exits
/// with the hook failure code.
#[must_use]
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<GsyncError>())
        .map_or(GENERIC_FAILURE_EXIT_CODE, GsyncError::exit_code)
}

/// Error wrapper with a suggestion and extra details for display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: GsyncError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestion or details.
    #[must_use]
    pub const fn new(error: GsyncError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Known [`GsyncError`] variants anywhere in the chain get tailored
/// suggestions; anything else is rendered with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(gsync_error) = error.chain().find_map(|cause| cause.downcast_ref::<GsyncError>())
    {
        let mut context = create_error_context(gsync_error.clone());
        let outer = error.to_string();
        if outer != gsync_error.to_string() && context.details.is_none() {
            context.details = Some(outer);
        }
        return context;
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(GsyncError::Configuration {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax: quotes, brackets and table headers");
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(GsyncError::Other {
        message,
    })
}

fn create_error_context(error: GsyncError) -> ErrorContext {
    match &error {
        GsyncError::DuplicateDependency { .. } => ErrorContext::new(error)
            .with_suggestion("Remove one of the declarations or make both point at the same url")
            .with_details("Every dependency path can only be checked out from a single url"),

        GsyncError::ConfigNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'gsync config <url>' to create a .gsync file in the checkout root")
            .with_details("gsync searches the current directory and its parents for .gsync"),

        GsyncError::ManifestSyntax { file, .. } => {
            let file = file.clone();
            ErrorContext::new(error).with_suggestion(format!(
                "Check the TOML syntax in {file}. Common issues: missing quotes, unmatched brackets"
            ))
        }

        GsyncError::Evaluation { .. } => ErrorContext::new(error)
            .with_suggestion("Declare the variable in a [vars] table or in custom_vars")
            .with_details("Conditions referencing undefined variables are never treated as false"),

        GsyncError::Checkout { .. } => ErrorContext::new(error)
            .with_suggestion("Re-run with --verbose for the git output, or --ignore-errors to continue past it"),

        GsyncError::HookExecution { output, .. } => {
            let details = if output.trim().is_empty() {
                None
            } else {
                Some(output.trim().to_string())
            };
            let context = ErrorContext::new(error)
                .with_suggestion("Fix the hook script or skip hooks with 'gsync sync --nohooks'");
            match details {
                Some(details) => context.with_details(details),
                None => context,
            }
        }

        GsyncError::RequirementsDeadlock { .. } => ErrorContext::new(error)
            .with_details("A dependency waits on a checkout that can never complete"),

        _ => ErrorContext::new(error),
    }
}
