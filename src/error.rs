//! Error handling for the template engine
//!
//! This module provides:
//! - `TemplateError`, the single error type returned by the engine APIs
//! - Stable error codes (also used as process exit codes by the binary)
//! - Error categories for structured logging

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Stable error codes for every failure class the engine reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// Malformed command setup (cardinality, non-collection items, missing area)
    Configuration = 2,
    /// Expression could not be parsed or evaluated
    Evaluation = 3,
    /// Cell or area reference could not be parsed
    InvalidReference = 4,
    /// Command markup in the template is malformed
    Markup = 5,
    /// A custom placement strategy produced overlapping regions
    Overlap = 6,
    /// The grid backend rejected an operation
    Transform = 7,
}

impl ErrorCode {
    /// Get the integer code
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Errors raised by this engine are never retried: every one of them is
    /// deterministic for a given template and dataset.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get the error category for logs
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::Configuration | ErrorCode::Markup | ErrorCode::InvalidReference => {
                "template_error"
            }
            ErrorCode::Evaluation => "evaluation_error",
            ErrorCode::Overlap => "layout_error",
            ErrorCode::Transform => "backend_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// =============================================================================
// TEMPLATE ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("failed to evaluate `{expression}`: {message}")]
    Evaluation { expression: String, message: String },

    #[error("invalid cell reference `{reference}`")]
    InvalidReference { reference: String },

    #[error("invalid markup at {cell}: {message}")]
    Markup { cell: String, message: String },

    #[error("step {index} placed at {cell} overlaps a previously rendered region")]
    Overlap { index: usize, cell: String },

    #[error("transformer error: {message}")]
    Transform { message: String },
}

impl TemplateError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn evaluation(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub fn invalid_reference(reference: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
        }
    }

    pub fn markup(cell: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Markup {
            cell: cell.to_string(),
            message: message.into(),
        }
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration { .. } => ErrorCode::Configuration,
            Self::Evaluation { .. } => ErrorCode::Evaluation,
            Self::InvalidReference { .. } => ErrorCode::InvalidReference,
            Self::Markup { .. } => ErrorCode::Markup,
            Self::Overlap { .. } => ErrorCode::Overlap,
            Self::Transform { .. } => ErrorCode::Transform,
        }
    }
}

pub type Result<T, E = TemplateError> = std::result::Result<T, E>;
