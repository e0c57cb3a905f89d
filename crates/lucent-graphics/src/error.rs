//! Graphics error taxonomy shared by every backend.

use lucent_core::TeardownError;
use thiserror::Error;

/// Errors surfaced through the capability layer.
#[derive(Error, Debug)]
pub enum GraphicsError {
    /// Requested backend or device layout is not realizable. Fatal to
    /// startup; capability mismatches do not change within a process run,
    /// so there is no retry.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// A mandatory layer or extension is absent. Raised during instance or
    /// device creation with the capability name.
    #[error("required capability missing: {0}")]
    RequiredCapabilityMissing(String),

    /// No queue family matches the requested capability flags. The caller
    /// decides whether to fall back to a lesser capability set or abort.
    #[error("no queue family matches the requested capabilities")]
    NoSuitableQueue,

    /// Surface/format/extent/capability mismatch during swapchain
    /// negotiation. Recoverable by recreating with corrected parameters.
    #[error("swapchain validation failed: {0}")]
    SwapchainValidation(String),

    /// Backend failed to create the swapchain. The caller must not assume
    /// partial state.
    #[error("swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// An operation was issued outside its documented protocol, e.g.
    /// `submit` without a prior `reset` in the current recording cycle.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// One or more ledger entries failed during unwind.
    #[error(transparent)]
    Teardown(#[from] TeardownError),

    /// Backend-specific failure with no more precise classification.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GraphicsError>;
