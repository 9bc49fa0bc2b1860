//! # webgui-core - Core Domain Types
//!
//! Foundation crate for webgui. Provides the session lifecycle types, error
//! handling and logging setup shared by the daemon and app crates.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`SessionState`] - Orchestrator lifecycle state (Idle → ... → Stopped)
//! - [`ShutdownReason`] - Which trigger ended the running session
//! - [`Platform`] - Operating system family used for discovery rules
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use webgui_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all webgui crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{Error, Result, ResultExt};
pub use types::{Platform, SessionState, ShutdownReason};
