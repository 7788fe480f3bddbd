//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use shakecc_core::prelude::*;
//! ```

// Core types
pub use crate::error::{ShakeError, ShakeResult};
pub use crate::frontend::FrontEndFlags;

// Builder API
pub use crate::optimizer::{optimize, OptimizeOutcome, Optimizer};

// Statistics
pub use crate::report::OptimizeStats;

// Configuration
pub use crate::config::{load_config, ShakeConfig};
