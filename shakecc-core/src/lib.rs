//! shakecc-core: whole-program dead-code elimination for one C++ file
//!
//! Given a single translation unit (a competitive-programming solution, a
//! generated test case), shakecc computes every declaration reachable from
//! `main` and rewrites the file without the rest. Code it cannot prove dead
//! stays.
//!
//! # Features
//!
//! - **Declaration removal**: unused functions, classes, variables, aliases
//! - **Redundancy removal**: forward declarations and repeated aliases made
//!   obsolete by a definition
//! - **Preprocessor cleanup**: branches not taken, macros with no surviving use
//! - **Namespace merging**: consecutive reopenings fused once emptied
//! - **Fixture harness**: cached flag detection and expected-output cases
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use shakecc_core::prelude::*;
//!
//! let flags = FrontEndFlags::parse(&["-std=c++17"])?;
//! let text = optimize("solution.cpp", flags, ["LOCAL"], Vec::<String>::new())?;
//! print!("{text}");
//! ```
//!
//! # Module Organization
//!
//! - [`frontend`]: declaration tree, preprocessor callbacks, reference front end
//! - [`index`]: semantic identities of declarations
//! - [`collector`]: requires graph and roots
//! - [`reachability`]: the used set
//! - [`remover`], [`pp_remover`], [`merger`]: edit planning
//! - [`rewriter`]: edit set and application
//! - [`optimizer`]: builder API and pipeline
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `dot` (default): Graphviz export of the requires graph
//! - `harness` (default): flag detection cache and fixture runner
//! - `full`: Enable all optional features

pub mod collector;
pub mod common;
pub mod config;
pub mod context;
pub mod error;
pub mod frontend;
pub mod graph;
pub mod index;
pub mod logging;
pub mod merger;
pub mod optimizer;
pub mod pp_remover;
pub mod prelude;
pub mod reachability;
pub mod remover;
pub mod report;
pub mod rewriter;
pub mod source;

// Common trait re-exports
pub use common::GraphTraversal;

// Feature-gated modules
#[cfg(feature = "dot")]
pub mod visualize;

#[cfg(feature = "harness")]
pub mod harness;

// ============================================================================
// Explicit Re-exports
// ============================================================================

// Error types
pub use error::{IoResultExt, ShakeError, ShakeResult};

// Builder API
pub use optimizer::{optimize, OptimizeOutcome, Optimizer};

// Configuration
pub use config::{load_config, load_config_file, OutputConfig, ShakeConfig, CONFIG_FILE};

// Front end
pub use frontend::lite::LiteFrontEnd;
pub use frontend::{FrontEnd, FrontEndFlags, PreprocessorCallbacks};

// Pipeline pieces
pub use context::PipelineContext;
pub use graph::RequiresGraph;
pub use index::{DeclIndex, DeclKey, SemanticId};
pub use reachability::compute_used;
pub use rewriter::Rewriter;

// Logging
pub use logging::init_structured_logging;

// Reporting
pub use report::{format_plain, print_json, print_plain, OptimizeStats};

#[cfg(feature = "dot")]
pub use visualize::generate_dot;

#[cfg(feature = "harness")]
pub use harness::{
    detect_or_load, run_case, run_cases, CaseReport, FixtureSummary, FlagsCache,
    DEFAULT_FLAGS_CACHE,
};

#[cfg(test)]
mod tests;
