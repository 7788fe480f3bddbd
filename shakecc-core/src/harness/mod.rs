//! Test-harness surface: cached front-end flag detection and the fixture
//! runner behind `--detect-flags`, `--run-case` and `--run-cases`.

pub mod fixtures;
pub mod flags_cache;

pub use fixtures::{discover_cases, line_diff, run_case, run_cases, CaseReport, FixtureSummary};
pub use flags_cache::{
    detect_flags, detect_or_load, load_flags_cache, save_flags_cache, CompilerProbe, FlagsCache,
    FlagsCacheMetadata, DEFAULT_FLAGS_CACHE,
};
