//! Builder API and the end-to-end pipeline.
//!
//! ```rust,ignore
//! use shakecc_core::prelude::*;
//!
//! let flags = FrontEndFlags::parse(&["-std=c++17"])?;
//! let outcome = Optimizer::new(flags)
//!     .keep_macros(["LOCAL"])
//!     .keep_identifiers(["debug"])
//!     .run("solution.cpp")?;
//!
//! print!("{}", outcome.text);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::collector;
use crate::context::PipelineContext;
use crate::error::{IoResultExt, ShakeError, ShakeResult};
use crate::frontend::lite::LiteFrontEnd;
use crate::frontend::{FrontEnd, FrontEndFlags};
use crate::logging::PhaseTimer;
use crate::merger;
use crate::pp_remover::PreprocessorRecorder;
use crate::reachability::compute_used;
use crate::remover;
use crate::report::OptimizeStats;
use crate::source::SourceFile;

/// Result of one run.
#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub path: PathBuf,
    /// The optimized program
    pub text: String,
    pub stats: OptimizeStats,
    /// Requires graph in DOT form, when asked for with
    /// [`Optimizer::with_graph_dot`]
    pub dot: Option<String>,
}

impl OptimizeOutcome {
    /// Whether the run left the file untouched.
    pub fn unchanged(&self) -> bool {
        self.stats.edits == 0
    }
}

/// Builder for one optimization.
pub struct Optimizer {
    flags: FrontEndFlags,

    /// Macros whose definitions and conditional chains always stay
    keep_macros: Vec<String>,

    /// Extra roots, by simple or qualified name
    keep_identifiers: Vec<String>,

    /// Defaults to [`LiteFrontEnd`] built from `flags`
    front_end: Option<Box<dyn FrontEnd>>,

    graph_dot: bool,
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("flags", &self.flags)
            .field("keep_macros", &self.keep_macros)
            .field("keep_identifiers", &self.keep_identifiers)
            .field("custom_front_end", &self.front_end.is_some())
            .field("graph_dot", &self.graph_dot)
            .finish()
    }
}

impl Optimizer {
    pub fn new(flags: FrontEndFlags) -> Self {
        Self {
            flags,
            keep_macros: Vec::new(),
            keep_identifiers: Vec::new(),
            front_end: None,
            graph_dot: false,
        }
    }

    /// Protect macros by name.
    pub fn keep_macros<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_macros.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add declarations to the roots by name.
    pub fn keep_identifiers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keep_identifiers.extend(names.into_iter().map(Into::into));
        self
    }

    /// Drive the pipeline with another front end.
    pub fn with_front_end(mut self, front_end: Box<dyn FrontEnd>) -> Self {
        self.front_end = Some(front_end);
        self
    }

    /// Also render the requires graph (feature `dot`).
    pub fn with_graph_dot(mut self, enabled: bool) -> Self {
        self.graph_dot = enabled;
        self
    }

    /// Read `path` and optimize it.
    pub fn run(&mut self, path: impl AsRef<Path>) -> ShakeResult<OptimizeOutcome> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_path(path)?;
        self.run_source(path, text)
    }

    /// Optimize `text` as if it were the content of `path`.
    pub fn run_source(
        &mut self,
        path: impl Into<PathBuf>,
        text: impl Into<String>,
    ) -> ShakeResult<OptimizeOutcome> {
        let path = path.into();
        let file = SourceFile::new(path.clone(), text);
        let _timer = PhaseTimer::start("optimize");

        let mut default_front_end;
        let front_end: &mut dyn FrontEnd = match self.front_end.as_mut() {
            Some(fe) => fe.as_mut(),
            None => {
                default_front_end = LiteFrontEnd::new(self.flags.clone());
                &mut default_front_end
            }
        };

        let mut recorder = PreprocessorRecorder::new(self.keep_macros.iter().cloned());
        let unit = front_end.parse(file, &mut recorder)?;
        if unit.diagnostics.has_errors() {
            let diagnostics = unit.diagnostics.format_all(unit.file());
            return Err(ShakeError::front_end(path, diagnostics));
        }

        let mut ctx = PipelineContext::new(unit);
        collector::collect(&mut ctx, front_end, &self.keep_identifiers)?;
        ctx.used = compute_used(&ctx.graph, &ctx.roots);
        debug!(
            roots = ctx.roots.len(),
            used = ctx.used.len(),
            nodes = ctx.graph.node_count(),
            "reachability done"
        );

        remover::remove_declarations(&mut ctx)?;
        recorder.remove_inactive_branches(&mut ctx)?;
        recorder.remove_unused_macros(&mut ctx)?;
        merger::merge_namespaces(&mut ctx)?;

        let text = ctx.rewriter.apply(ctx.unit.file().text())?;

        ctx.stats.declarations = ctx.unit.len();
        ctx.stats.semantic_nodes = ctx.graph.node_count();
        ctx.stats.edges = ctx.graph.edge_count();
        ctx.stats.roots = ctx.roots.len();
        ctx.stats.used = ctx.used.len();
        ctx.stats.edits = ctx.rewriter.len();

        let dot = self.render_dot(&ctx);

        info!(
            path = %path.display(),
            removed = ctx.stats.removed_declarations,
            macros = ctx.stats.removed_macros,
            branches = ctx.stats.removed_branches,
            merged = ctx.stats.merged_scopes,
            "optimized"
        );

        Ok(OptimizeOutcome {
            path,
            text,
            stats: ctx.stats,
            dot,
        })
    }

    #[cfg(feature = "dot")]
    fn render_dot(&self, ctx: &PipelineContext) -> Option<String> {
        self.graph_dot.then(|| {
            crate::visualize::generate_dot(&ctx.graph, &ctx.index, &ctx.roots, &ctx.used)
        })
    }

    #[cfg(not(feature = "dot"))]
    fn render_dot(&self, _ctx: &PipelineContext) -> Option<String> {
        if self.graph_dot {
            tracing::warn!("built without the `dot` feature, no graph rendered");
        }
        None
    }
}

/// Optimize the file at `path` and return the new program text.
pub fn optimize<M, I>(
    path: impl AsRef<Path>,
    flags: FrontEndFlags,
    macros_to_keep: M,
    identifiers_to_keep: I,
) -> ShakeResult<String>
where
    M: IntoIterator,
    M::Item: Into<String>,
    I: IntoIterator,
    I::Item: Into<String>,
{
    Optimizer::new(flags)
        .keep_macros(macros_to_keep)
        .keep_identifiers(identifiers_to_keep)
        .run(path)
        .map(|outcome| outcome.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn write_source(text: &str) -> (PathBuf, PathBuf) {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "shakecc_optimizer_test_{}_{}",
            std::process::id(),
            id
        ));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).expect("Failed to create test directory");
        let file = dir.join("solution.cpp");
        fs::write(&file, text).expect("Failed to write solution.cpp");
        (dir, file)
    }

    fn no_flags() -> FrontEndFlags {
        FrontEndFlags::default()
    }

    #[test]
    fn test_optimize_removes_unused_function() {
        let (dir, file) = write_source("int unused() { return 1; }\nint main() { return 0; }\n");

        let out = optimize(&file, no_flags(), Vec::<String>::new(), Vec::<String>::new()).unwrap();
        assert_eq!(out, "int main() { return 0; }\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_keep_identifiers_adds_roots() {
        let (dir, file) = write_source("void debug() {}\nint main() {}\n");

        let out = optimize(&file, no_flags(), Vec::<String>::new(), ["debug"]).unwrap();
        assert_eq!(out, "void debug() {}\nint main() {}\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = optimize(
            "/nonexistent/shakecc/solution.cpp",
            no_flags(),
            Vec::<String>::new(),
            Vec::<String>::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ShakeError::Io { .. }));
    }

    #[test]
    fn test_front_end_errors_fail_the_run() {
        let err = Optimizer::new(no_flags())
            .run_source("bad.cpp", "int main() {\n")
            .unwrap_err();
        match err {
            ShakeError::FrontEnd { path, diagnostics } => {
                assert_eq!(path, PathBuf::from("bad.cpp"));
                assert!(!diagnostics.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stats_are_filled() {
        let outcome = Optimizer::new(no_flags())
            .run_source("s.cpp", "int dead;\nint main() {}\n")
            .unwrap();
        assert_eq!(outcome.text, "int main() {}\n");
        assert_eq!(outcome.stats.removed_declarations, 1);
        assert_eq!(outcome.stats.roots, 1);
        assert_eq!(outcome.stats.used, 1);
        assert!(outcome.stats.edits >= 1);
        assert!(!outcome.unchanged());
        assert!(outcome.dot.is_none());
    }

    #[test]
    fn test_untouched_program_is_byte_identical() {
        let text = "#include <cstdio>\nint main() { std::puts(\"hi\"); }\n";
        let outcome = Optimizer::new(no_flags()).run_source("s.cpp", text).unwrap();
        assert_eq!(outcome.text, text);
        assert!(outcome.unchanged());
    }

    #[cfg(feature = "dot")]
    #[test]
    fn test_graph_dot_on_request() {
        let outcome = Optimizer::new(no_flags())
            .with_graph_dot(true)
            .run_source("s.cpp", "int f() { return 1; }\nint main() { return f(); }\n")
            .unwrap();
        let dot = outcome.dot.unwrap();
        assert!(dot.contains("digraph shakecc"));
        assert!(dot.contains("->"));
    }
}
