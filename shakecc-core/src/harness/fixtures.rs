//! Fixture runner.
//!
//! A case is a directory holding `input.cpp`, `expected.cpp` and an
//! optional `case.toml` (same keys as `shakecc.toml`). The runner optimizes
//! the input and compares the result with the expectation byte for byte.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{load_config_file, ShakeConfig};
use crate::frontend::FrontEndFlags;
use crate::optimizer::Optimizer;
use crate::report::OptimizeStats;

pub const INPUT_FILE: &str = "input.cpp";
pub const EXPECTED_FILE: &str = "expected.cpp";
pub const CASE_FILE: &str = "case.toml";

/// Outcome of one fixture case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub dir: PathBuf,
    pub passed: bool,
    /// Line-level differences between expected and actual output
    pub diff: Option<String>,
    /// Why the optimizer failed, if it did
    pub error: Option<String>,
    pub stats: Option<OptimizeStats>,
}

/// Reports of every case under a fixture root, sorted by name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixtureSummary {
    pub passed: usize,
    pub failed: usize,
    pub reports: Vec<CaseReport>,
}

impl FixtureSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Run the case in `dir`. `base_flags` come first, the case's own flags
/// after them.
pub fn run_case(dir: &Path, base_flags: &[String]) -> Result<CaseReport> {
    let input = dir.join(INPUT_FILE);
    let expected_path = dir.join(EXPECTED_FILE);
    let expected = fs::read_to_string(&expected_path)
        .with_context(|| format!("Failed to read {}", expected_path.display()))?;

    let case_file = dir.join(CASE_FILE);
    let case = if case_file.exists() {
        load_config_file(&case_file)?
    } else {
        ShakeConfig::default()
    };

    let mut args = base_flags.to_vec();
    args.extend(case.flags.iter().cloned());
    let flags = FrontEndFlags::parse(&args)
        .with_context(|| format!("Invalid flags for {}", dir.display()))?;

    let name = case_name(dir);
    let mut report = CaseReport {
        name: name.clone(),
        dir: dir.to_path_buf(),
        passed: false,
        diff: None,
        error: None,
        stats: None,
    };

    let outcome = Optimizer::new(flags)
        .keep_macros(case.keep_macros)
        .keep_identifiers(case.keep_identifiers)
        .run(&input);
    match outcome {
        Ok(outcome) => {
            report.passed = outcome.text == expected;
            if !report.passed {
                report.diff = Some(line_diff(&expected, &outcome.text));
            }
            report.stats = Some(outcome.stats);
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    debug!(case = %name, passed = report.passed, "fixture case finished");
    Ok(report)
}

/// Every directory below `root` that holds an `input.cpp`.
pub fn discover_cases(root: &Path) -> Vec<PathBuf> {
    let mut cases: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == INPUT_FILE)
        .filter_map(|e| e.path().parent().map(Path::to_path_buf))
        .collect();
    cases.sort();
    cases
}

/// Run every case under `root` in parallel, one optimizer per case.
pub fn run_cases(root: &Path, base_flags: &[String]) -> Result<FixtureSummary> {
    let cases = discover_cases(root);
    info!(root = %root.display(), cases = cases.len(), "running fixture cases");

    let reports: Vec<CaseReport> = cases
        .par_iter()
        .map(|dir| run_case(dir, base_flags))
        .collect::<Result<_>>()?;

    let passed = reports.iter().filter(|r| r.passed).count();
    Ok(FixtureSummary {
        passed,
        failed: reports.len() - passed,
        reports,
    })
}

fn case_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// `-expected` / `+actual` pairs for every line that differs.
pub fn line_diff(expected: &str, actual: &str) -> String {
    let exp: Vec<&str> = expected.lines().collect();
    let act: Vec<&str> = actual.lines().collect();
    let mut out = String::new();
    for i in 0..exp.len().max(act.len()) {
        let (e, a) = (exp.get(i), act.get(i));
        if e == a {
            continue;
        }
        out.push_str(&format!("@@ line {} @@\n", i + 1));
        if let Some(e) = e {
            out.push_str(&format!("-{e}\n"));
        }
        if let Some(a) = a {
            out.push_str(&format!("+{a}\n"));
        }
    }
    if out.is_empty() && expected != actual {
        out.push_str("@@ trailing newline differs @@\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("shakecc_fixture_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_case(dir: &Path, input: &str, expected: &str, case: Option<&str>) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(INPUT_FILE), input).unwrap();
        fs::write(dir.join(EXPECTED_FILE), expected).unwrap();
        if let Some(case) = case {
            fs::write(dir.join(CASE_FILE), case).unwrap();
        }
    }

    #[test]
    fn test_passing_case() {
        let dir = create_temp_dir("pass");
        write_case(
            &dir,
            "void unused() {}\nint main() {}\n",
            "int main() {}\n",
            None,
        );
        let report = run_case(&dir, &[]).unwrap();
        assert!(report.passed, "{:?}", report.diff);
        assert!(report.stats.is_some());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_failing_case_has_diff() {
        let dir = create_temp_dir("fail");
        write_case(&dir, "void unused() {}\nint main() {}\n", "void unused() {}\nint main() {}\n", None);
        let report = run_case(&dir, &[]).unwrap();
        assert!(!report.passed);
        let diff = report.diff.unwrap();
        assert!(diff.contains("-void unused() {}"));
        assert!(diff.contains("+int main() {}"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_case_toml_is_applied() {
        let dir = create_temp_dir("case_toml");
        write_case(
            &dir,
            "#ifdef LOCAL\nint trace;\n#endif\nint main() {}\n",
            "#ifdef LOCAL\nint trace;\n#endif\nint main() {}\n",
            Some("keep_macros = [\"LOCAL\"]\n"),
        );
        let report = run_case(&dir, &[]).unwrap();
        assert!(report.passed, "{:?}", report.diff);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_optimizer_error_is_reported() {
        let dir = create_temp_dir("error");
        write_case(&dir, "int main() {\n", "", None);
        let report = run_case(&dir, &[]).unwrap();
        assert!(!report.passed);
        assert!(report.error.is_some());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_cases_discovers_and_sorts() {
        let root = create_temp_dir("suite");
        write_case(&root.join("b_case"), "int main() {}\n", "int main() {}\n", None);
        write_case(&root.join("a_case"), "int dead;\nint main() {}\n", "int main() {}\n", None);
        write_case(&root.join("nested").join("c_case"), "int main() {}\n", "int x;\n", None);

        let summary = run_cases(&root, &[]).unwrap();
        let names: Vec<&str> = summary.reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a_case", "b_case", "c_case"]);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_passed());

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_line_diff() {
        assert_eq!(line_diff("a\nb\n", "a\nb\n"), "");
        assert_eq!(line_diff("a\nb\n", "a\nc\n"), "@@ line 2 @@\n-b\n+c\n");
        assert_eq!(line_diff("a\n", "a"), "@@ trailing newline differs @@\n");
    }
}
