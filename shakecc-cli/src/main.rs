//! shakecc CLI - whole-program dead-code eliminator for single-file C++.
//!
//! Modes:
//! - `shakecc FILE`: print the optimized program (or write it with `-o`)
//! - `--detect-flags`: probe the host compiler and cache front-end flags
//! - `--run-case DIR` / `--run-cases DIR`: compare against fixture output

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use shakecc_core::{
    detect_or_load, init_structured_logging, load_config, load_config_file, print_json,
    print_plain, run_case, run_cases, FixtureSummary, FrontEndFlags, Optimizer, ShakeConfig,
    DEFAULT_FLAGS_CACHE,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Whole-program dead-code eliminator for single-file C++")]
pub struct Cli {
    /// C++ source file to optimize
    file: Option<PathBuf>,

    /// Front-end flag (`-DNAME`, `-std=c++17`, ...); repeatable
    #[arg(long = "flag", value_name = "F", allow_hyphen_values = true)]
    flags: Vec<String>,

    /// Macro whose definitions and conditionals must stay; repeatable
    #[arg(long = "keep-macro", value_name = "M")]
    keep_macros: Vec<String>,

    /// Declaration kept alive by name; repeatable
    #[arg(long = "keep-identifier", value_name = "I")]
    keep_identifiers: Vec<String>,

    /// Write the optimized program here instead of stdout
    #[arg(short, long, value_name = "OUT")]
    output: Option<String>,

    /// Print optimizer statistics to stderr
    #[arg(long)]
    stats: bool,

    /// JSON instead of plain text for statistics and harness results
    #[arg(long)]
    json: bool,

    /// Write the requires graph in Graphviz DOT format
    #[arg(long, value_name = "FILE")]
    graph_dot: Option<String>,

    /// Configuration file (default: shakecc.toml next to the source)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Detect front-end flags for the host compiler and cache them
    #[arg(long)]
    detect_flags: bool,

    /// Flags cache used by --detect-flags and the fixture modes
    #[arg(long, value_name = "FILE")]
    flags_cache: Option<PathBuf>,

    /// Run one fixture case directory
    #[arg(long, value_name = "DIR")]
    run_case: Option<PathBuf>,

    /// Run every fixture case below a directory
    #[arg(long, value_name = "DIR")]
    run_cases: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

/// Validates output file paths.
///
/// Rejects:
/// - Paths with null bytes
/// - Paths containing `..` (parent directory traversal)
fn validate_output_path(path: &str) -> Result<PathBuf> {
    if path.contains('\0') {
        return Err(anyhow!("Output path contains null bytes"));
    }

    let p = PathBuf::from(path);
    for component in p.components() {
        if matches!(component, std::path::Component::ParentDir) {
            return Err(anyhow!(
                "Path traversal (..) not allowed in output paths: {}",
                path
            ));
        }
    }
    Ok(p)
}

/// Configuration for `file`: `--config`, else `shakecc.toml` next to the
/// file, else defaults. Command-line lists are appended.
fn resolve_config(cli: &Cli, file: &Path) -> Result<ShakeConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => {
            let dir = file.parent().filter(|d| !d.as_os_str().is_empty());
            load_config(dir.unwrap_or(Path::new(".")))?.unwrap_or_default()
        }
    };
    config.extend(&cli.flags, &cli.keep_macros, &cli.keep_identifiers);
    Ok(config)
}

/// Cached flags (when a cache is named) followed by the configured and
/// command-line flags.
fn harness_flags(cli: &Cli) -> Result<Vec<String>> {
    let mut flags = Vec::new();
    if let Some(cache) = &cli.flags_cache {
        flags.extend(detect_or_load(cache)?.flags);
    }
    if let Some(path) = &cli.config {
        flags.extend(load_config_file(path)?.flags);
    }
    flags.extend(cli.flags.iter().cloned());
    Ok(flags)
}

fn print_summary(summary: &FixtureSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    for report in &summary.reports {
        let verdict = if report.passed { "PASS" } else { "FAIL" };
        println!("{verdict} {}", report.name);
        if let Some(error) = &report.error {
            println!("  error: {error}");
        }
        if let Some(diff) = &report.diff {
            for line in diff.lines() {
                println!("  {line}");
            }
        }
    }
    println!("\n{} passed, {} failed", summary.passed, summary.failed);
    Ok(())
}

fn optimize_file(cli: &Cli, file: &Path) -> Result<i32> {
    let config = resolve_config(cli, file)?;
    let flags = FrontEndFlags::parse(&config.flags).context("Invalid front-end flags")?;

    let mut optimizer = Optimizer::new(flags)
        .keep_macros(config.keep_macros.iter().cloned())
        .keep_identifiers(config.keep_identifiers.iter().cloned())
        .with_graph_dot(cli.graph_dot.is_some());
    let outcome = optimizer
        .run(file)
        .with_context(|| format!("Failed to optimize {}", file.display()))?;

    match &cli.output {
        Some(out) => {
            let out = validate_output_path(out)?;
            fs::write(&out, &outcome.text)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            eprintln!("Optimized program written to: {}", out.display());
        }
        None => print!("{}", outcome.text),
    }

    if let (Some(path), Some(dot)) = (&cli.graph_dot, &outcome.dot) {
        let path = validate_output_path(path)?;
        fs::write(&path, dot)
            .with_context(|| format!("Failed to write DOT file: {}", path.display()))?;
        eprintln!("Requires graph written to: {}", path.display());
    }

    if cli.stats {
        if cli.json || config.json_output() {
            print_json(&outcome.stats);
        } else {
            print_plain(&outcome.stats);
        }
    }
    Ok(0)
}

/// Run the selected mode and return the exit code.
fn run(cli: &Cli) -> Result<i32> {
    if cli.detect_flags {
        let path = cli
            .flags_cache
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FLAGS_CACHE));
        let cache = detect_or_load(&path)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&cache)?);
        } else {
            for flag in &cache.flags {
                println!("{flag}");
            }
        }
        return Ok(0);
    }

    if let Some(dir) = &cli.run_case {
        let flags = harness_flags(cli)?;
        let report = run_case(dir, &flags)?;
        let passed = usize::from(report.passed);
        let summary = FixtureSummary {
            passed,
            failed: 1 - passed,
            reports: vec![report],
        };
        print_summary(&summary, cli.json)?;
        return Ok(if summary.all_passed() { 0 } else { 1 });
    }

    if let Some(dir) = &cli.run_cases {
        let flags = harness_flags(cli)?;
        let summary = run_cases(dir, &flags)
            .with_context(|| format!("Failed to run fixtures under {}", dir.display()))?;
        print_summary(&summary, cli.json)?;
        return Ok(if summary.all_passed() { 0 } else { 1 });
    }

    let file = cli
        .file
        .as_deref()
        .ok_or_else(|| anyhow!("No input file given (see --help)"))?;
    optimize_file(cli, file)
}

fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] shakecc internal error: {}", info);
        eprintln!("[PANIC] The process will exit with code 2.");
    }));

    let cli = Cli::parse();
    init_structured_logging(cli.log_json);

    let code = run(&cli)?;
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn create_temp_dir(name: &str) -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir()
            .join("shakecc_cli_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).ok();
        }
        fs::create_dir_all(&temp_dir).unwrap();
        temp_dir
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("shakecc").chain(args.iter().copied())).unwrap()
    }

    // --- argument parsing ---

    #[test]
    fn test_repeatable_lists() {
        let cli = cli(&[
            "a.cpp",
            "--flag",
            "-DLOCAL",
            "--flag=-std=c++17",
            "--keep-macro",
            "LOCAL",
            "--keep-identifier",
            "debug",
            "--keep-identifier",
            "trace",
        ]);
        assert_eq!(cli.file, Some(PathBuf::from("a.cpp")));
        assert_eq!(cli.flags, vec!["-DLOCAL".to_string(), "-std=c++17".to_string()]);
        assert_eq!(cli.keep_macros, vec!["LOCAL".to_string()]);
        assert_eq!(cli.keep_identifiers, vec!["debug".to_string(), "trace".to_string()]);
    }

    #[test]
    fn test_harness_modes_parse() {
        let cli = cli(&["--run-cases", "fixtures", "--flags-cache", "f.json", "--json"]);
        assert_eq!(cli.run_cases, Some(PathBuf::from("fixtures")));
        assert_eq!(cli.flags_cache, Some(PathBuf::from("f.json")));
        assert!(cli.json);
        assert!(cli.file.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(run(&cli(&[])).is_err());
    }

    // --- validate_output_path ---

    #[test]
    fn test_validate_output_path() {
        assert!(validate_output_path("out.cpp").is_ok());
        assert!(validate_output_path("build/out.cpp").is_ok());
        assert!(validate_output_path("../out.cpp").is_err());
        assert!(validate_output_path("a/../../out.cpp").is_err());
        assert!(validate_output_path("out\0.cpp").is_err());
    }

    // --- configuration ---

    #[test]
    fn test_config_next_to_file_is_extended() {
        let dir = create_temp_dir("config");
        let file = dir.join("a.cpp");
        create_file(&file, "int main() {}\n");
        create_file(&dir.join("shakecc.toml"), "keep_macros = [\"LOCAL\"]\n[output]\nformat = \"json\"\n");

        let args = cli(&[file.to_str().unwrap(), "--keep-macro", "DEBUG"]);
        let config = resolve_config(&args, &file).unwrap();
        assert_eq!(config.keep_macros, vec!["LOCAL".to_string(), "DEBUG".to_string()]);
        assert!(config.json_output());

        fs::remove_dir_all(&dir).ok();
    }

    // --- end to end ---

    #[test]
    fn test_optimize_to_output_file() {
        let dir = create_temp_dir("optimize");
        let file = dir.join("a.cpp");
        create_file(&file, "int unused() { return 1; }\nint main() {}\n");
        let out = dir.join("out.cpp");

        let args = cli(&[file.to_str().unwrap(), "-o", out.to_str().unwrap()]);
        assert_eq!(run(&args).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "int main() {}\n");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_run_case_exit_codes() {
        let dir = create_temp_dir("run_case");
        let good = dir.join("good");
        create_file(&good.join("input.cpp"), "int dead;\nint main() {}\n");
        create_file(&good.join("expected.cpp"), "int main() {}\n");
        let bad = dir.join("bad");
        create_file(&bad.join("input.cpp"), "int dead;\nint main() {}\n");
        create_file(&bad.join("expected.cpp"), "int dead;\nint main() {}\n");

        assert_eq!(run(&cli(&["--run-case", good.to_str().unwrap()])).unwrap(), 0);
        assert_eq!(run(&cli(&["--run-case", bad.to_str().unwrap()])).unwrap(), 1);
        assert_eq!(run(&cli(&["--run-cases", dir.to_str().unwrap()])).unwrap(), 1);

        fs::remove_dir_all(&dir).ok();
    }
}
