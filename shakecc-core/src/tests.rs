//! End-to-end suite for shakecc-core.

use crate::frontend::{Decl, DeclKind, FrontEnd, PreprocessorCallbacks, TranslationUnit};
use crate::source::{SourceFile, SourceRange};
use crate::*;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn setup_temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir()
        .join("shakecc_tests")
        .join(format!("{}_{}", std::process::id(), id));
    if dir.exists() {
        fs::remove_dir_all(&dir).ok();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_file(file: &Path, content: &str) {
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, content).unwrap();
}

fn shake(text: &str) -> String {
    Optimizer::new(FrontEndFlags::default())
        .run_source("solution.cpp", text)
        .unwrap()
        .text
}

// Scenario 1: a function main() never calls
#[test]
fn test_unused_function_removed() {
    let text = "int unused() {\n  return 42;\n}\nint main() {\n  return 0;\n}\n";
    assert_eq!(shake(text), "int main() {\n  return 0;\n}\n");
}

// Scenario 2: forward declarations collapse into the definition
#[test]
fn test_forward_declarations_collapse() {
    let text = "class C;\nclass C;\nclass C {\npublic:\n  int v = 1;\n};\nint main() {\n  C c;\n  return c.v;\n}\n";
    assert_eq!(
        shake(text),
        "class C {\npublic:\n  int v = 1;\n};\nint main() {\n  C c;\n  return c.v;\n}\n"
    );
}

// Scenario 3: a namespace reopened three times, only the middle one live
#[test]
fn test_reopened_namespace_keeps_live_block() {
    let text = "namespace a {\nint x = 1;\n}\nnamespace a {\nint y = 2;\n}\nnamespace a {\nint z = 3;\n}\nint main() { return a::y; }\n";
    assert_eq!(shake(text), "namespace a {\nint y = 2;\n}\nint main() { return a::y; }\n");
}

#[test]
fn test_reopened_namespaces_merge_after_removal() {
    let text = "namespace a {\nint x = 1;\n}\nint dead;\nnamespace a {\nint y = 2;\n}\nint main() { return a::x + a::y; }\n";
    assert_eq!(
        shake(text),
        "namespace a {\nint x = 1;\nint y = 2;\n}\nint main() { return a::x + a::y; }\n"
    );
}

// Scenario 4: `#if 0` regions go unconditionally
#[test]
fn test_if_zero_region_removed() {
    let text = "#if 0\nint gone() { return 1; }\n#endif\nint main() {}\n";
    assert_eq!(shake(text), "int main() {}\n");
}

// Scenario 5: a macro whose only use sits in dead code
#[test]
fn test_macro_used_only_in_dead_code_removed() {
    let text = "#define SQ(x) ((x) * (x))\nint unused(int v) { return SQ(v); }\nint main() { return 0; }\n";
    assert_eq!(shake(text), "int main() { return 0; }\n");
}

#[test]
fn test_protected_macro_and_branch_survive() {
    let text = "#define LOCAL\n#ifdef LOCAL\nint trace;\n#endif\nint main() {}\n";
    let out = Optimizer::new(FrontEndFlags::default())
        .keep_macros(["LOCAL"])
        .run_source("solution.cpp", text)
        .unwrap()
        .text;
    assert!(out.starts_with("#define LOCAL\n#ifdef LOCAL\n"));
    assert!(out.contains("#endif\n"));
}

#[test]
fn test_defines_from_flags_pick_the_branch() {
    let text = "#ifdef FAST\nint pick() { return 1; }\n#else\nint pick() { return 2; }\n#endif\nint main() { return pick(); }\n";
    let flags = FrontEndFlags::parse(&["-DFAST"]).unwrap();
    let out = Optimizer::new(flags).run_source("s.cpp", text).unwrap().text;
    assert_eq!(out, "int pick() { return 1; }\nint main() { return pick(); }\n");
}

#[test]
fn test_competitive_program_shape() {
    let text = "\
#include <bits/stdc++.h>
using namespace std;
#define ll long long
#define rep(i, n) for (int i = 0; i < (n); ++i)
typedef pair<int, int> pii;
const int MOD = 1000000007;
ll power(ll b, ll e) {
  ll r = 1;
  while (e) { if (e & 1) r = r * b % MOD; b = b * b % MOD; e >>= 1; }
  return r;
}
int gcd_unused(int a, int b) { return b ? gcd_unused(b, a % b) : a; }
int main() {
  int n = 3;
  ll s = 0;
  rep(i, n) s += power(2, i);
  cout << s << endl;
}
";
    let out = shake(text);
    assert!(out.contains("#include <bits/stdc++.h>\n"));
    assert!(out.contains("using namespace std;\n"));
    assert!(out.contains("ll power(ll b, ll e)"));
    assert!(out.contains("#define rep"));
    assert!(out.contains("const int MOD"));
    assert!(!out.contains("gcd_unused"));
    assert!(!out.contains("typedef pair<int, int> pii;"));
}

#[test]
fn test_class_members_follow_the_class() {
    let text = "struct S {\n  S() {}\n  ~S() {}\n  int used() { return 1; }\n  int unused_member() { return 2; }\n};\nstruct Dead { int v; };\nint main() { S s; return s.used(); }\n";
    let out = shake(text);
    assert!(out.contains("S() {}"));
    assert!(out.contains("~S() {}"));
    assert!(out.contains("int used()"));
    assert!(!out.contains("struct Dead"));
}

#[test]
fn test_optimize_is_idempotent() {
    let text = "#define TWICE(x) (2 * (x))\nnamespace util {\nint helper(int v) { return TWICE(v); }\nint dead() { return 0; }\n}\nnamespace util {\nint other() { return 3; }\n}\nclass Fwd;\nclass Fwd { public: int k = 0; };\nint main() { Fwd f; return util::helper(f.k); }\n";
    let once = shake(text);
    let twice = shake(&once);
    assert_eq!(once, twice);
    assert!(!once.contains("dead()"));
    assert!(!once.contains("other()"));
}

#[test]
fn test_no_edits_is_byte_identical() {
    let text = "// header comment\r\nint main() {\r\n  return 0;\r\n}\r\n";
    assert_eq!(shake(text), text);
}

#[test]
fn test_front_end_errors_fail_with_all_diagnostics() {
    let text = "#error first problem\nint main() {\n";
    let err = Optimizer::new(FrontEndFlags::default())
        .run_source("broken.cpp", text)
        .unwrap_err();
    match &err {
        ShakeError::FrontEnd { diagnostics, .. } => assert!(diagnostics.len() >= 2),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("first problem"));
}

#[test]
fn test_optimize_file_on_disk() {
    let dir = setup_temp_dir();
    let file = dir.join("solution.cpp");
    write_file(&file, "int unused() { return 1; }\nint main() {}\n");

    let out = optimize(&file, FrontEndFlags::default(), ["X"], ["unused"]).unwrap();
    assert_eq!(out, "int unused() { return 1; }\nint main() {}\n");

    fs::remove_dir_all(&dir).ok();
}

/// Front end serving a prepared tree.
struct HandBuilt {
    unit: Option<TranslationUnit>,
    forced: Rc<Cell<usize>>,
    muted_while_forced: Rc<Cell<bool>>,
}

impl HandBuilt {
    fn new(unit: TranslationUnit) -> Self {
        Self {
            unit: Some(unit),
            forced: Rc::new(Cell::new(0)),
            muted_while_forced: Rc::new(Cell::new(false)),
        }
    }
}

impl FrontEnd for HandBuilt {
    fn parse(
        &mut self,
        _file: SourceFile,
        _callbacks: &mut dyn PreprocessorCallbacks,
    ) -> ShakeResult<TranslationUnit> {
        self.unit
            .take()
            .ok_or_else(|| ShakeError::internal("unit already handed out"))
    }

    fn force_parse(&mut self, unit: &mut TranslationUnit, decl: crate::frontend::DeclId) -> ShakeResult<()> {
        let muted = unit.diagnostics.set_suppress_all(true);
        unit.diagnostics.set_suppress_all(muted);
        self.muted_while_forced.set(muted);
        self.forced.set(self.forced.get() + 1);
        unit.diagnostics.error(0, "bogus token in skipped body");
        unit.clear_deferred(decl);
        Ok(())
    }
}

fn function(name: &str, range: SourceRange) -> Decl {
    let mut decl = Decl::new(DeclKind::Function, name, range);
    decl.is_definition = true;
    decl
}

#[test]
fn test_external_declarations_are_never_edited() {
    let text = "int main() {}\n";
    let mut unit = TranslationUnit::new(SourceFile::new("s.cpp", text));
    unit.add_decl(function("main", SourceRange::new(0, 13)));
    let mut header = Decl::new(DeclKind::Record, "vector", SourceRange::new(0, 13));
    header.origin = crate::frontend::DeclOrigin::External;
    unit.add_decl(header);

    let outcome = Optimizer::new(FrontEndFlags::default())
        .with_front_end(Box::new(HandBuilt::new(unit)))
        .run_source("s.cpp", text)
        .unwrap();
    assert_eq!(outcome.text, text);
    assert_eq!(outcome.stats.removed_declarations, 0);
}

#[test]
fn test_forced_bodies_run_muted() {
    let text = "template <class T> void tmpl(T) {}\nint main() {}\n";
    let mut unit = TranslationUnit::new(SourceFile::new("s.cpp", text));
    let tmpl = unit.add_decl(function("tmpl", SourceRange::new(0, 34)));
    unit.add_decl(function("main", SourceRange::new(35, 48)));
    unit.mark_deferred(tmpl);

    let front_end = HandBuilt::new(unit);
    let forced = Rc::clone(&front_end.forced);
    let muted = Rc::clone(&front_end.muted_while_forced);

    let outcome = Optimizer::new(FrontEndFlags::default())
        .with_front_end(Box::new(front_end))
        .run_source("s.cpp", text)
        .unwrap();
    assert_eq!(forced.get(), 1);
    assert!(muted.get());
    assert_eq!(outcome.text, "int main() {}\n");
}

#[test]
fn test_global_initializers_with_effects_survive() {
    let text = "\
#include <cstdio>
#include <iostream>
int banner = std::printf(\"hello\\n\");
static bool fast_io = [] {
  std::ios_base::sync_with_stdio(false);
  return true;
}();
int unused_total = 0;
int main() { return 0; }
";
    let out = shake(text);
    assert!(out.contains("int banner = std::printf(\"hello\\n\");\n"));
    assert!(out.contains("static bool fast_io = [] {"));
    assert!(!out.contains("unused_total"));
}

#[test]
fn test_user_defined_literal_operators_survive() {
    let text = "\
long long operator\"\"_k(unsigned long long v) { return v * 1000; }
long long operator\"\" _unused(unsigned long long v) { return v; }
const char* operator\"\"_id(const char* s, unsigned long n) { return s + n - n; }
int main() { return (int)(5_k) + *\"x\"_id; }
";
    let out = shake(text);
    assert!(out.contains("long long operator\"\"_k(unsigned long long v)"));
    assert!(out.contains("const char* operator\"\"_id("));
    assert!(!out.contains("_unused"));
}

#[cfg(feature = "harness")]
#[test]
fn test_fixture_suite_round_trip() {
    let root = setup_temp_dir();
    write_file(&root.join("dead_fn").join("input.cpp"), "void f() {}\nint main() {}\n");
    write_file(&root.join("dead_fn").join("expected.cpp"), "int main() {}\n");
    write_file(&root.join("kept").join("input.cpp"), "void f() {}\nint main() {}\n");
    write_file(&root.join("kept").join("expected.cpp"), "void f() {}\nint main() {}\n");
    write_file(&root.join("kept").join("case.toml"), "keep_identifiers = [\"f\"]\n");

    let summary = harness::run_cases(&root, &[]).unwrap();
    assert!(summary.all_passed(), "{:?}", summary.reports);
    assert_eq!(summary.passed, 2);

    fs::remove_dir_all(&root).ok();
}
