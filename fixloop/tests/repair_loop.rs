//! Repair loop against a real source file with scripted lint/agent.

use std::fs;
use std::path::Path;
use std::time::Duration;

use fixloop::core::extract::extract;
use fixloop::io::init::FixPaths;
use fixloop::io::source_store::FileSourceStore;
use fixloop::looping::{LoopConfig, LoopStop, run_loop};
use fixloop::test_support::{
    CLIPPY_TWO_ERRORS, EchoAgent, MISMATCHED_TYPES, ScriptedLintRunner, ScriptedRepairAgent,
    clean_lint, failing_lint,
};

const BROKEN: &str = "fn main() {\n    let x: i32 = \"hello\";\n    println!(\"{}\", y);\n}\n";
const FIXED: &str = "fn main() {\n    let x: i32 = 1;\n    println!(\"{}\", x);\n}\n";

fn project(source: &str) -> (tempfile::TempDir, FileSourceStore) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FileSourceStore::new(temp.path(), "src/main.rs");
    fs::create_dir_all(temp.path().join("src")).expect("src dir");
    fs::write(store.path(), source).expect("write source");
    (temp, store)
}

fn loop_config(root: &Path, max_iterations: u32) -> LoopConfig {
    LoopConfig {
        workdir: root.to_path_buf(),
        max_iterations,
        lint_timeout: Duration::from_secs(5),
        output_limit_bytes: 100_000,
        iterations_dir: Some(FixPaths::new(root).iterations_dir),
    }
}

#[test]
fn repair_is_written_and_logged() {
    let (temp, store) = project(BROKEN);
    let lint = ScriptedLintRunner::new(vec![Ok(failing_lint(CLIPPY_TWO_ERRORS)), Ok(clean_lint())]);
    let agent = ScriptedRepairAgent::new(vec![Ok(FIXED.to_string())]);

    let outcome =
        run_loop(&lint, &agent, &store, &loop_config(temp.path(), 3), |_| {}).expect("loop");

    assert_eq!(outcome.stop, LoopStop::Converged { iterations: 2 });
    assert_eq!(fs::read_to_string(store.path()).expect("read"), FIXED);

    let first = FixPaths::new(temp.path())
        .iterations_dir
        .join(&outcome.run_id)
        .join("1");
    let diagnostics: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(first.join("diagnostics.json")).expect("diagnostics.json"),
    )
    .expect("parse diagnostics");
    assert_eq!(diagnostics.as_array().map(Vec::len), Some(2));
    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(first.join("meta.json")).expect("meta.json"))
            .expect("parse meta");
    assert_eq!(meta["repaired"], true);
    assert_eq!(meta["diagnostics"], 2);
    assert_eq!(
        fs::read_to_string(first.join("candidate.rs")).expect("candidate"),
        FIXED
    );
}

#[test]
fn unchanged_source_stops_at_cap_with_exact_repair_count() {
    let (temp, store) = project(BROKEN);
    let lint = ScriptedLintRunner::repeating(failing_lint(MISMATCHED_TYPES));

    let mut seen = Vec::new();
    let outcome = run_loop(
        &lint,
        &EchoAgent,
        &store,
        &loop_config(temp.path(), 2),
        |report| seen.push(report.diagnostics.len()),
    )
    .expect("loop");

    assert_eq!(outcome.repairs_executed, 2);
    assert_eq!(
        outcome.stop,
        LoopStop::MaxIterationsExceeded {
            max_iterations: 2,
            remaining: 1
        }
    );
    assert!(seen.iter().all(|&count| count > 0));
    assert_eq!(fs::read_to_string(store.path()).expect("read"), BROKEN);
}

#[test]
fn lint_failure_after_repair_puts_committed_source_back() {
    let (temp, store) = project(BROKEN);
    let lint = ScriptedLintRunner::new(vec![
        Ok(failing_lint(MISMATCHED_TYPES)),
        Err("`cargo clippy` timed out after 5s".to_string()),
    ]);
    let agent = ScriptedRepairAgent::new(vec![Ok("fn main() { loop {} }\n".to_string())]);

    let err = run_loop(&lint, &agent, &store, &loop_config(temp.path(), 3), |_| {}).unwrap_err();

    assert!(format!("{err:#}").contains("timed out"));
    assert_eq!(fs::read_to_string(store.path()).expect("read"), BROKEN);
}

#[test]
fn format_failure_keeps_converged_outcome() {
    let (temp, store) = project(FIXED);
    let lint = ScriptedLintRunner::new(vec![Ok(clean_lint())]).with_format_error("rustfmt failed");

    let outcome =
        run_loop(&lint, &EchoAgent, &store, &loop_config(temp.path(), 1), |_| {}).expect("loop");

    assert_eq!(outcome.stop, LoopStop::Converged { iterations: 1 });
    assert_eq!(outcome.repairs_executed, 0);
}

#[test]
fn worse_repair_becomes_the_new_baseline() {
    let (temp, store) = project(BROKEN);
    let lint = ScriptedLintRunner::new(vec![
        Ok(failing_lint(MISMATCHED_TYPES)),
        Ok(failing_lint(CLIPPY_TWO_ERRORS)),
        Ok(clean_lint()),
    ]);
    let agent = ScriptedRepairAgent::new(vec![Ok("worse\n".to_string()), Ok(FIXED.to_string())]);

    let outcome =
        run_loop(&lint, &agent, &store, &loop_config(temp.path(), 5), |_| {}).expect("loop");

    assert_eq!(outcome.repairs_executed, 2);
    let requests = agent.requests();
    assert_eq!(requests[1].source, "worse\n");
    assert_eq!(requests[1].diagnostics, extract(CLIPPY_TWO_ERRORS));
}
