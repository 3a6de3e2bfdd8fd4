//! Scripted collaborators and fixture lint output for tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow};

use crate::core::types::{CodeExplanation, DiagnosticRecord};
use crate::io::agent::{RepairAgent, RepairRequest, RepairResponse};
use crate::io::lint::{CommandRequest, LintOutput, LintRunner};
use crate::io::source_store::SourceStore;

/// A single rustc type error.
pub const MISMATCHED_TYPES: &str = "\
error[E0308]: mismatched types
 --> src/main.rs:3:5
3 |     let x: i32 = \"a\";
  |                  ^^^ expected i32
";

/// `cargo clippy` stderr with two coded errors, an uncoded warning and the
/// usual trailer.
pub const CLIPPY_TWO_ERRORS: &str = "\
    Checking demo v0.1.0 (/tmp/demo)
error[E0308]: mismatched types
 --> src/main.rs:3:18
  |
3 |     let x: i32 = \"hello\";
  |            ---   ^^^^^^^ expected `i32`, found `&str`
  |            |
  |            expected due to this

error[E0425]: cannot find value `y` in this scope
 --> src/main.rs:4:20
  |
4 |     println!(\"{}\", y);
  |                    ^ not found in this scope

warning: unused variable: `z`
 --> src/main.rs:5:9
  |
5 |     let z = 1;
  |         ^ help: if this is intentional, prefix it with an underscore: `_z`
  |
  = note: `#[warn(unused_variables)]` on by default

Some errors have detailed explanations: E0308, E0425.
For more information about an error, try `rustc --explain E0308`.
warning: `demo` (bin \"demo\") generated 1 warning
error: could not compile `demo` (bin \"demo\") due to 2 previous errors; 1 warning emitted
";

/// Lint output of a clean pass.
pub fn clean_lint() -> LintOutput {
    LintOutput {
        stdout: String::new(),
        stderr: "    Checking demo v0.1.0 (/tmp/demo)\n    Finished `dev` profile\n".to_string(),
        success: true,
    }
}

/// Lint output of a failing pass with `stderr`.
pub fn failing_lint(stderr: &str) -> LintOutput {
    LintOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        success: false,
    }
}

/// Lint runner replaying queued results. `Err` entries become collaborator
/// failures carrying the given message.
pub struct ScriptedLintRunner {
    outputs: RefCell<VecDeque<Result<LintOutput, String>>>,
    repeat: Option<LintOutput>,
    format_error: Option<String>,
    explanations: HashMap<String, String>,
    lint_calls: Cell<u32>,
    format_calls: Cell<u32>,
    explain_calls: RefCell<Vec<String>>,
}

impl ScriptedLintRunner {
    pub fn new(outputs: Vec<Result<LintOutput, String>>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            repeat: None,
            format_error: None,
            explanations: HashMap::new(),
            lint_calls: Cell::new(0),
            format_calls: Cell::new(0),
            explain_calls: RefCell::new(Vec::new()),
        }
    }

    /// Return `output` from every lint call.
    pub fn repeating(output: LintOutput) -> Self {
        Self {
            repeat: Some(output),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_format_error(mut self, message: &str) -> Self {
        self.format_error = Some(message.to_string());
        self
    }

    /// Answer `explain(code)` with `text`; other codes have no explanation.
    pub fn with_explanation(mut self, code: &str, text: &str) -> Self {
        self.explanations.insert(code.to_string(), text.to_string());
        self
    }

    /// Codes passed to `explain`, in call order.
    pub fn explain_calls(&self) -> Vec<String> {
        self.explain_calls.borrow().clone()
    }

    pub fn lint_calls(&self) -> u32 {
        self.lint_calls.get()
    }

    pub fn format_calls(&self) -> u32 {
        self.format_calls.get()
    }
}

impl LintRunner for ScriptedLintRunner {
    fn lint(&self, _request: &CommandRequest) -> Result<LintOutput> {
        self.lint_calls.set(self.lint_calls.get() + 1);
        if let Some(output) = &self.repeat {
            return Ok(output.clone());
        }
        match self.outputs.borrow_mut().pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted lint output left")),
        }
    }

    fn format(&self, _request: &CommandRequest) -> Result<()> {
        self.format_calls.set(self.format_calls.get() + 1);
        match &self.format_error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }

    fn explain(&self, code: &str, _request: &CommandRequest) -> Result<Option<String>> {
        self.explain_calls.borrow_mut().push(code.to_string());
        Ok(self.explanations.get(code).cloned())
    }
}

/// Owned copy of a request seen by [`ScriptedRepairAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub source: String,
    pub diagnostics: Vec<DiagnosticRecord>,
    pub explanations: Vec<CodeExplanation>,
}

/// Repair agent replaying queued replacement sources.
pub struct ScriptedRepairAgent {
    replies: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedRepairAgent {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }
}

impl RepairAgent for ScriptedRepairAgent {
    fn repair(&self, request: &RepairRequest<'_>) -> Result<RepairResponse> {
        self.requests.borrow_mut().push(RecordedRequest {
            path: request.path.to_string(),
            source: request.source.to_string(),
            diagnostics: request.diagnostics.to_vec(),
            explanations: request.explanations.to_vec(),
        });
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(source)) => Ok(RepairResponse {
                raw: format!("```rust\n{source}```"),
                source,
            }),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted repair left")),
        }
    }
}

/// Repair agent that hands the source back unchanged.
pub struct EchoAgent;

impl RepairAgent for EchoAgent {
    fn repair(&self, request: &RepairRequest<'_>) -> Result<RepairResponse> {
        Ok(RepairResponse {
            raw: request.source.to_string(),
            source: request.source.to_string(),
        })
    }
}

/// In-memory source file recording every write.
pub struct MemorySourceStore {
    current: RefCell<String>,
    writes: RefCell<Vec<String>>,
}

impl MemorySourceStore {
    pub fn new(initial: &str) -> Self {
        Self {
            current: RefCell::new(initial.to_string()),
            writes: RefCell::new(Vec::new()),
        }
    }

    pub fn current(&self) -> String {
        self.current.borrow().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.borrow().clone()
    }
}

impl SourceStore for MemorySourceStore {
    fn read(&self) -> Result<String> {
        Ok(self.current())
    }

    fn write(&self, source: &str) -> Result<()> {
        self.writes.borrow_mut().push(source.to_string());
        *self.current.borrow_mut() = source.to_string();
        Ok(())
    }

    fn describe(&self) -> String {
        "src/main.rs".to_string()
    }
}
