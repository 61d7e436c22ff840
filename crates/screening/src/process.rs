//! External process invocation shared by the trainer and predictor bridges

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Program plus fixed leading arguments, e.g. `python3 scripts/train.py`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Captured result of one invocation
#[derive(Debug)]
pub(crate) struct CapturedOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// The `error` string of a JSON object printed on stdout, if any.
    pub fn reported_error(&self) -> Option<String> {
        let payload: Value = serde_json::from_str(self.stdout.trim()).ok()?;
        error_message(&payload)
    }

    /// Non-empty stdout and stderr, verbatim, separated by a blank line
    pub fn diagnostics(&self) -> String {
        [self.stdout.trim(), self.stderr.trim()]
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// `status 1`, or `signal` when the child was killed
    pub fn status(&self) -> String {
        self.code
            .map_or_else(|| "signal".to_string(), |code| format!("status {code}"))
    }
}

/// Message of an `{"error": ...}` payload. Non-string errors are rendered as JSON.
pub(crate) fn error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Run `spec` with `extra` appended and wait for it to exit. The child is
/// killed if the returned future is dropped, so callers can bound it with
/// `tokio::time::timeout`.
pub(crate) async fn run(
    spec: &CommandSpec,
    extra: &[String],
) -> std::io::Result<CapturedOutput> {
    debug!(program = %spec.program, args = ?extra, "spawning external process");

    let output = Command::new(&spec.program)
        .args(&spec.args)
        .args(extra)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(CapturedOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
