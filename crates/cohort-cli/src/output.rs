//! Pretty/text/JSON rendering shared by every command.
//!
//! Results go to stdout and errors to stderr. JSON mode prints the serialized
//! payload; the two human modes call a per-command renderer. Which mode is in
//! effect is decided in `cohort_core::config` (`--json`, then `FORMAT`, then
//! the user config, then whether stdout is a terminal).

use cohort_core::RolloutError;
use cohort_core::config::OutputFormat;
use serde::Serialize;
use std::io::{self, Write};

type Renderer<'a, T> = &'a dyn Fn(&T, &mut dyn Write) -> io::Result<()>;

const RULE_WIDTH: usize = 72;

/// Heading underlined with a dashed rule.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}\n{}", "-".repeat(RULE_WIDTH))
}

/// `key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Sectioned output for a terminal.
    Pretty,
    /// Tab-separated lines for pipes.
    Text,
    Json,
}

impl OutputMode {
    pub const fn from_resolved(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json,
            OutputFormat::Pretty => Self::Pretty,
            OutputFormat::Text => Self::Text,
        }
    }

    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Error payload written to stderr; nested under `"error"` in JSON mode.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// `E####` for store and rollout failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn coded(
        message: impl Into<String>,
        error_code: impl Into<String>,
        suggestion: Option<&str>,
    ) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.map(str::to_string),
            error_code: Some(error_code.into()),
        }
    }
}

impl From<&RolloutError> for CliError {
    fn from(err: &RolloutError) -> Self {
        let code = err.code();
        Self::coded(err.to_string(), code.code(), code.hint())
    }
}

/// Print `value` as JSON, or through `human` in either human mode.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human: impl Fn(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    emit(&mut io::stdout().lock(), mode, value, &human, &human)
}

/// Like [`render`], with separate renderers for text and pretty modes.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text: impl Fn(&T, &mut dyn Write) -> io::Result<()>,
    pretty: impl Fn(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    emit(&mut io::stdout().lock(), mode, value, &text, &pretty)
}

fn emit<T: Serialize>(
    out: &mut dyn Write,
    mode: OutputMode,
    value: &T,
    text: Renderer<'_, T>,
    pretty: Renderer<'_, T>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text(value, out)?,
        OutputMode::Pretty => pretty(value, out)?,
    }
    out.flush()?;
    Ok(())
}

/// Write `error` to stderr in the given mode.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    write_error(&mut io::stderr().lock(), mode, error)
}

fn write_error(out: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut *out, &serde_json::json!({ "error": error }))?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "error: {}", error.message)?;
    if let Some(suggestion) = &error.suggestion {
        writeln!(out, "  suggestion: {suggestion}")?;
    }
    Ok(())
}

/// Report `err` on stderr, then return it for `?` propagation.
pub fn fail(mode: OutputMode, err: RolloutError) -> anyhow::Error {
    if let Err(render_err) = render_error(mode, &CliError::from(&err)) {
        tracing::warn!(error = %render_err, "could not write error report");
    }
    anyhow::Error::new(err)
}
