use crate::config::ValidationSettings;
use crate::error::{BenchError, Result};
use crate::materialize::SampleDirectory;
use crate::session::SessionResult;
use crate::shell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// CheckContext
// ---------------------------------------------------------------------------

pub struct CheckContext<'a> {
    pub sample: &'a SampleDirectory,
    pub session: &'a SessionResult,
    pub template_root: &'a Path,
    pub settings: &'a ValidationSettings,
    pub exclude: &'a [String],
}

// ---------------------------------------------------------------------------
// Verdict / ValidationOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub passed: bool,
    pub detail: String,
}

impl Verdict {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub scenario_id: String,
    pub check_name: String,
    pub passed: bool,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Check
// ---------------------------------------------------------------------------

/// A fn-pointer check: a stable name plus an evaluator.
///
/// An `Err` from `evaluate` is not fatal; the validator records it as a
/// failed outcome and moves on.
#[derive(Clone, Copy)]
pub struct Check {
    pub name: &'static str,
    pub evaluate: fn(&CheckContext) -> Result<Verdict>,
}

pub const COMPONENT_EXISTS: &str = "componentExists";
pub const LINT_PASSES: &str = "lintPasses";
pub const TESTS_PASS: &str = "testsPass";
pub const LINE_DELTA: &str = "lineDelta";

/// The fixed battery, in evaluation order.
pub fn default_checks() -> Vec<Check> {
    vec![
        Check {
            name: COMPONENT_EXISTS,
            evaluate: component_exists,
        },
        Check {
            name: LINT_PASSES,
            evaluate: lint_passes,
        },
        Check {
            name: TESTS_PASS,
            evaluate: tests_pass,
        },
        Check {
            name: LINE_DELTA,
            evaluate: line_delta,
        },
    ]
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

pub struct Validator {
    checks: Vec<Check>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(default_checks())
    }
}

impl Validator {
    pub fn new(checks: Vec<Check>) -> Self {
        Self { checks }
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name).collect()
    }

    /// Run every check in order. Always returns exactly one outcome per check.
    pub fn evaluate(&self, ctx: &CheckContext) -> Vec<ValidationOutcome> {
        let scenario_id = &ctx.sample.scenario_id;
        self.checks
            .iter()
            .map(|check| {
                let verdict = match (check.evaluate)(ctx) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(
                            scenario = %scenario_id,
                            check = check.name,
                            error = %e,
                            "check failed to evaluate"
                        );
                        Verdict::fail(e.to_string())
                    }
                };
                ValidationOutcome {
                    scenario_id: scenario_id.clone(),
                    check_name: check.name.to_string(),
                    passed: verdict.passed,
                    detail: verdict.detail,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Built-in checks
// ---------------------------------------------------------------------------

fn component_exists(ctx: &CheckContext) -> Result<Verdict> {
    let expected = &ctx.settings.expected_file;
    let path = ctx.sample.path.join(expected);
    if path.is_file() {
        return Ok(Verdict::pass(format!("{expected} exists")));
    }
    let mut detail = format!("{expected} not found");
    if !ctx.session.exit.is_success() {
        detail.push_str(&format!(" (session {})", ctx.session.exit.label()));
    }
    Ok(Verdict::fail(detail))
}

fn lint_passes(ctx: &CheckContext) -> Result<Verdict> {
    run_command_check(LINT_PASSES, &ctx.settings.lint_command, ctx)
}

fn tests_pass(ctx: &CheckContext) -> Result<Verdict> {
    run_command_check(TESTS_PASS, &ctx.settings.test_command, ctx)
}

fn run_command_check(check: &str, command: &str, ctx: &CheckContext) -> Result<Verdict> {
    if command.trim().is_empty() {
        return Err(BenchError::Validation {
            check: check.to_string(),
            reason: "command is empty".to_string(),
        });
    }
    let timeout = match ctx.settings.command_timeout_secs {
        0 => None,
        s => Some(Duration::from_secs(s)),
    };
    let out = shell::run(command, &ctx.sample.path, timeout).map_err(|e| {
        BenchError::Validation {
            check: check.to_string(),
            reason: format!("failed to spawn '{command}': {e}"),
        }
    })?;

    if out.timed_out {
        return Ok(Verdict::fail(out.output));
    }
    let code = out
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let mut detail = format!("`{command}` exited with {code} in {}ms", out.duration_ms);
    if !out.success() && !out.output.is_empty() {
        detail.push('\n');
        detail.push_str(crate::session::tail(&out.output, 2048));
    }
    Ok(Verdict {
        passed: out.success(),
        detail,
    })
}

fn line_delta(ctx: &CheckContext) -> Result<Verdict> {
    let source = &ctx.settings.source_dir;
    let before = crate::io::count_lines(&ctx.template_root.join(source), ctx.exclude)?;
    let after = crate::io::count_lines(&ctx.sample.path.join(source), ctx.exclude)?;
    let delta = after as i64 - before as i64;
    let detail = format!("{before} -> {after} lines ({delta:+})");

    if delta <= 0 {
        return Ok(Verdict::fail(detail));
    }
    if let Some(max) = ctx.settings.max_line_delta {
        if delta as usize > max {
            return Ok(Verdict::fail(format!("{detail}, exceeds max {max}")));
        }
    }
    Ok(Verdict::pass(detail))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
