//! Self-diagnosis: platform, external tools and engine health.

use serde::Serialize;

use crate::engines::find_executable;
use crate::registry::EngineRegistry;

/// External programs some engines shell out to.
pub const TOOLS: [&str; 4] = ["ffmpeg", "espeak-ng", "piper", "uv"];

/// Engines worth reporting on. `mock` always works.
pub const ENGINES: [&str; 3] = ["kokoro", "dia2", "piper"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticResult {
    pub check: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DiagnosticResult {
    fn new(check: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticSummary {
    pub total: usize,
    pub passed: usize,
    pub warnings: usize,
    pub failures: usize,
    /// No check failed. Warnings are allowed.
    pub healthy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub summary: DiagnosticSummary,
    pub details: Vec<DiagnosticResult>,
}

pub fn check_platform() -> DiagnosticResult {
    DiagnosticResult::new(
        "platform",
        CheckStatus::Pass,
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
    )
    .with_details(serde_json::json!({
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "family": std::env::consts::FAMILY,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn check_tool(tool: &str) -> DiagnosticResult {
    let check = format!("tool_{tool}");
    match find_executable(tool) {
        Some(path) => DiagnosticResult::new(check, CheckStatus::Pass, format!("{tool} found"))
            .with_details(serde_json::json!({ "path": path })),
        None => DiagnosticResult::new(
            check,
            CheckStatus::Warn,
            format!("{tool} not found (engines that need it will be unavailable)"),
        ),
    }
}

pub fn check_engine(registry: &EngineRegistry, name: &str) -> DiagnosticResult {
    let check = format!("engine_{name}");
    let Some(handle) = registry.get(name) else {
        return DiagnosticResult::new(
            check,
            CheckStatus::Warn,
            format!("Engine '{name}' not installed/registered"),
        );
    };

    let capabilities = serde_json::to_value(handle.capabilities()).unwrap_or_default();
    let (status, message) = if handle.is_available() {
        (CheckStatus::Pass, format!("Engine '{name}' available"))
    } else {
        (
            CheckStatus::Warn,
            format!("Engine '{name}' installed but not available (missing deps?)"),
        )
    };
    DiagnosticResult::new(check, status, message).with_details(capabilities)
}

/// Run every check. Engine checks probe availability but never load a model.
pub fn run_diagnostics(registry: &EngineRegistry) -> DiagnosticReport {
    let mut details = vec![check_platform()];
    details.extend(TOOLS.iter().map(|tool| check_tool(tool)));
    details.extend(ENGINES.iter().map(|name| check_engine(registry, name)));

    let count = |status| details.iter().filter(|d| d.status == status).count();
    let summary = DiagnosticSummary {
        total: details.len(),
        passed: count(CheckStatus::Pass),
        warnings: count(CheckStatus::Warn),
        failures: count(CheckStatus::Fail),
        healthy: count(CheckStatus::Fail) == 0,
    };
    log::info!(
        "Diagnostics: {} passed, {} warnings, {} failures",
        summary.passed,
        summary.warnings,
        summary.failures
    );

    DiagnosticReport { summary, details }
}
