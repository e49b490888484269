//! Resource cleanup and status reporting.
//!
//! Renders unload their engine on the way out, so these are a safety net for
//! engines loaded by hand and for worker processes left behind by a crash.

use serde::Serialize;

use crate::engines::{dia2, piper};
use crate::registry::EngineRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub success: bool,
    pub cleaned_engines: Vec<String>,
    /// Engines skipped because a render was using them.
    pub busy_engines: Vec<String>,
    pub message: String,
}

/// Unload every constructed engine that is loaded.
///
/// Engines currently held by a render are left alone and reported as busy; the
/// render unloads them itself when it finishes.
pub fn cleanup_resources(registry: &EngineRegistry) -> CleanupReport {
    let mut cleaned = Vec::new();
    let mut busy = Vec::new();

    for handle in registry.instances() {
        let Some(mut engine) = handle.try_lock() else {
            busy.push(handle.name().to_string());
            continue;
        };
        if engine.is_loaded() {
            engine.unload();
            cleaned.push(handle.name().to_string());
        }
    }

    if !busy.is_empty() {
        log::warn!("Skipped busy engines: {}", busy.join(", "));
    }
    log::info!("Cleaned {} engine(s)", cleaned.len());

    CleanupReport {
        success: true,
        message: format!("Cleaned {} engine(s). Memory freed.", cleaned.len()),
        cleaned_engines: cleaned,
        busy_engines: busy,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub name: String,
    pub loaded: bool,
    /// A render currently holds the engine.
    pub busy: bool,
    pub available: bool,
    /// Declared model size while loaded, else 0.
    pub memory_mb: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub engines: Vec<EngineStatus>,
    pub total_memory_mb: u32,
    /// `"clean"` when nothing is loaded, `"models_loaded"` otherwise.
    pub status: String,
}

/// Loaded state, availability and memory of every registered engine.
///
/// Read-only: nothing is loaded or unloaded. A busy engine counts as loaded.
pub fn resource_status(registry: &EngineRegistry) -> ResourceStatus {
    let engines: Vec<EngineStatus> = registry
        .registered()
        .iter()
        .filter_map(|name| registry.get(name))
        .map(|handle| {
            let (loaded, busy) = match handle.try_lock() {
                Some(engine) => (engine.is_loaded(), false),
                None => (true, true),
            };
            EngineStatus {
                name: handle.name().to_string(),
                loaded,
                busy,
                available: handle.is_available(),
                memory_mb: if loaded { handle.capabilities().model_size_mb } else { 0 },
            }
        })
        .collect();

    let total_memory_mb = engines.iter().map(|e| e.memory_mb).sum();
    let status = if engines.iter().any(|e| e.loaded) {
        "models_loaded"
    } else {
        "clean"
    };

    ResourceStatus {
        engines,
        total_memory_mb,
        status: status.to_string(),
    }
}

/// Name patterns of worker processes spawned by subprocess engines.
pub const STALE_PROCESS_PATTERNS: [&str; 2] = [dia2::TEMP_PREFIX, piper::TEMP_PREFIX];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessCleanupReport {
    pub success: bool,
    /// Patterns that matched and were signalled.
    pub killed_patterns: Vec<String>,
    pub errors: Vec<String>,
}

/// Best-effort kill of worker processes whose command line mentions one of
/// [`STALE_PROCESS_PATTERNS`].
///
/// Workers write into scratch paths carrying those prefixes, so a match is a
/// worker this crate started.
pub fn kill_stale_processes() -> ProcessCleanupReport {
    let mut killed = Vec::new();
    let mut errors = Vec::new();

    #[cfg(unix)]
    for pattern in STALE_PROCESS_PATTERNS {
        match std::process::Command::new("pkill").args(["-f", pattern]).status() {
            // pkill exits 1 when nothing matched.
            Ok(status) if status.code() == Some(0) => {
                log::info!("Killed stale processes matching {pattern}");
                killed.push(pattern.to_string());
            }
            Ok(status) if status.code() == Some(1) => {}
            Ok(status) => errors.push(format!("{pattern}: pkill exited with {status}")),
            Err(e) => errors.push(format!("{pattern}: {e}")),
        }
    }

    #[cfg(not(unix))]
    errors.push("Process cleanup not implemented for this OS".to_string());

    for error in &errors {
        log::warn!("Process cleanup: {error}");
    }

    ProcessCleanupReport {
        success: errors.is_empty(),
        killed_patterns: killed,
        errors,
    }
}
