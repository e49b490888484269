//! Engine selection through the registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hearme::cleanup;
use hearme::config::HearmeConfig;
use hearme::engines::dia2::Dia2Engine;
use hearme::engines::mock::MockEngine;
use hearme::registry::{boxed, get_engine};
use hearme::{
    AudioEngine, AudioFormat, EngineCapabilities, EngineError, EngineRegistry, SynthesisResult, VoiceInfo,
};

fn unavailable_dia2(registry: &EngineRegistry, dir: &std::path::Path) {
    let missing = dir.join("dia2");
    registry.register("dia2", 10, move || {
        boxed(Dia2Engine::new(missing.clone(), Duration::from_secs(5)))
    });
}

/// An engine whose runtime is never installed. Counts its availability checks.
struct Offline {
    checks: Arc<AtomicUsize>,
}

impl AudioEngine for Offline {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "offline".to_string(),
            multi_speaker: true,
            max_speakers: 2,
            supports_streaming: false,
            requires_gpu: true,
            model_size_mb: 2000,
            quality_rating: 5,
        }
    }

    fn is_available(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn list_voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn is_loaded(&self) -> bool {
        false
    }

    fn load(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Unavailable {
            engine: "offline",
            hint: "never installed".to_string(),
        })
    }

    fn unload(&mut self) {}

    fn synthesize(&mut self, _text: &str, _voice: Option<&str>, _format: AudioFormat) -> SynthesisResult {
        SynthesisResult::failure("offline")
    }
}

fn offline_then_mock() -> (EngineRegistry, Arc<AtomicUsize>) {
    let checks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&checks);
    let registry = EngineRegistry::new();
    registry.register("offline", 1, move || {
        boxed(Offline {
            checks: Arc::clone(&counter),
        })
    });
    registry.register("mock", 100, || boxed(MockEngine::new()));
    (registry, checks)
}

#[test]
fn default_registry_always_has_mock() {
    let registry = EngineRegistry::with_default_engines(&HearmeConfig::default());

    assert!(registry.is_registered("mock"));
    assert!(registry.is_registered("dia2"));
    assert!(registry.is_registered("piper"));
    assert_eq!(registry.registered().last().map(String::as_str), Some("mock"));
    assert!(registry.get_available().contains(&"mock".to_string()));
}

#[test]
fn best_available_skips_engines_that_cannot_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = EngineRegistry::new();
    unavailable_dia2(&registry, dir.path());
    registry.register("mock", 100, || boxed(MockEngine::new()));
    if registry.get("dia2").unwrap().is_available() {
        return;
    }

    let best = registry.get_best_available().unwrap();
    assert_eq!(best.name(), "mock");
    assert!(best.is_available());
    assert_eq!(get_engine(&registry, None).unwrap().name(), "mock");
}

#[test]
fn nothing_available_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let registry = EngineRegistry::new();
    unavailable_dia2(&registry, dir.path());
    if registry.get("dia2").unwrap().is_available() {
        return;
    }

    assert!(registry.get_best_available().is_none());
    assert!(registry.get_available().is_empty());
}

#[test]
fn lookup_of_unknown_engine_is_absent() {
    let registry = EngineRegistry::new();
    assert!(get_engine(&registry, Some("nonexistent_xyz")).is_none());
}

#[test]
fn failing_constructor_is_absent_and_retried() {
    let registry = EngineRegistry::new();
    registry.register("broken", 1, || Err(EngineError::Model("bad weights".to_string())));

    assert!(registry.get("broken").is_none());
    assert!(registry.instances().is_empty());

    registry.register("broken", 1, || boxed(MockEngine::new()));
    assert!(registry.get("broken").is_some());
}

#[test]
fn concurrent_lookups_share_one_instance() {
    let registry = Arc::new(EngineRegistry::new());
    registry.register("mock", 100, || boxed(MockEngine::new()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.get("mock").unwrap())
        })
        .collect();
    let engines: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(engines.iter().all(|e| Arc::ptr_eq(e, &engines[0])));
    assert_eq!(registry.instances().len(), 1);
}

#[test]
fn cleanup_unloads_loaded_engines_only() {
    let registry = EngineRegistry::new();
    registry.register("mock", 100, || boxed(MockEngine::new()));

    let report = cleanup::cleanup_resources(&registry);
    assert!(report.success);
    assert!(report.cleaned_engines.is_empty());

    let engine = registry.get("mock").unwrap();
    engine.lock().load().unwrap();
    assert_eq!(cleanup::resource_status(&registry).status, "models_loaded");

    let report = cleanup::cleanup_resources(&registry);
    assert_eq!(report.cleaned_engines, vec!["mock"]);
    assert_eq!(report.message, "Cleaned 1 engine(s). Memory freed.");
    assert!(!engine.lock().is_loaded());
    assert_eq!(cleanup::resource_status(&registry).status, "clean");
}

#[test]
fn cleanup_leaves_busy_engines_alone() {
    let registry = EngineRegistry::new();
    registry.register("mock", 100, || boxed(MockEngine::new()));
    let engine = registry.get("mock").unwrap();

    let mut guard = engine.lock();
    guard.load().unwrap();
    let report = cleanup::cleanup_resources(&registry);
    let status = cleanup::resource_status(&registry);
    assert!(guard.is_loaded());
    drop(guard);

    assert!(report.cleaned_engines.is_empty());
    assert_eq!(report.busy_engines, vec!["mock"]);
    assert!(status.engines[0].busy);
}

#[test]
fn held_engine_still_reports_its_real_availability() {
    let (registry, _) = offline_then_mock();
    let offline = registry.get("offline").unwrap();

    let _guard = offline.lock();
    assert!(!offline.is_available());
    assert_eq!(registry.get_best_available().unwrap().name(), "mock");
    assert_eq!(registry.get_available(), vec!["mock"]);
}

#[test]
fn availability_is_checked_once_per_instance() {
    let (registry, checks) = offline_then_mock();
    for _ in 0..3 {
        registry.get_best_available();
        registry.get_available();
    }
    assert_eq!(checks.load(Ordering::SeqCst), 1);
}

#[test]
fn list_all_reports_every_engine_in_fallback_order() {
    let (registry, _) = offline_then_mock();
    registry.register("broken", 50, || Err(EngineError::Model("bad weights".to_string())));

    let names: Vec<_> = registry.list_all().into_iter().map(|caps| caps.name).collect();
    assert_eq!(names, vec!["offline", "mock"]);
}
