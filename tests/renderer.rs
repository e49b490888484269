//! End-to-end renders through a freshly built registry.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use hearme::engines::dia2::{Dia2Engine, Dia2Runtime};
use hearme::engines::mock::{self, MockEngine};
use hearme::registry::boxed;
use hearme::renderer::RenderRequestBuilder;
use hearme::{
    audio, AudioEngine, AudioFormat, EngineCapabilities, EngineError, EngineRegistry, RenderRequest,
    Renderer, ScriptEntry, SynthesisResult, VoiceInfo,
};

fn mock_registry() -> EngineRegistry {
    let registry = EngineRegistry::new();
    registry.register("mock", 100, || boxed(MockEngine::new()));
    registry
}

fn request(script: Vec<ScriptEntry>, output: &Path) -> RenderRequest {
    RenderRequestBuilder::default()
        .script(script)
        .output_path(output)
        .build()
        .unwrap()
}

/// Dia2 stand-in that records every tagged script and answers with half a
/// second of silence, failing on the call numbered `fail_on`.
struct ScriptedRuntime {
    scripts: Arc<Mutex<Vec<String>>>,
    fail_on: Option<usize>,
}

impl Dia2Runtime for ScriptedRuntime {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn generate(&mut self, script: &str, output: &Path) -> Result<(), EngineError> {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.push(script.to_string());
        if self.fail_on == Some(scripts.len()) {
            return Err(EngineError::Process("out of memory".to_string()));
        }
        fs::write(output, audio::silence(0.5, 24_000)?)?;
        Ok(())
    }
}

fn dia2_registry(fail_on: Option<usize>) -> (EngineRegistry, Arc<Mutex<Vec<String>>>) {
    let scripts = Arc::new(Mutex::new(Vec::new()));
    let registry = EngineRegistry::new();
    let recorded = Arc::clone(&scripts);
    registry.register("dia2", 10, move || {
        let recorded = Arc::clone(&recorded);
        boxed(Dia2Engine::with_runtime(move || {
            Box::new(ScriptedRuntime {
                scripts: Arc::clone(&recorded),
                fail_on,
            })
        }))
    });
    registry.register("mock", 100, || boxed(MockEngine::new()));
    (registry, scripts)
}

fn dialogue() -> Vec<ScriptEntry> {
    vec![
        ScriptEntry::new("host", "Hello there."),
        ScriptEntry::new("guest", "Hi back."),
        ScriptEntry::new("host", "Once more."),
        ScriptEntry::new("guest", "Bye now."),
    ]
}

#[test]
fn mock_renders_single_segment() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("single.wav");
    let text = "Hello world, this is a test.";

    let result = Renderer::new(&mock_registry()).render(&request(vec![ScriptEntry::narration(text)], &output));

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.engine_used.as_deref(), Some("mock"));
    assert_eq!(result.segment_count, 1);
    assert!((result.duration_seconds - mock::estimate_duration(text)).abs() < 0.01);
    assert!(fs::metadata(&output).unwrap().len() > 44);
}

#[test]
fn mock_renders_every_segment() {
    let dir = tempfile::tempdir().unwrap();
    let script = vec![
        ScriptEntry::new("host", "Welcome to the tour."),
        ScriptEntry::new("guest", "Glad to be here."),
        ScriptEntry::new("host", "Let us begin."),
    ];

    let result = Renderer::new(&mock_registry()).render(&request(script, &dir.path().join("multi.wav")));

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.segment_count, 3);
    assert!(result.duration_seconds >= 1.5);
}

#[test]
fn creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("deep").join("er").join("out.wav");

    let result = Renderer::new(&mock_registry()).render(&request(vec![ScriptEntry::narration("Hi.")], &output));

    assert!(result.success, "{:?}", result.error);
    assert!(output.is_file());
}

#[test]
fn rejects_scripts_over_the_limit() {
    let dir = tempfile::tempdir().unwrap();
    let script = vec![ScriptEntry::narration(&"a".repeat(100_001))];

    let result = Renderer::new(&mock_registry()).render(&request(script, &dir.path().join("long.wav")));

    assert!(!result.success);
    assert!(result.error.unwrap().contains("too long"));
    assert!(result.engine_used.is_none());
}

#[test]
fn blank_turns_are_dropped_before_validation() {
    let dir = tempfile::tempdir().unwrap();
    let script = vec![ScriptEntry::new("host", "   "), ScriptEntry::narration("")];

    let result = Renderer::new(&mock_registry()).render(&request(script, &dir.path().join("blank.wav")));

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Script is empty"));
}

#[test]
fn unknown_engine_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = request(vec![ScriptEntry::narration("Hi.")], &dir.path().join("x.wav"));
    request.engine = Some("nonexistent_xyz".to_string());

    let result = Renderer::new(&mock_registry()).render(&request);

    assert!(!result.success);
    assert!(result.error.unwrap().contains("nonexistent_xyz"));
}

#[test]
fn requested_engine_that_cannot_run_is_not_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let registry = mock_registry();
    let missing = dir.path().join("no-dia2-here");
    registry.register("dia2", 10, move || {
        boxed(Dia2Engine::new(missing.clone(), std::time::Duration::from_secs(5)))
    });
    if registry.get("dia2").unwrap().is_available() {
        // A real Dia2 install on this machine.
        return;
    }

    let mut request = request(vec![ScriptEntry::narration("Hi.")], &dir.path().join("x.wav"));
    request.engine = Some("dia2".to_string());
    let result = Renderer::new(&registry).render(&request);

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Engine 'dia2' is not available"));
}

#[test]
fn long_dialogue_is_chunked_with_stable_markers() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, scripts) = dia2_registry(None);
    let output = dir.path().join("dialogue.wav");

    let result = Renderer::new(&registry)
        .with_chunk_chars(12)
        .render(&request(dialogue(), &output));

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.engine_used.as_deref(), Some("dia2"));
    assert_eq!(
        *scripts.lock().unwrap(),
        vec![
            "[S1] Hello there.",
            "[S2] Hi back.",
            "[S1] Once more.",
            "[S2] Bye now.",
        ]
    );
    assert!((result.duration_seconds - 2.0).abs() < 0.01);

    let pcm = audio::decode_pcm16(&fs::read(&output).unwrap()).unwrap();
    assert!((pcm.duration_seconds() - 2.0).abs() < 0.01);
    assert!(!registry.get("dia2").unwrap().lock().is_loaded());
}

#[test]
fn short_dialogue_is_one_pass() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, scripts) = dia2_registry(None);

    let result = Renderer::new(&registry).render(&request(dialogue(), &dir.path().join("d.wav")));

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        *scripts.lock().unwrap(),
        vec!["[S1] Hello there. [S2] Hi back. [S1] Once more. [S2] Bye now."]
    );
}

#[test]
fn failing_chunk_aborts_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, scripts) = dia2_registry(Some(2));
    let output = dir.path().join("partial.wav");

    let result = Renderer::new(&registry)
        .with_chunk_chars(12)
        .render(&request(dialogue(), &output));

    assert!(!result.success);
    assert!(result.error.unwrap().contains("out of memory"));
    assert_eq!(result.engine_used.as_deref(), Some("dia2"));
    assert_eq!(scripts.lock().unwrap().len(), 2);
    assert!(!output.exists());
    assert!(!registry.get("dia2").unwrap().lock().is_loaded());
}

/// Engine that misbehaves in the configured way.
#[derive(Default)]
struct Faulty {
    fail_load: bool,
    panic_in_synthesis: bool,
    loaded: bool,
}

impl AudioEngine for Faulty {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "faulty".to_string(),
            multi_speaker: false,
            max_speakers: 1,
            supports_streaming: false,
            requires_gpu: false,
            model_size_mb: 10,
            quality_rating: 5,
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn load(&mut self) -> Result<(), EngineError> {
        if self.fail_load {
            return Err(EngineError::Model("weights missing".to_string()));
        }
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = false;
    }

    fn synthesize(&mut self, _text: &str, _voice: Option<&str>, _format: AudioFormat) -> SynthesisResult {
        if self.panic_in_synthesis {
            panic!("decoder state corrupted");
        }
        SynthesisResult::failure("unreachable in these tests")
    }
}

fn faulty_registry(fail_load: bool, panic_in_synthesis: bool) -> EngineRegistry {
    let registry = EngineRegistry::new();
    registry.register("faulty", 1, move || {
        boxed(Faulty {
            fail_load,
            panic_in_synthesis,
            ..Faulty::default()
        })
    });
    registry
}

#[test]
fn load_failure_is_a_failed_result() {
    let dir = tempfile::tempdir().unwrap();
    let registry = faulty_registry(true, false);

    let result = Renderer::new(&registry).render(&request(vec![ScriptEntry::narration("Hi.")], &dir.path().join("x.wav")));

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Failed to load engine: Model error: weights missing")
    );
    assert_eq!(result.engine_used.as_deref(), Some("faulty"));
    assert!(!registry.get("faulty").unwrap().lock().is_loaded());
}

#[test]
fn panicking_engine_is_unloaded_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let registry = faulty_registry(false, true);
    let output = dir.path().join("x.wav");

    let result = Renderer::new(&registry).render(&request(vec![ScriptEntry::narration("Hi.")], &output));

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("internal error"), "{error}");
    assert!(error.contains("decoder state corrupted"), "{error}");
    assert!(!output.exists());
    assert!(!registry.get("faulty").unwrap().lock().is_loaded());
}

#[cfg(unix)]
#[test]
fn unwritable_output_dir_falls_back() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
    if fs::write(locked.join("write-check"), b"").is_ok() {
        // Running with privileges that ignore directory permissions.
        return;
    }
    let fallback = dir.path().join("fallback");

    let registry = mock_registry();
    let result = Renderer::new(&registry)
        .with_fallback_dir(&fallback)
        .render(&request(vec![ScriptEntry::narration("Hello there.")], &locked.join("talk.wav")));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    assert!(result.success, "{:?}", result.error);
    let written = result.output_path.unwrap();
    assert_eq!(written, fallback.join("talk.wav"));
    assert!(written.is_file());
    assert!(!locked.join("talk.wav").exists());
}
