//! Placeholder engine for development and tests.
//!
//! Produces silent audio whose length follows a 150 words-per-minute reading
//! pace, without any TTS dependency.

use crate::{audio, AudioEngine, AudioFormat, EngineCapabilities, EngineError, SynthesisResult, VoiceInfo};

/// Output sample rate of the mock engine.
pub const SAMPLE_RATE: u32 = 24_000;

const WORDS_PER_MINUTE: f64 = 150.0;
const MIN_DURATION_SECS: f64 = 0.5;

/// Reading time for `text` at 150 words per minute, never below half a second.
pub fn estimate_duration(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words / WORDS_PER_MINUTE * 60.0).max(MIN_DURATION_SECS)
}

/// Silent audio engine. Always available.
#[derive(Debug, Default)]
pub struct MockEngine {
    loaded: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "mock".to_string(),
            multi_speaker: true,
            max_speakers: 10,
            supports_streaming: false,
            requires_gpu: false,
            model_size_mb: 0,
            quality_rating: 1,
        }
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo::new("narrator", "Mock Narrator").gender("neutral"),
            VoiceInfo::new("host", "Mock Host").gender("neutral"),
            VoiceInfo::new("expert", "Mock Expert").gender("neutral"),
        ]
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn load(&mut self) -> Result<(), EngineError> {
        self.loaded = true;
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = false;
    }

    fn synthesize(&mut self, text: &str, _voice: Option<&str>, _format: AudioFormat) -> SynthesisResult {
        if let Err(e) = self.load() {
            return SynthesisResult::failure(e.to_string());
        }

        let duration = estimate_duration(text);
        match audio::silence(duration, SAMPLE_RATE) {
            Ok(wav) => SynthesisResult::from_audio(wav, duration, SAMPLE_RATE),
            Err(e) => SynthesisResult::failure(format!("Mock synthesis failed: {e}")),
        }
    }
}
