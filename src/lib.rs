//! # hearme
//!
//! Render agent-written documentation scripts into spoken audio through a set of
//! interchangeable text-to-speech engines.
//!
//! ## Features
//!
//! - **Engine abstraction**: one [`AudioEngine`] contract over a deterministic mock,
//!   the Kokoro ONNX model, the Dia2 two-speaker model and the Piper CLI
//! - **Lifecycle discipline**: engines stay unloaded until a render needs them and
//!   are unloaded again on every exit path
//! - **Fallback selection**: a priority-ordered [`EngineRegistry`] picks the best
//!   engine that can actually run on this machine
//! - **Long-form rendering**: long scripts are chunked for engines with limited
//!   input length, keeping each speaker on the same voice across chunks
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! hearme = { version = "0.1", features = ["kokoro"] }
//! ```
//!
//! ```no_run
//! use hearme::{config::HearmeConfig, registry::EngineRegistry, renderer::Renderer};
//! use hearme::renderer::RenderRequestBuilder;
//! use hearme::script::ScriptEntry;
//!
//! let config = HearmeConfig::default();
//! let registry = EngineRegistry::with_default_engines(&config);
//! let renderer = Renderer::from_config(&registry, &config);
//!
//! let request = RenderRequestBuilder::default()
//!     .script(vec![
//!         ScriptEntry::new("host", "Welcome to the project."),
//!         ScriptEntry::new("guest", "What does it do?"),
//!     ])
//!     .output_path("out/overview.wav")
//!     .build()?;
//!
//! let result = renderer.render(&request);
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod cleanup;
pub mod config;
pub mod engines;
pub mod error;
pub mod output;
pub mod registry;
pub mod renderer;
pub mod script;
pub mod tools;
pub mod troubleshoot;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use engines::markers::SpeakerMarkers;
pub use error::{EngineError, RenderError};
pub use registry::{EngineHandle, EngineRegistry, SharedEngine};
pub use renderer::{RenderRequest, RenderResult, Renderer};
pub use script::{ScriptEntry, ScriptSegment};

/// Speaker label to voice id mapping supplied by the caller.
pub type VoiceMap = HashMap<String, String>;

/// Container format of synthesized audio.
///
/// Engines always produce WAV today; `mp3` is accepted on input and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of what an engine can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineCapabilities {
    pub name: String,
    pub multi_speaker: bool,
    /// Maximum number of distinct speaker tags in one synthesis call.
    pub max_speakers: u32,
    pub supports_streaming: bool,
    pub requires_gpu: bool,
    /// Approximate resident size of the model once loaded.
    pub model_size_mb: u32,
    /// 1 (placeholder) to 5 (studio quality).
    pub quality_rating: u8,
}

/// A voice offered by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl VoiceInfo {
    /// An English voice without gender or style tags.
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            language: "en".to_string(),
            gender: None,
            style: None,
        }
    }

    pub fn gender(mut self, gender: &str) -> Self {
        self.gender = Some(gender.to_string());
        self
    }

    pub fn style(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }
}

/// One synthesized speaker turn.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSegment {
    pub speaker: String,
    pub text: String,
    /// Complete WAV container for this turn.
    pub audio_data: Vec<u8>,
    pub duration_seconds: f64,
    pub sample_rate: u32,
}

/// The outcome of a synthesis call.
///
/// Engines report failures through this type instead of returning `Err`, so a
/// caller can always inspect `error` and decide whether to retry elsewhere. A
/// successful result carries either a combined buffer or per-speaker segments.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub success: bool,
    pub audio_data: Option<Vec<u8>>,
    pub duration_seconds: f64,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub segments: Vec<SynthesisSegment>,
    pub error: Option<String>,
}

impl SynthesisResult {
    /// A result holding one combined WAV buffer.
    pub fn from_audio(audio_data: Vec<u8>, duration_seconds: f64, sample_rate: u32) -> Self {
        if audio_data.is_empty() {
            return Self::failure("Engine produced no audio");
        }
        Self {
            success: true,
            audio_data: Some(audio_data),
            duration_seconds,
            format: AudioFormat::Wav,
            sample_rate,
            segments: Vec::new(),
            error: None,
        }
    }

    /// A result holding per-speaker segments. Duration is the sum of the segments.
    pub fn from_segments(segments: Vec<SynthesisSegment>) -> Self {
        let Some(first) = segments.first() else {
            return Self::failure("Engine produced no audio");
        };
        let sample_rate = first.sample_rate;
        let duration_seconds = segments.iter().map(|s| s.duration_seconds).sum();
        Self {
            success: true,
            audio_data: None,
            duration_seconds,
            format: AudioFormat::Wav,
            sample_rate,
            segments,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            audio_data: None,
            duration_seconds: 0.0,
            format: AudioFormat::Wav,
            sample_rate: 0,
            segments: Vec::new(),
            error: Some(error.into()),
        }
    }
}

pub(crate) fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn serialize_2dp<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_2dp(*value))
}

/// Common interface for text-to-speech engines.
///
/// Engines start unloaded. `load()` brings the heavyweight resource (model
/// weights, a validated runtime binary) into memory and `unload()` releases it.
/// Both are idempotent. Synthesis methods load on demand so an engine can be used
/// on its own, outside a [`Renderer`].
///
/// Engines are not internally synchronized: the registry wraps each instance in
/// an [`EngineHandle`] whose lock serializes callers.
pub trait AudioEngine: Send {
    /// Stable identifier, used as the registry key.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> EngineCapabilities;

    /// Whether the engine can run at all on this machine.
    ///
    /// Never loads the model. Implementations memoize the probe because
    /// installation state does not change while the process runs.
    fn is_available(&self) -> bool;

    /// Static voice catalogue. Does not require the model.
    fn list_voices(&self) -> Vec<VoiceInfo>;

    fn is_loaded(&self) -> bool;

    /// Bring the model into memory. A no-op when already loaded.
    ///
    /// Fails with [`EngineError::Unavailable`] when `is_available()` is false.
    fn load(&mut self) -> Result<(), EngineError>;

    /// Release the model. A no-op when not loaded, and never fails: problems are
    /// logged and the engine is left unloaded regardless.
    fn unload(&mut self);

    /// Synthesize one chunk of single-speaker speech.
    fn synthesize(&mut self, text: &str, voice: Option<&str>, format: AudioFormat)
        -> SynthesisResult;

    /// Synthesize several speaker turns.
    ///
    /// The default synthesizes every turn on its own through [`synthesize`] and
    /// returns them as segments. It aborts on the first failing turn without
    /// returning any partial audio.
    ///
    /// [`synthesize`]: AudioEngine::synthesize
    fn synthesize_multi(
        &mut self,
        segments: &[ScriptSegment],
        voice_map: Option<&VoiceMap>,
        format: AudioFormat,
    ) -> SynthesisResult {
        if segments.is_empty() {
            return SynthesisResult::failure("No segments provided");
        }

        let mut produced = Vec::with_capacity(segments.len());
        for segment in segments {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }

            let voice = voice_map.and_then(|map| map.get(&segment.speaker));
            let result = self.synthesize(text, voice.map(String::as_str), format);
            if !result.success {
                return SynthesisResult::failure(format!(
                    "Failed to synthesize segment for {}: {}",
                    segment.speaker,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }

            let Some(audio_data) = result.audio_data else {
                return SynthesisResult::failure(format!(
                    "Failed to synthesize segment for {}: engine returned no audio",
                    segment.speaker
                ));
            };
            produced.push(SynthesisSegment {
                speaker: segment.speaker.clone(),
                text: text.to_string(),
                audio_data,
                duration_seconds: result.duration_seconds,
                sample_rate: result.sample_rate,
            });
        }

        SynthesisResult::from_segments(produced)
    }

    /// Synthesize turns using caller-owned speaker marker assignments.
    ///
    /// Native multi-speaker engines override this so that a speaker keeps the same
    /// marker across every chunk of one render. Everyone else ignores `markers`.
    fn synthesize_conversation(
        &mut self,
        segments: &[ScriptSegment],
        voice_map: Option<&VoiceMap>,
        markers: &mut SpeakerMarkers,
        format: AudioFormat,
    ) -> SynthesisResult {
        let _ = markers;
        self.synthesize_multi(segments, voice_map, format)
    }

    /// Whether long scripts must be split before synthesis.
    fn requires_chunking(&self) -> bool {
        false
    }
}
