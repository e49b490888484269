//! Dia2 conversational text-to-speech engine.
//!
//! Dia2 renders whole two-person dialogues in one pass. Turns are tagged with a
//! speaker marker, `[S1]` or `[S2]`, and the model picks a consistent voice for
//! each marker:
//!
//! ```text
//! [S1] Welcome to the project. [S2] What does it do? [S1] It turns docs into audio.
//! ```
//!
//! # Runtimes
//!
//! The model runs out of process. On `load()` the engine picks, in order:
//!
//! 1. a `dia2` executable on PATH
//! 2. `uv run -m dia2.cli` inside the Dia2 checkout (`<models_dir>/dia2`)
//!
//! The choice is kept until `unload()`. Long scripts degrade past a couple of
//! thousand characters, so the renderer chunks them; see
//! [`requires_chunking`](crate::AudioEngine::requires_chunking).

mod runtime;

pub use runtime::{CommandRuntime, Dia2Runtime, CHECKPOINT};

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use runtime::RuntimeSource;

use crate::audio;
use crate::{
    AudioEngine, AudioFormat, EngineCapabilities, EngineError, ScriptSegment, SpeakerMarkers,
    SynthesisResult, VoiceInfo, VoiceMap,
};

/// Speaker markers understood by the model, in assignment order.
pub const MARKERS: [&str; 2] = ["S1", "S2"];

/// Prefix of the per-call scratch directories, also used to find stale workers.
pub const TEMP_PREFIX: &str = "hearme-dia2-";

pub struct Dia2Engine {
    source: RuntimeSource,
    runtime: Option<Box<dyn Dia2Runtime>>,
    available: OnceLock<bool>,
}

impl Dia2Engine {
    /// Discover the runtime on PATH or in `project_dir`.
    pub fn new(project_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::from_source(RuntimeSource::Discover {
            project_dir: project_dir.into(),
            timeout,
        })
    }

    /// Use runtimes produced by `factory`, one per load.
    pub fn with_runtime<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Dia2Runtime> + Send + 'static,
    {
        Self::from_source(RuntimeSource::Custom(Box::new(factory)))
    }

    fn from_source(source: RuntimeSource) -> Self {
        Self {
            source,
            runtime: None,
            available: OnceLock::new(),
        }
    }

    /// Build the tagged script for `segments`, updating `markers` in place.
    ///
    /// A voice map entry naming a marker (`"S2"`) pins that speaker to it.
    pub fn tag_script(
        segments: &[ScriptSegment],
        voice_map: Option<&VoiceMap>,
        markers: &mut SpeakerMarkers,
    ) -> String {
        let mut parts = Vec::with_capacity(segments.len());

        for segment in segments {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }

            let pinned = voice_map
                .and_then(|map| map.get(&segment.speaker))
                .and_then(|voice| marker_slot(voice));
            let slot = match pinned {
                Some(slot) => {
                    markers.pin(&segment.speaker, slot);
                    slot
                }
                None => markers.assign(&segment.speaker, MARKERS.len()),
            };

            parts.push(format!("[{}] {}", MARKERS[slot], text));
        }

        parts.join(" ")
    }

    fn generate(&mut self, script: &str) -> SynthesisResult {
        let Some(runtime) = self.runtime.as_mut() else {
            return SynthesisResult::failure(EngineError::NotLoaded.to_string());
        };

        let rendered = (|| -> Result<audio::Pcm16, EngineError> {
            let scratch = tempfile::Builder::new().prefix(TEMP_PREFIX).tempdir()?;
            let output = scratch.path().join("dialogue.wav");
            runtime.generate(script, &output)?;
            Ok(audio::decode_pcm16(&fs::read(&output)?)?)
        })();

        match rendered.and_then(|pcm| Ok((pcm.to_wav()?, pcm.duration_seconds(), pcm.sample_rate))) {
            Ok((wav, duration, sample_rate)) => SynthesisResult::from_audio(wav, duration, sample_rate),
            Err(e) => {
                log::error!("Dia2 synthesis failed: {e}");
                SynthesisResult::failure(e.to_string())
            }
        }
    }
}

fn marker_slot(voice: &str) -> Option<usize> {
    MARKERS
        .iter()
        .position(|marker| marker.eq_ignore_ascii_case(voice.trim_matches(['[', ']'])))
}

impl AudioEngine for Dia2Engine {
    fn name(&self) -> &'static str {
        "dia2"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "dia2".to_string(),
            multi_speaker: true,
            max_speakers: MARKERS.len() as u32,
            supports_streaming: true,
            // Runs on CPU, much faster with CUDA or MPS.
            requires_gpu: false,
            model_size_mb: 2000,
            quality_rating: 4,
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = self.source.probe();
            log::debug!("Dia2 available: {found}");
            found
        })
    }

    fn list_voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo::new("S1", "Speaker 1 (Host)").gender("neutral"),
            VoiceInfo::new("S2", "Speaker 2 (Co-host)").gender("neutral"),
        ]
    }

    fn is_loaded(&self) -> bool {
        self.runtime.is_some()
    }

    fn load(&mut self) -> Result<(), EngineError> {
        if self.runtime.is_some() {
            return Ok(());
        }
        if !self.is_available() {
            return Err(EngineError::Unavailable {
                engine: "dia2",
                hint: "install the dia2 CLI or the Dia2 uv project".to_string(),
            });
        }

        let runtime = self.source.open()?;
        log::info!("Dia2 ready via {}", runtime.describe());
        self.runtime = Some(runtime);
        Ok(())
    }

    fn unload(&mut self) {
        if self.runtime.take().is_some() {
            log::info!("Dia2 runtime released - memory freed");
        }
    }

    fn synthesize(&mut self, text: &str, voice: Option<&str>, _format: AudioFormat) -> SynthesisResult {
        if let Err(e) = self.load() {
            return SynthesisResult::failure(e.to_string());
        }
        let marker = voice.and_then(marker_slot).map_or(MARKERS[0], |slot| MARKERS[slot]);
        self.generate(&format!("[{marker}] {}", text.trim()))
    }

    fn synthesize_multi(
        &mut self,
        segments: &[ScriptSegment],
        voice_map: Option<&VoiceMap>,
        format: AudioFormat,
    ) -> SynthesisResult {
        self.synthesize_conversation(segments, voice_map, &mut SpeakerMarkers::new(), format)
    }

    fn synthesize_conversation(
        &mut self,
        segments: &[ScriptSegment],
        voice_map: Option<&VoiceMap>,
        markers: &mut SpeakerMarkers,
        _format: AudioFormat,
    ) -> SynthesisResult {
        if segments.is_empty() {
            return SynthesisResult::failure("No segments provided");
        }
        if let Err(e) = self.load() {
            return SynthesisResult::failure(e.to_string());
        }

        let script = Self::tag_script(segments, voice_map, markers);
        if script.is_empty() {
            return SynthesisResult::failure("No segments provided");
        }
        self.generate(&script)
    }

    fn requires_chunking(&self) -> bool {
        true
    }
}
