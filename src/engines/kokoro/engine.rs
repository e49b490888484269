use std::path::PathBuf;
use std::sync::OnceLock;

use super::model::{locate_model, KokoroModel, SAMPLE_RATE, VOICES_FILE};
use crate::engines::find_executable;
use crate::{audio, AudioEngine, AudioFormat, EngineCapabilities, EngineError, SynthesisResult, VoiceInfo};

pub const DEFAULT_VOICE: &str = "af_heart";

/// Kokoro-82M over ONNX Runtime. Single speaker per call, 24 kHz output.
///
/// ```rust,no_run
/// use hearme::AudioEngine;
/// use hearme::engines::kokoro::KokoroEngine;
///
/// let mut engine = KokoroEngine::new("models/kokoro").with_speed(0.9);
/// engine.load()?;
/// let result = engine.synthesize("Hello from Emma.", Some("bf_emma"), Default::default());
/// assert!(result.success);
/// # Ok::<(), hearme::EngineError>(())
/// ```
pub struct KokoroEngine {
    model_dir: PathBuf,
    speed: f32,
    model: Option<KokoroModel>,
    available: OnceLock<bool>,
}

impl KokoroEngine {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            speed: 1.0,
            model: None,
            available: OnceLock::new(),
        }
    }

    /// Speech rate multiplier, clamped to 0.5..=2.0.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.clamp(0.5, 2.0);
        self
    }

    fn resolve_voice<'v>(model: &KokoroModel, voice: Option<&'v str>) -> &'v str {
        match voice {
            Some(voice) if model.has_voice(voice) => voice,
            Some(voice) => {
                log::warn!("Kokoro has no voice '{voice}', using {DEFAULT_VOICE}");
                DEFAULT_VOICE
            }
            None => DEFAULT_VOICE,
        }
    }
}

impl AudioEngine for KokoroEngine {
    fn name(&self) -> &'static str {
        "kokoro"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "kokoro".to_string(),
            multi_speaker: false,
            max_speakers: 1,
            supports_streaming: false,
            requires_gpu: false,
            model_size_mb: 300,
            quality_rating: 3,
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = locate_model(&self.model_dir).is_ok()
                && self.model_dir.join(VOICES_FILE).is_file()
                && find_executable("espeak-ng").is_some();
            log::debug!("Kokoro available: {found}");
            found
        })
    }

    fn list_voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo::new("af_heart", "Heart (American)").gender("female"),
            VoiceInfo::new("am_michael", "Michael (American)").gender("male"),
            VoiceInfo::new("bf_emma", "Emma (British)").gender("female"),
            VoiceInfo::new("bm_george", "George (British)").gender("male"),
        ]
    }

    fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn load(&mut self) -> Result<(), EngineError> {
        if self.model.is_some() {
            return Ok(());
        }
        if !self.is_available() {
            return Err(EngineError::Unavailable {
                engine: "kokoro",
                hint: format!(
                    "install espeak-ng and place the model and {VOICES_FILE} in {}",
                    self.model_dir.display()
                ),
            });
        }

        self.model = Some(KokoroModel::load(&self.model_dir)?);
        Ok(())
    }

    fn unload(&mut self) {
        if self.model.take().is_some() {
            log::info!("Unloaded Kokoro model");
        }
    }

    fn synthesize(&mut self, text: &str, voice: Option<&str>, _format: AudioFormat) -> SynthesisResult {
        if let Err(e) = self.load() {
            return SynthesisResult::failure(e.to_string());
        }
        let Some(model) = self.model.as_mut() else {
            return SynthesisResult::failure(EngineError::NotLoaded.to_string());
        };

        let voice = Self::resolve_voice(model, voice);
        let samples = match model.synthesize(text, voice, self.speed) {
            Ok(samples) => samples,
            Err(e) => return SynthesisResult::failure(EngineError::from(e).to_string()),
        };
        if samples.is_empty() {
            return SynthesisResult::failure("Kokoro produced no audio");
        }

        match audio::encode_f32(&samples, SAMPLE_RATE) {
            Ok(wav) => SynthesisResult::from_audio(
                wav,
                samples.len() as f64 / f64::from(SAMPLE_RATE),
                SAMPLE_RATE,
            ),
            Err(e) => SynthesisResult::failure(EngineError::from(e).to_string()),
        }
    }
}
