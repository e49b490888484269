//! Piper text-to-speech engine.
//!
//! Runs the `piper` command-line tool once per synthesis call. Piper is tiny and
//! CPU-only, which makes it the last real fallback before the mock engine.
//!
//! # System Requirements
//!
//! - `piper` on PATH (`pip install piper-tts` or a release binary)
//! - Voice models in the voices directory, each an `.onnx` file with its
//!   `.onnx.json` config next to it:
//!
//! ```text
//! ~/.hearme/models/piper/
//! ├── en_US-amy-medium.onnx
//! └── en_US-amy-medium.onnx.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use crate::audio;
use crate::engines::{find_executable, process};
use crate::{AudioEngine, AudioFormat, EngineCapabilities, EngineError, SynthesisResult, VoiceInfo};

pub const DEFAULT_VOICE: &str = "en_US-amy-medium";

/// Sample rate of the medium-quality Piper voices.
pub const SAMPLE_RATE: u32 = 22_050;

/// Prefix of the temporary output files, also used to find stale workers.
pub const TEMP_PREFIX: &str = "hearme-piper-";

pub struct PiperEngine {
    voices_dir: PathBuf,
    timeout: Duration,
    executable: Option<PathBuf>,
    available: OnceLock<bool>,
}

impl PiperEngine {
    pub fn new(voices_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            voices_dir: voices_dir.into(),
            timeout,
            executable: None,
            available: OnceLock::new(),
        }
    }

    fn model_path(&self, voice: &str) -> PathBuf {
        self.voices_dir.join(format!("{voice}.onnx"))
    }

    fn resolve_voice(&self, voice: &str) -> Result<PathBuf, EngineError> {
        // Voice ids become file names; keep them inside the voices directory.
        if voice.is_empty() || voice.contains(['/', '\\']) || voice.contains("..") {
            return Err(EngineError::VoiceNotFound(voice.to_string()));
        }
        let model = self.model_path(voice);
        if !model.is_file() || !config_path(&model).is_file() {
            return Err(EngineError::VoiceNotFound(voice.to_string()));
        }
        Ok(model)
    }

    fn run_piper(&self, executable: &Path, model: &Path, text: &str) -> Result<audio::Pcm16, EngineError> {
        let output = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".wav")
            .tempfile()?;

        let mut command = Command::new(executable);
        command
            .arg("--model")
            .arg(model)
            .arg("--output_file")
            .arg(output.path());
        process::run(&mut command, Some(text), self.timeout)?;

        let wav = fs::read(output.path())?;
        Ok(audio::decode_pcm16(&wav)?)
    }
}

fn config_path(model: &Path) -> PathBuf {
    let mut config = model.as_os_str().to_owned();
    config.push(".json");
    PathBuf::from(config)
}

impl AudioEngine for PiperEngine {
    fn name(&self) -> &'static str {
        "piper"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            name: "piper".to_string(),
            multi_speaker: false,
            max_speakers: 1,
            supports_streaming: false,
            requires_gpu: false,
            model_size_mb: 50,
            quality_rating: 2,
        }
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = find_executable("piper").is_some() && self.model_path(DEFAULT_VOICE).is_file();
            log::debug!("Piper available: {found}");
            found
        })
    }

    fn list_voices(&self) -> Vec<VoiceInfo> {
        vec![
            VoiceInfo::new("en_US-amy-medium", "Amy (US English)").gender("female"),
            VoiceInfo::new("en_US-ryan-medium", "Ryan (US English)").gender("male"),
            VoiceInfo::new("en_GB-alba-medium", "Alba (UK English)").gender("female"),
        ]
    }

    fn is_loaded(&self) -> bool {
        self.executable.is_some()
    }

    fn load(&mut self) -> Result<(), EngineError> {
        if self.executable.is_some() {
            return Ok(());
        }
        if !self.is_available() {
            return Err(EngineError::Unavailable {
                engine: "piper",
                hint: format!(
                    "install piper-tts and place {DEFAULT_VOICE}.onnx in {}",
                    self.voices_dir.display()
                ),
            });
        }

        let executable = find_executable("piper").ok_or_else(|| EngineError::Unavailable {
            engine: "piper",
            hint: "`piper` is no longer on PATH".to_string(),
        })?;
        self.resolve_voice(DEFAULT_VOICE)?;

        log::info!("Piper ready ({})", executable.display());
        self.executable = Some(executable);
        Ok(())
    }

    fn unload(&mut self) {
        if self.executable.take().is_some() {
            log::info!("Piper unloaded");
        }
    }

    fn synthesize(&mut self, text: &str, voice: Option<&str>, _format: AudioFormat) -> SynthesisResult {
        if let Err(e) = self.load() {
            return SynthesisResult::failure(e.to_string());
        }
        let Some(executable) = self.executable.clone() else {
            return SynthesisResult::failure(EngineError::NotLoaded.to_string());
        };

        let model = match voice.map(|voice| self.resolve_voice(voice)) {
            Some(Ok(model)) => Ok(model),
            Some(Err(e)) => {
                log::warn!("{e}, using {DEFAULT_VOICE}");
                self.resolve_voice(DEFAULT_VOICE)
            }
            None => self.resolve_voice(DEFAULT_VOICE),
        };
        let pcm = model.and_then(|model| self.run_piper(&executable, &model, text));

        match pcm.and_then(|pcm| Ok((pcm.to_wav()?, pcm.duration_seconds(), pcm.sample_rate))) {
            Ok((wav, duration, sample_rate)) => SynthesisResult::from_audio(wav, duration, sample_rate),
            Err(e) => {
                log::error!("Piper synthesis failed: {e}");
                SynthesisResult::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_in(dir: &Path) -> PiperEngine {
        PiperEngine::new(dir, Duration::from_secs(60))
    }

    #[test]
    fn starts_unloaded_and_unload_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        engine.unload();
        assert!(!engine.is_loaded());
    }

    #[test]
    fn unavailable_without_voice_models() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_in(dir.path());
        assert!(!engine.is_available());
        assert!(matches!(engine.load(), Err(EngineError::Unavailable { .. })));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn rejects_voice_ids_outside_the_voices_dir() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        assert!(matches!(
            engine.resolve_voice("../secrets"),
            Err(EngineError::VoiceNotFound(_))
        ));
    }

    #[test]
    fn voice_requires_model_and_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("en_US-ryan-medium.onnx"), b"onnx").unwrap();
        let engine = engine_in(dir.path());
        assert!(engine.resolve_voice("en_US-ryan-medium").is_err());

        fs::write(dir.path().join("en_US-ryan-medium.onnx.json"), b"{}").unwrap();
        assert!(engine.resolve_voice("en_US-ryan-medium").is_ok());
    }

    #[test]
    fn synthesizes_with_installed_piper() {
        let Some(voices) = dirs::home_dir().map(|h| h.join(".hearme/models/piper")) else {
            return;
        };
        let mut engine = engine_in(&voices);
        if !engine.is_available() {
            return;
        }

        let result = engine.synthesize("Hello from Piper.", None, AudioFormat::Wav);
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.sample_rate, SAMPLE_RATE);
        engine.unload();
    }
}
