use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::phonemizer::{espeak_language, Phonemizer};
use super::voices::{VoicePack, STYLE_DIM};
use super::vocab;
use crate::EngineError;

/// Output sample rate of Kokoro-82M.
pub const SAMPLE_RATE: u32 = 24_000;

/// Longest token window the model accepts, excluding the two pad tokens.
pub const MAX_TOKENS: usize = 510;

/// Preferred model file; any other `.onnx` in the directory is the fallback.
pub const MODEL_FILE: &str = "kokoro-quant-convinteger.onnx";
pub const VOICES_FILE: &str = "voices-v1.0.bin";
pub const CONFIG_FILE: &str = "config.json";

/// 10 ms at 24 kHz.
const WINDOW_CROSSFADE: usize = 240;

/// Token ids of `; : , . ! ?` in the Kokoro vocabulary, preferred window breaks.
const BREAK_TOKENS: [i64; 6] = [1, 2, 3, 4, 5, 6];

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    Phonemizer(String),
    #[error("Voice '{0}' not found. Call list_voices() to see available voices.")]
    VoiceNotFound(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("Invalid {CONFIG_FILE}: {0}")]
    Config(String),
    #[error("No .onnx model in {}", .0.display())]
    ModelMissing(PathBuf),
}

impl From<KokoroError> for EngineError {
    fn from(err: KokoroError) -> Self {
        match err {
            KokoroError::VoiceNotFound(voice) => EngineError::VoiceNotFound(voice),
            KokoroError::Io(e) => EngineError::Io(e),
            other => EngineError::Model(other.to_string()),
        }
    }
}

/// Names of the graph inputs, which differ between Kokoro exports.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InputLayout {
    /// `input_ids` or `tokens`.
    tokens: String,
    /// Whether `speed` is int32 rather than float32.
    integer_speed: bool,
}

impl InputLayout {
    fn detect(session: &Session) -> Self {
        let mut layout = Self {
            tokens: "input_ids".to_string(),
            integer_speed: true,
        };
        for input in session.inputs() {
            match input.name() {
                "input_ids" | "tokens" => layout.tokens = input.name().to_string(),
                "speed" => {
                    let dtype = format!("{:?}", input.dtype()).to_lowercase();
                    layout.integer_speed = dtype.contains("int32");
                }
                _ => {}
            }
        }
        layout
    }
}

/// A loaded Kokoro session with its voices and vocabulary.
pub struct KokoroModel {
    session: Session,
    layout: InputLayout,
    voices: VoicePack,
    phonemizer: Phonemizer,
}

impl KokoroModel {
    /// Load the model, voice pack and vocabulary from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, KokoroError> {
        let onnx = locate_model(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_parallel_execution(true)?
            .commit_from_file(&onnx)?;
        let layout = InputLayout::detect(&session);
        log::debug!("Kokoro inputs: {layout:?}");

        let voices = VoicePack::load(&model_dir.join(VOICES_FILE))?;

        let config = model_dir.join(CONFIG_FILE);
        let vocab = if config.is_file() {
            vocab::from_config(&config)?
        } else {
            log::debug!("{CONFIG_FILE} not found, using built-in vocabulary");
            vocab::builtin()
        };

        Ok(Self {
            session,
            layout,
            voices,
            phonemizer: Phonemizer::new(vocab),
        })
    }

    pub fn has_voice(&self, voice: &str) -> bool {
        self.voices.contains(voice)
    }

    /// Speak `text` with `voice`, returning float samples at [`SAMPLE_RATE`].
    pub fn synthesize(&mut self, text: &str, voice: &str, speed: f32) -> Result<Vec<f32>, KokoroError> {
        let tokens = self.phonemizer.tokens(text, espeak_language(voice))?;
        if tokens.is_empty() {
            log::warn!("No phoneme tokens for {text:?}");
            return Ok(Vec::new());
        }

        // One style for every window keeps prosody steady across window boundaries.
        let style = self.voices.style(voice, tokens.len())?;

        let mut samples: Vec<f32> = Vec::with_capacity(tokens.len() * 300);
        for window in token_windows(&tokens, MAX_TOKENS) {
            let audio = self.infer(window, &style, speed)?;
            crossfade_into(&mut samples, &audio, WINDOW_CROSSFADE);
        }
        Ok(samples)
    }

    fn infer(&mut self, tokens: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, KokoroError> {
        // The model expects the sequence wrapped in pad tokens: [0, t1..tN, 0].
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style = ArrayView2::from_shape((1, STYLE_DIM), style)?;

        let outputs = if self.layout.integer_speed {
            let speed = ndarray::arr1(&[speed as i32]);
            self.session.run(inputs![
                self.layout.tokens.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        } else {
            let speed = ndarray::arr1(&[speed]);
            self.session.run(inputs![
                self.layout.tokens.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        };

        let (_, waveform) = outputs
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("Kokoro returned no outputs")))?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }
}

/// The preferred model file, else the first `.onnx` in `model_dir`.
pub fn locate_model(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    let preferred = model_dir.join(MODEL_FILE);
    if preferred.is_file() {
        return Ok(preferred);
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(model_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "onnx"))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| KokoroError::ModelMissing(model_dir.to_path_buf()))
}

/// Split `tokens` into windows of at most `limit`, breaking after punctuation
/// where possible.
fn token_windows(tokens: &[i64], limit: usize) -> Vec<&[i64]> {
    let mut windows = Vec::new();
    let mut rest = tokens;

    while rest.len() > limit {
        let cut = rest[..limit]
            .iter()
            .rposition(|id| BREAK_TOKENS.contains(id))
            .map_or(limit, |i| i + 1);
        let (head, tail) = rest.split_at(cut);
        windows.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        windows.push(rest);
    }
    windows
}

/// Append `next` to `samples`, blending the first `overlap` samples linearly.
fn crossfade_into(samples: &mut Vec<f32>, next: &[f32], overlap: usize) {
    let overlap = overlap.min(samples.len()).min(next.len());
    let start = samples.len() - overlap;
    for (i, (out, incoming)) in samples[start..].iter_mut().zip(next).enumerate() {
        let t = (i + 1) as f32 / (overlap + 1) as f32;
        *out = *out * (1.0 - t) + incoming * t;
    }
    samples.extend_from_slice(&next[overlap..]);
}
