//! Script-to-file rendering.
//!
//! A render runs these steps in order:
//!
//! 1. parse the raw script and drop blank turns
//! 2. validate it (non-empty, at most 100,000 characters)
//! 3. pick an engine: the requested one, else the configured default, else the
//!    best available
//! 4. load the engine under a [`ScopedLoad`] guard
//! 5. synthesize, in chunks when the engine asks for it
//! 6. splice the audio into one WAV and write it atomically
//! 7. unload the engine (the guard does this on every path, panics included)
//!
//! Failures never escape as `Err`; they come back as a [`RenderResult`] with
//! `success == false`.

use std::any::Any;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::Serialize;

use crate::audio;
use crate::config::HearmeConfig;
use crate::engines::ScopedLoad;
use crate::error::RenderError;
use crate::registry::{EngineHandle, EngineRegistry, SharedEngine};
use crate::script::{self, ScriptEntry, ScriptSegment};
use crate::{AudioEngine, AudioFormat, SpeakerMarkers, SynthesisResult, SynthesisSegment, VoiceMap};

/// Per-chunk character limit used when the config does not set one.
pub const DEFAULT_CHUNK_CHARS: usize = 2000;

pub const DEFAULT_OUTPUT_PATH: &str = ".hearme/hearme.audio.wav";

const DEFAULT_FILE_NAME: &str = "hearme.audio.wav";

/// What to render and where to put it.
///
/// ```
/// use hearme::renderer::RenderRequestBuilder;
/// use hearme::ScriptEntry;
///
/// let request = RenderRequestBuilder::default()
///     .script(vec![ScriptEntry::narration("Hello.")])
///     .output_path("/tmp/hello.wav")
///     .engine("mock")
///     .build()
///     .unwrap();
/// assert_eq!(request.engine.as_deref(), Some("mock"));
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct RenderRequest {
    pub script: Vec<ScriptEntry>,
    #[builder(default = "PathBuf::from(DEFAULT_OUTPUT_PATH)")]
    pub output_path: PathBuf,
    #[builder(default, setter(into, strip_option))]
    pub voice_map: Option<VoiceMap>,
    /// Engine to use. Unset means the renderer's default.
    #[builder(default, setter(into, strip_option))]
    pub engine: Option<String>,
    /// Requested container. Output is always WAV today.
    #[builder(default)]
    pub format: AudioFormat,
}

/// Outcome of one render, ready to be serialized for the calling tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderResult {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    #[serde(serialize_with = "crate::serialize_2dp")]
    pub duration_seconds: f64,
    /// Number of parsed script turns.
    pub segment_count: usize,
    /// The engine that was used or attempted.
    pub engine_used: Option<String>,
    pub format: AudioFormat,
    pub error: Option<String>,
}

impl RenderResult {
    fn failure(error: &RenderError, engine_used: Option<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            duration_seconds: 0.0,
            segment_count: 0,
            engine_used,
            format: AudioFormat::Wav,
            error: Some(error.to_string()),
        }
    }
}

struct Rendered {
    path: PathBuf,
    duration_seconds: f64,
}

/// Turns scripts into audio files using engines from a registry.
pub struct Renderer<'r> {
    registry: &'r EngineRegistry,
    chunk_chars: usize,
    default_engine: Option<String>,
    fallback_dir: Option<PathBuf>,
}

impl<'r> Renderer<'r> {
    pub fn new(registry: &'r EngineRegistry) -> Self {
        Self {
            registry,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            default_engine: None,
            fallback_dir: None,
        }
    }

    /// A renderer using the configured default engine and chunk size.
    pub fn from_config(registry: &'r EngineRegistry, config: &HearmeConfig) -> Self {
        let mut renderer = Self::new(registry).with_chunk_chars(config.audio.chunk_chars);
        renderer.default_engine = config.audio.engine.clone();
        renderer
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    /// Engine used when a request does not name one. Falls back to the best
    /// available engine if it cannot run.
    pub fn with_default_engine(mut self, engine: impl Into<String>) -> Self {
        self.default_engine = Some(engine.into());
        self
    }

    /// Directory used when the requested output location is not writable.
    ///
    /// Defaults to `~/.hearme/output`.
    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    pub fn render(&self, request: &RenderRequest) -> RenderResult {
        let segments = script::parse_script(&request.script);
        if let Err(e) = script::validate_script(&segments) {
            log::warn!("Rejected script: {e}");
            return RenderResult::failure(&e, None);
        }

        let handle = match self.acquire(request.engine.as_deref()) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("{e}");
                return RenderResult::failure(&e, None);
            }
        };
        let engine_used = handle.name().to_string();
        if request.format != AudioFormat::Wav {
            log::debug!("Requested {} output, writing wav", request.format);
        }

        match self.render_with(&handle, &segments, request) {
            Ok(rendered) => RenderResult {
                success: true,
                output_path: Some(rendered.path),
                duration_seconds: rendered.duration_seconds,
                segment_count: segments.len(),
                engine_used: Some(engine_used),
                format: AudioFormat::Wav,
                error: None,
            },
            Err(e) => {
                log::error!("Render with {engine_used} failed: {e}");
                RenderResult::failure(&e, Some(engine_used))
            }
        }
    }

    fn acquire(&self, requested: Option<&str>) -> Result<SharedEngine, RenderError> {
        if let Some(name) = requested {
            let handle = self.registry.get(name).ok_or_else(|| RenderError::NoEngine {
                requested: Some(name.to_string()),
            })?;
            if !handle.is_available() {
                return Err(RenderError::EngineUnavailable(handle.name().to_string()));
            }
            return Ok(handle);
        }

        if let Some(name) = self.default_engine.as_deref() {
            match self.registry.get(name) {
                Some(handle) if handle.is_available() => return Ok(handle),
                _ => log::warn!("Default engine {name} is not available, trying others"),
            }
        }

        self.registry
            .get_best_available()
            .ok_or(RenderError::NoEngine { requested: None })
    }

    fn render_with(
        &self,
        handle: &EngineHandle,
        segments: &[ScriptSegment],
        request: &RenderRequest,
    ) -> Result<Rendered, RenderError> {
        let mut engine = handle.lock();
        let mut scope = ScopedLoad::enter(&mut **engine).map_err(RenderError::Load)?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Rendered, RenderError> {
            let result = self.synthesize(&mut *scope, segments, request)?;
            let duration_seconds = result.duration_seconds;
            let wav = assemble(result)?;
            let path = self.write_output(&request.output_path, &wav)?;
            Ok(Rendered {
                path,
                duration_seconds,
            })
        }));
        drop(scope);

        outcome.unwrap_or_else(|payload| Err(RenderError::Panicked(panic_message(payload.as_ref()))))
    }

    fn synthesize(
        &self,
        engine: &mut dyn AudioEngine,
        segments: &[ScriptSegment],
        request: &RenderRequest,
    ) -> Result<SynthesisResult, RenderError> {
        let voice_map = request.voice_map.as_ref();
        let total = script::total_chars(segments);

        if !engine.requires_chunking() || total <= self.chunk_chars {
            return checked(engine.synthesize_multi(segments, voice_map, request.format));
        }

        let chunks = script::chunk_segments(segments, self.chunk_chars);
        log::info!(
            "Script is {total} chars, rendering {} chunks of at most {}",
            chunks.len(),
            self.chunk_chars
        );

        // One marker table per render keeps each speaker on the same voice in every chunk.
        let mut markers = SpeakerMarkers::new();
        let mut produced = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            log::debug!("Rendering chunk {}/{}", index + 1, chunks.len());
            let result = checked(engine.synthesize_conversation(
                chunk,
                voice_map,
                &mut markers,
                request.format,
            ))?;

            if !result.segments.is_empty() {
                produced.extend(result.segments);
                continue;
            }
            let Some(audio_data) = result.audio_data else {
                return Err(RenderError::Synthesis(format!(
                    "Chunk {} produced no audio",
                    index + 1
                )));
            };
            produced.push(SynthesisSegment {
                speaker: format!("chunk-{}", index + 1),
                text: chunk
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                audio_data,
                duration_seconds: result.duration_seconds,
                sample_rate: result.sample_rate,
            });
        }

        checked(SynthesisResult::from_segments(produced))
    }

    fn write_output(&self, requested: &Path, wav: &[u8]) -> Result<PathBuf, RenderError> {
        let target = absolutize(requested)?;
        match write_atomic(&target, wav) {
            Ok(()) => {
                log::info!("Wrote {} bytes to {}", wav.len(), target.display());
                Ok(target)
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                let file_name = target
                    .file_name()
                    .map_or_else(|| DEFAULT_FILE_NAME.into(), |name| name.to_os_string());
                let fallback = self.fallback_dir().join(file_name);
                log::warn!(
                    "Cannot write {} ({e}), using {} instead",
                    target.display(),
                    fallback.display()
                );
                write_atomic(&fallback, wav)?;
                log::info!("Wrote {} bytes to {}", wav.len(), fallback.display());
                Ok(fallback)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn fallback_dir(&self) -> PathBuf {
        self.fallback_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".hearme").join("output")))
            .unwrap_or_else(|| env::temp_dir().join("hearme"))
    }
}

fn checked(result: SynthesisResult) -> Result<SynthesisResult, RenderError> {
    if result.success {
        return Ok(result);
    }
    Err(RenderError::Synthesis(
        result
            .error
            .unwrap_or_else(|| "Synthesis failed".to_string()),
    ))
}

/// One WAV buffer from a successful result.
fn assemble(result: SynthesisResult) -> Result<Vec<u8>, RenderError> {
    if !result.segments.is_empty() {
        return Ok(audio::concatenate_wav(&result.segments, result.sample_rate)?);
    }
    result
        .audio_data
        .ok_or_else(|| RenderError::Synthesis("Engine returned no audio".to_string()))
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(env::current_dir()?.join(path))
}

/// Write `bytes` next to `target` and rename into place, so a failed render never
/// leaves a truncated file behind.
fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(bytes)?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}
