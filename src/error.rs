/// Errors raised inside an engine.
///
/// Only `load()` surfaces these directly; synthesis folds them into a failed
/// [`SynthesisResult`](crate::SynthesisResult).
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Engine '{engine}' is not available: {hint}")]
    Unavailable { engine: &'static str, hint: String },
    #[error("Model not loaded. Call load() first.")]
    NotLoaded,
    #[error("Voice '{0}' not found. Call list_voices() to see available voices.")]
    VoiceNotFound(String),
    #[error("{0}")]
    Process(String),
    #[error("Audio error: {0}")]
    Audio(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model error: {0}")]
    Model(String),
}

/// Errors that end a render.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Script is empty")]
    EmptyScript,
    #[error("Script too long ({chars} chars). Maximum is 100,000.")]
    ScriptTooLong { chars: usize },
    #[error("{}", no_engine_message(.requested))]
    NoEngine { requested: Option<String> },
    #[error("Engine '{0}' is not available")]
    EngineUnavailable(String),
    #[error("Failed to load engine: {0}")]
    Load(#[source] EngineError),
    #[error("{0}")]
    Synthesis(String),
    #[error("Failed to assemble audio: {0}")]
    Audio(#[from] hound::Error),
    #[error("Failed to write audio: {0}")]
    Io(#[from] std::io::Error),
    #[error("Render failed: internal error: {0}")]
    Panicked(String),
}

fn no_engine_message(requested: &Option<String>) -> String {
    match requested {
        Some(name) => format!("No audio engine available (requested '{name}')"),
        None => "No audio engine available. Install an engine such as kokoro, piper or dia2"
            .to_string(),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
