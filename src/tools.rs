//! JSON tool surface for an outer protocol layer.
//!
//! Every operation takes and returns `serde_json::Value`s, and failures come
//! back as `{"success": false, "error": "..."}` rather than as `Err`.
//!
//! ```
//! use std::sync::Arc;
//! use hearme::{config::HearmeConfig, registry::EngineRegistry, tools::HearmeTools};
//!
//! let tools = HearmeTools::new(Arc::new(EngineRegistry::new()), HearmeConfig::default());
//! let status = tools.call("resource_status", serde_json::json!({}));
//! assert_eq!(status["status"], "clean");
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::HearmeConfig;
use crate::output::{self, RenderOutputs};
use crate::registry::EngineRegistry;
use crate::renderer::{RenderRequest, Renderer, DEFAULT_OUTPUT_PATH};
use crate::{cleanup, troubleshoot, AudioFormat, ScriptEntry, VoiceMap};

pub const TOOL_NAMES: [&str; 6] = [
    "render_audio",
    "cleanup_resources",
    "resource_status",
    "kill_stale_processes",
    "list_engines",
    "troubleshoot",
];

/// Arguments of `render_audio`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RenderAudioArgs {
    pub script: Vec<ScriptEntry>,
    /// Unset (or the default path) means `<root>/.hearme/hearme.audio.wav`.
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub voice_map: Option<VoiceMap>,
    #[serde(default)]
    pub engine: Option<String>,
    /// Save the script and a manifest next to the audio.
    #[serde(default = "default_persist")]
    pub persist: bool,
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default)]
    pub documents_used: Vec<String>,
}

fn default_persist() -> bool {
    true
}

fn default_root() -> String {
    ".".to_string()
}

impl RenderAudioArgs {
    pub fn new(script: Vec<ScriptEntry>) -> Self {
        Self {
            script,
            output_path: None,
            voice_map: None,
            engine: None,
            persist: default_persist(),
            root: default_root(),
            format: AudioFormat::default(),
            documents_used: Vec::new(),
        }
    }
}

/// The process-wide registry and config, with one method per tool.
pub struct HearmeTools {
    registry: Arc<EngineRegistry>,
    config: HearmeConfig,
}

impl HearmeTools {
    pub fn new(registry: Arc<EngineRegistry>, config: HearmeConfig) -> Self {
        Self { registry, config }
    }

    /// Load the config from disk and register the default engines.
    pub fn from_config() -> Self {
        let config = crate::config::load_config();
        let registry = Arc::new(EngineRegistry::with_default_engines(&config));
        Self::new(registry, config)
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HearmeConfig {
        &self.config
    }

    /// Dispatch a tool call by name.
    pub fn call(&self, tool: &str, args: Value) -> Value {
        match tool {
            "render_audio" => match serde_json::from_value::<RenderAudioArgs>(args) {
                Ok(args) => self.render_audio(&args),
                Err(e) => error_value(format!("Invalid arguments for render_audio: {e}")),
            },
            "cleanup_resources" => self.cleanup_resources(),
            "resource_status" => self.resource_status(),
            "kill_stale_processes" => self.kill_stale_processes(),
            "list_engines" => self.list_engines(),
            "troubleshoot" => self.troubleshoot(),
            _ => error_value(format!("Unknown tool: {tool}")),
        }
    }

    pub fn render_audio(&self, args: &RenderAudioArgs) -> Value {
        let root = PathBuf::from(&args.root);
        let output_dir = output::hearme_dir(&root, &self.config.output.dir);
        let output_path = match args.output_path.as_deref() {
            Some(path) if path != DEFAULT_OUTPUT_PATH => PathBuf::from(path),
            _ => match output::default_output_path(&output_dir) {
                Ok(path) => path,
                Err(e) => return error_value(format!("Cannot create output directory: {e}")),
            },
        };

        let request = RenderRequest {
            script: args.script.clone(),
            output_path,
            voice_map: args.voice_map.clone(),
            engine: args.engine.clone(),
            format: args.format,
        };
        let result = Renderer::from_config(&self.registry, &self.config).render(&request);

        let mut value = to_json(&result);
        if result.success && args.persist {
            let persisted = output::persist_outputs(
                &RenderOutputs {
                    audio_path: result.output_path.as_deref(),
                    script: &args.script,
                    duration_seconds: result.duration_seconds,
                    engine_used: result.engine_used.as_deref(),
                    documents_used: &args.documents_used,
                },
                &output_dir,
            );
            merge(&mut value, to_json(&persisted));
        }
        value
    }

    pub fn cleanup_resources(&self) -> Value {
        to_json(&cleanup::cleanup_resources(&self.registry))
    }

    pub fn resource_status(&self) -> Value {
        to_json(&cleanup::resource_status(&self.registry))
    }

    pub fn kill_stale_processes(&self) -> Value {
        to_json(&cleanup::kill_stale_processes())
    }

    /// Every registered engine with its capabilities, availability and voices.
    pub fn list_engines(&self) -> Value {
        let engines: Vec<Value> = self
            .registry
            .registered()
            .iter()
            .filter_map(|name| self.registry.get(name))
            .map(|handle| {
                let mut entry = to_json(handle.capabilities());
                let voices = handle.try_lock().map(|engine| engine.list_voices());
                merge(
                    &mut entry,
                    json!({
                        "name": handle.name(),
                        "available": handle.is_available(),
                        "voices": voices,
                    }),
                );
                entry
            })
            .collect();

        json!({
            "success": true,
            "engines": engines,
            "available": self.registry.get_available(),
        })
    }

    pub fn troubleshoot(&self) -> Value {
        to_json(&troubleshoot::run_diagnostics(&self.registry))
    }
}

fn error_value(error: impl Into<String>) -> Value {
    json!({ "success": false, "error": error.into() })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| error_value(format!("Cannot serialize result: {e}")))
}

/// Copy the fields of `extra` into `target`, overwriting on conflict.
fn merge(target: &mut Value, extra: Value) {
    if let (Value::Object(target), Value::Object(extra)) = (target, extra) {
        target.extend(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockEngine;
    use crate::registry::boxed;

    fn mock_tools() -> HearmeTools {
        let registry = EngineRegistry::new();
        registry.register("mock", 100, || boxed(MockEngine::new()));
        HearmeTools::new(Arc::new(registry), HearmeConfig::default())
    }

    #[test]
    fn unknown_tool_is_an_error_value() {
        let value = mock_tools().call("scan_workspace", json!({}));
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Unknown tool: scan_workspace");
    }

    #[test]
    fn render_args_take_defaults() {
        let args: RenderAudioArgs =
            serde_json::from_value(json!({ "script": [{ "text": "Hi" }] })).unwrap();
        assert_eq!(args, RenderAudioArgs::new(vec![ScriptEntry::narration("Hi")]));
    }

    #[test]
    fn bad_render_args_are_reported() {
        let value = mock_tools().call("render_audio", json!({ "script": "not a list" }));
        assert_eq!(value["success"], false);
        assert!(value["error"].as_str().unwrap().contains("render_audio"));
    }

    #[test]
    fn merge_overwrites_fields() {
        let mut value = json!({ "a": 1, "b": 2 });
        merge(&mut value, json!({ "b": 3, "c": 4 }));
        assert_eq!(value, json!({ "a": 1, "b": 3, "c": 4 }));
    }

    #[test]
    fn lists_engines_with_voices() {
        let value = mock_tools().list_engines();
        assert_eq!(value["engines"][0]["name"], "mock");
        assert_eq!(value["engines"][0]["available"], true);
        assert_eq!(value["engines"][0]["voices"][0]["id"], "narrator");
        assert_eq!(value["available"], json!(["mock"]));
    }
}
