//! Output persistence under the project's output directory, `<root>/.hearme/`
//! unless `output.dir` says otherwise.
//!
//! ```text
//! .hearme/
//! ├── hearme.audio.wav
//! ├── script.json      (the script as rendered)
//! ├── script.txt       (the same script, for reading)
//! └── manifest.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::expand_home;
use crate::script::ScriptEntry;

/// Default output directory, relative to the project root.
pub const OUTPUT_DIR: &str = ".hearme";
pub const AUDIO_FILE_NAME: &str = "hearme.audio.wav";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0";

/// The output directory `dir` resolved against the project `root`.
///
/// `dir` is usually relative; an absolute or `~` path is used as is.
pub fn hearme_dir(root: &Path, dir: &str) -> PathBuf {
    root.join(expand_home(dir))
}

/// `<dir>/hearme.audio.wav`, creating `dir`.
pub fn default_output_path(dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(AUDIO_FILE_NAME))
}

/// Write `<name>.json` and `<name>.txt` into `dir`.
pub fn save_script(script: &[ScriptEntry], dir: &Path, name: &str) -> io::Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let json_path = dir.join(format!("{name}.json"));
    let txt_path = dir.join(format!("{name}.txt"));

    fs::write(&json_path, serde_json::to_string_pretty(script)?)?;
    fs::write(&txt_path, script_text(script))?;

    Ok((json_path, txt_path))
}

/// Plain-text rendition: a `[SPEAKER]` header over each turn.
pub fn script_text(script: &[ScriptEntry]) -> String {
    script
        .iter()
        .map(|entry| {
            format!(
                "[{}]\n{}\n\n",
                entry.speaker_or_default().to_uppercase(),
                entry.text
            )
        })
        .collect()
}

/// Record of one persisted render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputManifest {
    pub version: String,
    pub created_at: String,
    pub audio_file: Option<PathBuf>,
    pub script_file: Option<PathBuf>,
    #[serde(serialize_with = "crate::serialize_2dp")]
    pub duration_seconds: f64,
    pub engine_used: Option<String>,
    pub segment_count: usize,
    pub documents_used: Vec<String>,
}

impl Default for OutputManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            created_at: chrono::Local::now().to_rfc3339(),
            audio_file: None,
            script_file: None,
            duration_seconds: 0.0,
            engine_used: None,
            segment_count: 0,
            documents_used: Vec::new(),
        }
    }
}

pub fn save_manifest(manifest: &OutputManifest, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(MANIFEST_FILE_NAME);
    fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
    Ok(path)
}

/// Paths written by [`persist_outputs`]. A file that could not be written is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistResult {
    pub success: bool,
    pub audio_file: Option<PathBuf>,
    pub script_json: Option<PathBuf>,
    pub script_txt: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
}

/// What a render produced, for the manifest.
#[derive(Debug, Clone, Default)]
pub struct RenderOutputs<'a> {
    pub audio_path: Option<&'a Path>,
    pub script: &'a [ScriptEntry],
    pub duration_seconds: f64,
    pub engine_used: Option<&'a str>,
    pub documents_used: &'a [String],
}

/// Save the script and a manifest next to the audio.
///
/// Persistence is secondary to the audio itself: write failures are logged and
/// leave the corresponding path empty.
pub fn persist_outputs(outputs: &RenderOutputs<'_>, dir: &Path) -> PersistResult {
    let (script_json, script_txt) = match save_script(outputs.script, dir, "script") {
        Ok((json, txt)) => (Some(json), Some(txt)),
        Err(e) => {
            log::error!("Failed to save script: {e}");
            (None, None)
        }
    };

    let manifest = OutputManifest {
        audio_file: outputs.audio_path.map(Path::to_path_buf),
        script_file: script_json.clone(),
        duration_seconds: outputs.duration_seconds,
        engine_used: outputs.engine_used.map(str::to_string),
        segment_count: outputs.script.len(),
        documents_used: outputs.documents_used.to_vec(),
        ..OutputManifest::default()
    };
    let manifest = match save_manifest(&manifest, dir) {
        Ok(path) => Some(path),
        Err(e) => {
            log::error!("Failed to save manifest: {e}");
            None
        }
    };

    PersistResult {
        success: true,
        audio_file: outputs.audio_path.map(Path::to_path_buf),
        script_json,
        script_txt,
        manifest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> Vec<ScriptEntry> {
        vec![
            ScriptEntry::new("host", "Welcome."),
            ScriptEntry::narration("Some background."),
        ]
    }

    #[test]
    fn default_output_path_creates_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = default_output_path(&hearme_dir(root.path(), OUTPUT_DIR)).unwrap();
        assert_eq!(path, root.path().join(".hearme").join("hearme.audio.wav"));
        assert!(root.path().join(".hearme").is_dir());
    }

    #[test]
    fn output_dir_can_be_renamed_or_absolute() {
        let root = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();

        assert_eq!(
            hearme_dir(root.path(), "docs/audio"),
            root.path().join("docs").join("audio")
        );
        let absolute = elsewhere.path().join("renders");
        assert_eq!(hearme_dir(root.path(), absolute.to_str().unwrap()), absolute);
    }

    #[test]
    fn text_script_uses_uppercase_headers() {
        assert_eq!(
            script_text(&script()),
            "[HOST]\nWelcome.\n\n[NARRATOR]\nSome background.\n\n"
        );
    }

    #[test]
    fn saves_script_in_both_forms() {
        let root = tempfile::tempdir().unwrap();
        let (json, txt) = save_script(&script(), &root.path().join(OUTPUT_DIR), "script").unwrap();

        let saved: Vec<ScriptEntry> = serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(saved, script());
        assert!(fs::read_to_string(txt).unwrap().starts_with("[HOST]"));
    }

    #[test]
    fn persist_writes_manifest() {
        let root = tempfile::tempdir().unwrap();
        let audio = root.path().join(".hearme").join("hearme.audio.wav");
        let script = script();

        let result = persist_outputs(
            &RenderOutputs {
                audio_path: Some(audio.as_path()),
                script: &script,
                duration_seconds: 12.3456,
                engine_used: Some("mock"),
                documents_used: &["README.md".to_string()],
            },
            &root.path().join(OUTPUT_DIR),
        );

        assert!(result.success);
        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(result.manifest.unwrap()).unwrap()).unwrap();
        assert_eq!(manifest["version"], "1.0");
        assert_eq!(manifest["duration_seconds"], serde_json::json!(12.35));
        assert_eq!(manifest["engine_used"], "mock");
        assert_eq!(manifest["segment_count"], 2);
        assert_eq!(manifest["documents_used"][0], "README.md");
        assert!(chrono::DateTime::parse_from_rfc3339(manifest["created_at"].as_str().unwrap()).is_ok());
    }
}
