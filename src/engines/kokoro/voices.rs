use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use super::model::KokoroError;

/// Width of one style vector.
pub const STYLE_DIM: usize = 256;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Style tables of every voice in a `voices-v1.0.bin` archive.
///
/// The archive is an `.npz`: one `<voice>.npy` per voice, each a little-endian
/// float32 array of shape `[N, 256]`. Row `n` is the style for an utterance of
/// `n` tokens.
pub struct VoicePack {
    voices: HashMap<String, Vec<f32>>,
}

impl VoicePack {
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        Self::read(File::open(path)?)
    }

    pub fn read<R: Read + Seek>(reader: R) -> Result<Self, KokoroError> {
        let mut archive = zip::ZipArchive::new(reader).map_err(|e| KokoroError::VoiceParse(e.to_string()))?;

        let mut voices = HashMap::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| KokoroError::VoiceParse(format!("entry {index}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let Some(voice) = entry.name().strip_suffix(".npy").map(str::to_string) else {
                log::debug!("Skipping {} in voice pack", entry.name());
                continue;
            };

            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            let styles = parse_npy(&bytes).map_err(|e| KokoroError::VoiceParse(format!("{voice}: {e}")))?;
            voices.insert(voice, styles);
        }

        log::info!("Loaded {} Kokoro voices", voices.len());
        Ok(Self { voices })
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.voices.contains_key(voice)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Style row for `tokens` tokens, clamped to the last row.
    pub fn style(&self, voice: &str, tokens: usize) -> Result<Vec<f32>, KokoroError> {
        let table = self
            .voices
            .get(voice)
            .ok_or_else(|| KokoroError::VoiceNotFound(voice.to_string()))?;
        let rows = table.len() / STYLE_DIM;
        let row = tokens.min(rows.saturating_sub(1));
        Ok(table[row * STYLE_DIM..(row + 1) * STYLE_DIM].to_vec())
    }
}

/// Float payload of a version 1 `.npy` holding whole style rows.
fn parse_npy(bytes: &[u8]) -> Result<Vec<f32>, String> {
    if bytes.len() < 10 || !bytes.starts_with(NPY_MAGIC) {
        return Err("not a .npy file".to_string());
    }
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let payload = bytes
        .get(10 + header_len..)
        .ok_or_else(|| format!("header of {header_len} bytes is truncated"))?;

    if payload.len() % (4 * STYLE_DIM) != 0 || payload.is_empty() {
        return Err(format!(
            "{} payload bytes do not form rows of {STYLE_DIM} floats",
            payload.len()
        ));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
