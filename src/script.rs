//! Audio scripts: the caller-supplied speaker turns and their normalized form.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Hard ceiling on the characters in one script, roughly twenty minutes of speech.
pub const MAX_SCRIPT_CHARS: usize = 100_000;

pub const DEFAULT_SPEAKER: &str = "narrator";

/// Default pause hint after a turn, in seconds.
pub const DEFAULT_PAUSE_AFTER: f64 = 0.5;

/// One raw script line as the calling agent sends it.
///
/// Every field is optional on the wire; missing text is treated as empty and the
/// line is dropped during [`parse_script`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_after: Option<f64>,
}

impl ScriptEntry {
    pub fn new(speaker: &str, text: &str) -> Self {
        Self {
            speaker: Some(speaker.to_string()),
            text: text.to_string(),
            pause_after: None,
        }
    }

    /// A line without a speaker, read by the narrator.
    pub fn narration(text: &str) -> Self {
        Self {
            speaker: None,
            text: text.to_string(),
            pause_after: None,
        }
    }

    /// The speaker label, falling back to the narrator.
    pub fn speaker_or_default(&self) -> &str {
        match self.speaker.as_deref().map(str::trim) {
            Some(speaker) if !speaker.is_empty() => speaker,
            _ => DEFAULT_SPEAKER,
        }
    }
}

/// A normalized script turn: non-empty trimmed text with a resolved speaker.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSegment {
    pub speaker: String,
    pub text: String,
    pub pause_after: f64,
}

impl ScriptSegment {
    pub fn new(speaker: &str, text: &str) -> Self {
        Self {
            speaker: speaker.to_string(),
            text: text.to_string(),
            pause_after: DEFAULT_PAUSE_AFTER,
        }
    }

    /// Length in characters (not bytes).
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Normalize raw entries into segments, preserving order.
///
/// Entries whose text is empty after trimming are dropped; this is not an error.
pub fn parse_script(entries: &[ScriptEntry]) -> Vec<ScriptSegment> {
    entries
        .iter()
        .filter_map(|entry| {
            let text = entry.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(ScriptSegment {
                speaker: entry.speaker_or_default().to_string(),
                text: text.to_string(),
                pause_after: entry.pause_after.unwrap_or(DEFAULT_PAUSE_AFTER),
            })
        })
        .collect()
}

pub fn total_chars(segments: &[ScriptSegment]) -> usize {
    segments.iter().map(ScriptSegment::char_count).sum()
}

/// Reject empty scripts and scripts over [`MAX_SCRIPT_CHARS`].
pub fn validate_script(segments: &[ScriptSegment]) -> Result<(), RenderError> {
    if segments.is_empty() {
        return Err(RenderError::EmptyScript);
    }

    let chars = total_chars(segments);
    if chars > MAX_SCRIPT_CHARS {
        return Err(RenderError::ScriptTooLong { chars });
    }

    Ok(())
}

/// Split segments into consecutive runs of at most `limit` characters.
///
/// Segments are never split; a segment longer than `limit` forms its own chunk.
pub fn chunk_segments(segments: &[ScriptSegment], limit: usize) -> Vec<&[ScriptSegment]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut current = 0;

    for (index, segment) in segments.iter().enumerate() {
        let chars = segment.char_count();
        if index > start && current + chars > limit {
            chunks.push(&segments[start..index]);
            start = index;
            current = 0;
        }
        current += chars;
    }

    if start < segments.len() {
        chunks.push(&segments[start..]);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_of_len(speaker: &str, len: usize) -> ScriptSegment {
        ScriptSegment::new(speaker, &"a".repeat(len))
    }

    #[test]
    fn drops_blank_entries_and_keeps_order() {
        let entries = vec![
            ScriptEntry::new("host", "  Welcome!  "),
            ScriptEntry::new("guest", "   "),
            ScriptEntry::new("guest", ""),
            ScriptEntry::new("guest", "Thanks for having me."),
        ];

        let segments = parse_script(&entries);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker, "host");
        assert_eq!(segments[0].text, "Welcome!");
        assert_eq!(segments[1].text, "Thanks for having me.");
    }

    #[test]
    fn missing_speaker_defaults_to_narrator() {
        let segments = parse_script(&[ScriptEntry::narration("Hello world.")]);
        assert_eq!(segments[0].speaker, "narrator");
        assert_eq!(segments[0].pause_after, DEFAULT_PAUSE_AFTER);
    }

    #[test]
    fn pause_hint_is_carried_over() {
        let mut entry = ScriptEntry::new("host", "Pause here.");
        entry.pause_after = Some(1.25);
        assert_eq!(parse_script(&[entry])[0].pause_after, 1.25);
    }

    #[test]
    fn entries_deserialize_with_missing_fields() {
        let entries: Vec<ScriptEntry> =
            serde_json::from_str(r#"[{"text": "Hi"}, {"speaker": "peer"}]"#).unwrap();
        let segments = parse_script(&entries);
        assert_eq!(segments, vec![ScriptSegment::new("narrator", "Hi")]);
    }

    #[test]
    fn empty_script_is_rejected() {
        let err = validate_script(&[]).unwrap_err();
        assert!(err.to_string().to_lowercase().contains("empty"));
    }

    #[test]
    fn script_length_boundary() {
        let at_limit = vec![segment_of_len("narrator", MAX_SCRIPT_CHARS)];
        assert!(validate_script(&at_limit).is_ok());

        let over = vec![
            segment_of_len("narrator", MAX_SCRIPT_CHARS),
            segment_of_len("peer", 1),
        ];
        let err = validate_script(&over).unwrap_err();
        assert!(matches!(err, RenderError::ScriptTooLong { chars } if chars == MAX_SCRIPT_CHARS + 1));
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let segment = ScriptSegment::new("narrator", "héllo");
        assert_eq!(segment.char_count(), 5);
    }

    #[test]
    fn chunks_respect_limit_and_order() {
        let segments: Vec<_> = (0..5).map(|_| segment_of_len("narrator", 40)).collect();
        let chunks = chunk_segments(&segments, 100);

        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert!(chunks.iter().all(|c| total_chars(c) <= 100));
        assert_eq!(chunks.concat(), segments);
    }

    #[test]
    fn oversized_segment_becomes_its_own_chunk() {
        let segments = vec![
            segment_of_len("host", 10),
            segment_of_len("guest", 250),
            segment_of_len("host", 10),
        ];
        let chunks = chunk_segments(&segments, 100);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1][0].char_count(), 250);
    }

    #[test]
    fn no_chunks_for_no_segments() {
        assert!(chunk_segments(&[], 100).is_empty());
    }
}
