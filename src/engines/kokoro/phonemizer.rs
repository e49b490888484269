use std::process::Command;
use std::time::Duration;

use super::model::KokoroError;
use super::vocab::Vocab;
use crate::engines::{find_executable, process};

const ESPEAK: &str = "espeak-ng";
const ESPEAK_TIMEOUT: Duration = Duration::from_secs(60);

/// espeak-ng language for a Kokoro voice, from its two-letter prefix
/// (`af_heart` is American English, `bm_george` British, and so on).
pub fn espeak_language(voice: &str) -> &'static str {
    match voice.get(..2).unwrap_or(voice) {
        "af" | "am" => "en-us",
        "bf" | "bm" => "en-gb",
        "ef" | "em" => "es",
        "ff" => "fr",
        "hf" | "hm" => "hi",
        "if" | "im" => "it",
        "jf" | "jm" => "ja",
        "pf" | "pm" => "pt-br",
        "zf" | "zm" => "cmn",
        _ => "en-us",
    }
}

/// Text to Kokoro token ids, with espeak-ng producing the IPA.
pub struct Phonemizer {
    vocab: Vocab,
}

impl Phonemizer {
    pub fn new(vocab: Vocab) -> Self {
        Self { vocab }
    }

    /// Token ids for `text`. Characters missing from the vocabulary are dropped.
    ///
    /// Punctuation is cut out before espeak sees it and re-inserted as its own
    /// token, so pauses survive phonemization.
    pub fn tokens(&self, text: &str, language: &str) -> Result<Vec<i64>, KokoroError> {
        let pieces = split_pieces(text);
        let words: Vec<&str> = pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Words(words) => Some(words.as_str()),
                Piece::Mark(_) => None,
            })
            .collect();
        if words.is_empty() {
            return Ok(pieces
                .iter()
                .filter_map(|piece| match piece {
                    Piece::Mark(mark) => self.vocab.get(mark).copied(),
                    Piece::Words(_) => None,
                })
                .collect());
        }

        let mut phonemized = self.phonemize(&words, language)?.into_iter();
        let mut ids = Vec::new();
        for piece in &pieces {
            match piece {
                Piece::Words(_) => ids.extend(phonemized.next().unwrap_or_default()),
                Piece::Mark(mark) => ids.extend(self.vocab.get(mark)),
            }
        }
        Ok(ids)
    }

    /// One id sequence per entry of `lines`.
    fn phonemize(&self, lines: &[&str], language: &str) -> Result<Vec<Vec<i64>>, KokoroError> {
        let ipa = espeak(&lines.join("\n"), language)?;
        let ipa_lines: Vec<&str> = ipa.lines().filter(|line| !line.trim().is_empty()).collect();
        if ipa_lines.len() == lines.len() {
            return Ok(ipa_lines.iter().map(|line| self.ipa_ids(line)).collect());
        }

        log::debug!(
            "espeak-ng returned {} lines for {} inputs, phonemizing one at a time",
            ipa_lines.len(),
            lines.len()
        );
        lines
            .iter()
            .map(|line| espeak(line, language).map(|ipa| self.ipa_ids(&ipa)))
            .collect()
    }

    fn ipa_ids(&self, ipa: &str) -> Vec<i64> {
        ipa.lines()
            .map(str::trim)
            .flat_map(str::chars)
            .filter(|&ch| ch != '_')
            .filter_map(|ch| self.vocab.get(&ch).copied())
            .collect()
    }
}

fn espeak(input: &str, language: &str) -> Result<String, KokoroError> {
    let program = find_executable(ESPEAK).ok_or(KokoroError::EspeakNotFound)?;
    let mut command = Command::new(program);
    command.args(["--ipa", "--stdin", "-q", "-v", language]);
    process::output(&mut command, Some(input), ESPEAK_TIMEOUT)
        .map_err(|e| KokoroError::Phonemizer(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Words(String),
    Mark(char),
}

/// Split `text` into runs of words and standalone punctuation marks.
fn split_pieces(text: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut words = String::new();

    for (at, ch) in text.char_indices() {
        if let Some(mark) = pause_mark(ch) {
            if !joins_digits(text, at, ch) {
                flush(&mut pieces, &mut words);
                pieces.push(Piece::Mark(mark));
                continue;
            }
        }
        if ch.is_whitespace() {
            if !words.is_empty() && !words.ends_with(' ') {
                words.push(' ');
            }
        } else {
            words.push(ch);
        }
    }
    flush(&mut pieces, &mut words);
    pieces
}

fn flush(pieces: &mut Vec<Piece>, words: &mut String) {
    let trimmed = words.trim();
    if !trimmed.is_empty() {
        pieces.push(Piece::Words(trimmed.to_string()));
    }
    words.clear();
}

fn pause_mark(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}' | '\u{201d}' => {
            Some(ch)
        }
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

/// `2.0` and `1,000` keep their separator.
fn joins_digits(text: &str, at: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }
    let before = text[..at].chars().next_back();
    let after = text[at + ch.len_utf8()..].chars().next();
    matches!((before, after), (Some(b), Some(a)) if b.is_ascii_digit() && a.is_ascii_digit())
}
