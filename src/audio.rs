//! WAV helpers shared by every engine and the renderer.
//!
//! Everything written by this crate is single-channel 16-bit linear PCM. Decoding
//! accepts whatever `hound` can read and folds it down to that shape.

use std::io::Cursor;

use crate::SynthesisSegment;

/// Bit depth of every WAV this crate writes.
pub const BITS_PER_SAMPLE: u16 = 16;

fn mono_pcm16(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Encode 16-bit samples into a mono WAV container.
pub fn encode_pcm16(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut buffer = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), mono_pcm16(sample_rate))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(buffer)
}

/// Encode float samples in `[-1.0, 1.0]` into a mono 16-bit WAV container.
pub fn encode_f32(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let pcm: Vec<i16> = samples.iter().map(|&s| f32_to_i16(s)).collect();
    encode_pcm16(&pcm, sample_rate)
}

/// A silent mono WAV of the given length.
pub fn silence(duration_seconds: f64, sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let frames = (sample_rate as f64 * duration_seconds.max(0.0)) as usize;
    encode_pcm16(&vec![0i16; frames], sample_rate)
}

/// Decoded mono 16-bit audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm16 {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Pcm16 {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn to_wav(&self) -> Result<Vec<u8>, hound::Error> {
        encode_pcm16(&self.samples, self.sample_rate)
    }
}

/// Decode any WAV container into mono 16-bit samples.
///
/// Multi-channel audio is averaged down; other bit depths and float samples are
/// rescaled.
pub fn decode_pcm16(wav: &[u8]) -> Result<Pcm16, hound::Error> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader.into_samples::<i16>().collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, bits) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|s| rescale_int(s, bits)))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .map(|s| s.map(f32_to_i16))
            .collect::<Result<_, _>>()?,
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };

    Ok(Pcm16 {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Splice the frames of every segment into one mono 16-bit WAV at `sample_rate`.
///
/// Segments with an empty payload are skipped. A payload that cannot be decoded
/// fails the whole concatenation rather than producing a file with a gap.
pub fn concatenate_wav(
    segments: &[SynthesisSegment],
    sample_rate: u32,
) -> Result<Vec<u8>, hound::Error> {
    let mut frames: Vec<i16> = Vec::new();

    for segment in segments {
        if segment.audio_data.is_empty() {
            continue;
        }
        let decoded = decode_pcm16(&segment.audio_data)?;
        if decoded.sample_rate != sample_rate {
            log::warn!(
                "Segment for {} is {} Hz, splicing into {} Hz output",
                segment.speaker,
                decoded.sample_rate,
                sample_rate
            );
        }
        frames.extend_from_slice(&decoded.samples);
    }

    encode_pcm16(&frames, sample_rate)
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn rescale_int(sample: i32, bits: u16) -> i16 {
    if bits > 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}
