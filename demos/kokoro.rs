use std::path::PathBuf;
use std::time::Instant;

use hearme::engines::kokoro::KokoroEngine;
use hearme::engines::ScopedLoad;
use hearme::{AudioEngine, AudioFormat};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let model_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| hearme::config::load_config().models_dir().join("kokoro"));
    let mut engine = KokoroEngine::new(&model_dir);
    if !engine.is_available() {
        return Err(format!("Kokoro model or espeak-ng missing (looked in {})", model_dir.display()).into());
    }

    let text = "Hello! This is Kokoro, reading a short excerpt from the project documentation. \
                Every render loads the model, speaks, and frees the memory again.";

    let load_start = Instant::now();
    let mut scope = ScopedLoad::enter(&mut engine)?;
    println!("Model loaded in {:.2?}", load_start.elapsed());

    let synth_start = Instant::now();
    let result = scope.synthesize(text, Some("bf_emma"), AudioFormat::Wav);
    let elapsed = synth_start.elapsed();
    let Some(wav) = result.audio_data else {
        return Err(result.error.unwrap_or_default().into());
    };
    println!(
        "Synthesized {:.2}s of audio in {:.2?} ({:.1}x real-time)",
        result.duration_seconds,
        elapsed,
        result.duration_seconds / elapsed.as_secs_f64()
    );

    std::fs::write("output.wav", wav)?;
    println!("Saved to output.wav");
    Ok(())
}
