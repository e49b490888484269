use std::time::Instant;

use hearme::config;
use hearme::renderer::RenderRequestBuilder;
use hearme::tools::HearmeTools;
use hearme::{EngineRegistry, Renderer, ScriptEntry, VoiceMap};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = config::load_config();
    let registry = EngineRegistry::with_default_engines(&config);
    println!("Available engines: {:?}", registry.get_available());

    let request = RenderRequestBuilder::default()
        .script(vec![
            ScriptEntry::new("host", "Welcome to a quick tour of this repository."),
            ScriptEntry::new("guest", "Thanks. Where should a new contributor start?"),
            ScriptEntry::new("host", "With the renderer. It turns a script like this one into a single audio file."),
            ScriptEntry::narration("That's the tour. Happy hacking."),
        ])
        .voice_map(VoiceMap::from([
            ("host".to_string(), "S1".to_string()),
            ("guest".to_string(), "S2".to_string()),
        ]))
        .output_path("output/tour.wav")
        .build()?;

    let start = Instant::now();
    let result = Renderer::from_config(&registry, &config).render(&request);
    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("Rendered in {:.2?}", start.elapsed());

    let tools = HearmeTools::new(registry.into(), config);
    println!("{}", serde_json::to_string_pretty(&tools.call("cleanup_resources", serde_json::json!({})))?);
    Ok(())
}
