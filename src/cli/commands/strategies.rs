//! List strategies command.

use anyhow::Result;
use retrace_strategies::PresetRegistry;

pub async fn run() -> Result<()> {
    let registry = PresetRegistry::new();

    println!("Available Presets");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    for info in registry.list() {
        println!("  {} ", info.name);
        println!("  ───────────────────────────────────────────────────────");
        println!("  {}", info.description);
        println!();
    }

    println!("Use --preset <name> to select a preset.");
    println!();
    println!("Preset names: {}", registry.names().join(", "));

    Ok(())
}
