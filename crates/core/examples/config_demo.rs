//! Example demonstrating configuration loading and parameter ingestion
//!
//! Run with: cargo run --package dcomp-core --example config_demo

use dcomp_core::{DcompConfig, ParamId, SignalRouter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("dcomp_core=debug,info")
        .init();

    println!("=== dcomp Configuration Demo ===\n");

    // 1. Default configuration
    println!("1. Creating default configuration...");
    let mut config = DcompConfig::default();
    config.parameters.threshold_db = -18.0;
    config.parameters.ratio = 6.0;
    println!(
        "   ✓ {} Hz, {} frame blocks",
        config.engine.sample_rate, config.engine.block_size
    );

    // 2. Round trip through TOML
    println!("\n2. Saving and reloading configuration...");
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("dcomp.toml");
    config.save_to_file(&config_path).await?;
    let loaded = DcompConfig::load_from_file(&config_path).await?;
    println!("   ✓ Reloaded from {}", config_path.display());

    // 3. Feed the parameters through the ingestion boundary
    println!("\n3. Building the signal router...");
    let mut router = SignalRouter::from_config(&loaded.engine, &loaded.parameters);
    router.prepare(loaded.engine.sample_rate as f32)?;
    for id in ParamId::ALL {
        let spec = id.spec();
        println!(
            "   {:<20} {}",
            spec.name,
            spec.display(router.parameter_value(id))
        );
    }

    // 4. Static curve
    println!("\n4. Transfer curve:");
    let curve = router.gain_curve();
    for level in [-30.0_f32, -20.0, -18.0, -12.0, -6.0, 0.0] {
        println!(
            "   {:>6.1} dB in -> {:>6.2} dB out",
            level,
            curve.output_db(level)
        );
    }

    println!("\n=== Demo complete ===");
    Ok(())
}
