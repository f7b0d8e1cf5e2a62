//! Authenticity Analysis Example
//!
//! Runs the full pipeline on one image and writes the ELA artifacts plus a
//! JSON report. Configuration comes from the environment (`.env` is read):
//! `FORENSICS_MODEL_PATH`, `FORENSICS_ELA_QUALITY`, `OPENAI_API_KEY`.
//!
//! Run with: cargo run --example analyze_image -- <image_path> [output_dir]

use deepfake_forensics::{
    ForensicsAnalyzer, Label, error::Result, image_utils::load_image,
    report::visualization::Visualizer,
};
use std::env;
use std::fs;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: {} <image_path> [output_dir]", args[0]);
        println!();
        println!("  image_path  - JPEG or PNG image to analyze");
        println!("  output_dir  - Optional output directory (default: ./output)");
        return Ok(());
    }

    let image_path = &args[1];
    let output_dir = args.get(2).map(|s| s.as_str()).unwrap_or("./output");

    if !Path::new(image_path).exists() {
        eprintln!("Error: Image file '{}' not found", image_path);
        std::process::exit(1);
    }

    fs::create_dir_all(output_dir)?;

    let analyzer = ForensicsAnalyzer::from_env()?;
    let bytes = fs::read(image_path)?;

    let report = match analyzer.analyze_with_narrative(&bytes) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           Image Authenticity - Forensic Report               ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!("📁 Input:  {}", image_path);
    println!("📂 Output: {}", output_dir);
    println!();

    let classification = report.classification();
    let marker = match classification.label {
        Label::Real => "✅",
        Label::Fake => "⚠️ ",
    };
    println!(
        "  {} Verdict: {}  (confidence {:.2}%)",
        marker,
        classification.label,
        classification.confidence * 100.0
    );
    if classification.is_demo() {
        println!("     Demo mode: no trained model loaded, verdict is a placeholder.");
    }
    println!();

    println!("  ELA noise level: {:.2}", report.ela_score());
    println!("     {}", report.ela_annotation().describe());
    println!();

    println!("  Metadata:");
    for (key, value) in &report.metadata().fields {
        println!("     {}: {}", key, value);
    }
    for indicator in &report.metadata().suspicious_indicators {
        println!("     ⚠️  {}", indicator);
    }
    println!();

    let visualizer = Visualizer::new();
    let ela_path = format!("{}/ela_map.png", output_dir);
    report.save_ela_map(&ela_path)?;

    let heatmap_path = format!("{}/ela_heatmap.png", output_dir);
    visualizer.create_heatmap(&report.ela().map).save(&heatmap_path)?;

    let (_, original) = load_image(&bytes)?;
    let comparison_path = format!("{}/comparison.png", output_dir);
    visualizer
        .side_by_side(&original.to_rgb8(), &report.ela().map)
        .save(&comparison_path)?;

    let json_path = format!("{}/report.json", output_dir);
    fs::write(&json_path, report.to_json()?)?;

    if let Some(narrative) = report.narrative() {
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("SYSTEM OUTPUT:");
        println!();
        println!("{}", narrative.text());
        println!();
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("All outputs saved to: {}/", output_dir);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    Ok(())
}
