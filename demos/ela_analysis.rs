use deepfake_forensics::analysis::ela::ElaAnalyzer;
use std::{env, fs};

fn main() -> deepfake_forensics::error::Result<()> {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| "evidences/sample.jpg".into());
    let bytes = fs::read(&path)?;
    fs::create_dir_all("output")?;

    for quality in [95, 90, 85] {
        println!("Analyzing at quality {}... ", quality);

        let ela_result = ElaAnalyzer::new(quality).analyze(&bytes);

        let ela_output = format!("output/ela_q{}.png", quality);
        ela_result.save(&ela_output)?;

        println!("  Score: {:.2}", ela_result.score);
        println!("  Max difference: {}", ela_result.max_difference);
        println!("  Mean residual: {:.2}", ela_result.mean_residual);
        println!("  Status: {:?}", ela_result.status);
        println!("  Output: {}", ela_output);
        println!();
    }

    Ok(())
}
