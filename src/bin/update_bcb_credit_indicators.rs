use std::{error::Error, path::Path};

use bcb_credit::db::prod_db::ProdDb;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Step {
    /// Download both series from the BCB
    Extract,
    /// Join the downloaded files into the consolidated file
    Transform,
    /// Replace the DuckDB table with the consolidated file
    Load,
    /// All of the above, in sequence
    All,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Which step of the pipeline to run
    #[arg(short, long, value_enum, default_value_t = Step::All)]
    step: Step,
}

/// Run this job monthly.  Each step can be scheduled on its own, in the order
/// extract, transform, load.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let env_file = format!(".env/{}.env", args.env);
    if Path::new(&env_file).exists() {
        dotenvy::from_path(Path::new(&env_file))?;
    }

    let archive = ProdDb::bcb_credit_indicators();
    match args.step {
        Step::Extract => archive.download_files()?,
        Step::Transform => {
            archive.transform()?;
        }
        Step::Load => {
            archive.update_duckdb()?;
        }
        Step::All => {
            archive.run_all()?;
        }
    }

    Ok(())
}
