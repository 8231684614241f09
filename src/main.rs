use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ddb_scraper::config::Config;
use ddb_scraper::logging;
use ddb_scraper::pipeline::{Pipeline, EXIT_NO_ROWS};
use ddb_scraper::types::EntityKind;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ddb_scraper")]
#[command(about = "D&D Beyond listing scraper with 5e.tools source codes")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to ddb_scraper.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Stop after this many rows
    #[arg(long)]
    limit: Option<usize>,
    /// Show the browser window
    #[arg(long)]
    headed: bool,
    /// Directory for the CSV files
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct EnrichFlags {
    /// Leave SOURCE_SHORT empty instead of visiting 5e.tools
    #[arg(long)]
    skip_enrichment: bool,
    /// Only look up the scraped names on 5e.tools and honor --limit there too
    #[arg(long)]
    filter_enrichment: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the spell listing
    Spells {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        enrich: EnrichFlags,
    },
    /// Scrape the magic item listing
    MagicItems {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        enrich: EnrichFlags,
    },
    /// Scrape the monster listing
    Monsters {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Add SOURCE_SHORT to a previously scraped magic items CSV
    EnrichItems {
        /// Input CSV (defaults to the magic items data file in the output directory)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Output CSV (defaults to magicitems-with-sources.csv in the output directory)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Only enrich the first N rows
        #[arg(long)]
        limit: Option<usize>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
}

fn apply_run_args(config: &mut Config, run: &RunArgs) {
    if run.limit.is_some() {
        config.run.limit = run.limit;
    }
    if run.headed {
        config.browser.headless = false;
    }
    if let Some(dir) = &run.output_dir {
        config.output.dir = dir.clone();
    }
}

fn apply_enrich_flags(config: &mut Config, flags: &EnrichFlags) {
    if flags.skip_enrichment {
        config.run.enrich = false;
    }
    if flags.filter_enrichment {
        config.run.scrape_all_fivetools = false;
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let code = match cli.command {
        Commands::Spells { run, enrich } => {
            apply_run_args(&mut config, &run);
            apply_enrich_flags(&mut config, &enrich);
            Pipeline::run(EntityKind::Spells, &config).await
        }
        Commands::MagicItems { run, enrich } => {
            apply_run_args(&mut config, &run);
            apply_enrich_flags(&mut config, &enrich);
            Pipeline::run(EntityKind::MagicItems, &config).await
        }
        Commands::Monsters { run } => {
            apply_run_args(&mut config, &run);
            Pipeline::run(EntityKind::Monsters, &config).await
        }
        Commands::EnrichItems { input, output, limit, headed } => {
            if headed {
                config.browser.headless = false;
            }
            let (default_input, default_output) = Pipeline::default_enrich_paths(&config);
            let input = input.unwrap_or(default_input);
            let output = output.unwrap_or(default_output);
            Pipeline::enrich_items(&config, &input, &output, limit.filter(|&n| n > 0)).await
        }
    };
    Ok(code)
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let guard = logging::init_logging();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            println!("❌ {:#}", e);
            EXIT_NO_ROWS
        }
    };
    info!(code, "Exiting");
    drop(guard);
    std::process::exit(code);
}
