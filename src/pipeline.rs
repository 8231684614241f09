//! One run of the tool: browser in, CSV files out, exit code back.

use crate::browser::BrowserSession;
use crate::collector::{collect, CollectOptions, CollectStats};
use crate::config::Config;
use crate::constants::{ENRICHED_ITEMS_FILE, MAGIC_ITEMS_DATA_FILE, NAME_COLUMN};
use crate::enrich::{name_filter, SourceCodeMap};
use crate::error::{Result, ScraperError};
use crate::export::{read_table, write_records, write_table, write_url_index, Table};
use crate::normalize::format_elapsed;
use crate::scrapers::dndbeyond::{DdbListing, MagicItemRows, MonsterRows, RowParser, SpellRows};
use crate::scrapers::fivetools::{
    collect_source_codes, BrowserSourceRows, FiveToolsList, SourceOptions, ITEM_LIST,
};
use crate::types::{EntityKind, ListingRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_NO_ROWS: i32 = 1;
pub const EXIT_WRITE_FAILED: i32 = 2;

/// What a finished run reports on the console and in the log.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub kind: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: String,
    pub pages: usize,
    pub rows: usize,
    pub duplicates: usize,
    pub stale_skips: usize,
    pub stop_reason: String,
    pub source_codes: Option<usize>,
    pub source_misses: Option<usize>,
    pub output_files: Vec<String>,
}

impl RunSummary {
    fn print(&self) {
        println!("\n📊 Run results for {}:", self.kind);
        println!("   Started: {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("   Elapsed: {}", self.elapsed);
        println!("   Pages: {}", self.pages);
        println!("   Rows: {}", self.rows);
        println!("   Duplicates skipped: {}", self.duplicates);
        println!("   Stale rows skipped: {}", self.stale_skips);
        println!("   Stopped: {}", self.stop_reason);
        if let (Some(codes), Some(misses)) = (self.source_codes, self.source_misses) {
            println!("   5e.tools codes: {} ({} rows unmatched)", codes, misses);
        }
        for file in &self.output_files {
            println!("   Output file: {}", file);
        }
    }
}

/// Result of writing a run's rows.
#[derive(Debug)]
pub enum Outcome {
    Written { files: Vec<PathBuf>, misses: Option<usize> },
    NoRows,
    WriteFailed(ScraperError),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Written { .. } => EXIT_OK,
            Outcome::NoRows => EXIT_NO_ROWS,
            Outcome::WriteFailed(_) => EXIT_WRITE_FAILED,
        }
    }
}

/// Settings of the 5e.tools walk for a scrape run.
///
/// Unless every 5e.tools row is wanted, the walk is filtered to the scraped
/// names and bounded by the run limit.
pub fn source_options<'a>(config: &Config, names: impl IntoIterator<Item = &'a str>) -> SourceOptions {
    let (filter, limit) = if config.run.scrape_all_fivetools {
        (None, None)
    } else {
        (Some(name_filter(names)), config.run.effective_limit())
    };
    SourceOptions {
        filter,
        limit,
        max_scroll_rounds: config.timing.max_scroll_rounds,
        delay_range: config.timing.delay_range(),
    }
}

/// The 5e.tools list to read for a scrape of `kind`, if codes are joined at all.
pub fn enrichment_list(kind: EntityKind, config: &Config) -> Option<FiveToolsList> {
    if !kind.supports_enrichment() {
        return None;
    }
    if !config.run.enrich {
        info!("Enrichment disabled, SOURCE_SHORT left empty");
        return None;
    }
    FiveToolsList::for_kind(kind)
}

/// Finalize rows, join codes and write both CSV files.
pub fn finish<R: ListingRecord>(mut records: Vec<R>, codes: Option<&SourceCodeMap>, dir: &Path) -> Outcome {
    if records.is_empty() {
        return Outcome::NoRows;
    }
    for record in records.iter_mut() {
        record.finalize();
    }
    let misses = codes.map(|codes| codes.apply(&mut records));

    let kind = R::KIND;
    let urls = dir.join(kind.urls_file());
    let data = dir.join(kind.data_file());
    let written = write_url_index(&urls, &records).and_then(|_| write_records(&data, &records));
    match written {
        Ok(()) => Outcome::Written { files: vec![urls, data], misses },
        Err(e) => Outcome::WriteFailed(e),
    }
}

/// Join codes onto a loaded table and write it.
pub fn finish_table(table: &mut Table, codes: &SourceCodeMap, output: &Path) -> Outcome {
    if table.is_empty() {
        return Outcome::NoRows;
    }
    let misses = codes.apply_to_table(table);
    match write_table(output, table) {
        Ok(()) => Outcome::Written { files: vec![output.to_path_buf()], misses: Some(misses) },
        Err(e) => Outcome::WriteFailed(e),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

fn report_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Written { .. } => {}
        Outcome::NoRows => {
            error!("No rows collected");
            println!("❌ No rows collected, nothing written");
        }
        Outcome::WriteFailed(e) => {
            error!("Failed to write output: {}", error_chain(e));
            println!("❌ Failed to write output: {}", e);
        }
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Scrape one listing end to end and return the process exit code.
    pub async fn run(kind: EntityKind, config: &Config) -> i32 {
        match kind {
            EntityKind::Spells => Self::run_kind::<SpellRows>(config).await,
            EntityKind::MagicItems => Self::run_kind::<MagicItemRows>(config).await,
            EntityKind::Monsters => Self::run_kind::<MonsterRows>(config).await,
        }
    }

    #[instrument(skip_all)]
    async fn run_kind<P: RowParser>(config: &Config) -> i32 {
        let kind = <P::Record as ListingRecord>::KIND;
        let started_at = Utc::now();
        let started = Instant::now();
        println!("🔄 Scraping {} from {}", kind, config.sites.ddb_base_url);

        let browser = match BrowserSession::launch(&config.browser).await {
            Ok(browser) => browser,
            Err(e) => {
                error!("Browser launch failed: {}", error_chain(&e));
                println!("❌ Could not start the browser: {}", e);
                return EXIT_NO_ROWS;
            }
        };
        let scraped = Self::scrape::<P>(&browser, config).await;
        browser.quit().await;

        let (records, stats, codes) = match scraped {
            Ok(scraped) => scraped,
            Err(e) => {
                error!("Scrape failed: {}", error_chain(&e));
                (Vec::new(), CollectStats::default(), None)
            }
        };
        let rows = records.len();
        let outcome = finish(records, codes.as_ref(), &config.output.dir);
        report_outcome(&outcome);

        if let Outcome::Written { files, misses } = &outcome {
            let summary = RunSummary {
                kind: kind.to_string(),
                started_at,
                elapsed: format_elapsed(started.elapsed()),
                pages: stats.pages,
                rows,
                duplicates: stats.duplicates,
                stale_skips: stats.stale_skips,
                stop_reason: stats.stop_reason.to_string(),
                source_codes: codes.as_ref().map(SourceCodeMap::len),
                source_misses: *misses,
                output_files: files.iter().map(|p| p.display().to_string()).collect(),
            };
            summary.print();
            match serde_json::to_string(&summary) {
                Ok(json) => info!(summary = %json, "Run finished"),
                Err(e) => debug!("Could not serialize run summary: {}", e),
            }
        }
        outcome.exit_code()
    }

    async fn scrape<P: RowParser>(
        browser: &BrowserSession,
        config: &Config,
    ) -> Result<(Vec<P::Record>, CollectStats, Option<SourceCodeMap>)> {
        let kind = <P::Record as ListingRecord>::KIND;
        let base_url = &config.sites.ddb_base_url;
        browser.goto(&kind.listing_url(base_url)).await?;

        let mut listing = DdbListing::<P>::new(browser, config.timing.clone(), base_url);
        let (records, stats) = collect(&mut listing, &CollectOptions::from_config(config)).await?;

        let codes = match enrichment_list(kind, config) {
            Some(list) if !records.is_empty() => {
                let options = source_options(config, records.iter().map(|r| r.name()));
                Some(Self::source_codes(browser, list, config, &options).await)
            }
            _ => None,
        };
        Ok((records, stats, codes))
    }

    async fn source_codes(
        browser: &BrowserSession,
        list: FiveToolsList,
        config: &Config,
        options: &SourceOptions,
    ) -> SourceCodeMap {
        println!("🔗 Collecting short source codes from {}", list.url(&config.sites.fivetools_base_url));
        let mut rows = BrowserSourceRows::new(browser, list, &config.sites.fivetools_base_url, config.timing.clone());
        collect_source_codes(&mut rows, options).await
    }

    /// Append SOURCE_SHORT to an existing magic-items CSV.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub async fn enrich_items(config: &Config, input: &Path, output: &Path, limit: Option<usize>) -> i32 {
        let mut table = match read_table(input) {
            Ok(table) => table,
            Err(e) => {
                error!("Could not read {}: {}", input.display(), error_chain(&e));
                println!("❌ Could not read {}: {}", input.display(), e);
                return EXIT_NO_ROWS;
            }
        };
        table.truncate(limit);
        if table.is_empty() {
            report_outcome(&Outcome::NoRows);
            return EXIT_NO_ROWS;
        }
        if table.column_index(NAME_COLUMN).is_none() {
            warn!("{} has no {} column, every row will miss", input.display(), NAME_COLUMN);
        }
        println!("📥 Loaded {} items from {}", table.rows.len(), input.display());

        let options = SourceOptions {
            filter: Some(name_filter(table.column(NAME_COLUMN))),
            limit: None,
            max_scroll_rounds: config.timing.max_scroll_rounds,
            delay_range: config.timing.delay_range(),
        };
        let codes = match BrowserSession::launch(&config.browser).await {
            Ok(browser) => {
                let codes = Self::source_codes(&browser, ITEM_LIST, config, &options).await;
                browser.quit().await;
                codes
            }
            Err(e) => {
                error!("Browser launch failed: {}", error_chain(&e));
                println!("❌ Could not start the browser: {}", e);
                return EXIT_NO_ROWS;
            }
        };

        let outcome = finish_table(&mut table, &codes, output);
        report_outcome(&outcome);
        if let Outcome::Written { .. } = outcome {
            println!("✅ Wrote {} rows to {}", table.rows.len(), output.display());
        }
        outcome.exit_code()
    }

    pub fn default_enrich_paths(config: &Config) -> (PathBuf, PathBuf) {
        (
            config.output.dir.join(MAGIC_ITEMS_DATA_FILE),
            config.output.dir.join(ENRICHED_ITEMS_FILE),
        )
    }
}
