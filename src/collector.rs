//! Paginated listing collector.
//!
//! Walks a listing page by page, extracting each visible row exactly once.
//! The walk is `Loading → Extracting(page) → {NextPage | ScrollMore | Done}`:
//! after a page is exhausted the collector tries the "next" control, then
//! falls back to scrolling for lazily loaded rows, and stops when neither
//! produces anything new or when the row limit is reached.

use crate::config::Config;
use crate::error::Result;
use crate::normalize::format_elapsed;
use crate::types::ListingRecord;
use crate::wait::throttle;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Outcome of reading one row.
#[derive(Debug)]
pub enum RowRead<R> {
    Parsed(R),
    /// The row went stale mid-read and is skipped.
    Stale,
    /// Neither `data-slug` nor a link yielded an id.
    Unidentified,
    Failed(String),
}

/// Outcome of trying the pagination control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPage {
    /// Clicked, and the URL, first row or row count changed.
    Changed,
    /// Clicked, but nothing observably changed before the wait expired.
    Unchanged,
    /// No usable control (absent or disabled).
    Unavailable,
}

/// Browser-facing side of a listing. Rows are addressed by position and
/// re-acquired on every call.
#[async_trait]
pub trait ListingPage: Send {
    type Record: ListingRecord;

    /// Wait for the listing container of the first page.
    async fn wait_ready(&mut self) -> Result<()>;

    /// Best-effort page count for progress output.
    async fn total_pages(&mut self) -> Option<usize>;

    async fn visible_rows(&mut self) -> Result<usize>;

    async fn read_row(&mut self, index: usize) -> RowRead<Self::Record>;

    async fn next_page(&mut self) -> Result<NextPage>;

    async fn scroll_to_bottom(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub limit: Option<usize>,
    pub delay_range: (Duration, Duration),
    pub page_delay_range: (Duration, Duration),
    pub item_delay: Duration,
    pub max_scroll_rounds: usize,
}

impl CollectOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.run.effective_limit(),
            delay_range: config.timing.delay_range(),
            page_delay_range: config.timing.page_delay_range(),
            item_delay: config.timing.item_delay(),
            max_scroll_rounds: config.timing.max_scroll_rounds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    NoMoreContent,
    LimitReached,
    /// Pages kept "changing" without yielding new rows.
    Stalled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoMoreContent => write!(f, "no more content"),
            StopReason::LimitReached => write!(f, "limit reached"),
            StopReason::Stalled => write!(f, "pagination stalled"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectStats {
    pub pages: usize,
    pub rows_seen: usize,
    pub new_rows: usize,
    pub duplicates: usize,
    pub stale_skips: usize,
    pub unidentified: usize,
    pub failures: usize,
    pub stop_reason: StopReason,
}

enum State {
    Extracting { page: usize, from: usize },
    NextPage { page: usize },
    ScrollMore { page: usize, rows: usize },
    Done(StopReason),
}

/// Collect deduplicated rows from a listing opened on its first page.
#[instrument(skip_all)]
pub async fn collect<P: ListingPage>(
    page: &mut P,
    options: &CollectOptions,
) -> Result<(Vec<P::Record>, CollectStats)> {
    let started = Instant::now();
    page.wait_ready().await?;
    let total_pages = page.total_pages().await;
    let total_label = total_pages.map_or_else(|| "?".to_string(), |n| n.to_string());

    let mut rows: Vec<P::Record> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stats = CollectStats::default();
    let mut barren_pages = 0usize;
    let mut state = State::Extracting { page: 1, from: 0 };

    loop {
        state = match state {
            State::Extracting { page: page_no, from } => {
                if from == 0 {
                    stats.pages += 1;
                }
                throttle(options.delay_range).await;
                let visible = page.visible_rows().await.unwrap_or_else(|e| {
                    warn!("Could not list rows on page {}: {}", page_no, e);
                    0
                });
                let mut new_here = 0usize;
                let mut limit_hit = false;

                for index in from..visible {
                    stats.rows_seen += 1;
                    match page.read_row(index).await {
                        RowRead::Parsed(record) => {
                            if seen.insert(record.id().to_string()) {
                                rows.push(record);
                                stats.new_rows += 1;
                                new_here += 1;
                            } else {
                                stats.duplicates += 1;
                            }
                        }
                        RowRead::Stale => {
                            debug!("Row {} went stale, skipping", index);
                            stats.stale_skips += 1;
                        }
                        RowRead::Unidentified => stats.unidentified += 1,
                        RowRead::Failed(reason) => {
                            debug!("Row {} failed: {}", index, reason);
                            stats.failures += 1;
                        }
                    }
                    if options.limit.is_some_and(|limit| rows.len() >= limit) {
                        limit_hit = true;
                        break;
                    }
                    if !options.item_delay.is_zero() {
                        tokio::time::sleep(options.item_delay).await;
                    }
                }

                println!(
                    "{}  Page {}/{}: {} items, {} new, total {}",
                    format_elapsed(started.elapsed()),
                    page_no,
                    total_label,
                    visible,
                    new_here,
                    rows.len()
                );

                if limit_hit {
                    State::Done(StopReason::LimitReached)
                } else if new_here == 0 && from == 0 {
                    barren_pages += 1;
                    if barren_pages > options.max_scroll_rounds {
                        State::Done(StopReason::Stalled)
                    } else {
                        State::NextPage { page: page_no }
                    }
                } else {
                    if new_here > 0 {
                        barren_pages = 0;
                    }
                    if from == 0 {
                        State::NextPage { page: page_no }
                    } else {
                        State::ScrollMore { page: page_no, rows: visible }
                    }
                }
            }
            State::NextPage { page: page_no } => match page.next_page().await {
                Ok(NextPage::Changed) | Ok(NextPage::Unchanged) => {
                    throttle(options.page_delay_range).await;
                    State::Extracting { page: page_no + 1, from: 0 }
                }
                Ok(NextPage::Unavailable) => {
                    let rows_now = page.visible_rows().await.unwrap_or(0);
                    State::ScrollMore { page: page_no, rows: rows_now }
                }
                Err(e) => {
                    warn!("Pagination failed on page {}: {}", page_no, e);
                    let rows_now = page.visible_rows().await.unwrap_or(0);
                    State::ScrollMore { page: page_no, rows: rows_now }
                }
            },
            State::ScrollMore { page: page_no, rows: before } => {
                let mut grown = None;
                for round in 1..=options.max_scroll_rounds {
                    if let Err(e) = page.scroll_to_bottom().await {
                        warn!("Scroll round {} failed: {}", round, e);
                        break;
                    }
                    throttle(options.delay_range).await;
                    let now = page.visible_rows().await.unwrap_or(before);
                    if now > before {
                        debug!("Scroll round {} loaded {} more rows", round, now - before);
                        grown = Some(now);
                        break;
                    }
                }
                match grown {
                    Some(_) => State::Extracting { page: page_no, from: before },
                    None => State::Done(StopReason::NoMoreContent),
                }
            }
            State::Done(reason) => {
                stats.stop_reason = reason;
                break;
            }
        };
    }

    let kind = <P::Record as ListingRecord>::KIND;
    info!(
        kind = %kind,
        pages = stats.pages,
        collected = rows.len(),
        duplicates = stats.duplicates,
        stale = stats.stale_skips,
        unidentified = stats.unidentified,
        failures = stats.failures,
        "Listing walk finished: {}",
        stats.stop_reason
    );
    Ok((rows, stats))
}
