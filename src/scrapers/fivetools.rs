//! 5e.tools list reader: builds a normalized-name → short source code map.
//!
//! Two list pages are supported. The spell list only exposes a row's source
//! in the URL fragment after the row is opened, so each row is clicked. The
//! item list carries the fragment on each row's link, so rows are read
//! without clicking.

use crate::browser::BrowserSession;
use crate::config::TimingConfig;
use crate::enrich::SourceCodeMap;
use crate::error::Result;
use crate::normalize::{clean, format_elapsed, fragment_of, norm_name, source_code_from_fragment};
use crate::types::EntityKind;
use crate::wait::{poll_until, throttle, Backoff};
use async_trait::async_trait;
use fantoccini::elements::Element;
use serde_json::json;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Close buttons of announcement banners, modals and toasts that block clicks.
const OVERLAY_CLOSERS: &[&str] = &[
    ".veapp__spc-announcements .veapp__btn-close",
    ".ui-modal__wrp button",
    ".ui-modal__wrp .ve-btn",
    ".ui-toast__wrp .btn-close",
    ".ui-toast__wrp button",
];

const ENTRY_HEADING: &str = "h1.stats__h-name";
const ROW_LINK: &str = "a.lst__row-inner, a";
const ROW_NAME: &str = "span.bold, span.ve-col-3-5";

/// Pause between scroll rounds while waiting for lazily rendered rows.
const SCROLL_SETTLE: Duration = Duration::from_millis(500);
/// Row-count polls without growth before the initial row wait gives up.
const ROW_WAIT_STAGNATION: usize = 5;
/// Row-count polls without growth before the item list counts as fully rendered.
const PRESCROLL_STAGNATION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStrategy {
    /// Open each row and read the fragment the page navigates to.
    ClickThrough,
    /// Read the fragment from the row link's `href`.
    LinkAttribute,
}

/// One 5e.tools list page and how its rows are read.
#[derive(Debug, Clone, Copy)]
pub struct FiveToolsList {
    pub path: &'static str,
    pub container: &'static str,
    /// Row candidates, first non-empty match wins.
    pub rows: &'static [&'static str],
    pub strategy: RowStrategy,
}

pub const SPELL_LIST: FiveToolsList = FiveToolsList {
    path: "spells.html",
    container: "#list",
    rows: &[
        "#list .lst__row",
        "#list .lst__row-inner",
        "#list [class*='lst__row']",
        "#list [data-list-row]",
        "#list .lst__wrp-cells",
    ],
    strategy: RowStrategy::ClickThrough,
};

pub const ITEM_LIST: FiveToolsList = FiveToolsList {
    path: "items.html",
    container: "div.list.list--stats.magic.ele-magic",
    rows: &["div.list.list--stats.magic.ele-magic a.lst__row-inner"],
    strategy: RowStrategy::LinkAttribute,
};

impl FiveToolsList {
    /// The list holding codes for `kind`; monsters are never enriched.
    pub fn for_kind(kind: EntityKind) -> Option<Self> {
        match kind {
            EntityKind::Spells => Some(SPELL_LIST),
            EntityKind::MagicItems => Some(ITEM_LIST),
            EntityKind::Monsters => None,
        }
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.path)
    }
}

/// Result of reading one list row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryRead {
    Entry { name: String, fragment: String },
    /// The row did not open in time; it is not retried.
    Skipped,
    /// The row reference went stale; it is retried on the next pass.
    Stale,
    Failed(String),
}

/// Browser-facing side of a 5e.tools list.
#[async_trait]
pub trait SourceRows: Send {
    /// Load the list. `false` means no codes can be read.
    async fn open(&mut self) -> bool;

    async fn row_count(&mut self) -> usize;

    async fn read_entry(&mut self, index: usize) -> EntryRead;

    /// Trigger rendering of further rows.
    async fn scroll_more(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Only store these normalized names, and stop once all are matched.
    pub filter: Option<HashSet<String>>,
    /// Stop after this many rows have been read.
    pub limit: Option<usize>,
    pub max_scroll_rounds: usize,
    pub delay_range: (Duration, Duration),
}

impl SourceOptions {
    fn satisfied(&self, codes: &SourceCodeMap, reads: usize) -> bool {
        if let Some(filter) = &self.filter {
            if codes.covers(filter) {
                info!("All {} filtered names matched", filter.len());
                return true;
            }
        }
        if let Some(limit) = self.limit {
            if reads >= limit {
                info!("Reached 5e.tools read limit of {}", limit);
                return true;
            }
        }
        false
    }

    fn wants(&self, key: &str) -> bool {
        self.filter.as_ref().map_or(true, |f| f.contains(key))
    }
}

/// Walk every row of the list and keep the first code seen for each name.
///
/// Never fails: an unreachable list yields an empty map.
#[instrument(skip_all)]
pub async fn collect_source_codes<S: SourceRows>(rows: &mut S, options: &SourceOptions) -> SourceCodeMap {
    let started = Instant::now();
    let mut codes = SourceCodeMap::new();
    if !rows.open().await {
        warn!("5e.tools list unavailable, continuing without short source codes");
        return codes;
    }

    let mut seen: HashSet<usize> = HashSet::new();
    let mut reads = 0usize;
    let mut skipped = 0usize;
    let mut stale = 0usize;
    let mut stagnation = 0usize;

    'passes: loop {
        let count = rows.row_count().await;
        if count == 0 {
            break;
        }
        for index in 0..count {
            if seen.contains(&index) {
                continue;
            }
            if options.satisfied(&codes, reads) {
                break 'passes;
            }
            match rows.read_entry(index).await {
                EntryRead::Entry { name, fragment } => {
                    seen.insert(index);
                    reads += 1;
                    let key = norm_name(&name);
                    if !options.wants(&key) {
                        continue;
                    }
                    match source_code_from_fragment(&fragment) {
                        Some(code) => {
                            if codes.insert_first(&name, &code) {
                                debug!(name = %name, code = %code, "Short source code");
                            }
                        }
                        None => debug!(name = %name, fragment = %fragment, "No code in fragment"),
                    }
                }
                EntryRead::Skipped => {
                    seen.insert(index);
                    skipped += 1;
                }
                EntryRead::Stale => stale += 1,
                EntryRead::Failed(reason) => {
                    seen.insert(index);
                    debug!(index, "Row read failed: {}", reason);
                }
            }
            if reads > 0 && reads % 100 == 0 {
                println!("   5e.tools: {} rows read, {} codes", reads, codes.len());
            }
        }
        if options.satisfied(&codes, reads) {
            break;
        }

        rows.scroll_more().await;
        throttle(options.delay_range).await;
        if rows.row_count().await <= count {
            stagnation += 1;
            if stagnation >= options.max_scroll_rounds {
                debug!(passes = stagnation, "5e.tools list stopped growing");
                break;
            }
        } else {
            stagnation = 0;
        }
    }

    println!(
        "🔗 5e.tools: {} codes from {} rows ({} skipped, {} stale) in {}",
        codes.len(),
        reads,
        skipped,
        stale,
        format_elapsed(started.elapsed())
    );
    codes
}

/// [`SourceRows`] over a live browser session.
pub struct BrowserSourceRows<'a> {
    browser: &'a BrowserSession,
    list: FiveToolsList,
    base_url: String,
    timing: TimingConfig,
    row_selector: Option<&'static str>,
}

impl<'a> BrowserSourceRows<'a> {
    pub fn new(browser: &'a BrowserSession, list: FiveToolsList, base_url: &str, timing: TimingConfig) -> Self {
        Self {
            browser,
            list,
            base_url: base_url.to_string(),
            timing,
            row_selector: None,
        }
    }

    fn host(&self) -> &str {
        let rest = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(self.base_url.as_str());
        rest.split('/').next().unwrap_or(rest)
    }

    async fn rows(&mut self) -> Result<Vec<Element>> {
        if let Some(css) = self.row_selector {
            let found = self.browser.find_all(css).await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        for css in self.list.rows {
            let found = match self.browser.find_all(css).await {
                Ok(found) => found,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if !found.is_empty() {
                self.row_selector = Some(css);
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    async fn container_children(&self) -> usize {
        self.browser
            .execute(
                "const el = document.querySelector(arguments[0]); return el ? el.children.length : 0;",
                vec![json!(self.list.container)],
            )
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize
    }

    /// Ready state and list container, both within `timeout`.
    async fn wait_base(&self, timeout: Duration) -> Result<()> {
        let backoff = self.timing.backoff();
        poll_until("document ready", timeout, backoff, || async move {
            self.browser.ready_state_complete().await.ok().filter(|ready| *ready)
        })
        .await?;
        poll_until("5e.tools list container", timeout, backoff, || async move {
            self.browser
                .find_all(self.list.container)
                .await
                .ok()
                .filter(|found| !found.is_empty())
        })
        .await?;
        Ok(())
    }

    async fn dismiss_overlays(&self) {
        for css in OVERLAY_CLOSERS {
            let Ok(buttons) = self.browser.find_all(css).await else {
                continue;
            };
            for button in buttons {
                if self.browser.is_displayed(&button).await.unwrap_or(false) {
                    if let Err(e) = self.browser.click(&button).await {
                        debug!("Overlay close failed for {}: {}", css, e);
                    }
                }
            }
        }
    }

    async fn scroll_container(&self) {
        let scrolled = match self.browser.find_all(self.list.container).await {
            Ok(found) => match found.first() {
                Some(container) => self.browser.scroll_element(container).await.is_ok(),
                None => false,
            },
            Err(_) => false,
        };
        if !scrolled {
            let _ = self.browser.scroll_to_bottom().await;
        }
    }

    /// Poll for rows, scrolling between attempts, until the timeout or until
    /// the container stops changing.
    async fn wait_rows(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut last_len = None;
        let mut stagnation = 0;
        while Instant::now() < deadline {
            if let Ok(found) = self.rows().await {
                if !found.is_empty() {
                    info!("Found {} rows on {}", found.len(), self.list.path);
                    return true;
                }
            }
            self.scroll_container().await;
            sleep(SCROLL_SETTLE).await;
            let len = self.container_children().await;
            if last_len == Some(len) {
                stagnation += 1;
            } else {
                stagnation = 0;
            }
            last_len = Some(len);
            if stagnation > ROW_WAIT_STAGNATION {
                break;
            }
        }
        false
    }

    /// Scroll the page until the row count holds still for a few rounds.
    async fn prescroll(&mut self) {
        let mut last = 0;
        let mut stagnation = 0;
        while stagnation < PRESCROLL_STAGNATION {
            let _ = self.browser.scroll_to_bottom().await;
            sleep(SCROLL_SETTLE).await;
            let count = self.rows().await.map(|r| r.len()).unwrap_or(last);
            if count == last {
                stagnation += 1;
            } else {
                stagnation = 0;
                last = count;
            }
        }
        debug!(rows = last, "Item list fully rendered");
    }

    async fn try_open(&mut self) -> Result<bool> {
        let url = self.list.url(&self.base_url);
        self.browser.goto(&url).await?;
        sleep(Duration::from_secs(2)).await;

        let current = self.browser.current_url().await?;
        if !current.contains(self.host()) {
            warn!("Redirected away from 5e.tools to {}", current);
            return Ok(false);
        }

        let max_wait = self.timing.fivetools_max_wait();
        self.wait_base(max_wait).await?;
        self.dismiss_overlays().await;
        if !self.wait_rows(max_wait).await {
            warn!("No rows on {}, refreshing once", self.list.path);
            self.browser.refresh().await?;
            self.wait_base(max_wait).await?;
            self.dismiss_overlays().await;
            if !self.wait_rows(max_wait / 2).await {
                return Ok(false);
            }
        }
        if self.list.strategy == RowStrategy::LinkAttribute {
            self.prescroll().await;
        }
        Ok(true)
    }

    async fn click_through(&mut self, row: &Element) -> Result<Option<(String, String)>> {
        let link = self.browser.find_in(row, ROW_LINK).await?.unwrap_or_else(|| row.clone());
        let _ = self.browser.scroll_into_view(&link).await;
        sleep(Duration::from_millis(50)).await;

        let browser = self.browser;
        let before = browser.current_url().await?;
        let before = fragment_of(&before);
        if let Err(e) = self.browser.js_click(&link).await {
            if e.is_stale() {
                return Err(e);
            }
            self.browser.click(&link).await?;
        }

        let opened = poll_until(
            "row fragment change",
            self.timing.fivetools_row_wait(),
            Backoff::fixed(Duration::from_millis(100)),
            || async move {
                let url = browser.current_url().await.ok()?;
                let fragment = fragment_of(&url);
                (!fragment.is_empty() && fragment != before).then(|| fragment.to_string())
            },
        )
        .await;
        let fragment = match opened {
            Ok(fragment) => fragment,
            Err(e) if e.is_timeout() => return Ok(None),
            Err(e) => return Err(e),
        };

        let heading = poll_until(
            "entry heading",
            self.timing.fivetools_max_wait(),
            self.timing.backoff(),
            || async move { browser.find_all(ENTRY_HEADING).await.ok()?.into_iter().next() },
        )
        .await;
        let name = match heading {
            Ok(el) => clean(&browser.text(&el).await?),
            Err(_) => String::new(),
        };
        Ok(Some((name, fragment)))
    }

    async fn link_attribute(&mut self, row: &Element) -> Result<(String, String)> {
        let name = match self.browser.find_in(row, ROW_NAME).await? {
            Some(span) => clean(&self.browser.text(&span).await?),
            None => clean(&self.browser.text(row).await?),
        };
        let href = self.browser.attr(row, "href").await?.unwrap_or_default();
        Ok((name, fragment_of(&href).to_string()))
    }
}

#[async_trait]
impl SourceRows for BrowserSourceRows<'_> {
    async fn open(&mut self) -> bool {
        match self.try_open().await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("5e.tools did not load: {}", e);
                false
            }
        }
    }

    async fn row_count(&mut self) -> usize {
        self.rows().await.map(|r| r.len()).unwrap_or(0)
    }

    async fn read_entry(&mut self, index: usize) -> EntryRead {
        let row = match self.rows().await {
            Ok(rows) => match rows.into_iter().nth(index) {
                Some(row) => row,
                None => return EntryRead::Stale,
            },
            Err(e) => return EntryRead::Failed(e.to_string()),
        };
        let read = match self.list.strategy {
            RowStrategy::ClickThrough => self.click_through(&row).await,
            RowStrategy::LinkAttribute => self.link_attribute(&row).await.map(Some),
        };
        match read {
            Ok(Some((name, fragment))) => EntryRead::Entry { name, fragment },
            Ok(None) => EntryRead::Skipped,
            Err(e) if e.is_stale() => EntryRead::Stale,
            Err(e) => EntryRead::Failed(e.to_string()),
        }
    }

    async fn scroll_more(&mut self) {
        match self.list.strategy {
            RowStrategy::ClickThrough => self.scroll_container().await,
            RowStrategy::LinkAttribute => {
                let _ = self.browser.scroll_to_bottom().await;
            }
        }
        sleep(SCROLL_SETTLE).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Scripted list: rows become visible in batches as the list is scrolled.
    struct FakeRows {
        opens: bool,
        entries: Vec<EntryRead>,
        visible: usize,
        batch: usize,
        reads: usize,
        /// Index → number of stale reads before it resolves.
        stale_once: HashMap<usize, usize>,
    }

    impl FakeRows {
        fn new(entries: Vec<EntryRead>, batch: usize) -> Self {
            Self {
                opens: true,
                visible: batch.min(entries.len()),
                entries,
                batch,
                reads: 0,
                stale_once: HashMap::new(),
            }
        }
    }

    fn entry(name: &str, fragment: &str) -> EntryRead {
        EntryRead::Entry {
            name: name.to_string(),
            fragment: fragment.to_string(),
        }
    }

    #[async_trait]
    impl SourceRows for FakeRows {
        async fn open(&mut self) -> bool {
            self.opens
        }

        async fn row_count(&mut self) -> usize {
            self.visible
        }

        async fn read_entry(&mut self, index: usize) -> EntryRead {
            self.reads += 1;
            if let Some(left) = self.stale_once.get_mut(&index) {
                if *left > 0 {
                    *left -= 1;
                    return EntryRead::Stale;
                }
            }
            self.entries[index].clone()
        }

        async fn scroll_more(&mut self) {
            self.visible = (self.visible + self.batch).min(self.entries.len());
        }
    }

    fn options() -> SourceOptions {
        SourceOptions {
            filter: None,
            limit: None,
            max_scroll_rounds: 2,
            delay_range: (Duration::ZERO, Duration::ZERO),
        }
    }

    #[tokio::test]
    async fn test_first_occurrence_wins_across_batches() {
        let mut rows = FakeRows::new(
            vec![
                entry("Fireball", "fireball_phb"),
                entry("Shield", "shield_phb"),
                entry("Fireball", "fireball_xphb"),
                entry("Boots of Speed", "boots%20of%20speed_xdmg"),
            ],
            2,
        );
        let codes = collect_source_codes(&mut rows, &options()).await;
        assert_eq!(codes.len(), 3);
        assert_eq!(codes.get("Fireball"), Some("phb"));
        assert_eq!(codes.get("boots of speed"), Some("xdmg"));
    }

    #[tokio::test]
    async fn test_filter_stores_only_wanted_and_exits_early() {
        let mut rows = FakeRows::new(
            vec![
                entry("Acid Splash", "acid%20splash_xphb"),
                entry("Fireball", "fireball_xphb"),
                entry("Shield", "shield_xphb"),
                entry("Wish", "wish_xphb"),
            ],
            4,
        );
        let opts = SourceOptions {
            filter: Some(crate::enrich::name_filter(["Fireball"])),
            ..options()
        };
        let codes = collect_source_codes(&mut rows, &opts).await;
        assert_eq!(codes.len(), 1);
        assert_eq!(codes.get("fireball"), Some("xphb"));
        assert_eq!(rows.reads, 2);
    }

    #[tokio::test]
    async fn test_read_limit() {
        let entries = (0..10).map(|i| entry(&format!("Spell {}", i), &format!("spell%20{}_phb", i))).collect();
        let mut rows = FakeRows::new(entries, 10);
        let opts = SourceOptions { limit: Some(3), ..options() };
        let codes = collect_source_codes(&mut rows, &opts).await;
        assert_eq!(codes.len(), 3);
        assert_eq!(rows.reads, 3);
    }

    #[tokio::test]
    async fn test_timeouts_skipped_and_stale_retried() {
        let mut rows = FakeRows::new(
            vec![
                EntryRead::Skipped,
                entry("Shield", "shield_phb"),
                EntryRead::Failed("boom".into()),
                entry("Light", "light"),
            ],
            4,
        );
        rows.stale_once.insert(1, 1);
        let codes = collect_source_codes(&mut rows, &options()).await;
        assert_eq!(codes.get("shield"), Some("phb"));
        assert_eq!(codes.get("light"), None);
        assert_eq!(codes.len(), 1);
        // 4 reads in the first pass, one retry of the stale row.
        assert_eq!(rows.reads, 5);
    }

    #[tokio::test]
    async fn test_unavailable_list_yields_empty_map() {
        let mut rows = FakeRows::new(vec![entry("Shield", "shield_phb")], 1);
        rows.opens = false;
        let codes = collect_source_codes(&mut rows, &options()).await;
        assert!(codes.is_empty());
        assert_eq!(rows.reads, 0);
    }

    #[test]
    fn test_list_for_kind() {
        assert_eq!(FiveToolsList::for_kind(EntityKind::Spells).unwrap().strategy, RowStrategy::ClickThrough);
        let items = FiveToolsList::for_kind(EntityKind::MagicItems).unwrap();
        assert_eq!(items.strategy, RowStrategy::LinkAttribute);
        assert_eq!(items.url("https://5e.tools/"), "https://5e.tools/items.html");
        assert!(FiveToolsList::for_kind(EntityKind::Monsters).is_none());
    }
}
