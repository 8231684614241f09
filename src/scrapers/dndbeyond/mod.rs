//! D&D Beyond listing pages.
//!
//! [`DdbListing`] drives the browser and implements [`ListingPage`]; the
//! per-kind [`RowParser`]s only see outer HTML and are tested against
//! fixtures.

pub mod magic_items;
pub mod monsters;
pub mod spells;

pub use magic_items::MagicItemRows;
pub use monsters::MonsterRows;
pub use spells::SpellRows;

use crate::browser::BrowserSession;
use crate::collector::{ListingPage, NextPage, RowRead};
use crate::config::TimingConfig;
use crate::error::Result;
use crate::selectors::{exists, fragment_root, max_page_number, row_identity, text_of};
use crate::types::{EntityKind, ListingRecord};
use crate::wait::{poll_until, throttle, Backoff};
use async_trait::async_trait;
use fantoccini::elements::Element;
use scraper::{ElementRef, Html};
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};

const PAGINATION_LINKS: &str = "ul.b-pagination-list a, .b-pagination a";
const NEXT_CONTROL: &str = "ul.b-pagination-list a[rel='next'], .b-pagination a[rel='next'], \
     .b-pagination .b-pagination-item-next a, a[data-next-page]";
const PANEL_SOURCE: &str = ".more-info-footer-source";
const PANEL_BLOCKED_SOURCE: &str = ".ddb-blocked-content-body-text-main";
const PANEL_DESCRIPTION_UPPER: &str = ".more-info-body-description-upper";
const BOOK_HINTS: &[&str] = &["Guide", "Compendium", "Player", "Tasha", "Dungeon"];

/// Identity of one listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIdentity {
    pub id: String,
    pub slug: String,
    pub url: String,
}

/// Per-kind extraction from a row's outer HTML and its more-info panel.
pub trait RowParser: Send + Sync + 'static {
    type Record: ListingRecord;

    /// Toggle inside the row that expands the more-info panel.
    const TOGGLE: &'static str;
    /// Clicked instead of the toggle when the row has none.
    const NAME_LINK: &'static str;
    /// Any of these inside the panel means it has loaded.
    const PANEL_READY: &'static [&'static str];

    fn parse(row_html: &str, panel_html: Option<&str>, identity: &RowIdentity) -> Self::Record;

    /// Whether fields are still missing that only the panel can supply.
    fn needs_panel(record: &Self::Record) -> bool;
}

/// Parse `(id, slug, url)` from a row's outer HTML.
pub fn identify_row(row_html: &str, kind: EntityKind, base_url: &str) -> Option<RowIdentity> {
    let doc = Html::parse_fragment(row_html);
    let row = fragment_root(&doc)?;
    let (id, slug) = row_identity(row, kind.name())?;
    let url = kind.entry_url(base_url, &id, &slug);
    Some(RowIdentity { id, slug, url })
}

pub fn panel_ready(panel_html: &str, ready: &[&str]) -> bool {
    let doc = Html::parse_fragment(panel_html);
    match fragment_root(&doc) {
        Some(panel) => ready.iter().any(|css| exists(panel, css)),
        None => false,
    }
}

/// Source book named in a more-info panel.
///
/// With `allow_description` the upper description block is accepted when it
/// reads like a book title.
pub(crate) fn panel_source(panel: ElementRef<'_>, allow_description: bool) -> String {
    for css in [PANEL_SOURCE, PANEL_BLOCKED_SOURCE] {
        let text = text_of(panel, css);
        if !text.is_empty() {
            return text;
        }
    }
    if allow_description {
        let upper = text_of(panel, PANEL_DESCRIPTION_UPPER);
        if upper.contains(':') || BOOK_HINTS.iter().any(|hint| upper.contains(hint)) {
            return upper;
        }
    }
    String::new()
}

/// Parse a row and optional panel fragment, handing the parser their roots.
pub(crate) fn with_fragments<T>(
    row_html: &str,
    panel_html: Option<&str>,
    f: impl FnOnce(ElementRef<'_>, Option<ElementRef<'_>>) -> T,
) -> T {
    let row_doc = Html::parse_fragment(row_html);
    let row = fragment_root(&row_doc).unwrap_or_else(|| row_doc.root_element());
    let panel_doc = panel_html.map(Html::parse_fragment);
    let panel = panel_doc.as_ref().and_then(fragment_root);
    f(row, panel)
}

/// Panel lookups relative to the row, tried in order.
fn panel_sibling_xpaths(kind: EntityKind) -> [String; 2] {
    [
        format!("./following-sibling::div[contains(@class,'more-info-{}')][1]", kind.singular()),
        "./following-sibling::div[contains(@class,'more-info')][1]".to_string(),
    ]
}

/// Absolute URL for a pagination href.
fn resolve_href(base_url: &str, current_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    } else {
        let path = current_url.split(&['?', '#'][..]).next().unwrap_or(current_url);
        format!("{}{}", path, href)
    }
}

/// A D&D Beyond listing opened in the browser.
pub struct DdbListing<'a, P: RowParser> {
    browser: &'a BrowserSession,
    timing: TimingConfig,
    base_url: String,
    row_selector: Option<String>,
    _parser: PhantomData<P>,
}

impl<'a, P: RowParser> DdbListing<'a, P> {
    pub fn new(browser: &'a BrowserSession, timing: TimingConfig, base_url: &str) -> Self {
        Self {
            browser,
            timing,
            base_url: base_url.to_string(),
            row_selector: None,
            _parser: PhantomData,
        }
    }

    fn kind(&self) -> EntityKind {
        <P::Record as ListingRecord>::KIND
    }

    /// Current row elements, re-acquired on every call.
    async fn rows(&mut self) -> Result<Vec<Element>> {
        if let Some(css) = &self.row_selector {
            let rows = self.browser.find_all(css).await?;
            if !rows.is_empty() {
                return Ok(rows);
            }
        }
        match self.browser.find_first_of(&self.kind().row_selectors()).await? {
            Some((css, rows)) => {
                if self.row_selector.as_deref() != Some(css.as_str()) {
                    debug!("Row selector: {}", css);
                }
                self.row_selector = Some(css);
                Ok(rows)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn first_row_slug(&mut self) -> Option<String> {
        let rows = self.rows().await.ok()?;
        let first = rows.first()?;
        self.browser.attr(first, "data-slug").await.ok().flatten()
    }

    /// The row's more-info panel: by class first, then the following sibling
    /// of this kind, then any following more-info sibling.
    async fn panel_html(&self, row: &Element, identity: &RowIdentity) -> Result<Option<String>> {
        let kind = self.kind();
        match self
            .browser
            .find_all(&kind.panel_selector(&identity.id, &identity.slug))
            .await
        {
            Ok(found) => {
                if let Some(panel) = found.first() {
                    return Ok(Some(self.browser.outer_html(panel).await?));
                }
            }
            Err(e) if e.is_stale() => return Err(e),
            Err(e) => debug!("Panel lookup by class failed: {}", e),
        }
        for xpath in panel_sibling_xpaths(kind) {
            if let Some(panel) = self.browser.find_in_xpath(row, &xpath).await? {
                return Ok(Some(self.browser.outer_html(&panel).await?));
            }
        }
        Ok(None)
    }

    /// Open the row's panel and wait for it to carry content.
    async fn expand(&self, row: &Element, identity: &RowIdentity) -> Result<Option<String>> {
        let target = match self.browser.find_in(row, P::TOGGLE).await? {
            Some(toggle) => Some(toggle),
            None => self.browser.find_in(row, P::NAME_LINK).await?,
        };
        match target {
            Some(el) => {
                if let Err(e) = self.browser.scroll_into_view(&el).await {
                    debug!("Scroll into view failed: {}", e);
                }
                self.browser.click(&el).await?;
            }
            None => debug!("Row {} has no toggle or name link", identity.id),
        }

        let waited = poll_until(
            "more-info panel",
            self.timing.toggle_wait(),
            self.timing.backoff(),
            || async move {
                match self.panel_html(row, identity).await {
                    Ok(Some(html)) if panel_ready(&html, P::PANEL_READY) => Some(html),
                    _ => None,
                }
            },
        )
        .await;

        match waited {
            Ok(html) => Ok(Some(html)),
            Err(e) if e.is_timeout() => {
                debug!("Panel for {} did not fill in: {}", identity.id, e);
                self.panel_html(row, identity).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_read_row(&mut self, index: usize) -> Result<RowRead<P::Record>> {
        let rows = self.rows().await?;
        let Some(row) = rows.get(index) else {
            return Ok(RowRead::Failed(format!("row {} is no longer on the page", index)));
        };
        let row_html = self.browser.outer_html(row).await?;
        let Some(identity) = identify_row(&row_html, self.kind(), &self.base_url) else {
            return Ok(RowRead::Unidentified);
        };

        let mut panel = RowPanel { listing: &*self, row, identity: &identity };
        let record = parse_with_panel::<P, _>(&row_html, &identity, &mut panel).await;
        Ok(RowRead::Parsed(record))
    }
}

/// Access to the more-info panel of the row being read.
#[async_trait]
pub trait PanelSource: Send {
    /// The panel as currently rendered, if any.
    async fn current(&mut self) -> Result<Option<String>>;

    /// Open the panel and wait for it to load.
    async fn expand(&mut self) -> Result<Option<String>>;
}

/// Parse a row, expanding its panel only when panel-only fields are missing.
///
/// Panel errors never drop the row: the fields the row itself shows are kept
/// and the panel-only ones stay empty.
pub async fn parse_with_panel<P: RowParser, S: PanelSource>(
    row_html: &str,
    identity: &RowIdentity,
    source: &mut S,
) -> P::Record {
    let panel = match source.current().await {
        Ok(panel) => panel,
        Err(e) => {
            debug!("Panel lookup for {} failed: {}", identity.id, e);
            None
        }
    };
    let loaded = panel
        .as_deref()
        .is_some_and(|html| panel_ready(html, P::PANEL_READY));
    let record = P::parse(row_html, panel.as_deref(), identity);
    if loaded || !P::needs_panel(&record) {
        return record;
    }

    match source.expand().await {
        Ok(expanded) => P::parse(row_html, expanded.as_deref(), identity),
        Err(e) => {
            debug!("Expanding panel for {} failed, keeping row fields: {}", identity.id, e);
            record
        }
    }
}

struct RowPanel<'r, 'a, P: RowParser> {
    listing: &'r DdbListing<'a, P>,
    row: &'r Element,
    identity: &'r RowIdentity,
}

#[async_trait]
impl<'r, 'a, P: RowParser> PanelSource for RowPanel<'r, 'a, P> {
    async fn current(&mut self) -> Result<Option<String>> {
        self.listing.panel_html(self.row, self.identity).await
    }

    async fn expand(&mut self) -> Result<Option<String>> {
        self.listing.expand(self.row, self.identity).await
    }
}

#[async_trait]
impl<'a, P: RowParser> ListingPage for DdbListing<'a, P> {
    type Record = P::Record;

    async fn wait_ready(&mut self) -> Result<()> {
        let css = self.kind().listing_ready_selector();
        let browser = self.browser;
        poll_until(
            "listing container",
            self.timing.max_wait(),
            self.timing.backoff(),
            || {
                let css = css.clone();
                async move {
                    match browser.find_all(&css).await {
                        Ok(found) if !found.is_empty() => Some(()),
                        _ => None,
                    }
                }
            },
        )
        .await
    }

    async fn total_pages(&mut self) -> Option<usize> {
        let links = self.browser.find_all(PAGINATION_LINKS).await.ok()?;
        let mut pairs = Vec::with_capacity(links.len());
        for link in &links {
            let text = self.browser.text(link).await.unwrap_or_default();
            let href = self.browser.attr(link, "href").await.ok().flatten().unwrap_or_default();
            pairs.push((text, href));
        }
        max_page_number(&pairs)
    }

    async fn visible_rows(&mut self) -> Result<usize> {
        Ok(self.rows().await?.len())
    }

    async fn read_row(&mut self, index: usize) -> RowRead<P::Record> {
        match self.try_read_row(index).await {
            Ok(read) => read,
            Err(e) if e.is_stale() => RowRead::Stale,
            Err(e) => RowRead::Failed(e.to_string()),
        }
    }

    async fn next_page(&mut self) -> Result<NextPage> {
        let Some(next) = self.browser.find_all(NEXT_CONTROL).await?.into_iter().next() else {
            return Ok(NextPage::Unavailable);
        };
        let aria = self.browser.attr(&next, "aria-disabled").await?.unwrap_or_default();
        let class = self.browser.attr(&next, "class").await?.unwrap_or_default();
        if aria.eq_ignore_ascii_case("true") || class.to_lowercase().contains("disabled") {
            debug!("Next control is disabled");
            return Ok(NextPage::Unavailable);
        }
        let href = self.browser.attr(&next, "href").await?.unwrap_or_default();

        let before_url = self.browser.current_url().await?;
        let before_count = self.rows().await?.len();
        let before_first = self.first_row_slug().await;

        if let Err(e) = self.browser.scroll_into_view(&next).await {
            debug!("Scroll to next control failed: {}", e);
        }
        let (min, max) = self.timing.delay_range();
        throttle((min / 2, max / 2)).await;
        if let Err(e) = self.browser.click(&next).await {
            if href.is_empty() {
                return Err(e);
            }
            let target = resolve_href(&self.base_url, &before_url, &href);
            warn!("Next click failed ({}), navigating to {}", e, target);
            self.browser.goto(&target).await?;
        }

        let browser = self.browser;
        let candidates = self.kind().row_selectors();
        let changed = poll_until(
            "next page",
            self.timing.max_wait(),
            Backoff::fixed(Duration::from_millis(500)),
            || {
                let before_url = before_url.clone();
                let before_first = before_first.clone();
                let candidates = candidates.clone();
                async move {
                    if browser.current_url().await.ok()? != before_url {
                        return Some(());
                    }
                    let (_, rows) = browser.find_first_of(&candidates).await.ok()??;
                    let first = match rows.first() {
                        Some(el) => browser.attr(el, "data-slug").await.ok().flatten(),
                        None => None,
                    };
                    let first_changed = matches!(
                        (&before_first, &first),
                        (Some(a), Some(b)) if a != b
                    );
                    (first_changed || rows.len() != before_count).then_some(())
                }
            },
        )
        .await;

        match changed {
            Ok(()) => Ok(NextPage::Changed),
            Err(e) if e.is_timeout() => {
                warn!("Page did not change after clicking next: {}", e);
                Ok(NextPage::Unchanged)
            }
            Err(e) => Err(e),
        }
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.browser.scroll_to_bottom().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScraperError;

    #[test]
    fn test_identify_row_from_data_slug() {
        let id = identify_row(
            r#"<div class="info" data-slug="2619-fireball"><a href="/spells/1-other">x</a></div>"#,
            EntityKind::Spells,
            "https://www.dndbeyond.com",
        )
        .unwrap();
        assert_eq!(id.id, "2619");
        assert_eq!(id.slug, "fireball");
        assert_eq!(id.url, "https://www.dndbeyond.com/spells/2619-fireball");
    }

    #[test]
    fn test_identify_row_without_id() {
        assert!(identify_row(r#"<div class="info">Nothing</div>"#, EntityKind::Monsters, "x").is_none());
    }

    #[test]
    fn test_panel_ready() {
        let ready = r#"<div class="more-info"><div class="ddb-statblock"></div></div>"#;
        assert!(panel_ready(ready, &[".ddb-statblock"]));
        assert!(!panel_ready(r#"<div class="more-info"></div>"#, &[".ddb-statblock"]));
    }

    #[test]
    fn test_panel_source_fallbacks() {
        let html = r#"<div class="more-info">
            <div class="more-info-body-description-upper">Wondrous item, uncommon</div>
            <div class="ddb-blocked-content-body-text-main">Dungeon Master's Guide</div>
        </div>"#;
        let doc = Html::parse_fragment(html);
        let panel = fragment_root(&doc).unwrap();
        assert_eq!(panel_source(panel, true), "Dungeon Master's Guide");

        let html = r#"<div class="more-info"><div class="more-info-body-description-upper">Wondrous item, uncommon</div></div>"#;
        let doc = Html::parse_fragment(html);
        assert_eq!(panel_source(fragment_root(&doc).unwrap(), true), "");

        let html = r#"<div class="more-info"><div class="more-info-body-description-upper">Tasha's Cauldron of Everything</div></div>"#;
        let doc = Html::parse_fragment(html);
        let panel = fragment_root(&doc).unwrap();
        assert_eq!(panel_source(panel, true), "Tasha's Cauldron of Everything");
        assert_eq!(panel_source(panel, false), "");
    }

    struct FakePanel {
        current: Option<&'static str>,
        expanded: std::result::Result<&'static str, ()>,
        expansions: usize,
    }

    #[async_trait]
    impl PanelSource for FakePanel {
        async fn current(&mut self) -> Result<Option<String>> {
            Ok(self.current.map(str::to_string))
        }

        async fn expand(&mut self) -> Result<Option<String>> {
            self.expansions += 1;
            match self.expanded {
                Ok(html) => Ok(Some(html.to_string())),
                Err(()) => Err(ScraperError::Browser("element click intercepted".into())),
            }
        }
    }

    const ITEM_ROW: &str = r#"<div class="info" data-slug="4600-boots-of-speed">
        <div class="row item-name"><a class="link" href="/magic-items/4600-boots-of-speed">Boots of Speed</a>
            <span class="rarity">Rare</span></div>
        <div class="row item-type"><span class="type">Wondrous item</span></div>
    </div>"#;
    const ITEM_PANEL: &str = r#"<div class="more-info more-info-magic-item"><div class="more-info-footer-source">Dungeon Master's Guide</div></div>"#;

    fn boots() -> RowIdentity {
        identify_row(ITEM_ROW, EntityKind::MagicItems, "https://www.dndbeyond.com").unwrap()
    }

    #[tokio::test]
    async fn test_failed_expansion_keeps_row_fields() {
        let mut panel = FakePanel { current: None, expanded: Err(()), expansions: 0 };
        let item = parse_with_panel::<MagicItemRows, _>(ITEM_ROW, &boots(), &mut panel).await;
        assert_eq!(panel.expansions, 1);
        assert_eq!(item.id, "4600");
        assert_eq!(item.name, "Boots of Speed");
        assert_eq!(item.rarity, "Rare");
        assert_eq!(item.item_type, "Wondrous item");
        assert_eq!(item.source, "");
    }

    #[tokio::test]
    async fn test_expansion_fills_panel_fields() {
        let mut panel = FakePanel { current: None, expanded: Ok(ITEM_PANEL), expansions: 0 };
        let item = parse_with_panel::<MagicItemRows, _>(ITEM_ROW, &boots(), &mut panel).await;
        assert_eq!(item.source, "Dungeon Master's Guide");
    }

    #[tokio::test]
    async fn test_loaded_panel_is_not_expanded() {
        let mut panel = FakePanel { current: Some(ITEM_PANEL), expanded: Err(()), expansions: 0 };
        let item = parse_with_panel::<MagicItemRows, _>(ITEM_ROW, &boots(), &mut panel).await;
        assert_eq!(panel.expansions, 0);
        assert_eq!(item.source, "Dungeon Master's Guide");
    }

    #[test]
    fn test_panel_sibling_lookups() {
        let [own, any] = panel_sibling_xpaths(EntityKind::MagicItems);
        assert_eq!(own, "./following-sibling::div[contains(@class,'more-info-magic-item')][1]");
        assert_eq!(any, "./following-sibling::div[contains(@class,'more-info')][1]");
    }

    #[test]
    fn test_resolve_href() {
        let base = "https://www.dndbeyond.com";
        assert_eq!(
            resolve_href(base, "https://www.dndbeyond.com/spells", "/spells?page=2"),
            "https://www.dndbeyond.com/spells?page=2"
        );
        assert_eq!(
            resolve_href(base, "https://www.dndbeyond.com/spells?page=1", "?page=2"),
            "https://www.dndbeyond.com/spells?page=2"
        );
        assert_eq!(resolve_href(base, "", "https://x.test/a"), "https://x.test/a");
    }
}
