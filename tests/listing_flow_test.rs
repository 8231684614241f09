use async_trait::async_trait;
use ddb_scraper::collector::{collect, CollectOptions, ListingPage, NextPage, RowRead, StopReason};
use ddb_scraper::constants::MAGIC_ITEM_COLUMNS;
use ddb_scraper::error::Result;
use ddb_scraper::pipeline::{finish, Outcome, EXIT_OK};
use ddb_scraper::scrapers::dndbeyond::{identify_row, MagicItemRows, RowParser};
use ddb_scraper::scrapers::fivetools::{collect_source_codes, EntryRead, SourceOptions, SourceRows};
use ddb_scraper::types::{EntityKind, MagicItemRecord};
use std::time::Duration;

const BASE: &str = "https://www.dndbeyond.com";

fn item_row(id: u32, slug: &str, name: &str, rarity: &str) -> String {
    format!(
        r#"<div class="info" data-slug="{id}-{slug}">
            <div class="row item-name">
                <a class="link" href="/magic-items/{id}-{slug}"><span class="name">{name}</span></a>
                <span class="rarity">{rarity}</span>
            </div>
            <div class="row item-type"><span class="type">Wondrous item</span></div>
            <div class="row requires-attunement"><span>——</span></div>
        </div>"#
    )
}

fn panel(source: &str) -> String {
    format!(r#"<div class="more-info"><div class="more-info-footer-source">{source}</div></div>"#)
}

/// Listing pages served from HTML fixtures, parsed with the real row parser.
struct FixtureListing {
    pages: Vec<Vec<String>>,
    current: usize,
}

#[async_trait]
impl ListingPage for FixtureListing {
    type Record = MagicItemRecord;

    async fn wait_ready(&mut self) -> Result<()> {
        Ok(())
    }

    async fn total_pages(&mut self) -> Option<usize> {
        Some(self.pages.len())
    }

    async fn visible_rows(&mut self) -> Result<usize> {
        Ok(self.pages[self.current].len())
    }

    async fn read_row(&mut self, index: usize) -> RowRead<MagicItemRecord> {
        let html = &self.pages[self.current][index];
        let Some(identity) = identify_row(html, EntityKind::MagicItems, BASE) else {
            return RowRead::Unidentified;
        };
        let record = MagicItemRows::parse(html, None, &identity);
        if MagicItemRows::needs_panel(&record) {
            return RowRead::Parsed(MagicItemRows::parse(html, Some(&panel("Dungeon Master's Guide")), &identity));
        }
        RowRead::Parsed(record)
    }

    async fn next_page(&mut self) -> Result<NextPage> {
        if self.current + 1 < self.pages.len() {
            self.current += 1;
            Ok(NextPage::Changed)
        } else {
            Ok(NextPage::Unavailable)
        }
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A 5e.tools item list whose rows are read from link fragments.
struct FixtureSources {
    rows: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl SourceRows for FixtureSources {
    async fn open(&mut self) -> bool {
        true
    }

    async fn row_count(&mut self) -> usize {
        self.rows.len()
    }

    async fn read_entry(&mut self, index: usize) -> EntryRead {
        let (name, fragment) = self.rows[index];
        EntryRead::Entry {
            name: name.to_string(),
            fragment: fragment.to_string(),
        }
    }

    async fn scroll_more(&mut self) {}
}

fn options(limit: Option<usize>) -> CollectOptions {
    CollectOptions {
        limit,
        delay_range: (Duration::ZERO, Duration::ZERO),
        page_delay_range: (Duration::ZERO, Duration::ZERO),
        item_delay: Duration::ZERO,
        max_scroll_rounds: 2,
    }
}

fn listing() -> FixtureListing {
    FixtureListing {
        pages: vec![
            vec![
                item_row(4585, "bag-of-holding", "Bag of Holding", "Uncommon"),
                item_row(4600, "boots-of-speed", "Boots of Speed", "Rare"),
            ],
            vec![
                item_row(4600, "boots-of-speed", "Boots of Speed", "Rare"),
                item_row(4700, "cap-of-water-breathing", "Cap of Water Breathing", "Uncommon"),
            ],
        ],
        current: 0,
    }
}

#[tokio::test]
async fn test_items_scrape_enrich_and_export() {
    let mut page = listing();
    let (records, stats) = collect(&mut page, &options(None)).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.stop_reason, StopReason::NoMoreContent);

    let mut sources = FixtureSources {
        rows: vec![
            ("Boots of Speed", "boots%20of%20speed_xdmg"),
            ("Boots of Speed", "boots%20of%20speed_dmg"),
            ("Bag of Holding", "bag%20of%20holding_xdmg,pg=12"),
        ],
    };
    let source_options = SourceOptions {
        max_scroll_rounds: 1,
        delay_range: (Duration::ZERO, Duration::ZERO),
        ..Default::default()
    };
    let codes = collect_source_codes(&mut sources, &source_options).await;
    assert_eq!(codes.len(), 2);

    let dir = tempfile::tempdir().unwrap();
    let outcome = finish(records, Some(&codes), dir.path());
    assert_eq!(outcome.exit_code(), EXIT_OK);
    assert!(matches!(outcome, Outcome::Written { misses: Some(1), .. }));

    let mut rdr = csv::Reader::from_path(dir.path().join("dndbeyond-magicitems-data.csv")).unwrap();
    let headers: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(headers, MAGIC_ITEM_COLUMNS);
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[1][1], "Boots of Speed");
    assert_eq!(&rows[1][2], "boots of speed");
    assert_eq!(&rows[1][7], "Dungeon Master's Guide");
    assert_eq!(&rows[1][9], "xdmg");
    assert_eq!(&rows[1][10], "boots-of-speed");
    assert_eq!(&rows[2][9], "");

    let urls = std::fs::read_to_string(dir.path().join("dndbeyond-magicitems-urls.csv")).unwrap();
    assert_eq!(
        urls.lines().next_back().unwrap(),
        "4700,Cap of Water Breathing,https://www.dndbeyond.com/magic-items/4700-cap-of-water-breathing"
    );
}

#[tokio::test]
async fn test_limit_stops_mid_listing() {
    let pages = (0..5)
        .map(|p| {
            (0..4)
                .map(|i| {
                    let id = p * 4 + i + 1;
                    item_row(id, &format!("item-{id}"), &format!("Item {id}"), "Common")
                })
                .collect()
        })
        .collect();
    let mut page = FixtureListing { pages, current: 0 };
    let (records, stats) = collect(&mut page, &options(Some(10))).await.unwrap();
    assert_eq!(records.len(), 10);
    assert_eq!(records[9].id, "10");
    assert_eq!(stats.stop_reason, StopReason::LimitReached);
}
