use super::{panel_source, with_fragments, RowIdentity, RowParser};
use crate::normalize::clean;
use crate::selectors::{attr_of, first_non_empty, first_text, text_of};
use crate::types::MonsterRecord;
use scraper::ElementRef;

pub struct MonsterRows;

impl RowParser for MonsterRows {
    type Record = MonsterRecord;

    const TOGGLE: &'static str = ".row.monster-indicator .monster-color";
    const NAME_LINK: &'static str = ".row.monster-name a.link";
    const PANEL_READY: &'static [&'static str] = &[
        ".more-info-footer-source",
        ".ddb-blocked-content-body-text-main",
    ];

    fn parse(row_html: &str, panel_html: Option<&str>, identity: &RowIdentity) -> MonsterRecord {
        with_fragments(row_html, panel_html, |row, panel| parse_monster(row, panel, identity))
    }

    fn needs_panel(record: &MonsterRecord) -> bool {
        record.source.is_empty()
    }
}

pub fn parse_monster(
    row: ElementRef<'_>,
    panel: Option<ElementRef<'_>>,
    identity: &RowIdentity,
) -> MonsterRecord {
    let monster_type = clean(&format!(
        "{} {}",
        text_of(row, ".row.monster-type .type"),
        text_of(row, ".row.monster-type .subtype")
    ));
    // Truncated habitats carry the full list in the title attribute.
    let habitat = first_non_empty(&[
        &|| attr_of(row, ".row.monster-environment span", "title"),
        &|| text_of(row, ".row.monster-environment span"),
    ]);
    let source = first_non_empty(&[
        &|| text_of(row, ".row.monster-name .source"),
        &|| panel.map(|p| panel_source(p, false)).unwrap_or_default(),
    ]);

    MonsterRecord {
        id: identity.id.clone(),
        name: first_text(row, &[".row.monster-name a.link", ".row.monster-name .name"]),
        cr: first_text(row, &[".row.monster-challenge span", ".row.monster-challenge"]),
        monster_type,
        size: text_of(row, ".row.monster-size span"),
        alignment: text_of(row, ".row.monster-alignment span"),
        habitat,
        source,
        url: identity.url.clone(),
    }
}
