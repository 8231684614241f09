use super::{panel_source, with_fragments, RowIdentity, RowParser};
use crate::normalize::{is_dash_only, title_from_slug};
use crate::selectors::{class_list, find, first_non_empty, first_text, text_of};
use crate::types::MagicItemRecord;
use scraper::ElementRef;

pub struct MagicItemRows;

impl RowParser for MagicItemRows {
    type Record = MagicItemRecord;

    const TOGGLE: &'static str = ".row.item-indicator .item-color";
    const NAME_LINK: &'static str = ".row.item-name a.link";
    const PANEL_READY: &'static [&'static str] =
        &[".more-info-footer-source", ".ddb-blocked-content-body-text-main"];

    fn parse(row_html: &str, panel_html: Option<&str>, identity: &RowIdentity) -> MagicItemRecord {
        with_fragments(row_html, panel_html, |row, panel| parse_magic_item(row, panel, identity))
    }

    fn needs_panel(record: &MagicItemRecord) -> bool {
        record.source.is_empty()
    }
}

pub fn parse_magic_item(
    row: ElementRef<'_>,
    panel: Option<ElementRef<'_>>,
    identity: &RowIdentity,
) -> MagicItemRecord {
    let name = first_non_empty(&[
        &|| first_text(row, &[".row.item-name a.link", ".row.item-name .name"]),
        &|| title_from_slug(&identity.slug),
    ]);
    let rarity = first_non_empty(&[
        &|| text_of(row, ".row.item-name .rarity"),
        &|| {
            find(row, ".row.item-name a.link span")
                .and_then(|span| rarity_from_class(&class_list(span)))
                .unwrap_or_default()
                .to_string()
        },
    ]);
    let attunement = text_of(row, ".row.requires-attunement span");
    let attunement = if is_dash_only(&attunement) { String::new() } else { attunement };

    MagicItemRecord {
        id: identity.id.clone(),
        name,
        rarity,
        item_type: text_of(row, ".row.item-type .type"),
        attunement,
        notes: text_of(row, ".row.notes span"),
        source: panel.map(|p| panel_source(p, true)).unwrap_or_default(),
        url: identity.url.clone(),
        slug: identity.slug.clone(),
        ..Default::default()
    }
}

/// Rarity implied by the name span's class, e.g. `very-rare`.
fn rarity_from_class(class: &str) -> Option<&'static str> {
    if class.contains("very-rare") {
        Some("Very Rare")
    } else if class.contains("rare") {
        Some("Rare")
    } else if class.contains("uncommon") {
        Some("Uncommon")
    } else if class.contains("artifact") {
        Some("Artifact")
    } else if class.contains("varies") {
        Some("Varies")
    } else if class.contains("legendary") {
        Some("Legendary")
    } else if class.contains("common") {
        Some("Common")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RowIdentity {
        RowIdentity {
            id: "4585".into(),
            slug: "bag-of-holding".into(),
            url: "https://www.dndbeyond.com/magic-items/4585-bag-of-holding".into(),
        }
    }

    const ROW: &str = r#"<div class="info" data-slug="4585-bag-of-holding">
        <div class="row item-indicator"><div class="item-color"></div></div>
        <div class="row item-name">
            <a class="link" href="/magic-items/4585-bag-of-holding"><span class="name uncommon">Bag of Holding</span></a>
            <span class="rarity">Uncommon</span>
        </div>
        <div class="row item-type"><span class="type">Wondrous item</span></div>
        <div class="row requires-attunement"><span>——</span></div>
        <div class="row notes"><span>Storage,  Utility</span></div>
    </div>"#;

    const PANEL: &str = r#"<div class="more-info more-info-magic-item-4585-bag-of-holding">
        <div class="more-info-body-description">This bag has an interior space...</div>
        <div class="more-info-footer-source">Basic Rules</div>
    </div>"#;

    #[test]
    fn test_parse_row_and_panel() {
        let item = MagicItemRows::parse(ROW, Some(PANEL), &identity());
        assert_eq!(item.id, "4585");
        assert_eq!(item.name, "Bag of Holding");
        assert_eq!(item.rarity, "Uncommon");
        assert_eq!(item.item_type, "Wondrous item");
        assert_eq!(item.attunement, "");
        assert_eq!(item.notes, "Storage, Utility");
        assert_eq!(item.source, "Basic Rules");
        assert_eq!(item.slug, "bag-of-holding");
        assert!(!MagicItemRows::needs_panel(&item));
    }

    #[test]
    fn test_missing_source_needs_panel() {
        let item = MagicItemRows::parse(ROW, None, &identity());
        assert_eq!(item.source, "");
        assert!(MagicItemRows::needs_panel(&item));
    }

    #[test]
    fn test_description_alone_is_not_a_loaded_panel() {
        let partial = r#"<div class="more-info more-info-magic-item-4585-bag-of-holding">
            <div class="more-info-body-description">This bag has an interior space...</div>
        </div>"#;
        assert!(!super::super::panel_ready(partial, MagicItemRows::PANEL_READY));
        assert!(super::super::panel_ready(PANEL, MagicItemRows::PANEL_READY));
    }

    #[test]
    fn test_rarity_from_span_class_and_name_from_slug() {
        let row = r#"<div class="info">
            <div class="row item-name"><a class="link" href="/magic-items/9-x"><span class="very-rare"></span></a></div>
            <div class="row requires-attunement"><span>Requires Attunement by a Wizard</span></div>
        </div>"#;
        let item = MagicItemRows::parse(row, None, &identity());
        assert_eq!(item.rarity, "Very Rare");
        assert_eq!(item.name, "Bag Of Holding");
        assert_eq!(item.attunement, "Requires Attunement by a Wizard");
    }

    #[test]
    fn test_rarity_class_precedence() {
        assert_eq!(rarity_from_class("name uncommon"), Some("Uncommon"));
        assert_eq!(rarity_from_class("name common"), Some("Common"));
        assert_eq!(rarity_from_class("name rare"), Some("Rare"));
        assert_eq!(rarity_from_class("name"), None);
    }
}
