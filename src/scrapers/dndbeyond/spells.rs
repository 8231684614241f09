use super::{with_fragments, RowIdentity, RowParser};
use crate::normalize::{clean, clean_material_text, clean_school, split_range_area, title_from_slug};
use crate::selectors::{
    attr_of, element_text, find_all, first_non_empty, first_text, statblock_value, text_of,
};
use crate::types::SpellRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::ElementRef;

static AOE_ICON_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"i-aoe-([a-z0-9_-]+)").unwrap());
static COMPONENTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:V|S|M)(?:\s*,\s*(?:V|S|M))*\b(?:\s*\*)?").unwrap());
static SCHOOL_TAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"•.*$").unwrap());
static VERBAL_TAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bV\b.*$").unwrap());

pub struct SpellRows;

impl RowParser for SpellRows {
    type Record = SpellRecord;

    const TOGGLE: &'static str = ".row.spell-indicator .spell-color";
    const NAME_LINK: &'static str = ".row.spell-name a";
    const PANEL_READY: &'static [&'static str] = &[".ddb-statblock"];

    fn parse(row_html: &str, panel_html: Option<&str>, identity: &RowIdentity) -> SpellRecord {
        with_fragments(row_html, panel_html, |row, panel| parse_spell(row, panel, identity))
    }

    fn needs_panel(record: &SpellRecord) -> bool {
        record.area_shape.is_empty()
            || record.classes.is_empty()
            || record.source.is_empty()
            || (record.has_material_component() && record.material_components.is_empty())
    }
}

/// Panel statblock first, compact row cells second.
pub fn parse_spell(
    row: ElementRef<'_>,
    panel: Option<ElementRef<'_>>,
    identity: &RowIdentity,
) -> SpellRecord {
    let stat = |label: &str| panel.map(|p| statblock_value(p, label)).unwrap_or_default();

    let level = first_non_empty(&[&|| stat("Level"), &|| text_of(row, ".row.spell-level span")]);
    let casting_time = first_non_empty(&[
        &|| stat("Casting Time"),
        &|| text_of(row, ".row.spell-cast-time span"),
    ]);
    let range_raw = first_non_empty(&[&|| stat("Range/Area"), &|| row_range(row)]);
    let components = first_non_empty(&[&|| stat("Components"), &|| row_components(row)]);
    let duration = first_non_empty(&[
        &|| stat("Duration"),
        &|| text_of(row, ".row.spell-duration span"),
    ]);
    let school = first_non_empty(&[&|| stat("School"), &|| row_school(row)]);
    let attack_save = first_non_empty(&[
        &|| stat("Attack/Save"),
        &|| first_text(row, &[".row.spell-attack-save span", ".row.spell-attack-save"]),
    ]);
    let damage_effect = first_non_empty(&[
        &|| stat("Damage/Effect"),
        &|| first_text(row, &[".row.spell-damage-effect span", ".row.spell-damage-effect"]),
    ]);
    let icon_shape = first_non_empty(&[
        &|| panel.map(aoe_icon_shape).unwrap_or_default(),
        &|| aoe_icon_shape(row),
    ]);

    let (range, area, paren_shape) = split_range_area(&range_raw);
    let area_shape = if icon_shape.is_empty() { paren_shape } else { icon_shape };

    let mut spell = SpellRecord {
        id: identity.id.clone(),
        name: first_non_empty(&[&|| row_name(row), &|| title_from_slug(&identity.slug)]),
        level,
        casting_time,
        range,
        area,
        area_shape,
        components,
        duration,
        school: if school.is_empty() { school } else { clean_school(&school) },
        attack_save,
        damage_effect,
        url: identity.url.clone(),
        slug: identity.slug.clone(),
        ..Default::default()
    };

    if let Some(panel) = panel {
        spell.classes = class_tags(panel);
        spell.source = text_of(panel, ".more-info-footer-source");
        if spell.has_material_component() {
            let blurb = text_of(panel, ".components-blurb");
            if !blurb.is_empty() {
                spell.material_components = clean_material_text(&blurb);
            }
        }
    }
    spell
}

/// Name link text, else the name cell up to the first bullet.
fn row_name(row: ElementRef<'_>) -> String {
    first_non_empty(&[
        &|| text_of(row, ".row.spell-name a"),
        &|| {
            let cell = text_of(row, ".row.spell-name");
            clean(cell.split('•').next().unwrap_or_default())
        },
    ])
}

fn row_range(row: ElementRef<'_>) -> String {
    let distance = text_of(row, ".row.spell-range .range-distance");
    if distance.is_empty() {
        return text_of(row, ".row.spell-range");
    }
    let aoe = text_of(row, ".row.spell-range .aoe-size");
    clean(&format!("{} {}", distance, aoe))
}

fn row_components(row: ElementRef<'_>) -> String {
    let cell = text_of(row, ".row.spell-name");
    if let Some(m) = COMPONENTS_RE.find(&cell) {
        return m.as_str().to_string();
    }
    let spans = find_all(row, ".row.spell-name span");
    match spans.as_slice() {
        [_, .., last] => element_text(*last),
        _ => String::new(),
    }
}

/// The school sits in the second span of the name cell, before the bullet.
fn row_school(row: ElementRef<'_>) -> String {
    let spans = find_all(row, ".row.spell-name span");
    if let Some(second) = spans.get(1) {
        let text = element_text(*second);
        let text = SCHOOL_TAIL_RE.replace(&text, "");
        let text = VERBAL_TAIL_RE.replace(text.trim(), "");
        let text = text.trim();
        if text.chars().any(|c| c.is_ascii_alphabetic()) {
            return text.to_string();
        }
    }
    text_of(row, ".row.spell-school")
}

/// Shape token from an `<i class="i-aoe-cube">` icon.
fn aoe_icon_shape(root: ElementRef<'_>) -> String {
    let class = attr_of(root, ".aoe-size i", "class");
    AOE_ICON_RE
        .captures(&class)
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

/// Class tags with legacy ones moved to the end.
fn class_tags(panel: ElementRef<'_>) -> Vec<String> {
    let tags: Vec<String> = find_all(panel, ".more-info-footer-classes .tag")
        .into_iter()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();
    let (legacy, current): (Vec<String>, Vec<String>) = tags
        .into_iter()
        .partition(|t| t.to_lowercase().contains("legacy"));
    current.into_iter().chain(legacy).collect()
}
