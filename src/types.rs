use crate::constants::{
    MAGIC_ITEMS, MAGIC_ITEMS_DATA_FILE, MAGIC_ITEMS_URLS_FILE,
    MAGIC_ITEM_COLUMNS, MONSTERS, MONSTERS_DATA_FILE, MONSTERS_URLS_FILE, MONSTER_COLUMNS,
    SPELLS, SPELLS_DATA_FILE, SPELLS_URLS_FILE, SPELL_COLUMNS,
};
use crate::normalize::slug_from_url;
use serde::{Serialize, Serializer};
use std::fmt;

/// The three D&D Beyond listings this tool knows how to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Spells,
    MagicItems,
    Monsters,
}

impl EntityKind {
    /// Plural name, also the URL path segment on D&D Beyond.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Spells => SPELLS,
            EntityKind::MagicItems => MAGIC_ITEMS,
            EntityKind::Monsters => MONSTERS,
        }
    }

    /// Singular form used in listing and more-info class names.
    pub fn singular(&self) -> &'static str {
        match self {
            EntityKind::Spells => "spell",
            EntityKind::MagicItems => "magic-item",
            EntityKind::Monsters => "monster",
        }
    }

    pub fn listing_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.name())
    }

    pub fn entry_url(&self, base_url: &str, id: &str, slug: &str) -> String {
        format!("{}/{}/{}-{}", base_url.trim_end_matches('/'), self.name(), id, slug)
    }

    pub fn urls_file(&self) -> &'static str {
        match self {
            EntityKind::Spells => SPELLS_URLS_FILE,
            EntityKind::MagicItems => MAGIC_ITEMS_URLS_FILE,
            EntityKind::Monsters => MONSTERS_URLS_FILE,
        }
    }

    pub fn data_file(&self) -> &'static str {
        match self {
            EntityKind::Spells => SPELLS_DATA_FILE,
            EntityKind::MagicItems => MAGIC_ITEMS_DATA_FILE,
            EntityKind::Monsters => MONSTERS_DATA_FILE,
        }
    }

    pub fn data_columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Spells => SPELL_COLUMNS,
            EntityKind::MagicItems => MAGIC_ITEM_COLUMNS,
            EntityKind::Monsters => MONSTER_COLUMNS,
        }
    }

    /// Row container candidates, most specific first.
    pub fn row_selectors(&self) -> Vec<String> {
        vec![
            format!("ul.listing-rpg{} .info", self.singular()),
            "ul.listing .info".to_string(),
            ".listing-body .listing .info".to_string(),
            "div.info[data-slug]".to_string(),
        ]
    }

    pub fn listing_ready_selector(&self) -> String {
        format!(".listing, .listing-rpg{}", self.singular())
    }

    /// Class of the collapsed more-info panel for one row.
    pub fn panel_selector(&self, id: &str, slug: &str) -> String {
        format!(".more-info-{}-{}-{}", self.singular(), id, slug)
    }

    /// Whether 5e.tools short codes are joined onto this kind.
    pub fn supports_enrichment(&self) -> bool {
        !matches!(self, EntityKind::Monsters)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row scraped from a listing page.
///
/// Serialization produces the data CSV row in column order; the URL index
/// row is built from `id`, `name` and `url`.
pub trait ListingRecord: Serialize + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Stable identifier used for deduplication.
    fn id(&self) -> &str;

    /// Display name, also the enrichment join key before normalization.
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    fn url_row(&self) -> [String; 3] {
        [self.id().to_string(), self.name().to_string(), self.url().to_string()]
    }

    /// Mutable SOURCE_SHORT slot, absent for kinds that are never enriched.
    fn source_short_mut(&mut self) -> Option<&mut String> {
        None
    }

    /// Post-processing applied once before export.
    fn finalize(&mut self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MagicItemRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "NAME_LOWER")]
    pub name_lower: String,
    #[serde(rename = "RARITY")]
    pub rarity: String,
    #[serde(rename = "TYPE")]
    pub item_type: String,
    #[serde(rename = "ATTUNEMENT")]
    pub attunement: String,
    #[serde(rename = "NOTES")]
    pub notes: String,
    #[serde(rename = "SOURCE")]
    pub source: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "SOURCE_SHORT")]
    pub source_short: String,
    #[serde(rename = "SLUG")]
    pub slug: String,
}

impl ListingRecord for MagicItemRecord {
    const KIND: EntityKind = EntityKind::MagicItems;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn source_short_mut(&mut self) -> Option<&mut String> {
        Some(&mut self.source_short)
    }

    fn finalize(&mut self) {
        self.name_lower = self.name.to_lowercase();
        if self.slug.is_empty() {
            self.slug = slug_from_url(&self.url, Self::KIND.name());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpellRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "NAME_LOWER")]
    pub name_lower: String,
    #[serde(rename = "LEVEL")]
    pub level: String,
    #[serde(rename = "CASTING_TIME")]
    pub casting_time: String,
    #[serde(rename = "RANGE")]
    pub range: String,
    #[serde(rename = "AREA")]
    pub area: String,
    #[serde(rename = "AREA_SHAPE")]
    pub area_shape: String,
    #[serde(rename = "COMPONENTS")]
    pub components: String,
    #[serde(rename = "MATERIAL_COMPONENTS")]
    pub material_components: String,
    #[serde(rename = "DURATION")]
    pub duration: String,
    #[serde(rename = "SCHOOL")]
    pub school: String,
    #[serde(rename = "ATTACK_SAVE")]
    pub attack_save: String,
    #[serde(rename = "DAMAGE_EFFECT")]
    pub damage_effect: String,
    /// Non-legacy class tags first, then legacy ones.
    #[serde(rename = "CLASSES", serialize_with = "json_array")]
    pub classes: Vec<String>,
    #[serde(rename = "SOURCE")]
    pub source: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "SOURCE_SHORT")]
    pub source_short: String,
    #[serde(rename = "SLUG")]
    pub slug: String,
}

impl SpellRecord {
    /// Material components are only expected when the components list has an M.
    pub fn has_material_component(&self) -> bool {
        self.components
            .split(|c: char| c == ',' || c.is_whitespace())
            .any(|part| part.trim_end_matches('*').eq_ignore_ascii_case("m"))
    }
}

impl ListingRecord for SpellRecord {
    const KIND: EntityKind = EntityKind::Spells;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn source_short_mut(&mut self) -> Option<&mut String> {
        Some(&mut self.source_short)
    }

    fn finalize(&mut self) {
        self.name_lower = self.name.to_lowercase();
        if self.slug.is_empty() {
            self.slug = slug_from_url(&self.url, Self::KIND.name());
        }
    }
}

/// Monsters keep their id and URL for the index file only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonsterRecord {
    #[serde(skip)]
    pub id: String,
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "CR")]
    pub cr: String,
    #[serde(rename = "TYPE")]
    pub monster_type: String,
    #[serde(rename = "SIZE")]
    pub size: String,
    #[serde(rename = "ALIGNMENT")]
    pub alignment: String,
    #[serde(rename = "HABITAT")]
    pub habitat: String,
    #[serde(rename = "SOURCE")]
    pub source: String,
    #[serde(skip)]
    pub url: String,
}

impl ListingRecord for MonsterRecord {
    const KIND: EntityKind = EntityKind::Monsters;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }
}

fn json_array<S: Serializer>(values: &[String], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let json = serde_json::to_string(values).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&json)
}
