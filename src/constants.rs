/// Site, file and column constants shared across the scrapers.
/// Column lists are the fixed CSV headers; their order is part of the output format.

// Sites
pub const DDB_BASE_URL: &str = "https://www.dndbeyond.com";
pub const FIVETOOLS_BASE_URL: &str = "https://5e.tools";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/121.0.0.0 Safari/537.36";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

// Entity names (used in CLI, URLs and file names)
pub const SPELLS: &str = "spells";
pub const MAGIC_ITEMS: &str = "magic-items";
pub const MONSTERS: &str = "monsters";

// Output files
pub const DEFAULT_OUTPUT_DIR: &str = "data";
pub const SPELLS_URLS_FILE: &str = "dndbeyond-spells-urls.csv";
pub const SPELLS_DATA_FILE: &str = "dndbeyond-spells-data.csv";
pub const MAGIC_ITEMS_URLS_FILE: &str = "dndbeyond-magicitems-urls.csv";
pub const MAGIC_ITEMS_DATA_FILE: &str = "dndbeyond-magicitems-data.csv";
pub const MONSTERS_URLS_FILE: &str = "dndbeyond-monsters-urls.csv";
pub const MONSTERS_DATA_FILE: &str = "dndbeyond-monsters-data.csv";
pub const ENRICHED_ITEMS_FILE: &str = "magicitems-with-sources.csv";

pub const DEFAULT_CONFIG_FILE: &str = "ddb_scraper.toml";

// Column headers
pub const SOURCE_SHORT_COLUMN: &str = "SOURCE_SHORT";
pub const NAME_COLUMN: &str = "NAME";

pub const URL_INDEX_COLUMNS: &[&str] = &["ID", "NAME", "URL"];

pub const MAGIC_ITEM_COLUMNS: &[&str] = &[
    "ID",
    "NAME",
    "NAME_LOWER",
    "RARITY",
    "TYPE",
    "ATTUNEMENT",
    "NOTES",
    "SOURCE",
    "URL",
    "SOURCE_SHORT",
    "SLUG",
];

pub const SPELL_COLUMNS: &[&str] = &[
    "ID",
    "NAME",
    "NAME_LOWER",
    "LEVEL",
    "CASTING_TIME",
    "RANGE",
    "AREA",
    "AREA_SHAPE",
    "COMPONENTS",
    "MATERIAL_COMPONENTS",
    "DURATION",
    "SCHOOL",
    "ATTACK_SAVE",
    "DAMAGE_EFFECT",
    "CLASSES",
    "SOURCE",
    "URL",
    "SOURCE_SHORT",
    "SLUG",
];

pub const MONSTER_COLUMNS: &[&str] = &[
    "NAME",
    "CR",
    "TYPE",
    "SIZE",
    "ALIGNMENT",
    "HABITAT",
    "SOURCE",
];
