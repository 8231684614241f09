//! Joining 5e.tools short source codes onto scraped rows by normalized name.

use crate::export::Table;
use crate::normalize::norm_name;
use crate::types::ListingRecord;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Normalized name → short source code. The first code seen for a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCodeMap {
    codes: HashMap<String, String>,
}

impl SourceCodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `code` under the normalized `name` unless one is already present.
    /// Returns whether the entry was stored.
    pub fn insert_first(&mut self, name: &str, code: &str) -> bool {
        let key = norm_name(name);
        if key.is_empty() || code.is_empty() || self.codes.contains_key(&key) {
            return false;
        }
        self.codes.insert(key, code.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.codes.get(&norm_name(name)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Whether every normalized name in `filter` has a code.
    pub fn covers(&self, filter: &HashSet<String>) -> bool {
        filter.iter().all(|key| self.codes.contains_key(key))
    }

    /// Set SOURCE_SHORT on each record; returns how many had no match.
    pub fn apply<R: ListingRecord>(&self, records: &mut [R]) -> usize {
        let mut misses = 0;
        for record in records.iter_mut() {
            let code = self.get(record.name()).unwrap_or_default().to_string();
            if code.is_empty() {
                misses += 1;
            }
            if let Some(slot) = record.source_short_mut() {
                *slot = code;
            }
        }
        report(misses, records.len());
        misses
    }

    /// Fill the SOURCE_SHORT column of a loaded CSV, keyed by its NAME column.
    pub fn apply_to_table(&self, table: &mut Table) -> usize {
        let name_idx = table.column_index(crate::constants::NAME_COLUMN);
        let source_idx = table.ensure_column(crate::constants::SOURCE_SHORT_COLUMN);
        let mut misses = 0;
        for row in table.rows.iter_mut() {
            let name = name_idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("");
            let code = self.get(name).unwrap_or_default().to_string();
            if code.is_empty() {
                misses += 1;
            }
            row[source_idx] = code;
        }
        report(misses, table.rows.len());
        misses
    }
}

/// Normalized names of the records, used to filter the 5e.tools walk.
pub fn name_filter<'a>(names: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
    names
        .into_iter()
        .map(norm_name)
        .filter(|key| !key.is_empty())
        .collect()
}

fn report(misses: usize, total: usize) {
    if misses > 0 {
        println!(
            "⚠️  {}/{} rows had no matching SOURCE_SHORT from 5e.tools (by name)",
            misses, total
        );
    } else if total > 0 {
        println!("✅ All {} rows matched a SOURCE_SHORT", total);
    }
    info!(misses, total, "Applied short source codes");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MagicItemRecord, MonsterRecord};

    #[test]
    fn test_join_boots_of_speed() {
        let mut map = SourceCodeMap::new();
        assert!(map.insert_first("Boots of Speed", "xdmg"));
        let mut items = vec![
            MagicItemRecord { name: "Boots of Speed".into(), ..Default::default() },
            MagicItemRecord { name: "Unknown Trinket".into(), ..Default::default() },
        ];
        let misses = map.apply(&mut items);
        assert_eq!(items[0].source_short, "xdmg");
        assert_eq!(items[1].source_short, "");
        assert_eq!(misses, 1);
    }

    #[test]
    fn test_first_code_wins() {
        let mut map = SourceCodeMap::new();
        assert!(map.insert_first("Boots of Speed", "dmg"));
        assert!(!map.insert_first("BOOTS-OF-SPEED", "xdmg"));
        assert_eq!(map.get("boots of speed!!"), Some("dmg"));
        assert!(!map.insert_first("", "phb"));
        assert!(!map.insert_first("Fireball", ""));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_covers_filter() {
        let mut map = SourceCodeMap::new();
        let filter = name_filter(["Fireball", "Shield", "  "]);
        assert_eq!(filter.len(), 2);
        map.insert_first("Fireball", "xphb");
        assert!(!map.covers(&filter));
        map.insert_first("Shield", "phb");
        assert!(map.covers(&filter));
    }

    #[test]
    fn test_monsters_are_left_alone() {
        let mut map = SourceCodeMap::new();
        map.insert_first("Goblin", "xmm");
        let mut monsters = vec![MonsterRecord { name: "Goblin".into(), ..Default::default() }];
        map.apply(&mut monsters);
        assert_eq!(monsters[0].source, "");
    }

    #[test]
    fn test_apply_to_table_appends_column() {
        let mut table = Table {
            headers: vec!["ID".into(), "NAME".into()],
            rows: vec![
                vec!["1".into(), "Boots of Speed".into()],
                vec!["2".into(), "Nothing".into()],
            ],
        };
        let mut map = SourceCodeMap::new();
        map.insert_first("boots of speed", "xdmg");
        let misses = map.apply_to_table(&mut table);
        assert_eq!(table.headers, vec!["ID", "NAME", "SOURCE_SHORT"]);
        assert_eq!(table.rows[0], vec!["1", "Boots of Speed", "xdmg"]);
        assert_eq!(table.rows[1][2], "");
        assert_eq!(misses, 1);
    }
}
