//! Text normalization shared by the listing parsers and the name join.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static DATA_SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)-(.*)$").unwrap());
static DASH_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-–—]+$").unwrap());
static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((.*?)\)").unwrap());
static PAREN_STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(.*\)\s*").unwrap());
static MATERIAL_LEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[*\s\-–:]*").unwrap());
static MATERIAL_LEAD2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\-\s:]*").unwrap());
static SCHOOL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z\s'-]+").unwrap());

const AREA_SHAPES: &[&str] = &[
    "cube",
    "sphere",
    "line",
    "cone",
    "radius",
    "hemisphere",
    "cylinder",
    "circle",
    "square",
];

/// Collapse all runs of whitespace to single spaces and trim.
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join key: lowercase, ASCII alphanumerics only.
pub fn norm_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// `MM:SS:mmm`, minutes not wrapped at the hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}:{:02}:{:03}", total / 60, total % 60, elapsed.subsec_millis())
}

/// `(id, slug)` from a `data-slug` value such as `"1234-bag-of-holding"`.
pub fn parse_data_slug(value: &str) -> Option<(String, String)> {
    let caps = DATA_SLUG_RE.captures(value)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

/// `(id, slug)` from a link such as `/spells/2619-fireball?x=1`.
pub fn parse_id_slug_from_href(href: &str, kind: &str) -> Option<(String, String)> {
    let pattern = format!(r"/{}/(\d+)-([^/?#]+)", regex::escape(kind));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(href)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Slug portion of a listing URL, or empty when the URL does not match.
pub fn slug_from_url(url: &str, kind: &str) -> String {
    parse_id_slug_from_href(url, kind)
        .map(|(_, slug)| slug)
        .unwrap_or_default()
}

/// Short source code from a 5e.tools URL fragment.
///
/// The fragment is cut at the first raw `,` or `&` (encoded commas inside a
/// name survive), percent-decoded, and the text after the last `_` is
/// returned lowercased.
pub fn source_code_from_fragment(fragment: &str) -> Option<String> {
    let fragment = fragment.trim_start_matches('#');
    let main = fragment.split(&[',', '&'][..]).next().unwrap_or_default();
    let decoded = urlencoding::decode(main)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| main.to_string());
    let (_, code) = decoded.rsplit_once('_')?;
    let code = code.trim().to_lowercase();
    (!code.is_empty()).then_some(code)
}

/// Fragment part of a URL, if any.
pub fn fragment_of(url: &str) -> &str {
    url.split_once('#').map(|(_, f)| f).unwrap_or("")
}

/// `"bag-of-holding"` → `"Bag Of Holding"`.
pub fn title_from_slug(slug: &str) -> String {
    clean(&slug.replace(&['-', '_'][..], " "))
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Values consisting only of dashes mean "none" in the listing tables.
pub fn is_dash_only(text: &str) -> bool {
    DASH_ONLY_RE.is_match(text)
}

/// Split a Range/Area cell into `(range, area, shape-from-parenthetical)`.
///
/// `"60 ft (15 ft cube)"` → `("60 ft", "15 ft cube", "cube")`.
pub fn split_range_area(raw: &str) -> (String, String, String) {
    let raw = clean(raw);
    if raw.is_empty() {
        return (String::new(), String::new(), String::new());
    }
    let paren = PAREN_RE
        .captures(&raw)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();
    let range = PAREN_STRIP_RE.replace_all(&raw, "").trim().to_string();
    let lower = paren.to_lowercase();
    let shape = AREA_SHAPES
        .iter()
        .find(|s| lower.contains(*s))
        .map(|s| s.to_string())
        .unwrap_or_default();
    (range, paren, shape)
}

/// `"* - (a bit of sponge)"` → `"a bit of sponge"`.
pub fn clean_material_text(blurb: &str) -> String {
    let t = MATERIAL_LEAD_RE.replace(blurb, "");
    let t = t.trim();
    let t = if t.starts_with('(') && t.ends_with(')') && t.len() >= 2 {
        t[1..t.len() - 1].trim()
    } else {
        t
    };
    clean(&MATERIAL_LEAD2_RE.replace(t, ""))
}

/// Keep only the leading alphabetic phrase of a school cell.
pub fn clean_school(text: &str) -> String {
    SCHOOL_RE
        .find(text)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(clean("  Bag \n of\t Holding  "), "Bag of Holding");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn test_norm_name_variants_collide() {
        assert_eq!(norm_name("Boots of Speed"), "bootsofspeed");
        assert_eq!(norm_name("BOOTS-OF-SPEED"), "bootsofspeed");
        assert_eq!(norm_name("boots of speed!!"), "bootsofspeed");
        assert_eq!(norm_name("boots-of-speed!"), "bootsofspeed");
        assert_eq!(norm_name("+1 Shield"), "1shield");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs_f64(125.250)), "02:05:250");
        assert_eq!(format_elapsed(Duration::from_millis(999)), "00:00:999");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "60:00:000");
    }

    #[test]
    fn test_parse_data_slug() {
        assert_eq!(
            parse_data_slug(" 4585-bag-of-holding"),
            Some(("4585".to_string(), "bag-of-holding".to_string()))
        );
        assert_eq!(parse_data_slug("bag-of-holding"), None);
    }

    #[test]
    fn test_parse_id_slug_from_href() {
        assert_eq!(
            parse_id_slug_from_href("https://www.dndbeyond.com/spells/2619-fireball?src=x", "spells"),
            Some(("2619".to_string(), "fireball".to_string()))
        );
        assert_eq!(parse_id_slug_from_href("/monsters/17-goblin", "spells"), None);
        assert_eq!(slug_from_url("https://www.dndbeyond.com/magic-items/4585-bag-of-holding", "magic-items"), "bag-of-holding");
    }

    #[test]
    fn test_source_code_from_fragment() {
        assert_eq!(source_code_from_fragment("boots%20of%20speed_xdmg"), Some("xdmg".to_string()));
        assert_eq!(source_code_from_fragment("#fireball_PHB,pg:3"), Some("phb".to_string()));
        assert_eq!(source_code_from_fragment("bag%20of%20tricks%2C%20gray_dmg&x"), Some("dmg".to_string()));
        assert_eq!(source_code_from_fragment("nounderscore"), None);
        assert_eq!(source_code_from_fragment(""), None);
    }

    #[test]
    fn test_fragment_of() {
        assert_eq!(fragment_of("https://5e.tools/items.html#boots%20of%20speed_xdmg"), "boots%20of%20speed_xdmg");
        assert_eq!(fragment_of("https://5e.tools/items.html"), "");
    }

    #[test]
    fn test_title_from_slug() {
        assert_eq!(title_from_slug("bag-of-holding"), "Bag Of Holding");
        assert_eq!(title_from_slug("cloak_of-elvenkind"), "Cloak Of Elvenkind");
    }

    #[test]
    fn test_is_dash_only() {
        assert!(is_dash_only("——"));
        assert!(is_dash_only("--"));
        assert!(!is_dash_only("Required"));
        assert!(!is_dash_only(""));
    }

    #[test]
    fn test_split_range_area() {
        assert_eq!(
            split_range_area("60 ft (15 ft cube)"),
            ("60 ft".to_string(), "15 ft cube".to_string(), "cube".to_string())
        );
        assert_eq!(
            split_range_area("Self"),
            ("Self".to_string(), String::new(), String::new())
        );
        assert_eq!(split_range_area(""), (String::new(), String::new(), String::new()));
    }

    #[test]
    fn test_clean_material_text() {
        assert_eq!(clean_material_text("* - (a bit of sponge)"), "a bit of sponge");
        assert_eq!(clean_material_text("*- (a tiny ball of bat guano and sulfur)"), "a tiny ball of bat guano and sulfur");
        assert_eq!(clean_material_text("a feather"), "a feather");
    }

    #[test]
    fn test_clean_school() {
        assert_eq!(clean_school("Evocation"), "Evocation");
        assert_eq!(clean_school("• Conjuration 2"), "Conjuration");
    }
}
