//! Measurement vocabulary shared by the parsers and the load path
//!
//! Maps the unit spellings seen in scraped text onto canonical measurement
//! rows (name, abbreviation, unit type) for the measurements catalog.

use crate::models::NumOrText;

/// Canonical measurement entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitInfo {
    pub canonical: &'static str,
    pub abbreviation: &'static str,
    pub unit_type: &'static str,
}

const fn unit(canonical: &'static str, abbreviation: &'static str, unit_type: &'static str) -> UnitInfo {
    UnitInfo {
        canonical,
        abbreviation,
        unit_type,
    }
}

const CUP: UnitInfo = unit("cup", "c", "volume");
const TBSP: UnitInfo = unit("tablespoon", "tbsp", "volume");
const TSP: UnitInfo = unit("teaspoon", "tsp", "volume");
const ML: UnitInfo = unit("milliliter", "mL", "volume");
const LITER: UnitInfo = unit("liter", "L", "volume");
const FL_OZ: UnitInfo = unit("fluid ounce", "fl oz", "volume");
const PINT: UnitInfo = unit("pint", "pt", "volume");
const QUART: UnitInfo = unit("quart", "qt", "volume");
const GALLON: UnitInfo = unit("gallon", "gal", "volume");
const OZ: UnitInfo = unit("ounce", "oz", "weight");
const GRAM: UnitInfo = unit("gram", "g", "weight");
const KG: UnitInfo = unit("kilogram", "kg", "weight");
const LB: UnitInfo = unit("pound", "lb", "weight");
const PIECE: UnitInfo = unit("piece", "pc", "count");
const CAN: UnitInfo = unit("can", "can", "count");
const CLOVE: UnitInfo = unit("clove", "clove", "count");
const PINCH: UnitInfo = unit("pinch", "pinch", "count");
const DASH: UnitInfo = unit("dash", "dash", "count");
const PACKAGE: UnitInfo = unit("package", "pkg", "count");
const STICK: UnitInfo = unit("stick", "stick", "count");
const BUNCH: UnitInfo = unit("bunch", "bunch", "count");
const SLICE: UnitInfo = unit("slice", "slice", "count");

/// Look up a unit token (case-insensitive, plural-tolerant).
pub fn lookup_unit(token: &str) -> Option<UnitInfo> {
    let t = token.trim().trim_end_matches('.').to_lowercase();
    let info = match t.as_str() {
        "cup" | "cups" | "c" => CUP,
        "tablespoon" | "tablespoons" | "tbsp" | "tbs" | "tbsps" => TBSP,
        "teaspoon" | "teaspoons" | "tsp" | "tsps" => TSP,
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => ML,
        "l" | "liter" | "liters" | "litre" | "litres" => LITER,
        "fl oz" | "floz" => FL_OZ,
        "pint" | "pints" | "pt" => PINT,
        "quart" | "quarts" | "qt" => QUART,
        "gallon" | "gallons" | "gal" => GALLON,
        "oz" | "ounce" | "ounces" => OZ,
        "g" | "gr" | "gram" | "grams" => GRAM,
        "kg" | "kilogram" | "kilograms" => KG,
        "lb" | "lbs" | "pound" | "pounds" => LB,
        "piece" | "pieces" | "pc" | "pcs" => PIECE,
        "can" | "cans" => CAN,
        "clove" | "cloves" => CLOVE,
        "pinch" | "pinches" => PINCH,
        "dash" | "dashes" => DASH,
        "package" | "packages" | "pkg" | "pack" => PACKAGE,
        "stick" | "sticks" => STICK,
        "bunch" | "bunches" => BUNCH,
        "slice" | "slices" => SLICE,
        _ => return None,
    };
    Some(info)
}

/// Whether a token names a known measurement unit.
pub fn is_unit(token: &str) -> bool {
    lookup_unit(token).is_some()
}

/// Resolve an ingredient's amount text and unit into the numeric amount and
/// catalog measurement used by the relational store.
///
/// Ranges coerce to the low end (`"2-4"` → 2.0). When no explicit unit is
/// given, a trailing unit token inside the amount text is recognised
/// (`"200g"`, `"2 cups"`).
pub fn parse_amount(amount: &str, unit: Option<&str>) -> (Option<f64>, Option<UnitInfo>) {
    let amount = amount.trim();
    let numeric = NumOrText::Text(amount.to_string()).as_f64();

    if let Some(u) = unit.and_then(lookup_unit) {
        return (numeric, Some(u));
    }

    // No explicit unit: look for one embedded in the amount text.
    let embedded = amount
        .split_whitespace()
        .rev()
        .find_map(|tok| lookup_unit(tok.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '/')))
        .or_else(|| {
            // Glued form like "200g" or "4oz"
            let alpha: String = amount.chars().skip_while(|c| !c.is_alphabetic()).collect();
            lookup_unit(&alpha)
        });

    (numeric, embedded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_handles_plurals_and_case() {
        assert_eq!(lookup_unit("Cups").unwrap().canonical, "cup");
        assert_eq!(lookup_unit("tbsp").unwrap().canonical, "tablespoon");
        assert_eq!(lookup_unit("pinches").unwrap().unit_type, "count");
        assert!(lookup_unit("eggplant").is_none());
    }

    #[test]
    fn parse_amount_coerces_ranges_to_low_end() {
        let (n, u) = parse_amount("2-4", None);
        assert_eq!(n, Some(2.0));
        assert!(u.is_none());
    }

    #[test]
    fn parse_amount_finds_embedded_units() {
        let (n, u) = parse_amount("200g", None);
        assert_eq!(n, Some(200.0));
        assert_eq!(u.unwrap().canonical, "gram");

        let (n, u) = parse_amount("2 cups", None);
        assert_eq!(n, Some(2.0));
        assert_eq!(u.unwrap().canonical, "cup");
    }

    #[test]
    fn parse_amount_prefers_explicit_unit() {
        let (n, u) = parse_amount("1/2", Some("cups"));
        assert_eq!(n, Some(0.5));
        assert_eq!(u.unwrap().canonical, "cup");
    }

    #[test]
    fn parse_amount_without_number() {
        let (n, u) = parse_amount("to taste", None);
        assert_eq!(n, None);
        assert!(u.is_none());
    }
}
