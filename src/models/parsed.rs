//! Loose parser output shape
//!
//! Both extraction tracks (pattern-based and model-assisted) produce a
//! `ParsedRecipe`. Numeric fields arrive as numbers, strings (`"30-45
//! minutes"`, `"2-4"`) or not at all, so they are held in a tagged variant
//! and coerced centrally by the repair pass. This shape never leaves the
//! extractor layer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static FIRST_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// A numeric field as produced by a parser: number, raw text, or absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumOrText {
    Number(f64),
    Text(String),
    #[default]
    Absent,
}

impl NumOrText {
    pub fn is_absent(&self) -> bool {
        matches!(self, NumOrText::Absent)
    }

    /// First integer in the value; ranges coerce to the low end.
    ///
    /// `"30-45 minutes"` → 30, `"2-4"` → 2, `12.0` → 12, `"soonish"` → None.
    pub fn first_integer(&self) -> Option<i64> {
        match self {
            NumOrText::Number(n) if n.is_finite() && *n >= 0.0 => Some(*n as i64),
            NumOrText::Text(s) => FIRST_INT
                .find(s)
                .and_then(|m| m.as_str().parse::<i64>().ok()),
            _ => None,
        }
    }

    /// Numeric value preserving fractional parts; text coerces like
    /// [`Self::first_integer`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumOrText::Number(n) if n.is_finite() && *n >= 0.0 => Some(*n),
            NumOrText::Text(s) => self::parse_leading_number(s),
            _ => None,
        }
    }
}

/// Parse a leading number out of loose text, handling fractions.
/// `"1/2"` → 0.5, `"1 1/2 cups"` → 1.5, `"2-4"` → 2.0.
fn parse_leading_number(s: &str) -> Option<f64> {
    static LEADING: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(\d+(?:\.\d+)?)?(?:\s*(\d+)\s*/\s*(\d+))?").unwrap()
    });
    let caps = LEADING.captures(s)?;
    let whole: Option<f64> = caps.get(1).and_then(|m| m.as_str().parse().ok());
    let frac = match (caps.get(2), caps.get(3)) {
        (Some(n), Some(d)) => {
            let n: f64 = n.as_str().parse().ok()?;
            let d: f64 = d.as_str().parse().ok()?;
            if d == 0.0 {
                None
            } else {
                Some(n / d)
            }
        }
        _ => None,
    };
    match (whole, frac) {
        (Some(w), Some(f)) => Some(w + f),
        (Some(w), None) => Some(w),
        (None, Some(f)) => Some(f),
        (None, None) => None,
    }
}

/// One ingredient as a parser saw it, before repair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedIngredient {
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Recipe as a parser saw it, before repair and coercion.
///
/// Every field is lenient: unknown enum values are carried as strings and
/// normalized downstream, missing fields default to empty/absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedRecipe {
    pub title: String,
    pub description: Option<String>,
    pub ingredients: Vec<ParsedIngredient>,
    pub instructions: Vec<String>,
    pub prep_time: NumOrText,
    pub cook_time: NumOrText,
    pub total_time: NumOrText,
    pub servings: NumOrText,
    pub difficulty: Option<String>,
    pub cuisine_type: Option<String>,
    pub meal_type: Option<String>,
    pub dietary_tags: Vec<String>,
}
