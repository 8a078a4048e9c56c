//! Pattern-based recipe extraction
//!
//! Extracts a loose recipe from free-form text (usually markdown-ish forum
//! prose) with heuristics alone: no network, no model. The parser never
//! errors on malformed input; it returns best-effort output and leaves
//! rejection to the validation gate at load time.

use crate::extractors::units;
use crate::models::{NumOrText, ParsedIngredient, ParsedRecipe};
use regex::Regex;
use std::sync::LazyLock;

/// Amount used for a placeholder ingredient row
const PLACEHOLDER_AMOUNT: &str = "See recipe";

/// Single-word cooking verbs that mark a line as an instruction, not an
/// ingredient, when they lead the line.
const COOKING_VERBS: &[&str] = &[
    "add", "bake", "blend", "boil", "coat", "combine", "cook", "cover", "cut", "deglaze",
    "drain", "fill", "fix", "fold", "fry", "garnish", "heat", "knead", "melt", "mix", "place",
    "pour", "preheat", "reduce", "remove", "repeat", "serve", "sift", "simmer", "spread",
    "sprinkle", "stir", "toss", "transfer", "warm", "whisk",
];

/// Leading verb phrases that span two words.
const COOKING_VERB_PHRASES: &[&str] = &["bring to", "set aside", "let rest", "let cool"];

/// Standalone annotations that carry no ingredient.
const ANNOTATIONS: &[&str] = &["to taste", "optional", "as needed", "taste", "needed"];

/// Section-header lines that sometimes leak into ingredient lists.
const SECTION_WORDS: &[&str] = &[
    "preparation", "instructions", "instruction", "directions", "direction", "method",
    "steps", "ingredients", "ingredient list", "what you need",
];

/// Markup fragments that mark a line as leaked formatting.
const LEAKED_MARKUP: &[&str] = &["**", "&amp;", "[video]", "[x200b]", "&#x200b"];

/// Preparation words that separate an ingredient name from its notes.
const PREP_WORDS: &[&str] = &[
    "chopped", "diced", "sliced", "minced", "cut", "peeled", "grated", "shredded", "crushed",
    "cubed", "melted", "softened", "beaten", "divided", "drained", "rinsed", "halved",
    "quartered", "sifted", "toasted", "trimmed", "julienned",
];

/// Main-course indicators that outweigh dessert keywords in meal scoring.
const MAIN_COURSE_WORDS: &[&str] = &[
    "meat", "pasta", "rice", "noodle", "curry", "brat", "sausage", "chicken", "beef", "pork",
    "steak", "salmon", "shrimp",
];

const ADVANCED_TECHNIQUES: &[&str] = &[
    "sous vide", "tempering", "emulsify", "caramelize", "braise", "confit", "deglaze", "flambe",
    "reduce", "blanch", "score",
];

static QTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:about\s+|approx(?:imately)?\.?\s+)?(\d+(?:\.\d+)?(?:\s+\d+\s*/\s*\d+|\s*/\s*\d+(?:st|nd|rd|th)?)?(?:\s*-\s*\d+(?:\.\d+)?)?)\s*(.*)$",
    )
    .unwrap()
});

static PAREN_AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^(\d][^(]{1,}?)\s*\(([^)]*\d[^)]*)\)\s*$").unwrap());

static PAREN_NOTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.{2,}?)\s*\(([^)]+)\)\s*$").unwrap());

static SERVES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\(?\s*serves\s*\d*\s*\)?$").unwrap());

static ING_SECTION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\*\*)?(?:ingredients?|what you need|shopping list)(?:\*\*)?\s*:?").unwrap()
});

static INST_SECTION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\*\*)?(?:instructions?|directions?|method|preparation|steps)(?:\*\*)?\s*:?")
        .unwrap()
});

static ITEM_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s+|\d+\)\s+|[*\-•]\s+|・\s*|\r?\n").unwrap());

static BULLET_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[*\-•・]+\s*|\d+[\.)]\s*)").unwrap());

static NUMBERED_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[\.)]\s+").unwrap());

static PREP_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)prep(?:aration)?[\s-]*time\s*:?\s*(\d[\d\s\-/\.]*\s*(?:minutes?|mins?|hours?|hrs?)?)").unwrap()
});

static COOK_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cook(?:ing)?[\s-]*time\s*:?\s*(\d[\d\s\-/\.]*\s*(?:minutes?|mins?|hours?|hrs?)?)").unwrap()
});

static BAKE_FOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bake\s+(?:for\s+)?(\d[\d\s\-]*\s*(?:minutes?|mins?|hours?|hrs?))").unwrap()
});

static TOTAL_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)total[\s-]*time\s*:?\s*(\d[\d\s\-/\.]*\s*(?:minutes?|mins?|hours?|hrs?)?)").unwrap()
});

static SERVINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:serves|servings?|yields?)\s*:?\s*(\d[\d\s\-/\.]*)").unwrap()
});

/// Local pattern-based recipe parser
#[derive(Debug, Default, Clone)]
pub struct LocalParser;

impl LocalParser {
    pub fn new() -> Self {
        Self
    }

    /// Extract a loose recipe from free text. Never panics, never errors;
    /// unusable input produces placeholder rows that the validation gate
    /// rejects downstream.
    pub fn parse(&self, raw: &str) -> ParsedRecipe {
        let text = unescape(raw);
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        let title = extract_title(&lines);
        let description = extract_description(&lines, &title);
        let ingredients = extract_ingredients(&text);
        let instructions = extract_instructions(&text);

        let lower = text.to_lowercase();
        let title_lower = title.to_lowercase();
        let combined = format!("{} {}", title_lower, lower);

        ParsedRecipe {
            title,
            description,
            ingredients,
            instructions,
            prep_time: capture_time(&PREP_TIME_RE, &text),
            cook_time: capture_time(&COOK_TIME_RE, &text)
                .first_or(capture_time(&BAKE_FOR_RE, &text)),
            total_time: capture_time(&TOTAL_TIME_RE, &text),
            servings: SERVINGS_RE
                .captures(&text)
                .map(|c| NumOrText::Text(c[1].trim().to_string()))
                .unwrap_or_default(),
            difficulty: extract_difficulty(&combined, &text),
            cuisine_type: extract_cuisine(&combined, &title_lower),
            meal_type: score_meal_type(&combined, &title_lower),
            dietary_tags: extract_dietary_tags(&combined),
        }
    }
}

trait FirstOr {
    fn first_or(self, other: NumOrText) -> NumOrText;
}

impl FirstOr for NumOrText {
    fn first_or(self, other: NumOrText) -> NumOrText {
        if self.is_absent() {
            other
        } else {
            self
        }
    }
}

/// Fix common escape leakage from scraped text: literal `\n` / `\t` / `\*`
/// sequences, and double-space paragraph breaks in flattened posts.
fn unescape(text: &str) -> String {
    let mut t = text
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace("\\*", "*");
    if !t.contains('\n') && t.contains("  ") {
        t = t.replace("  ", "\n");
    }
    t.trim().to_string()
}

fn strip_markdown(s: &str) -> String {
    s.replace("**", "")
        .replace("&amp;", "&")
        .replace("\n\n", " ")
        .trim_start_matches('#')
        .trim()
        .to_string()
}

// ============================================================================
// Title and description
// ============================================================================

fn extract_title(lines: &[&str]) -> String {
    static TITLE_PREFIX: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^(?:recipe|title)\s*:\s*(.+)$").unwrap());

    for line in lines.iter().take(5) {
        if let Some(caps) = TITLE_PREFIX.captures(line) {
            return strip_markdown(&caps[1]);
        }
    }

    for line in lines.iter().take(5) {
        let clean = strip_markdown(line);
        if clean.len() < 3 || clean.len() > 150 {
            continue;
        }
        if looks_like_ingredient(&clean) || looks_like_instruction(&clean) {
            continue;
        }
        if is_section_heading(&clean) {
            continue;
        }
        return clean;
    }

    "Untitled Recipe".to_string()
}

fn extract_description(lines: &[&str], title: &str) -> Option<String> {
    let title_idx = lines
        .iter()
        .position(|l| strip_markdown(l) == title)
        .unwrap_or(0);

    for line in lines.iter().skip(title_idx + 1).take(5) {
        let clean = strip_markdown(line);
        if clean.len() < 30 || clean.len() > 300 {
            continue;
        }
        if looks_like_ingredient(&clean)
            || looks_like_instruction(&clean)
            || is_section_heading(&clean)
        {
            continue;
        }
        if clean.chars().all(|c| !c.is_lowercase()) {
            continue;
        }
        return Some(clean);
    }
    None
}

fn is_section_heading(line: &str) -> bool {
    let clean = line
        .trim_matches(|c: char| c == '*' || c == '#' || c == ':' || c.is_whitespace())
        .to_lowercase();
    SECTION_WORDS.contains(&clean.as_str())
}

fn looks_like_ingredient(line: &str) -> bool {
    if !line.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    line.split_whitespace().any(units::is_unit)
}

fn looks_like_instruction(line: &str) -> bool {
    if NUMBERED_LINE.is_match(line) {
        return true;
    }
    line.ends_with('.') && line.split_whitespace().count() >= 6
}

// ============================================================================
// Ingredients
// ============================================================================

/// Byte range of a section body: from the end of the start-heading match to
/// the start of the next section heading (or end of text).
fn section_body<'t>(text: &'t str, start: &Regex, end: Option<&Regex>) -> Option<&'t str> {
    let m = start.find(text)?;
    let body_start = m.end();
    let body_end = end
        .and_then(|re| re.find(&text[body_start..]))
        .map(|n| body_start + n.start())
        .unwrap_or(text.len());
    Some(&text[body_start..body_end])
}

fn extract_ingredients(text: &str) -> Vec<ParsedIngredient> {
    let mut out = Vec::new();

    if let Some(body) = section_body(text, &ING_SECTION_START, Some(&INST_SECTION_START)) {
        for item in ITEM_SPLIT.split(body) {
            let candidate = strip_candidate(item);
            if candidate.len() < 3 {
                continue;
            }
            if is_rejected_ingredient(&candidate) {
                continue;
            }
            if let Some(ing) = parse_ingredient_smart(&candidate) {
                out.push(ing);
                if out.len() >= 30 {
                    break;
                }
            }
        }
    }

    if out.is_empty() {
        out = extract_ingredients_lenient(text);
    }

    if out.is_empty() {
        out.push(ParsedIngredient {
            item: crate::models::recipe::PLACEHOLDER_INGREDIENT.to_string(),
            amount: PLACEHOLDER_AMOUNT.to_string(),
            unit: None,
            notes: None,
        });
    }

    out
}

/// Last-resort pass: any line carrying a measurement is probably an
/// ingredient, section or no section.
fn extract_ingredients_lenient(text: &str) -> Vec<ParsedIngredient> {
    let mut out = Vec::new();
    for line in text.lines() {
        let candidate = strip_candidate(line);
        if candidate.len() < 3 || candidate.len() > 120 {
            continue;
        }
        if is_rejected_ingredient(&candidate) {
            continue;
        }
        let has_measure = candidate.starts_with(|c: char| c.is_ascii_digit())
            || candidate.split_whitespace().any(units::is_unit);
        if !has_measure {
            continue;
        }
        if let Some(ing) = parse_ingredient_smart(&candidate) {
            out.push(ing);
            if out.len() >= 20 {
                break;
            }
        }
    }
    out
}

fn strip_candidate(raw: &str) -> String {
    let s = raw.trim().replace("**", "");
    BULLET_PREFIX.replace(&s, "").trim().to_string()
}

/// Drop filter for ingredient candidates: instruction sentences, section
/// headers, standalone annotations, oversized lines and leaked markup.
pub fn is_rejected_ingredient(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() || t.len() > 200 {
        return true;
    }
    let lower = t.to_lowercase();

    if LEAKED_MARKUP.iter().any(|m| lower.contains(m)) {
        return true;
    }

    let bare = lower.trim_end_matches(':').trim();
    if lower.starts_with("for the ") || bare == "for filling" || bare == "for topping" {
        return true;
    }
    if SECTION_WORDS.contains(&bare) {
        return true;
    }
    if ANNOTATIONS.contains(&bare) || SERVES_RE.is_match(t) {
        return true;
    }

    let words: Vec<&str> = lower.split_whitespace().collect();
    let first = words
        .first()
        .map(|w| w.trim_end_matches(|c: char| c.is_ascii_punctuation()))
        .unwrap_or("");
    let two = if words.len() >= 2 {
        format!("{} {}", first, words[1].trim_end_matches(|c: char| c.is_ascii_punctuation()))
    } else {
        String::new()
    };
    let verb_led =
        COOKING_VERBS.contains(&first) || COOKING_VERB_PHRASES.contains(&two.as_str());
    if verb_led && (words.len() >= 3 || t.ends_with('.')) {
        return true;
    }

    // Full sentences read as instructions even without a leading verb.
    if t.ends_with('.')
        && words.len() >= 6
        && words
            .iter()
            .map(|w| w.trim_end_matches(|c: char| c.is_ascii_punctuation()))
            .any(|w| COOKING_VERBS.contains(&w))
    {
        return true;
    }

    false
}

/// Parse a single ingredient candidate into `(item, amount, unit, notes)`.
///
/// Handles leading quantities (`"2"`, `"1/2"`, `"1 1/2"`, `"2-4"`), glued and
/// spaced units (`"4oz"`, `"2 cups"`), parenthetical amounts
/// (`"Ground beef (800 g)"`), and trailing preparation notes. A token after
/// the quantity that is not a known unit stays part of the ingredient name,
/// so `"1 Eggplant cut into cubes"` keeps `Eggplant` as the item.
pub fn parse_ingredient_smart(text: &str) -> Option<ParsedIngredient> {
    let text = text.trim();
    if text.len() < 2 || text.len() > 200 {
        return None;
    }

    // "Ground beef (1.8 lb / 800 g)" - amount lives in the parentheses.
    if let Some(caps) = PAREN_AMOUNT_RE.captures(text) {
        let item = caps[1].trim().to_string();
        let amount = caps[2].trim().to_string();
        if item.len() >= 2 {
            return Some(ParsedIngredient {
                item,
                amount,
                unit: None,
                notes: None,
            });
        }
    }

    if let Some(caps) = QTY_RE.captures(text) {
        let amount = caps[1].trim().to_string();
        let rest = caps[2].trim();
        if rest.is_empty() {
            return None;
        }

        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let (unit, remainder) = take_unit(&tokens);
        if remainder.is_empty() {
            return None;
        }
        let (item, notes) = split_item_notes(&remainder.join(" "));
        if item.len() < 2 {
            return None;
        }
        return Some(ParsedIngredient {
            item,
            amount,
            unit,
            notes,
        });
    }

    // No quantity at all: the whole text is the ingredient.
    if text.len() >= 3 {
        let (item, notes) = split_item_notes(text);
        return Some(ParsedIngredient {
            item,
            amount: String::new(),
            unit: None,
            notes,
        });
    }

    None
}

/// Consume a leading unit token (including the two-token `"fl oz"`) when it
/// names a known measurement.
fn take_unit<'a>(tokens: &[&'a str]) -> (Option<String>, Vec<&'a str>) {
    if tokens.len() >= 2 && tokens[0].eq_ignore_ascii_case("fl") && units::is_unit(tokens[1]) {
        return (
            Some(format!("{} {}", tokens[0], tokens[1])),
            tokens[2..].to_vec(),
        );
    }
    if let Some(first) = tokens.first() {
        if units::is_unit(first) {
            return (Some((*first).to_string()), tokens[1..].to_vec());
        }
    }
    (None, tokens.to_vec())
}

/// Split trailing preparation notes off an ingredient name: a parenthetical,
/// a comma, or the first preparation word after the name.
fn split_item_notes(rest: &str) -> (String, Option<String>) {
    if let Some(caps) = PAREN_NOTES_RE.captures(rest) {
        let item = caps[1].trim().to_string();
        let notes = caps[2].trim().to_string();
        if !item.is_empty() && !notes.is_empty() {
            return (item, Some(notes));
        }
    }

    if let Some(idx) = rest.find(',') {
        let item = rest[..idx].trim().to_string();
        let notes = rest[idx + 1..].trim().to_string();
        if !item.is_empty() {
            return (item, if notes.is_empty() { None } else { Some(notes) });
        }
    }

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    for i in 1..tokens.len() {
        if PREP_WORDS.contains(&tokens[i].to_lowercase().as_str()) {
            let item = tokens[..i].join(" ");
            let notes = tokens[i..].join(" ");
            return (item, Some(notes));
        }
    }

    (rest.trim().to_string(), None)
}

// ============================================================================
// Instructions
// ============================================================================

fn extract_instructions(text: &str) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(body) = section_body(text, &INST_SECTION_START, None) {
        for item in ITEM_SPLIT.split(body) {
            let clean = clean_instruction(item);
            if let Some(step) = clean {
                out.push(step);
                if out.len() >= 30 {
                    break;
                }
            }
        }
    }

    if out.is_empty() {
        // Numbered steps anywhere in the text.
        for line in text.lines() {
            if NUMBERED_LINE.is_match(line.trim()) {
                if let Some(step) = clean_instruction(line) {
                    out.push(step);
                    if out.len() >= 30 {
                        break;
                    }
                }
            }
        }
    }

    if out.is_empty() {
        // Verb-led prose lines as a last resort.
        for line in text.lines() {
            let t = line.trim();
            if t.len() < 15 || t.len() > 300 {
                continue;
            }
            let lower = t.to_lowercase();
            let has_verb = COOKING_VERBS.iter().any(|v| {
                lower
                    .split_whitespace()
                    .next()
                    .map(|w| w == *v)
                    .unwrap_or(false)
            });
            if has_verb {
                if let Some(step) = clean_instruction(t) {
                    out.push(step);
                    if out.len() >= 20 {
                        break;
                    }
                }
            }
        }
    }

    if out.is_empty() {
        out.push("See full recipe text for instructions".to_string());
    }

    out
}

fn clean_instruction(raw: &str) -> Option<String> {
    static VIDEO_PREFIX: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)^\(?(?:video recipe|recipe video|video)\b").unwrap());
    static LEADING_PAREN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^\([^)]*\)\s*:?\s*").unwrap());

    let s = strip_candidate(raw);
    if s.len() < 15 {
        return None;
    }
    if is_section_heading(&s) {
        return None;
    }
    if s.ends_with(':') && s.len() < 40 {
        return None;
    }
    if VIDEO_PREFIX.is_match(&s) {
        return None;
    }
    let s = LEADING_PAREN.replace(&s, "").trim().to_string();
    if s.len() < 15 {
        return None;
    }
    Some(s)
}

// ============================================================================
// Metadata
// ============================================================================

fn capture_time(re: &Regex, text: &str) -> NumOrText {
    re.captures(text)
        .map(|c| NumOrText::Text(c[1].trim().to_string()))
        .unwrap_or_default()
}

fn extract_difficulty(combined: &str, text: &str) -> Option<String> {
    static EASY: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(?:easy|simple|beginner|quick)\b").unwrap());
    static MEDIUM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(?:medium|moderate|intermediate)\b").unwrap());
    static HARD: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b(?:hard|difficult|advanced|complex|challenging)\b").unwrap()
    });
    static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[*\-•・]").unwrap());
    static STEP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[\.)]").unwrap());

    if EASY.is_match(combined) {
        return Some("easy".to_string());
    }
    if MEDIUM.is_match(combined) {
        return Some("medium".to_string());
    }
    if HARD.is_match(combined) {
        return Some("hard".to_string());
    }

    // No explicit mention: infer from complexity.
    let has_advanced = ADVANCED_TECHNIQUES.iter().any(|t| combined.contains(t));
    let bullets = BULLET.find_iter(text).count();
    let steps = STEP.find_iter(text).count();
    if has_advanced || bullets > 15 || steps > 10 {
        Some("hard".to_string())
    } else if bullets > 8 || steps > 5 {
        Some("medium".to_string())
    } else if bullets > 0 || steps > 0 {
        Some("easy".to_string())
    } else {
        None
    }
}

fn extract_cuisine(combined: &str, title_lower: &str) -> Option<String> {
    const CUISINES: &[(&str, &[&str])] = &[
        ("Italian", &["italian", "sicilian", "pasta", "risotto", "parmesan", "mozzarella", "marinara", "carbonara", "lasagna"]),
        ("Mexican", &["mexican", "taco", "burrito", "enchilada", "salsa", "tortilla", "guacamole", "quesadilla"]),
        ("Chinese", &["chinese", "stir fry", "wok", "soy sauce", "bok choy", "dumpling", "lo mein"]),
        ("Japanese", &["japanese", "sushi", "ramen", "miso", "teriyaki", "matcha", "mirin", "nori"]),
        ("Thai", &["thai", "pad thai", "lemongrass", "fish sauce", "coconut milk", "galangal"]),
        ("Indian", &["indian", "curry", "naan", "masala", "tikka", "garam masala", "biryani"]),
        ("French", &["french", "hollandaise", "croissant", "baguette", "ratatouille", "bourguignon"]),
        ("Greek", &["greek", "feta", "tzatziki", "gyro", "moussaka", "kalamata"]),
        ("Korean", &["korean", "kimchi", "bibimbap", "bulgogi", "gochujang", "ssamjang", "banchan"]),
        ("Vietnamese", &["vietnamese", "pho", "banh mi", "spring roll", "nuoc mam"]),
        ("Spanish", &["spanish", "paella", "tapas", "chorizo", "gazpacho", "sangria"]),
        ("American", &["bbq", "barbecue", "burger", "mac and cheese", "southern", "cajun", "fried chicken"]),
        ("German", &["german", "bratwurst", "sauerkraut", "spaetzle", "schnitzel", "dunkel"]),
        ("Middle Eastern", &["middle eastern", "hummus", "falafel", "tahini", "shawarma", "pita", "chickpea", "couscous", "kebab", "baba ganoush"]),
        ("Mediterranean", &["mediterranean", "olive oil", "feta", "olives", "lemon"]),
    ];

    for (cuisine, keywords) in CUISINES {
        let hits = keywords.iter().filter(|k| combined.contains(*k)).count();
        if hits >= 2 {
            return Some((*cuisine).to_string());
        }
        if hits == 1 && keywords.iter().any(|k| title_lower.contains(k)) {
            return Some((*cuisine).to_string());
        }
    }
    None
}

/// Score meal-type keyword hits per category. Main-course indicators weigh
/// into `dinner` so a savory dish with sugar in the glaze does not land in
/// `dessert`.
fn score_meal_type(combined: &str, title_lower: &str) -> Option<String> {
    const CATEGORIES: &[(&str, &[&str])] = &[
        ("breakfast", &["breakfast", "pancake", "waffle", "omelette", "omelet", "french toast", "granola", "brunch", "oatmeal"]),
        ("lunch", &["lunch", "sandwich", "wrap", "midday"]),
        ("dinner", &["dinner", "supper", "main course", "entree"]),
        ("snack", &["snack", "appetizer", "finger food", "dip", "popcorn"]),
        ("dessert", &["dessert", "cake", "cookie", "brownie", "pie", "tart", "pudding", "ice cream", "mousse", "cheesecake", "cupcake", "fudge", "frosting", "custard", "tiramisu"]),
    ];

    let mut best: Option<(&str, usize)> = None;
    for (category, keywords) in CATEGORIES {
        let mut score = 0usize;
        for k in *keywords {
            if combined.contains(k) {
                score += 1;
            }
            if title_lower.contains(k) {
                score += 1;
            }
        }
        if *category == "dinner" {
            let prior = MAIN_COURSE_WORDS
                .iter()
                .filter(|w| combined.contains(*w))
                .count();
            score += prior * 2;
        }
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((category, score));
        }
    }
    best.map(|(c, _)| c.to_string())
}

fn extract_dietary_tags(combined: &str) -> Vec<String> {
    const EXPLICIT: &[(&str, &[&str])] = &[
        ("vegetarian", &["vegetarian", "veggie"]),
        ("vegan", &["vegan", "plant-based", "plant based"]),
        ("gluten-free", &["gluten-free", "gluten free"]),
        ("dairy-free", &["dairy-free", "dairy free", "lactose-free"]),
        ("keto", &["keto", "ketogenic", "low-carb", "low carb"]),
        ("paleo", &["paleo"]),
        ("whole30", &["whole30", "whole 30"]),
        ("low-fat", &["low-fat", "low fat", "fat-free"]),
        ("sugar-free", &["sugar-free", "sugar free", "no sugar"]),
        ("nut-free", &["nut-free", "nut free"]),
        ("soy-free", &["soy-free", "soy free"]),
        ("kosher", &["kosher"]),
        ("halal", &["halal"]),
    ];
    const MEAT: &[&str] = &[
        "chicken", "beef", "pork", "fish", "meat", "bacon", "sausage", "turkey", "lamb", "duck",
        "seafood", "shrimp", "salmon",
    ];
    const DAIRY: &[&str] = &["milk", "cheese", "butter", "cream", "yogurt", "whey"];

    let mut tags: Vec<String> = EXPLICIT
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| combined.contains(k)))
        .map(|(tag, _)| tag.to_string())
        .collect();

    if tags.is_empty() {
        let has_meat = MEAT.iter().any(|w| combined.contains(w));
        let has_dairy = DAIRY.iter().any(|w| combined.contains(w));
        let has_egg = combined.contains("egg");
        if !has_meat && !has_dairy && !has_egg {
            tags.push("vegan".to_string());
            tags.push("vegetarian".to_string());
        } else if !has_meat {
            tags.push("vegetarian".to_string());
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recipe::PLACEHOLDER_INGREDIENT;

    #[test]
    fn eggplant_keeps_item_and_notes() {
        let ing = parse_ingredient_smart("1 Eggplant cut into cubes").unwrap();
        assert_eq!(ing.item, "Eggplant");
        assert_eq!(ing.amount, "1");
        assert_eq!(ing.unit, None);
        assert_eq!(ing.notes.as_deref(), Some("cut into cubes"));
    }

    #[test]
    fn quantity_unit_item_splits() {
        let ing = parse_ingredient_smart("2 cups flour, sifted").unwrap();
        assert_eq!(ing.item, "flour");
        assert_eq!(ing.amount, "2");
        assert_eq!(ing.unit.as_deref(), Some("cups"));
        assert_eq!(ing.notes.as_deref(), Some("sifted"));
    }

    #[test]
    fn glued_unit_is_recognised() {
        let ing = parse_ingredient_smart("4oz pancetta").unwrap();
        assert_eq!(ing.item, "pancetta");
        assert_eq!(ing.amount, "4");
        assert_eq!(ing.unit.as_deref(), Some("oz"));
    }

    #[test]
    fn ranges_are_preserved_as_text() {
        let ing = parse_ingredient_smart("2-4 large eggs").unwrap();
        assert_eq!(ing.amount, "2-4");
        assert_eq!(ing.item, "large eggs");
    }

    #[test]
    fn parenthetical_amount_is_lifted() {
        let ing = parse_ingredient_smart("Ground beef (1.8 lb / 800 g)").unwrap();
        assert_eq!(ing.item, "Ground beef");
        assert_eq!(ing.amount, "1.8 lb / 800 g");
    }

    #[test]
    fn round_trip_preserves_the_tuple() {
        let cases = ["2 cups flour, sifted", "1 Eggplant cut into cubes", "4oz pancetta"];
        for case in cases {
            let first = parse_ingredient_smart(case).unwrap();
            let reassembled = {
                let mut parts = vec![first.amount.clone()];
                if let Some(u) = &first.unit {
                    parts.push(u.clone());
                }
                parts.push(first.item.clone());
                let mut s = parts.join(" ").trim().to_string();
                if let Some(n) = &first.notes {
                    s = format!("{}, {}", s, n);
                }
                s
            };
            let second = parse_ingredient_smart(&reassembled).unwrap();
            assert_eq!(second.item, first.item, "case: {}", case);
            assert_eq!(second.amount, first.amount, "case: {}", case);
            assert_eq!(second.unit, first.unit, "case: {}", case);
        }
    }

    #[test]
    fn filter_drops_instruction_sentences() {
        assert!(is_rejected_ingredient(
            "Cook pancetta on medium heat until fat has rendered and it starts to crisp."
        ));
        assert!(is_rejected_ingredient(
            "Deglaze pan with white wine and cook for a minute."
        ));
        assert!(is_rejected_ingredient("Preheat the oven to 350F"));
        assert!(is_rejected_ingredient("Bring to a boil."));
    }

    #[test]
    fn filter_drops_headers_and_annotations() {
        assert!(is_rejected_ingredient("For the filling:"));
        assert!(is_rejected_ingredient("for topping"));
        assert!(is_rejected_ingredient("Preparation"));
        assert!(is_rejected_ingredient("to taste"));
        assert!(is_rejected_ingredient("optional"));
        assert!(is_rejected_ingredient("(Serves 2)"));
    }

    #[test]
    fn filter_drops_leaked_markup() {
        assert!(is_rejected_ingredient("Salt and pepper to taste **Preparation*"));
        assert!(is_rejected_ingredient("1 cup sugar [x200b]"));
    }

    #[test]
    fn filter_keeps_real_ingredients() {
        assert!(!is_rejected_ingredient("2 cups flour"));
        assert!(!is_rejected_ingredient("1 cup warm water"));
        assert!(!is_rejected_ingredient("Chives"));
        assert!(!is_rejected_ingredient("8oz portabella mushrooms"));
    }

    #[test]
    fn section_based_extraction() {
        let text = "Best Brownies\n\nIngredients:\n- 2 cups sugar\n- 1 cup cocoa powder\n- 4 eggs\n\nInstructions:\n1. Preheat oven to 350F.\n2. Mix everything and bake for 30 minutes.";
        let parser = LocalParser::new();
        let parsed = parser.parse(text);
        assert_eq!(parsed.title, "Best Brownies");
        assert_eq!(parsed.ingredients.len(), 3);
        assert_eq!(parsed.ingredients[0].item, "sugar");
        assert_eq!(parsed.instructions.len(), 2);
        assert_eq!(parsed.cook_time.first_integer(), Some(30));
    }

    #[test]
    fn dotted_bullets_and_serving_annotation() {
        // Inline blob in the style of a translated dessert post.
        let text = "Matcha Mousse\n\nIngredients (Serves 2)\n・200ml heavy cream ・2 tbsp matcha powder ・3 tbsp sugar ・1 tsp gelatin\n\nInstructions:\n1. Whisk the cream until soft peaks form and chill it well.\n2. Dissolve gelatin and fold everything together gently.";
        let parsed = LocalParser::new().parse(text);
        let items: Vec<&str> = parsed.ingredients.iter().map(|i| i.item.as_str()).collect();
        assert_eq!(items.len(), 4, "items: {:?}", items);
        assert!(items.contains(&"heavy cream"));
        assert!(items.contains(&"matcha powder"));
        assert!(!items.iter().any(|i| i.to_lowercase().contains("serves")));
        assert!(!items.iter().any(|i| i.to_lowercase().contains("whisk")));
    }

    #[test]
    fn unusable_text_yields_placeholder() {
        let parsed = LocalParser::new().parse("I made this last night, so good!");
        assert_eq!(parsed.ingredients.len(), 1);
        assert_eq!(parsed.ingredients[0].item, PLACEHOLDER_INGREDIENT);
    }

    #[test]
    fn savory_prior_beats_dessert_keywords() {
        let parsed = LocalParser::new().parse(
            "Hunters Gravy with Brats\n\nIngredients:\n- 4 Bratwurst\n- 10 oz pasta\n- 2 tbsp sugar\n\nInstructions:\n1. Cook the sausage and pasta, then make a sweet gravy.",
        );
        assert_eq!(parsed.meal_type.as_deref(), Some("dinner"));
    }

    #[test]
    fn dessert_without_savory_words_scores_dessert() {
        let parsed = LocalParser::new().parse(
            "Matcha Mousse\n\nIngredients:\n- 200ml heavy cream\n- 2 tbsp matcha\n\nInstructions:\n1. Whisk the cream and fold in the matcha mixture.",
        );
        assert_eq!(parsed.meal_type.as_deref(), Some("dessert"));
    }

    #[test]
    fn metadata_capture() {
        let parsed = LocalParser::new().parse(
            "Quick Soup\n\nPrep time: 10 minutes\nCook time: 30-45 minutes\nServes 4\n\nIngredients:\n- 2 cups broth\n- 1 onion\n\nInstructions:\n1. Simmer everything together until done.",
        );
        assert_eq!(parsed.prep_time.first_integer(), Some(10));
        assert_eq!(parsed.cook_time.first_integer(), Some(30));
        assert_eq!(parsed.servings.first_integer(), Some(4));
        assert_eq!(parsed.difficulty.as_deref(), Some("easy"));
    }

    #[test]
    fn quick_reads_as_easy_difficulty() {
        let parsed = LocalParser::new().parse(
            "Quick Weeknight Stir Fry\n\nIngredients:\n- 1 lb chicken\n- 2 cups rice\n\nInstructions:\n1. Cook everything together in a hot wok.",
        );
        assert_eq!(parsed.difficulty.as_deref(), Some("easy"));
    }

    #[test]
    fn cuisine_detection_from_keyword_hits() {
        let parsed = LocalParser::new().parse(
            "Bulgogi Bowls\n\nIngredients:\n- 1 lb beef\n- 2 tbsp gochujang\n\nInstructions:\n1. Marinate the beef in the gochujang mixture overnight.",
        );
        assert_eq!(parsed.cuisine_type.as_deref(), Some("Korean"));
    }

    #[test]
    fn explicit_dietary_tags_detected() {
        let parsed = LocalParser::new().parse(
            "Whole30 Chicken Skillet\n\nThis one is whole30 friendly and soy-free.\n\nIngredients:\n- 2 chicken breasts\n- 1 tbsp olive oil\n\nInstructions:\n1. Sear the chicken and cook it through.",
        );
        assert!(parsed.dietary_tags.contains(&"whole30".to_string()));
        assert!(parsed.dietary_tags.contains(&"soy-free".to_string()));
    }

    #[test]
    fn escaped_newlines_are_fixed_before_parsing() {
        let parsed = LocalParser::new().parse(
            "Simple Bread\\n\\nIngredients:\\n- 3 cups flour\\n- 1 cup warm water\\n- 1 tsp yeast\\n\\nInstructions:\\n1. Knead the dough and let it rise for an hour.",
        );
        assert_eq!(parsed.title, "Simple Bread");
        assert_eq!(parsed.ingredients.len(), 3);
    }

    #[test]
    fn vegetarian_inference_from_ingredients() {
        let parsed = LocalParser::new().parse(
            "Tomato Salad\n\nIngredients:\n- 4 tomatoes\n- 2 tbsp olive oil\n\nInstructions:\n1. Slice the tomatoes and drizzle with the oil.",
        );
        assert!(parsed.dietary_tags.contains(&"vegan".to_string()));
        assert!(parsed.dietary_tags.contains(&"vegetarian".to_string()));
    }
}
