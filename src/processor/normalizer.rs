use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Category, NormalizedAttributes};
use crate::processor::vocab::{
    BRAND_ALIASES, FORMULA_KEYWORDS, KNOWN_BRANDS, UNKNOWN_BRAND, WATER_DIAPER_KEYWORDS,
    WIPES_KEYWORDS,
};

/// Size detection rules, tried in order against the uppercased name. The
/// first capture wins; "/" separators in multi-token sizes become "-".
///
/// Rule order matters: an explicit "TALLA X" always beats whatever a product
/// line qualifier or a pants pattern would say about the same name.
static SIZE_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "talla_explicita",
            Regex::new(r"TALLA\s+(RN\+?|S[/-]?M|P|M|G|XG|XXG|XXXG|L[/-]?XL)").unwrap(),
        ),
        (
            "linea_producto",
            Regex::new(r"(?:PREMIUM|COMFORT|CARE|SEC|COOL|PLUS)\s+(RN\+?|P|M|G|XG|XXG|XXXG)\b").unwrap(),
        ),
        (
            "pants",
            Regex::new(r"PANTS\s+(RN|P|M|G|XG|XXG|XXXG|P[/-]M|G[/-]XG)\b").unwrap(),
        ),
        (
            "adulto",
            Regex::new(r"ADULTO\s+.*?(M|G|L|XG|XL)\b").unwrap(),
        ),
    ]
});

/// Unit-count patterns for products sold by the piece, tried in order.
static COUNT_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("panales", Regex::new(r"(?i)(\d+)\s*(?:pa[ñn]ales)\b").unwrap()),
        ("unidades", Regex::new(r"(?i)(\d+)\s*(?:unidades|unid|und)\b").unwrap()),
        ("x_unidades", Regex::new(r"(?i)x\s*(\d+)\s*(?:un|u)\b").unwrap()),
        ("un_suelto", Regex::new(r"(?i)(\d+)\s*(?:un)\b").unwrap()),
    ]
});

static KILOGRAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*kg\b").unwrap());
static GRAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:g|grs|gr|gramos)\b").unwrap());

/// Derives brand, category, size and unit count from a raw offer. Pure: same
/// inputs always produce the same attributes, so historical rows can be
/// re-derived at query time without a migration.
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn normalize(&self, name: &str, raw_brand: Option<&str>) -> NormalizedAttributes {
        let category = self.detect_category(name);
        NormalizedAttributes {
            brand: self.canonical_brand(raw_brand, name),
            category,
            size_tag: self.detect_size(name),
            unit_count: self.extract_unit_count(name, category),
        }
    }

    /// Canonical brand for an offer. The adapter-reported brand wins when
    /// present; otherwise the name is scanned against the known-brand list,
    /// and as a last resort the first word of the name is taken.
    pub fn canonical_brand(&self, raw_brand: Option<&str>, name: &str) -> String {
        if let Some(brand) = raw_brand {
            let brand = brand.trim();
            if !brand.is_empty() {
                return apply_alias(title_case(brand));
            }
        }

        let name_lower = name.to_lowercase();
        for known in KNOWN_BRANDS {
            if name_lower.contains(&known.to_lowercase()) {
                return apply_alias(known.to_string());
            }
        }

        match name.split_whitespace().next() {
            Some(first) => apply_alias(title_case(first)),
            None => UNKNOWN_BRAND.to_string(),
        }
    }

    /// Category by keyword priority: formula beats wipes beats water diapers;
    /// everything else is a regular diaper.
    pub fn detect_category(&self, name: &str) -> Category {
        if name.is_empty() {
            return Category::Diaper;
        }
        let name_lower = name.to_lowercase();
        if FORMULA_KEYWORDS.iter().any(|kw| name_lower.contains(kw)) {
            return Category::InfantFormula;
        }
        if WIPES_KEYWORDS.iter().any(|kw| name_lower.contains(kw)) {
            return Category::WetWipes;
        }
        if WATER_DIAPER_KEYWORDS.iter().any(|kw| name_lower.contains(kw)) {
            return Category::WaterDiaper;
        }
        Category::Diaper
    }

    /// Size tag from the offer name, or `None` when no rule matches.
    pub fn detect_size(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let upper = name.to_uppercase();
        for (_rule, pattern) in SIZE_RULES.iter() {
            if let Some(caps) = pattern.captures(&upper) {
                return Some(caps[1].replace('/', "-"));
            }
        }
        None
    }

    /// How many units one package holds. For formula this is the net weight
    /// in grams (kilograms converted); weightless formula names still get a
    /// chance at the piece-count patterns.
    pub fn extract_unit_count(&self, name: &str, category: Category) -> Option<i64> {
        if name.is_empty() {
            return None;
        }

        if category == Category::InfantFormula {
            if let Some(caps) = KILOGRAMS.captures(name) {
                let kg: f64 = caps[1].replace(',', ".").parse().ok()?;
                return Some((kg * 1000.0).round() as i64);
            }
            if let Some(caps) = GRAMS.captures(name) {
                return caps[1].parse().ok();
            }
        }

        for (_rule, pattern) in COUNT_RULES.iter() {
            if let Some(caps) = pattern.captures(name) {
                return caps[1].parse().ok();
            }
        }
        None
    }
}

fn apply_alias(brand: String) -> String {
    for (variant, canonical) in BRAND_ALIASES {
        if brand == *variant {
            return (*canonical).to_string();
        }
    }
    brand
}

/// Title-cases the way brands are displayed: every letter that follows a
/// non-letter starts a word. "NAN OPTIPRO" -> "Nan Optipro", "s-26" -> "S-26".
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
