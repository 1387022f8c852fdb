//! Shared vocabulary for the Chilean diaper market: brands, size ladder,
//! category keywords and scope filters. Matching is always done on lowercased
//! (or uppercased, for sizes) text; the tables keep display casing.

/// Brands recognized inside product names, scanned in priority order.
/// Multi-word entries must come before any single word they contain.
pub const KNOWN_BRANDS: &[&str] = &[
    "Pampers",
    "Huggies",
    "Babysec",
    "Cotidian",
    "Goodnites",
    "Win",
    "Tutte",
    "Pequenin",
    "Tena",
    "Plenitud",
    "Ladysoft",
    "Aiwibi",
    "Emubaby",
    "Moltex",
    "Chelino",
    "Bambo",
    "Pingo",
    "Naty",
    "Eco Boom",
    "Biobaby",
];

/// Variants folded into one canonical brand, applied after title-casing.
pub const BRAND_ALIASES: &[(&str, &str)] = &[("Nan Optipro", "Nan")];

/// Fallback brand when nothing can be derived.
pub const UNKNOWN_BRAND: &str = "Desconocida";

/// Keywords that mark a product as infant formula. Checked before every other
/// category; note the trailing space in "nan " so "Nana" does not match.
pub const FORMULA_KEYWORDS: &[&str] = &[
    "fórmula",
    "formula",
    "leche infantil",
    "leche en polvo",
    "nan ",
    "nido",
    "similac",
    "enfamil",
    "s-26",
    "s26",
    "alula",
    "nidal",
    "nutrilon",
    "blemil",
];

/// Keywords that mark a product as baby wet wipes.
pub const WIPES_KEYWORDS: &[&str] = &[
    "toalla húmeda",
    "toallas húmedas",
    "toalla humeda",
    "toallas humedas",
    "toallita",
];

/// Keywords that mark a product as a swim/water diaper.
pub const WATER_DIAPER_KEYWORDS: &[&str] = &["swimmer", "agua", "acuatic", "piscina", "splasher"];

/// Diaper sizes from smallest to largest. Unknown tags sort after all of
/// these.
pub const SIZE_ORDER: &[&str] = &[
    "RN", "RN+", "P", "S-M", "M", "G", "P-M", "XG", "G-XG", "L", "XXG", "L-XL", "XL", "XXXG",
];

/// Baby age ranges mapped to the diaper sizes usually worn at that age.
pub const AGE_TO_SIZES: &[(&str, &[&str])] = &[
    ("0-1 mes", &["RN", "RN+"]),
    ("1-3 meses", &["RN+", "P"]),
    ("3-6 meses", &["P", "M"]),
    ("6-12 meses", &["M", "G"]),
    ("12-18 meses", &["G", "XG"]),
    ("18-24 meses", &["XG", "XXG"]),
    ("+2 anos", &["XXG", "XXXG"]),
];

/// Allowlist for the baby-product scope: a name must contain at least one of
/// these substrings (lowercased comparison) to count as in scope.
pub const SCOPE_INCLUDE: &[&str] = &[
    "pañal",
    "panal",
    "toalla",
    "toallita",
    "huggies",
    "pampers",
    "babysec",
    "leche",
    "fórmula",
    "formula",
    "nan ",
    "similac",
    "enfamil",
    "s-26",
    "purita",
    "nido",
    "splasher",
    "goodnites",
    "emubaby",
    "waterwipes",
    "aqua baby",
    "merries",
    "terra ",
    "nenitos",
    "neniwipes",
    "althera",
    "cell skin",
];

/// Adult incontinence products excluded from the baby scope, even when the
/// allowlist matches. " win " keeps its surrounding spaces on purpose: the
/// brand name is too short to match bare.
pub const SCOPE_EXCLUDE_ADULT: &[&str] = &[
    "adulto",
    "incontinencia",
    "plenitud",
    "tena ",
    "cotidian",
    "ladysoft",
    "emumed",
    "emuprotect",
    "proactive",
    " win ",
    "win plus",
    "win premium",
];

/// Products dropped from the analysis report: accessories and toiletries some
/// distributors mix into their diaper listings.
pub const REPORT_EXCLUDE: &[&str] = &[
    "toalla higienica",
    "toalla higiénica",
    "toalla humeda",
    "toalla húmeda",
    "aposito",
    "apósito",
    "protector diario",
    "herbal essences",
    "shampoo",
    "acondicionador",
    "jabon",
    "jabón",
    "crema",
    "colonia",
    "mamadera",
    "chupete",
    "biberón",
    "biberon",
];

/// Popular brands compared store-by-store in the report, keyed by the
/// substring looked up in the raw brand field.
pub const REPORT_BRANDS: &[(&str, &str)] = &[
    ("pampers", "Pampers"),
    ("huggies", "Huggies"),
    ("babysec", "Babysec"),
    ("cotidian", "Cotidian"),
    ("win", "Win"),
    ("plenitud", "Plenitud"),
    ("tena", "Tena"),
];

/// Position of a size tag in the ladder, for sorting. Unknown tags go last.
pub fn size_rank(tag: &str) -> usize {
    SIZE_ORDER.iter().position(|t| *t == tag).unwrap_or(SIZE_ORDER.len())
}

/// Sizes associated with an age range, or `None` for an unknown range label.
pub fn sizes_for_age(age: &str) -> Option<&'static [&'static str]> {
    AGE_TO_SIZES.iter().find(|(label, _)| *label == age).map(|(_, sizes)| *sizes)
}
