use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::ProductRecord;

/// Generic words stripped before grouping offers across stores. All patterns
/// are whole-word anchored; order is not load-bearing.
static GROUP_STOPWORDS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bpa[ñn]al(es)?\b",
        r"\bbeb[eé]\b",
        r"\badulto\b",
        r"\bunidades\b",
        r"\bunid\b",
        r"\bund\b",
        r"\btalla\b",
        r"\bun\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalizes an offer name into its cross-store grouping key: lowercased,
/// generic diaper words and punctuation stripped, whitespace collapsed.
pub fn grouping_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    let mut text = name.to_lowercase();
    for pattern in GROUP_STOPWORDS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    let text = NON_WORD.replace_all(&text, "");
    let text = MULTI_SPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// One line of the consolidated export: the wire record plus the grouping key
/// and the lowest-price flag. Field order is the export column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedRow {
    pub nombre: String,
    pub precio: Option<i64>,
    pub marca: Option<String>,
    pub cantidad_unidades: Option<i64>,
    pub precio_por_unidad: Option<i64>,
    pub url: String,
    pub tienda: String,
    pub fecha_extraccion: String,
    pub imagen: Option<String>,
    pub precio_lista: Option<i64>,
    pub nombre_normalizado: String,
    #[serde(
        serialize_with = "serialize_lowest_flag",
        deserialize_with = "deserialize_lowest_flag"
    )]
    pub es_precio_mas_bajo: bool,
}

// The flag column historically reads "Si" or empty, and spreadsheet users
// filter on that.
fn serialize_lowest_flag<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "Si" } else { "" })
}

fn deserialize_lowest_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(value == "Si")
}

/// Builds the consolidated roster from one run's records: every record gets
/// its grouping key, and within each group every record matching the group's
/// minimum price is flagged. Unpriced records are never flagged and do not
/// compete for the minimum.
pub fn build_consolidated(records: &[ProductRecord]) -> Vec<ConsolidatedRow> {
    let keys: Vec<String> = records.iter().map(|r| grouping_name(&r.nombre)).collect();

    let mut group_min: HashMap<&str, i64> = HashMap::new();
    for (record, key) in records.iter().zip(&keys) {
        if let Some(precio) = record.precio {
            group_min
                .entry(key.as_str())
                .and_modify(|min| *min = (*min).min(precio))
                .or_insert(precio);
        }
    }

    records
        .iter()
        .zip(keys.iter())
        .map(|(record, key)| {
            let lowest = match (record.precio, group_min.get(key.as_str())) {
                (Some(precio), Some(min)) => precio <= *min,
                _ => false,
            };
            ConsolidatedRow {
                nombre: record.nombre.clone(),
                precio: record.precio,
                marca: record.marca.clone(),
                cantidad_unidades: record.cantidad_unidades,
                precio_por_unidad: record.precio_por_unidad,
                url: record.url.clone(),
                tienda: record.tienda.clone(),
                fecha_extraccion: record.fecha_extraccion.clone(),
                imagen: record.imagen.clone(),
                precio_lista: record.precio_lista,
                nombre_normalizado: key.clone(),
                es_precio_mas_bajo: lowest,
            }
        })
        .collect()
}

/// Writes the consolidated roster as CSV, creating parent directories as
/// needed. The file is overwritten on every run; history lives in the
/// database, not here.
pub fn write_consolidated_csv(path: &Path, rows: &[ConsolidatedRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a consolidated CSV back, for analysis runs decoupled from the
/// database.
pub fn read_consolidated(path: &Path) -> Result<Vec<ConsolidatedRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.with_context(|| format!("Malformed row in {}", path.display()))?);
    }
    Ok(rows)
}
