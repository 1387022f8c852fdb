use serde::{Deserialize, Deserializer, Serialize};

use crate::processor::pricing::parse_clp;

/// Timestamp format used for scrape runs and price history rows. Two runs on
/// the same day get distinct stamps, so re-running the pipeline appends a
/// second observation instead of silently replacing the first.
pub const RUN_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One scraped offer, in the shape every store adapter hands over.
///
/// Field names are the Spanish wire contract the adapters and the consolidated
/// CSV share; everything downstream (storage, queries, reports) consumes this
/// struct. Prices are integer Chilean pesos, never floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
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
}

/// Tolerant decoding shape for adapter output files.
///
/// Adapters are not consistent about numeric fields: some emit `16990`, some
/// `"16.990"`, some `"$16.990"`. Everything is optional here; the only hard
/// gate is applied in [`RawRecord::into_record`].
#[derive(Debug, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default, deserialize_with = "flexible_amount")]
    pub precio: Option<i64>,
    #[serde(default)]
    pub marca: Option<String>,
    #[serde(default, deserialize_with = "flexible_amount")]
    pub cantidad_unidades: Option<i64>,
    #[serde(default, deserialize_with = "flexible_amount")]
    pub precio_por_unidad: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tienda: Option<String>,
    #[serde(default)]
    pub fecha_extraccion: Option<String>,
    #[serde(default)]
    pub imagen: Option<String>,
    #[serde(default, deserialize_with = "flexible_amount")]
    pub precio_lista: Option<i64>,
}

impl RawRecord {
    /// Applies the single hard validation gate: a record missing both `url`
    /// and `nombre` cannot be tied to a product identity and is dropped.
    /// Missing `tienda` or `fecha_extraccion` fall back to what the caller
    /// knows about the file being ingested.
    pub fn into_record(self, fallback_store: &str, fallback_stamp: &str) -> Option<ProductRecord> {
        let nombre = clean(self.nombre);
        let url = clean(self.url);
        if nombre.is_none() && url.is_none() {
            return None;
        }

        Some(ProductRecord {
            nombre: nombre.unwrap_or_default(),
            precio: self.precio,
            marca: clean(self.marca),
            cantidad_unidades: self.cantidad_unidades,
            precio_por_unidad: self.precio_por_unidad,
            url: url.unwrap_or_default(),
            tienda: clean(self.tienda).unwrap_or_else(|| fallback_store.to_string()),
            fecha_extraccion: clean(self.fecha_extraccion).unwrap_or_else(|| fallback_stamp.to_string()),
            imagen: clean(self.imagen),
            precio_lista: self.precio_lista,
        })
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

fn flexible_amount<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        NumberOrText::Int(n) => Some(n),
        NumberOrText::Float(f) => Some(f.round() as i64),
        NumberOrText::Text(s) => parse_clp(&s),
    }))
}
