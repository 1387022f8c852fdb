use serde::{Deserialize, Serialize};

/// Product family, inferred from the offer name. Assignment is by priority:
/// formula keywords win over wipes, wipes over water diapers, and anything
/// left is a regular diaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Pañales")]
    Diaper,
    #[serde(rename = "Pañales de Agua")]
    WaterDiaper,
    #[serde(rename = "Toallitas Humedas")]
    WetWipes,
    #[serde(rename = "Fórmulas Infantiles")]
    InfantFormula,
}

impl Category {
    /// Display order used by filter catalogs and reports.
    pub const ALL: [Category; 4] = [
        Category::Diaper,
        Category::WaterDiaper,
        Category::WetWipes,
        Category::InfantFormula,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Diaper => "Pañales",
            Category::WaterDiaper => "Pañales de Agua",
            Category::WetWipes => "Toallitas Humedas",
            Category::InfantFormula => "Fórmulas Infantiles",
        }
    }

    pub fn from_display(name: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.display_name() == name)
    }

    /// Sizes only make sense for products worn by the baby. Wipes and formula
    /// never carry a size tag.
    pub fn has_sizes(&self) -> bool {
        matches!(self, Category::Diaper | Category::WaterDiaper)
    }

    /// Unit prices are per diaper/wipe except for formula, which is compared
    /// per kilogram.
    pub fn per_kilogram(&self) -> bool {
        matches!(self, Category::InfantFormula)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Output of the record normalizer: everything derived from a raw offer name
/// plus the adapter-supplied brand.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAttributes {
    pub brand: String,
    pub category: Category,
    pub size_tag: Option<String>,
    pub unit_count: Option<i64>,
}

/// A persisted product identity, keyed by source URL. Descriptive fields are
/// refreshed as better data arrives; the URL never changes.
#[derive(Debug, Clone)]
pub struct ProductIdentity {
    pub id: i64,
    pub name: String,
    pub brand: Option<String>,
    pub unit_count: Option<i64>,
    pub url: String,
    pub image_url: Option<String>,
}

/// One historical price observation for a product, already joined with the
/// store that reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub run_date: String,
    pub store: String,
    pub price: Option<i64>,
    pub unit_price: Option<i64>,
    pub list_price: Option<i64>,
}

/// A product offer as seen at one reference date, with normalized attributes
/// recomputed from the stored raw fields. This is the row shape every query,
/// report and alert works on.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRow {
    pub product_id: i64,
    pub nombre: String,
    /// Brand exactly as the adapter reported it, if any.
    pub marca_original: Option<String>,
    /// Canonical brand, always present ("Desconocida" when nothing matched).
    pub marca: String,
    pub categoria: Category,
    pub talla: Option<String>,
    pub cantidad_unidades: Option<i64>,
    pub url: String,
    pub imagen: Option<String>,
    pub tienda: String,
    pub precio: Option<i64>,
    pub precio_por_unidad: Option<i64>,
    /// Suppressed (None) unless strictly above the selling price.
    pub precio_lista: Option<i64>,
    /// Rounded percent off the list price; present only when the list price is.
    pub descuento: Option<i64>,
}

impl SnapshotRow {
    /// Price used when comparing offers against an alert target: the per-unit
    /// figure when known, the plain price otherwise.
    pub fn effective_price(&self) -> Option<i64> {
        self.precio_por_unidad.or(self.precio)
    }
}

/// Coverage of the accumulated price history, for run summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    pub distinct_runs: i64,
    pub first_run: String,
    pub last_run: String,
    pub total_observations: i64,
    pub tracked_products: i64,
}
