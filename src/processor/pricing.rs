use std::cmp::Ordering;

use crate::models::{Category, ProductRecord, SnapshotRow};
use crate::processor::normalizer::RecordNormalizer;

/// Pulls an integer Chilean-peso amount out of arbitrary text by keeping only
/// the digits: `"$16.990"` -> `16990`. `None` when no digit survives.
pub fn parse_clp(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Per-unit price for an offer. Diapers and wipes are compared per piece,
/// formula per kilogram so tins of different weight stay comparable. `None`
/// whenever the division cannot be done.
pub fn unit_price(price: Option<i64>, unit_count: Option<i64>, category: Category) -> Option<i64> {
    let price = price?;
    let count = unit_count?;
    if count <= 0 {
        return None;
    }
    let per_unit = price as f64 / count as f64;
    let value = if category.per_kilogram() { per_unit * 1000.0 } else { per_unit };
    Some(value.round() as i64)
}

/// Per-unit figure persisted with an observation: computed from the record
/// when possible, otherwise whatever the adapter already worked out.
pub fn unit_price_or_reported(
    price: Option<i64>,
    unit_count: Option<i64>,
    reported: Option<i64>,
    category: Category,
) -> Option<i64> {
    unit_price(price, unit_count, category).or(reported)
}

/// Normalization pass over one adapter batch, in place. A unit count parsed
/// out of the product name covers for adapters that send none, then every
/// record gets the per-unit figure later persisted with its observation.
pub fn enrich_records(records: &mut [ProductRecord]) {
    let normalizer = RecordNormalizer;
    for record in records {
        let category = normalizer.detect_category(&record.nombre);
        if record.cantidad_unidades.is_none() {
            record.cantidad_unidades = normalizer.extract_unit_count(&record.nombre, category);
        }
        record.precio_por_unidad = unit_price_or_reported(
            record.precio,
            record.cantidad_unidades,
            record.precio_por_unidad,
            category,
        );
    }
}

/// Rounded percent off the list price. Only a list price strictly above the
/// selling price counts; anything else is a phantom discount and yields
/// `None`.
pub fn discount_pct(price: Option<i64>, list_price: Option<i64>) -> Option<i64> {
    let price = price?;
    let list = list_price?;
    if price <= 0 || list <= price {
        return None;
    }
    Some(((list - price) as f64 / list as f64 * 100.0).round() as i64)
}

/// List price as shown to users: suppressed unless strictly above the
/// selling price.
pub fn effective_list_price(price: Option<i64>, list_price: Option<i64>) -> Option<i64> {
    match (price, list_price) {
        (Some(p), Some(l)) if p > 0 && l > p => Some(l),
        _ => None,
    }
}

/// Default offer ordering: per-unit price ascending with unknown unit prices
/// after every known one, plain price as tiebreak. Ties keep their incoming
/// order under a stable sort.
pub fn cmp_by_unit_price(a: &SnapshotRow, b: &SnapshotRow) -> Ordering {
    rank_key(a).cmp(&rank_key(b))
}

fn rank_key(row: &SnapshotRow) -> (bool, i64, i64) {
    (
        row.precio_por_unidad.is_none(),
        row.precio_por_unidad.unwrap_or(i64::MAX),
        row.precio.unwrap_or(i64::MAX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clp() {
        assert_eq!(parse_clp("$16.990"), Some(16990));
        assert_eq!(parse_clp("16990"), Some(16990));
        assert_eq!(parse_clp("CLP 9.990 c/u"), Some(9990));
        assert_eq!(parse_clp("Agotado"), None);
        assert_eq!(parse_clp(""), None);
    }

    #[test]
    fn test_unit_price_per_diaper() {
        assert_eq!(unit_price(Some(16990), Some(68), Category::Diaper), Some(250));
        assert_eq!(unit_price(Some(9990), Some(40), Category::WetWipes), Some(250));
    }

    #[test]
    fn test_unit_price_formula_per_kilogram() {
        assert_eq!(unit_price(Some(8990), Some(800), Category::InfantFormula), Some(11238));
        assert_eq!(unit_price(Some(15990), Some(1200), Category::InfantFormula), Some(13325));
    }

    #[test]
    fn test_unit_price_missing_inputs() {
        assert_eq!(unit_price(None, Some(68), Category::Diaper), None);
        assert_eq!(unit_price(Some(16990), None, Category::Diaper), None);
        assert_eq!(unit_price(Some(16990), Some(0), Category::Diaper), None);
        assert_eq!(unit_price(Some(16990), Some(-4), Category::Diaper), None);
    }

    #[test]
    fn test_unit_price_reported_fallback() {
        // computed when possible, even if the adapter disagrees
        assert_eq!(
            unit_price_or_reported(Some(16990), Some(68), Some(999), Category::Diaper),
            Some(250)
        );
        // adapter figure fills the gap when the division is impossible
        assert_eq!(
            unit_price_or_reported(Some(16990), None, Some(260), Category::Diaper),
            Some(260)
        );
        assert_eq!(unit_price_or_reported(None, None, None, Category::Diaper), None);
    }

    fn record(nombre: &str, precio: Option<i64>, count: Option<i64>, reported: Option<i64>) -> ProductRecord {
        ProductRecord {
            nombre: nombre.to_string(),
            precio,
            marca: None,
            cantidad_unidades: count,
            precio_por_unidad: reported,
            url: "https://tienda.cl/p/1".to_string(),
            tienda: "Jumbo".to_string(),
            fecha_extraccion: "2025-03-01 08:00:00".to_string(),
            imagen: None,
            precio_lista: None,
        }
    }

    #[test]
    fn test_enrich_records() {
        let mut records = vec![
            record("Pañales Babysec Ultra Talla G", Some(16990), Some(68), None),
            record("Fórmula Nan 1 800g", Some(8990), Some(800), None),
            record("Pañales Huggies M", Some(12990), None, Some(270)),
            record("Pañales Pampers XG", None, None, None),
            record("Pañal Babysec Super Premium Talla G 60 unidades", Some(15000), None, None),
        ];
        enrich_records(&mut records);

        assert_eq!(records[0].precio_por_unidad, Some(250));
        // formula is compared per kilogram
        assert_eq!(records[1].precio_por_unidad, Some(11238));
        // no unit count anywhere: adapter's own figure survives
        assert_eq!(records[2].precio_por_unidad, Some(270));
        assert_eq!(records[3].precio_por_unidad, None);
        // count recovered from the name when the adapter sent none
        assert_eq!(records[4].cantidad_unidades, Some(60));
        assert_eq!(records[4].precio_por_unidad, Some(250));
    }

    #[test]
    fn test_discount_pct() {
        assert_eq!(discount_pct(Some(10000), Some(12000)), Some(17));
        assert_eq!(discount_pct(Some(8990), Some(12990)), Some(31));
        // list price at or below the selling price is a phantom discount
        assert_eq!(discount_pct(Some(10000), Some(9000)), None);
        assert_eq!(discount_pct(Some(10000), Some(10000)), None);
        assert_eq!(discount_pct(None, Some(12000)), None);
        assert_eq!(discount_pct(Some(10000), None), None);
    }

    #[test]
    fn test_effective_list_price() {
        assert_eq!(effective_list_price(Some(10000), Some(12000)), Some(12000));
        assert_eq!(effective_list_price(Some(10000), Some(9000)), None);
        assert_eq!(effective_list_price(Some(10000), Some(10000)), None);
        assert_eq!(effective_list_price(None, Some(12000)), None);
    }

    fn row(unit: Option<i64>, price: Option<i64>) -> SnapshotRow {
        SnapshotRow {
            product_id: 0,
            nombre: String::new(),
            marca_original: None,
            marca: "Desconocida".into(),
            categoria: Category::Diaper,
            talla: None,
            cantidad_unidades: None,
            url: String::new(),
            imagen: None,
            tienda: String::new(),
            precio: price,
            precio_por_unidad: unit,
            precio_lista: None,
            descuento: None,
        }
    }

    #[test]
    fn test_ordering_nulls_last_with_price_tiebreak() {
        let mut rows = vec![
            row(None, Some(5000)),
            row(Some(260), Some(15000)),
            row(Some(250), Some(16990)),
            row(None, Some(3000)),
            row(Some(250), Some(14990)),
        ];
        rows.sort_by(cmp_by_unit_price);

        let keys: Vec<_> = rows.iter().map(|r| (r.precio_por_unidad, r.precio)).collect();
        assert_eq!(
            keys,
            vec![
                (Some(250), Some(14990)),
                (Some(250), Some(16990)),
                (Some(260), Some(15000)),
                (None, Some(3000)),
                (None, Some(5000)),
            ]
        );
    }

    #[test]
    fn test_ordering_keeps_input_order_on_full_ties() {
        let mut first = row(Some(250), Some(16990));
        first.tienda = "Jumbo".to_string();
        let mut second = row(Some(250), Some(16990));
        second.tienda = "Santa Isabel".to_string();

        let mut rows = vec![first, second];
        rows.sort_by(cmp_by_unit_price);
        assert_eq!(rows[0].tienda, "Jumbo");
        assert_eq!(rows[1].tienda, "Santa Isabel");
    }
}
