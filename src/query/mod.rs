//! Read-side views over the historical store: latest-run search, the
//! cascading filter catalog, the best-offer-per-size view and the savings
//! projection the presentation layer shows next to a listing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Result;

use crate::models::{Category, PricePoint, ProductIdentity, SnapshotRow};
use crate::processor::normalizer::RecordNormalizer;
use crate::processor::vocab::{UNKNOWN_BRAND, size_rank};
use crate::storage::{PriceDb, SnapshotFilter, SortKey, in_baby_scope};

/// Price-slider ceiling offered before any observation exists.
const DEFAULT_PRICE_CEILING: i64 = 50_000;

/// Roughly six diapers a day; the figure behind the savings projection.
pub const DIAPERS_PER_MONTH: i64 = 180;

/// Latest-run listing under the given filters and ordering, together with
/// the run date it reflects. An empty history yields no rows and no date.
pub fn search(
    db: &PriceDb,
    filter: &SnapshotFilter,
    sort: SortKey,
) -> Result<(Vec<SnapshotRow>, Option<String>)> {
    db.latest_snapshot(filter, sort)
}

/// Cheapest offer of each size under the unit-price ordering, smallest size
/// first. Offers without a size or without a unit price never claim a slot.
/// Any size filter on the incoming selection is ignored.
pub fn best_per_size(
    db: &PriceDb,
    filter: &SnapshotFilter,
) -> Result<Vec<(String, SnapshotRow)>> {
    let filter = SnapshotFilter { size: None, sizes: None, ..filter.clone() };
    let (rows, _) = db.latest_snapshot(&filter, SortKey::UnitPrice)?;

    let mut best: Vec<(String, SnapshotRow)> = Vec::new();
    for row in rows {
        if row.precio_por_unidad.is_none() {
            continue;
        }
        let Some(talla) = row.talla.clone() else {
            continue;
        };
        if best.iter().any(|(seen, _)| *seen == talla) {
            continue;
        }
        best.push((talla, row));
    }
    best.sort_by_key(|(talla, _)| size_rank(talla));
    Ok(best)
}

/// Full price history of one product, oldest first, with the identity
/// attributes as currently stored. `None` for an unknown id.
pub fn product_history(
    db: &PriceDb,
    product_id: i64,
) -> Result<Option<(ProductIdentity, Vec<PricePoint>)>> {
    let Some(identity) = db.product_identity(product_id)? else {
        return Ok(None);
    };
    let points = db.history_of(product_id)?;
    Ok(Some((identity, points)))
}

/// Distinct canonical brands that ever had a priced-per-unit offer in scope,
/// alphabetical.
pub fn available_brands(db: &PriceDb) -> Result<Vec<String>> {
    let normalizer = RecordNormalizer;
    let mut brands = BTreeSet::new();
    for (nombre, marca) in db.products_with_unit_price()? {
        if !in_baby_scope(&nombre) {
            continue;
        }
        let brand = normalizer.canonical_brand(marca.as_deref(), &nombre);
        if brand != UNKNOWN_BRAND {
            brands.insert(brand);
        }
    }
    Ok(brands.into_iter().collect())
}

/// Options one category offers: its brands, the sizes each brand comes in
/// and, for formula, the concrete product names per brand. The `""` key in
/// the maps is the union across all brands of the category.
#[derive(Debug, Default, PartialEq)]
pub struct CategoryOptions {
    pub brands: Vec<String>,
    pub sizes_by_brand: BTreeMap<String, Vec<String>>,
    pub products_by_brand: BTreeMap<String, Vec<String>>,
}

/// Cascading filter catalog built from the latest snapshot. Categories are
/// keyed by display name, with a `""` entry for "no category chosen"; the
/// store list and the price-slider ceiling ride along.
#[derive(Debug, Default)]
pub struct FilterOptions {
    pub by_category: BTreeMap<String, CategoryOptions>,
    pub stores: Vec<String>,
    pub price_ceiling: i64,
}

/// Builds the filter catalog from the latest run. Offers without a unit
/// price only count for formula, where comparison is by product rather than
/// by size; wipes and formula expose no size menu at all.
pub fn filter_options(db: &PriceDb) -> Result<FilterOptions> {
    let stores = db.stores()?;
    let price_ceiling = db.max_price()?.unwrap_or(DEFAULT_PRICE_CEILING);

    let (rows, run_date) = db.latest_snapshot(&SnapshotFilter::default(), SortKey::UnitPrice)?;
    if run_date.is_none() {
        let mut by_category = BTreeMap::new();
        by_category.insert(
            String::new(),
            CategoryOptions {
                sizes_by_brand: BTreeMap::from([(String::new(), Vec::new())]),
                ..Default::default()
            },
        );
        return Ok(FilterOptions { by_category, stores, price_ceiling });
    }

    // category -> brand -> sizes, accumulated before any category-specific
    // pruning
    let mut sizes: HashMap<Category, BTreeMap<String, BTreeSet<String>>> = HashMap::new();
    let mut formula_products: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for row in &rows {
        if row.marca == UNKNOWN_BRAND {
            continue;
        }
        if row.categoria != Category::InfantFormula && row.precio_por_unidad.is_none() {
            continue;
        }

        let per_brand = sizes.entry(row.categoria).or_default();
        let brand_sizes = per_brand.entry(row.marca.clone()).or_default();
        if let Some(talla) = &row.talla {
            brand_sizes.insert(talla.clone());
        }

        if row.categoria == Category::InfantFormula {
            formula_products.entry(row.marca.clone()).or_default().insert(row.nombre.clone());
        }
    }

    let mut by_category = BTreeMap::new();
    let mut all_brands: BTreeSet<String> = BTreeSet::new();
    let mut global_sizes: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut global_union: BTreeSet<String> = BTreeSet::new();

    for category in Category::ALL {
        let Some(per_brand) = sizes.get(&category) else {
            continue;
        };
        let brands: Vec<String> = per_brand.keys().cloned().collect();

        let mut sizes_by_brand = BTreeMap::new();
        let mut union: BTreeSet<String> = BTreeSet::new();
        for (brand, brand_sizes) in per_brand {
            union.extend(brand_sizes.iter().cloned());
            sizes_by_brand.insert(brand.clone(), sorted_sizes(brand_sizes));

            all_brands.insert(brand.clone());
            global_sizes.entry(brand.clone()).or_default().extend(brand_sizes.iter().cloned());
            global_union.extend(brand_sizes.iter().cloned());
        }
        sizes_by_brand.insert(String::new(), sorted_sizes(&union));
        if !category.has_sizes() {
            sizes_by_brand = BTreeMap::new();
        }

        let mut products_by_brand = BTreeMap::new();
        if category == Category::InfantFormula {
            let mut every: BTreeSet<String> = BTreeSet::new();
            for (brand, names) in &formula_products {
                every.extend(names.iter().cloned());
                products_by_brand.insert(brand.clone(), names.iter().cloned().collect());
            }
            products_by_brand.insert(String::new(), every.into_iter().collect());
        }

        by_category.insert(
            category.display_name().to_string(),
            CategoryOptions { brands, sizes_by_brand, products_by_brand },
        );
    }

    let mut global_sizes_sorted = BTreeMap::new();
    global_sizes_sorted.insert(String::new(), sorted_sizes(&global_union));
    for (brand, brand_sizes) in &global_sizes {
        global_sizes_sorted.insert(brand.clone(), sorted_sizes(brand_sizes));
    }
    by_category.insert(
        String::new(),
        CategoryOptions {
            brands: all_brands.into_iter().collect(),
            sizes_by_brand: global_sizes_sorted,
            products_by_brand: BTreeMap::new(),
        },
    );

    Ok(FilterOptions { by_category, stores, price_ceiling })
}

fn sorted_sizes(sizes: &BTreeSet<String>) -> Vec<String> {
    let mut out: Vec<String> = sizes.iter().cloned().collect();
    out.sort_by_key(|tag| size_rank(tag));
    out
}

/// Spread between the cheapest and the dearest per-unit offer of a listing,
/// projected at [`DIAPERS_PER_MONTH`]. `None` until at least two offers
/// carry a unit price.
#[derive(Debug, Clone)]
pub struct SavingsEstimate {
    pub best: SnapshotRow,
    pub worst: SnapshotRow,
    pub per_unit_difference: i64,
    pub percentage: f64,
    pub monthly: i64,
    pub annual: i64,
}

pub fn savings_estimate(rows: &[SnapshotRow]) -> Option<SavingsEstimate> {
    let candidates: Vec<&SnapshotRow> =
        rows.iter().filter(|row| row.precio_por_unidad.is_some_and(|v| v > 0)).collect();
    if candidates.len() < 2 {
        return None;
    }

    let best = candidates.iter().copied().min_by_key(|row| row.precio_por_unidad)?;
    let worst = candidates.iter().copied().max_by_key(|row| row.precio_por_unidad)?;
    let best_ppu = best.precio_por_unidad?;
    let worst_ppu = worst.precio_por_unidad?;

    let per_unit_difference = worst_ppu - best_ppu;
    let monthly = per_unit_difference * DIAPERS_PER_MONTH;
    Some(SavingsEstimate {
        best: best.clone(),
        worst: worst.clone(),
        per_unit_difference,
        percentage: per_unit_difference as f64 / worst_ppu as f64 * 100.0,
        monthly,
        annual: monthly * 12,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::ProductRecord;

    fn seed(db: &PriceDb, records: Vec<ProductRecord>) {
        db.record_observations("2025-03-10 08:00:00", &records, &HashMap::new()).unwrap();
    }

    fn record(nombre: &str, tienda: &str, url: &str, precio: i64, count: Option<i64>) -> ProductRecord {
        ProductRecord {
            nombre: nombre.to_string(),
            precio: Some(precio),
            marca: None,
            cantidad_unidades: count,
            precio_por_unidad: None,
            url: url.to_string(),
            tienda: tienda.to_string(),
            fecha_extraccion: "2025-03-10 08:00:00".to_string(),
            imagen: None,
            precio_lista: None,
        }
    }

    #[test]
    fn test_search_returns_rows_and_run_date() {
        let db = PriceDb::open_in_memory().unwrap();
        seed(&db, vec![record("Pañales Pampers Talla M 68 unidades", "Jumbo", "https://j/1", 16990, Some(68))]);

        let (rows, date) = search(&db, &SnapshotFilter::default(), SortKey::UnitPrice).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(date.as_deref(), Some("2025-03-10 08:00:00"));
    }

    #[test]
    fn test_best_per_size_picks_cheapest_and_orders_by_ladder() {
        let db = PriceDb::open_in_memory().unwrap();
        seed(
            &db,
            vec![
                record("Pañales Pampers Talla G 60 unidades", "Jumbo", "https://j/1", 18000, Some(60)),
                record("Pañales Huggies Talla G 50 unidades", "Liquimax", "https://l/1", 12500, Some(50)),
                record("Pañales Babysec Talla RN 40 unidades", "Jumbo", "https://j/2", 8000, Some(40)),
                record("Pañales Pampers Talla M 68 unidades", "Jumbo", "https://j/3", 16990, Some(68)),
            ],
        );

        let best = best_per_size(&db, &SnapshotFilter::default()).unwrap();
        let sizes: Vec<&str> = best.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(sizes, vec!["RN", "M", "G"]);

        let (_, g) = best.iter().find(|(t, _)| t == "G").unwrap();
        assert_eq!(g.precio_por_unidad, Some(250));
        assert_eq!(g.tienda, "Liquimax");
    }

    #[test]
    fn test_best_per_size_ignores_offers_without_unit_price() {
        let db = PriceDb::open_in_memory().unwrap();
        seed(
            &db,
            vec![
                // cheaper in absolute terms but no count, so no unit price
                record("Pañales Huggies Talla G", "Liquimax", "https://l/1", 3000, None),
                record("Pañales Pampers Talla G 60 unidades", "Jumbo", "https://j/1", 18000, Some(60)),
                record("Pañales Babysec Talla M", "Jumbo", "https://j/2", 9990, None),
            ],
        );

        let best = best_per_size(&db, &SnapshotFilter::default()).unwrap();
        let sizes: Vec<&str> = best.iter().map(|(t, _)| t.as_str()).collect();
        // M has no priced-per-unit offer at all, so it gets no slot
        assert_eq!(sizes, vec!["G"]);
        assert_eq!(best[0].1.precio_por_unidad, Some(300));
    }

    #[test]
    fn test_product_history_view() {
        let db = PriceDb::open_in_memory().unwrap();
        let rec = record("Pañales Pampers Talla M 68 unidades", "Jumbo", "https://j/1", 16990, Some(68));
        db.record_observations("2025-03-09 08:00:00", std::slice::from_ref(&rec), &HashMap::new())
            .unwrap();
        db.record_observations("2025-03-10 08:00:00", &[rec], &HashMap::new()).unwrap();

        let (rows, _) = search(&db, &SnapshotFilter::default(), SortKey::UnitPrice).unwrap();
        let (identity, points) = product_history(&db, rows[0].product_id).unwrap().unwrap();
        assert_eq!(identity.unit_count, Some(68));
        assert_eq!(points.len(), 2);
        assert!(points[0].run_date < points[1].run_date);

        assert!(product_history(&db, 9999).unwrap().is_none());
    }

    #[test]
    fn test_available_brands_canonical_sorted() {
        let db = PriceDb::open_in_memory().unwrap();
        let mut branded = record("Pañales Premium Talla M 68 unidades", "Jumbo", "https://j/1", 16990, Some(68));
        branded.marca = Some("PAMPERS".to_string());
        seed(
            &db,
            vec![
                branded,
                record("Pañales Pampers Talla G 60 unidades", "Liquimax", "https://l/1", 18000, Some(60)),
                record("Pañales Huggies Talla M 64 unidades", "Jumbo", "https://j/2", 15990, Some(64)),
                // no unit price: not part of the brand catalog
                record("Pañales Babysec Talla M", "Jumbo", "https://j/3", 9990, None),
            ],
        );

        assert_eq!(available_brands(&db).unwrap(), vec!["Huggies", "Pampers"]);
    }

    #[test]
    fn test_filter_options_cascade() {
        let db = PriceDb::open_in_memory().unwrap();
        let mut formula = record("NAN Optipro 1 fórmula infantil 800g", "Jumbo", "https://j/4", 8990, Some(800));
        formula.marca = Some("NAN OPTIPRO".to_string());
        seed(
            &db,
            vec![
                record("Pañales Pampers Talla M 68 unidades", "Jumbo", "https://j/1", 16990, Some(68)),
                record("Pañales Pampers Talla G 60 unidades", "Jumbo", "https://j/2", 18000, Some(60)),
                record("Pañales Huggies Talla G 50 unidades", "Liquimax", "https://l/1", 12500, Some(50)),
                record("Toallitas húmedas Huggies x80", "Jumbo", "https://j/3", 2990, Some(80)),
                formula,
            ],
        );

        let options = filter_options(&db).unwrap();
        assert_eq!(options.price_ceiling, 18000);
        assert_eq!(options.stores, vec!["Jumbo", "Liquimax"]);

        let diapers = &options.by_category["Pañales"];
        assert_eq!(diapers.brands, vec!["Huggies", "Pampers"]);
        assert_eq!(diapers.sizes_by_brand["Pampers"], vec!["M", "G"]);
        assert_eq!(diapers.sizes_by_brand["Huggies"], vec!["G"]);
        assert_eq!(diapers.sizes_by_brand[""], vec!["M", "G"]);
        assert!(diapers.products_by_brand.is_empty());

        let wipes = &options.by_category["Toallitas Humedas"];
        assert_eq!(wipes.brands, vec!["Huggies"]);
        assert!(wipes.sizes_by_brand.is_empty());

        let formulas = &options.by_category["Fórmulas Infantiles"];
        assert_eq!(formulas.brands, vec!["Nan"]);
        assert!(formulas.sizes_by_brand.is_empty());
        assert_eq!(
            formulas.products_by_brand["Nan"],
            vec!["NAN Optipro 1 fórmula infantil 800g"]
        );
        assert_eq!(
            formulas.products_by_brand[""],
            vec!["NAN Optipro 1 fórmula infantil 800g"]
        );

        let global = &options.by_category[""];
        assert_eq!(global.brands, vec!["Huggies", "Nan", "Pampers"]);
        assert_eq!(global.sizes_by_brand[""], vec!["M", "G"]);
    }

    #[test]
    fn test_filter_options_requires_unit_price_outside_formula() {
        let db = PriceDb::open_in_memory().unwrap();
        seed(
            &db,
            vec![
                // no count anywhere: diaper drops out, formula stays
                record("Pañales Babysec Talla M", "Jumbo", "https://j/1", 9990, None),
                record("Fórmula láctea Blemil Plus 1", "Jumbo", "https://j/2", 12990, None),
            ],
        );

        let options = filter_options(&db).unwrap();
        assert!(!options.by_category.contains_key("Pañales"));
        assert!(options.by_category.contains_key("Fórmulas Infantiles"));
    }

    #[test]
    fn test_filter_options_empty_history() {
        let db = PriceDb::open_in_memory().unwrap();
        let options = filter_options(&db).unwrap();
        assert_eq!(options.price_ceiling, DEFAULT_PRICE_CEILING);
        assert!(options.stores.is_empty());
        assert_eq!(options.by_category.len(), 1);
        assert_eq!(options.by_category[""].sizes_by_brand[""], Vec::<String>::new());
    }

    #[test]
    fn test_savings_estimate_projection() {
        let db = PriceDb::open_in_memory().unwrap();
        seed(
            &db,
            vec![
                record("Pañales Huggies Talla G 50 unidades", "Liquimax", "https://l/1", 12500, Some(50)),
                record("Pañales Pampers Talla G 60 unidades", "Jumbo", "https://j/1", 18000, Some(60)),
                record("Pañales Babysec Talla G sin cantidad", "Jumbo", "https://j/2", 9990, None),
            ],
        );
        let (rows, _) = search(&db, &SnapshotFilter::default(), SortKey::UnitPrice).unwrap();

        let estimate = savings_estimate(&rows).unwrap();
        assert_eq!(estimate.best.precio_por_unidad, Some(250));
        assert_eq!(estimate.worst.precio_por_unidad, Some(300));
        assert_eq!(estimate.per_unit_difference, 50);
        assert_eq!(estimate.monthly, 9_000);
        assert_eq!(estimate.annual, 108_000);
        assert!((estimate.percentage - 16.666).abs() < 0.01);
    }

    #[test]
    fn test_savings_estimate_needs_two_priced_offers() {
        assert!(savings_estimate(&[]).is_none());

        let db = PriceDb::open_in_memory().unwrap();
        seed(
            &db,
            vec![
                record("Pañales Pampers Talla G 60 unidades", "Jumbo", "https://j/1", 18000, Some(60)),
                record("Pañales Babysec Talla G", "Jumbo", "https://j/2", 9990, None),
            ],
        );
        let (rows, _) = search(&db, &SnapshotFilter::default(), SortKey::UnitPrice).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(savings_estimate(&rows).is_none());
    }
}
