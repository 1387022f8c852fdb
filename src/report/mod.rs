//! Analysis over one consolidated dataset: per-store statistics, the store
//! ranking, top offers and the brand comparison table, plus the plain-text
//! report rendered from them.

use std::collections::{BTreeMap, BTreeSet};

use crate::processor::consolidator::ConsolidatedRow;
use crate::processor::vocab::{REPORT_BRANDS, REPORT_EXCLUDE};

const LINE_WIDTH: usize = 70;

/// How many offers the cheapest-per-unit section lists.
pub const TOP_OFFERS: usize = 10;

/// Whether a consolidated row names an actual diaper. Some distributors mix
/// sanitary towels, dressings and toiletries into their diaper listings;
/// those never enter the analysis.
pub fn is_diaper(nombre: &str) -> bool {
    let lower = nombre.to_lowercase();
    !REPORT_EXCLUDE.iter().any(|kw| lower.contains(kw))
}

/// One store's slice of the dataset. Averages are `None` when no row of the
/// store carries the needed figure; unpriced rows never count as zero.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub products: usize,
    pub with_price: usize,
    pub with_unit_price: usize,
    pub avg_price: Option<f64>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub avg_unit_price: Option<f64>,
    pub cheapest_total: Option<ConsolidatedRow>,
    pub cheapest_per_unit: Option<ConsolidatedRow>,
}

/// Stores ordered by average unit price, cheapest first. `difference` and
/// `percentage` compare the winner against the runner-up.
#[derive(Debug, Clone)]
pub struct StoreRanking {
    pub by_avg_unit_price: Vec<(String, f64)>,
    pub difference: f64,
    pub percentage: f64,
}

/// Unit-price aggregate of one (brand, store) cell in the comparison table.
#[derive(Debug, Clone)]
pub struct BrandCell {
    pub avg_unit_price: f64,
    pub min_unit_price: i64,
    pub products: usize,
}

/// Everything the rendered report shows, as pure aggregates.
#[derive(Debug, Clone, Default)]
pub struct PriceReport {
    pub analyzed: usize,
    pub excluded: usize,
    pub data_date: Option<String>,
    pub stores: BTreeMap<String, StoreStats>,
    pub ranking: Option<StoreRanking>,
    pub top_offers: Vec<ConsolidatedRow>,
    pub brand_table: BTreeMap<&'static str, BTreeMap<String, BrandCell>>,
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

/// Aggregates a consolidated dataset. Non-diaper rows are dropped first and
/// counted in `excluded`.
pub fn build_report(rows: &[ConsolidatedRow]) -> PriceReport {
    let diapers: Vec<&ConsolidatedRow> = rows.iter().filter(|r| is_diaper(&r.nombre)).collect();
    let excluded = rows.len() - diapers.len();

    let data_date = diapers
        .iter()
        .find(|r| !r.fecha_extraccion.is_empty())
        .map(|r| r.fecha_extraccion.get(..10).unwrap_or(&r.fecha_extraccion).to_string());

    let mut by_store: BTreeMap<&str, Vec<&ConsolidatedRow>> = BTreeMap::new();
    for row in &diapers {
        by_store.entry(row.tienda.as_str()).or_default().push(row);
    }

    let mut stores = BTreeMap::new();
    for (store, group) in &by_store {
        let prices: Vec<i64> = group.iter().filter_map(|r| r.precio).collect();
        let unit_prices: Vec<i64> = group.iter().filter_map(|r| r.precio_por_unidad).collect();

        let cheapest_total = group
            .iter()
            .copied()
            .filter(|r| r.precio.is_some())
            .min_by_key(|r| r.precio)
            .cloned();
        let cheapest_per_unit = group
            .iter()
            .copied()
            .filter(|r| r.precio_por_unidad.is_some())
            .min_by_key(|r| r.precio_por_unidad)
            .cloned();

        stores.insert(
            (*store).to_string(),
            StoreStats {
                products: group.len(),
                with_price: prices.len(),
                with_unit_price: unit_prices.len(),
                avg_price: mean(&prices),
                min_price: prices.iter().copied().min(),
                max_price: prices.iter().copied().max(),
                avg_unit_price: mean(&unit_prices),
                cheapest_total,
                cheapest_per_unit,
            },
        );
    }

    let mut by_avg: Vec<(String, f64)> = stores
        .iter()
        .filter_map(|(name, stats)| stats.avg_unit_price.map(|avg| (name.clone(), avg)))
        .collect();
    by_avg.sort_by(|a, b| a.1.total_cmp(&b.1));
    let ranking = if by_avg.len() >= 2 {
        let difference = by_avg[1].1 - by_avg[0].1;
        Some(StoreRanking {
            difference,
            percentage: difference / by_avg[1].1 * 100.0,
            by_avg_unit_price: by_avg,
        })
    } else {
        None
    };

    let mut priced: Vec<&ConsolidatedRow> =
        diapers.iter().copied().filter(|r| r.precio_por_unidad.is_some()).collect();
    priced.sort_by_key(|r| r.precio_por_unidad);
    let top_offers: Vec<ConsolidatedRow> =
        priced.into_iter().take(TOP_OFFERS).cloned().collect();

    let mut cells: BTreeMap<&'static str, BTreeMap<String, Vec<i64>>> = BTreeMap::new();
    for row in &diapers {
        let Some(ppu) = row.precio_por_unidad else {
            continue;
        };
        let marca_lower = row.marca.as_deref().unwrap_or_default().to_lowercase();
        let Some(brand) = REPORT_BRANDS
            .iter()
            .find(|(needle, _)| marca_lower.contains(needle))
            .map(|(_, display)| *display)
        else {
            continue;
        };
        cells.entry(brand).or_default().entry(row.tienda.clone()).or_default().push(ppu);
    }
    let brand_table = cells
        .into_iter()
        .map(|(brand, by_store)| {
            let by_store = by_store
                .into_iter()
                .map(|(store, ppus)| {
                    let cell = BrandCell {
                        avg_unit_price: ppus.iter().sum::<i64>() as f64 / ppus.len() as f64,
                        min_unit_price: ppus.iter().copied().min().unwrap_or(0),
                        products: ppus.len(),
                    };
                    (store, cell)
                })
                .collect();
            (brand, by_store)
        })
        .collect();

    PriceReport {
        analyzed: diapers.len(),
        excluded,
        data_date,
        stores,
        ranking,
        top_offers,
        brand_table,
    }
}

/// `16690` -> `"$16.690"`, the way Chilean prices are written.
pub fn format_clp(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    if value < 0 { format!("-${out}") } else { format!("${out}") }
}

fn fmt_opt(value: Option<i64>) -> String {
    match value {
        Some(v) => format_clp(v),
        None => "Sin precio".to_string(),
    }
}

fn section(title: &str) -> String {
    let bar = "=".repeat(LINE_WIDTH);
    format!("\n{bar}\n  {title}\n{bar}")
}

fn subsection(title: &str) -> String {
    format!("\n  {title}\n  {}", "-".repeat(title.len()))
}

/// Renders the report as plain text, ready for stdout and the report file.
pub fn render_report(report: &PriceReport, generated_at: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let stars = "*".repeat(LINE_WIDTH);
    out.push(stars.clone());
    out.push("  COMPARADOR DE PANALES CHILE".to_string());
    out.push("  Reporte de Analisis de Precios".to_string());
    out.push(format!("  Generado el: {generated_at}"));
    out.push(stars);

    out.push(section("RESUMEN GENERAL"));
    out.push(String::new());
    out.push(format!("  Total de productos analizados: {}", report.analyzed));
    out.push(String::new());
    for (store, stats) in &report.stores {
        out.push(format!(
            "  - {}: {} productos ({} con precio)",
            store, stats.products, stats.with_price
        ));
    }
    if let Some(date) = &report.data_date {
        out.push(String::new());
        out.push(format!("  Datos extraidos el: {date}"));
    }

    out.push(section("PRECIO PROMEDIO POR TIENDA"));
    out.push(subsection("Promedio general (todos los productos)"));
    out.push(String::new());
    for (store, stats) in &report.stores {
        let (Some(avg), Some(min), Some(max)) = (stats.avg_price, stats.min_price, stats.max_price)
        else {
            continue;
        };
        out.push(format!("  {store}:"));
        out.push(format!("    Precio promedio: {}", format_clp(avg.round() as i64)));
        out.push(format!("    Precio minimo:   {}", format_clp(min)));
        out.push(format!("    Precio maximo:   {}", format_clp(max)));
        out.push(String::new());
    }

    out.push(subsection("Promedio por unidad (precio/cantidad de panales)"));
    out.push("  * Solo incluye productos donde se conoce la cantidad".to_string());
    out.push(String::new());
    for (store, stats) in &report.stores {
        let Some(avg) = stats.avg_unit_price else {
            continue;
        };
        out.push(format!("  {store}:"));
        out.push(format!("    Precio promedio por panal: {}", format_clp(avg.round() as i64)));
        out.push(format!(
            "    Productos con dato: {} de {}",
            stats.with_unit_price, stats.products
        ));
        out.push(String::new());
    }

    out.push(section("PRODUCTO MAS BARATO EN CADA TIENDA"));
    for (store, stats) in &report.stores {
        let Some(cheapest) = &stats.cheapest_total else {
            continue;
        };
        out.push(subsection(store));
        out.push(String::new());
        out.push("  Mas barato por precio total:".to_string());
        out.push(format!("    {}", cheapest.nombre));
        out.push(format!("    Precio: {}", fmt_opt(cheapest.precio)));
        if let Some(count) = cheapest.cantidad_unidades {
            out.push(format!("    Cantidad: {count} unidades"));
        }
        out.push(format!("    Marca: {}", cheapest.marca.as_deref().unwrap_or("-")));
        out.push(String::new());

        if let Some(best) = &stats.cheapest_per_unit {
            out.push("  Mas barato por unidad (mejor rendimiento):".to_string());
            out.push(format!("    {}", best.nombre));
            out.push(format!("    Precio: {}", fmt_opt(best.precio)));
            if let Some(count) = best.cantidad_unidades {
                out.push(format!("    Cantidad: {count} unidades"));
            }
            out.push(format!("    Precio por panal: {}", fmt_opt(best.precio_por_unidad)));
            out.push(format!("    Marca: {}", best.marca.as_deref().unwrap_or("-")));
            out.push(String::new());
        }
    }

    out.push(section("TIENDA CON MEJORES PRECIOS EN GENERAL"));
    out.push(String::new());
    match &report.ranking {
        None => out.push("  No hay suficientes datos para comparar tiendas.".to_string()),
        Some(ranking) => {
            out.push("  Comparando el precio promedio por panal individual:".to_string());
            out.push(String::new());
            for (i, (store, avg)) in ranking.by_avg_unit_price.iter().enumerate() {
                let mark = if i == 0 { " <-- Mas barata" } else { "" };
                out.push(format!(
                    "    {}. {}: {} por panal{}",
                    i + 1,
                    store,
                    format_clp(avg.round() as i64),
                    mark
                ));
            }
            let winner = &ranking.by_avg_unit_price[0].0;
            let second = &ranking.by_avg_unit_price[1].0;
            out.push(String::new());
            out.push(format!("  Conclusion: {winner} es en promedio"));
            out.push(format!(
                "  {} mas barata por panal ({:.1}% menos)",
                format_clp(ranking.difference.round() as i64),
                ranking.percentage
            ));
            out.push(format!("  que {second}."));
            out.push(String::new());
            out.push("  IMPORTANTE: Este promedio mezcla panales de bebe y adulto,".to_string());
            out.push("  packs grandes y chicos, y distintas marcas. Para una comparacion".to_string());
            out.push("  mas precisa, revisa el Top 10 de ofertas mas abajo o filtra".to_string());
            out.push("  por marca/talla en el CSV consolidado.".to_string());
        }
    }

    out.push(section(&format!("TOP {TOP_OFFERS} MEJORES OFERTAS DE PANALES")));
    out.push(String::new());
    out.push("  Ordenado por precio por panal (de mas barato a mas caro).".to_string());
    out.push("  Solo incluye productos donde se conoce la cantidad.".to_string());
    out.push(String::new());
    for (i, offer) in report.top_offers.iter().enumerate() {
        out.push(format!("  {:>2}. {}", i + 1, offer.nombre));
        out.push(format!("      Tienda:           {}", offer.tienda));
        out.push(format!("      Precio total:     {}", fmt_opt(offer.precio)));
        if let Some(count) = offer.cantidad_unidades {
            out.push(format!("      Cantidad:         {count} unidades"));
        }
        out.push(format!("      Precio por panal: {}", fmt_opt(offer.precio_por_unidad)));
        out.push(format!("      Marca:            {}", offer.marca.as_deref().unwrap_or("-")));
        out.push(String::new());
    }

    out.push(section("COMPARACION POR MARCA"));
    out.push(String::new());
    out.push("  Precio promedio por panal, por marca y tienda.".to_string());
    out.push("  Solo marcas presentes en al menos una tienda con cantidad conocida.".to_string());
    out.push(String::new());
    let stores_in_table: BTreeSet<&String> =
        report.brand_table.values().flat_map(|cells| cells.keys()).collect();
    for (brand, cells) in &report.brand_table {
        out.push(format!("  {brand}:"));
        for store in &stores_in_table {
            match cells.get(*store) {
                Some(cell) => out.push(format!(
                    "    {:25} promedio {}/u  (minimo {}/u, {} productos)",
                    store,
                    format_clp(cell.avg_unit_price.round() as i64),
                    format_clp(cell.min_unit_price),
                    cell.products
                )),
                None => out.push(format!("    {:25} No disponible", store)),
            }
        }
        out.push(String::new());
    }

    out.push(String::new());
    let dashes = "-".repeat(LINE_WIDTH);
    out.push(dashes.clone());
    out.push("  Fin del reporte.".to_string());
    out.push("  Datos del archivo consolidado de la ultima ejecucion.".to_string());
    out.push(dashes);

    out.join("\n")
}
