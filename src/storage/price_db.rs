use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::models::{HistoryStats, PricePoint, ProductIdentity, ProductRecord, SnapshotRow};
use crate::processor::normalizer::RecordNormalizer;
use crate::processor::pricing;
use crate::storage::filters::{ProductScope, SnapshotFilter, SortKey, in_baby_scope};

/// Single-file schema. Prices accumulate one row per product, store and run;
/// nothing is ever updated or deleted there. Product identities are keyed by
/// source URL and only refreshed in place (unit count back-fill, image).
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tiendas (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nombre TEXT NOT NULL UNIQUE,
        url_base TEXT
    );

    CREATE TABLE IF NOT EXISTS productos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nombre TEXT NOT NULL,
        marca TEXT,
        tamano_unidades INTEGER,
        url TEXT,
        imagen_url TEXT,
        UNIQUE(url)
    );

    CREATE TABLE IF NOT EXISTS precios (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        producto_id INTEGER NOT NULL,
        tienda_id INTEGER NOT NULL,
        precio INTEGER,
        precio_por_unidad INTEGER,
        precio_lista INTEGER,
        fecha_scraping TEXT NOT NULL,
        FOREIGN KEY (producto_id) REFERENCES productos(id),
        FOREIGN KEY (tienda_id) REFERENCES tiendas(id)
    );

    CREATE INDEX IF NOT EXISTS idx_precios_fecha ON precios(fecha_scraping);
    CREATE INDEX IF NOT EXISTS idx_precios_producto ON precios(producto_id);

    CREATE TABLE IF NOT EXISTS alertas (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL,
        tipo TEXT NOT NULL,
        producto_id INTEGER,
        marca TEXT,
        talla TEXT,
        cantidad INTEGER,
        categoria TEXT,
        nombre_display TEXT,
        precio_objetivo INTEGER NOT NULL,
        token TEXT NOT NULL UNIQUE,
        confirmada INTEGER DEFAULT 0,
        activa INTEGER DEFAULT 1,
        fecha_creacion TEXT NOT NULL,
        FOREIGN KEY (producto_id) REFERENCES productos(id)
    );

    CREATE TABLE IF NOT EXISTS alertas_enviadas (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        alerta_id INTEGER NOT NULL,
        precio_encontrado INTEGER NOT NULL,
        tienda TEXT,
        fecha_envio TEXT NOT NULL,
        FOREIGN KEY (alerta_id) REFERENCES alertas(id)
    );
";

/// SQLite-backed price history and product registry.
pub struct PriceDb {
    conn: Connection,
}

struct RawOfferRow {
    product_id: i64,
    nombre: String,
    marca: Option<String>,
    tamano_unidades: Option<i64>,
    url: Option<String>,
    imagen: Option<String>,
    tienda: String,
    precio: Option<i64>,
    precio_por_unidad: Option<i64>,
    precio_lista: Option<i64>,
}

impl PriceDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let db = PriceDb { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = PriceDb { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self.conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < 1 {
            self.conn.execute_batch(SCHEMA).context("Failed to apply schema")?;
            self.conn.execute_batch("PRAGMA user_version = 1")?;
        }
        Ok(())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Finds a store by exact name, creating it on first sight.
    pub fn get_or_create_store(&self, name: &str, base_url: Option<&str>) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row("SELECT id FROM tiendas WHERE nombre = ?", params![name], |row| row.get(0))
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO tiendas (nombre, url_base) VALUES (?, ?)",
            params![name, base_url],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Finds the product identity for a record by URL, creating it if the URL
    /// was never seen. Existing identities keep their name and brand; the
    /// unit count is back-filled once it becomes known (never cleared), and
    /// the image is refreshed whenever the record carries one.
    pub fn resolve_identity(&self, record: &ProductRecord) -> Result<i64> {
        // An empty URL binds NULL, which never matches in SQL: url-less
        // records get a fresh identity each instead of merging under "".
        let url = (!record.url.is_empty()).then_some(record.url.as_str());
        let existing: Option<(i64, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT id, tamano_unidades FROM productos WHERE url = ?",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, current_count)) = existing {
            if let Some(count) = record.cantidad_unidades {
                if count > 0 && current_count.unwrap_or(0) == 0 {
                    self.conn.execute(
                        "UPDATE productos SET tamano_unidades = ? WHERE id = ?",
                        params![count, id],
                    )?;
                }
            }
            if record.imagen.is_some() {
                self.conn.execute(
                    "UPDATE productos SET imagen_url = ? WHERE id = ?",
                    params![record.imagen, id],
                )?;
            }
            return Ok(id);
        }

        self.conn.execute(
            "INSERT INTO productos (nombre, marca, tamano_unidades, url, imagen_url) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.nombre,
                record.marca,
                record.cantidad_unidades,
                url,
                record.imagen
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Appends one run's observations for a batch of records. Each insert
    /// commits on its own: a failure mid-batch keeps everything written so
    /// far and surfaces the error to the caller, which decides whether other
    /// batches still run.
    ///
    /// `base_urls` maps store names to their site root, used only when a
    /// store row is first created.
    pub fn record_observations(
        &self,
        run_date: &str,
        records: &[ProductRecord],
        base_urls: &HashMap<String, String>,
    ) -> Result<usize> {
        let normalizer = RecordNormalizer;
        let mut inserted = 0;

        for record in records {
            let store_id = self
                .get_or_create_store(&record.tienda, base_urls.get(&record.tienda).map(String::as_str))?;
            let product_id = self.resolve_identity(record)?;

            let category = normalizer.detect_category(&record.nombre);
            let unit_price = pricing::unit_price_or_reported(
                record.precio,
                record.cantidad_unidades,
                record.precio_por_unidad,
                category,
            );

            let mut stmt = self.conn.prepare_cached(
                "INSERT INTO precios (producto_id, tienda_id, precio, precio_por_unidad, \
                 precio_lista, fecha_scraping) VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            stmt.execute(params![
                product_id,
                store_id,
                record.precio,
                unit_price,
                record.precio_lista,
                run_date
            ])?;
            inserted += 1;
        }

        debug!("{} price rows appended for run {}", inserted, run_date);
        Ok(inserted)
    }

    /// Timestamp of the most recent run, or `None` on an empty history.
    pub fn latest_run_date(&self) -> Result<Option<String>> {
        let date: Option<String> =
            self.conn
                .query_row("SELECT MAX(fecha_scraping) FROM precios", [], |row| row.get(0))?;
        Ok(date)
    }

    /// Priced offers observed at one reference date, with attributes derived
    /// per row and the requested filters and ordering applied. A product seen
    /// twice at the same store in one run yields a single row.
    pub fn snapshot_at(
        &self,
        run_date: &str,
        filter: &SnapshotFilter,
        sort: SortKey,
    ) -> Result<Vec<SnapshotRow>> {
        let mut sql = String::from(
            "SELECT p.id, p.nombre, p.marca, p.tamano_unidades, p.url, p.imagen_url, \
             t.nombre, pr.precio, pr.precio_por_unidad, pr.precio_lista \
             FROM precios pr \
             JOIN productos p ON p.id = pr.producto_id \
             JOIN tiendas t ON t.id = pr.tienda_id \
             WHERE pr.fecha_scraping = ? AND pr.precio IS NOT NULL",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(run_date.to_string())];

        if let Some(product_id) = filter.product_id {
            sql.push_str(" AND p.id = ?");
            args.push(Box::new(product_id));
        }
        if let Some(stores) = &filter.stores {
            if !stores.is_empty() {
                let placeholders = vec!["?"; stores.len()].join(",");
                sql.push_str(&format!(" AND t.nombre IN ({placeholders})"));
                for store in stores {
                    args.push(Box::new(store.clone()));
                }
            }
        }
        if let Some(max_price) = filter.max_price {
            sql.push_str(" AND pr.precio <= ?");
            args.push(Box::new(max_price));
        }
        if let Some(text) = &filter.text {
            for word in text.split_whitespace() {
                sql.push_str(" AND p.nombre LIKE ?");
                args.push(Box::new(format!("%{word}%")));
            }
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(sort.order_clause());

        let mut stmt = self.conn.prepare(&sql)?;
        let raw_rows = stmt.query_map(params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
            Ok(RawOfferRow {
                product_id: row.get(0)?,
                nombre: row.get(1)?,
                marca: row.get(2)?,
                tamano_unidades: row.get(3)?,
                url: row.get(4)?,
                imagen: row.get(5)?,
                tienda: row.get(6)?,
                precio: row.get(7)?,
                precio_por_unidad: row.get(8)?,
                precio_lista: row.get(9)?,
            })
        })?;

        let normalizer = RecordNormalizer;
        let mut seen: HashSet<(i64, String)> = HashSet::new();
        let mut out = Vec::new();

        for raw in raw_rows {
            let raw = raw?;
            if !seen.insert((raw.product_id, raw.tienda.clone())) {
                continue;
            }
            if filter.scope == ProductScope::BabyOnly && !in_baby_scope(&raw.nombre) {
                continue;
            }

            let categoria = normalizer.detect_category(&raw.nombre);
            let talla = normalizer.detect_size(&raw.nombre);
            let marca_original = raw.marca.filter(|m| !m.trim().is_empty());
            let marca = normalizer.canonical_brand(marca_original.as_deref(), &raw.nombre);

            if let Some(brand) = &filter.brand {
                if marca.to_lowercase() != brand.to_lowercase() {
                    continue;
                }
            }
            if let Some(size) = &filter.size {
                if talla.as_deref() != Some(size.as_str()) {
                    continue;
                }
            }
            if let Some(sizes) = &filter.sizes {
                if !sizes.is_empty()
                    && !talla.as_deref().is_some_and(|t| sizes.iter().any(|s| s == t))
                {
                    continue;
                }
            }
            if let Some(category) = filter.category {
                if categoria != category {
                    continue;
                }
            }
            if let Some(name) = &filter.product_name {
                if raw.nombre != *name {
                    continue;
                }
            }

            out.push(SnapshotRow {
                product_id: raw.product_id,
                nombre: raw.nombre,
                marca_original,
                marca,
                categoria,
                talla,
                cantidad_unidades: raw.tamano_unidades,
                url: raw.url.unwrap_or_default(),
                imagen: raw.imagen,
                tienda: raw.tienda,
                precio: raw.precio,
                precio_por_unidad: raw.precio_por_unidad,
                precio_lista: pricing::effective_list_price(raw.precio, raw.precio_lista),
                descuento: pricing::discount_pct(raw.precio, raw.precio_lista),
            });
        }

        Ok(out)
    }

    /// Snapshot at the most recent run date. Returns the rows together with
    /// that date; an empty history yields no rows and no date.
    pub fn latest_snapshot(
        &self,
        filter: &SnapshotFilter,
        sort: SortKey,
    ) -> Result<(Vec<SnapshotRow>, Option<String>)> {
        match self.latest_run_date()? {
            Some(date) => {
                let rows = self.snapshot_at(&date, filter, sort)?;
                Ok((rows, Some(date)))
            }
            None => Ok((Vec::new(), None)),
        }
    }

    /// Full price history of one product, oldest first.
    pub fn history_of(&self, product_id: i64) -> Result<Vec<PricePoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT pr.fecha_scraping, t.nombre, pr.precio, pr.precio_por_unidad, pr.precio_lista \
             FROM precios pr \
             JOIN tiendas t ON t.id = pr.tienda_id \
             WHERE pr.producto_id = ? \
             ORDER BY pr.fecha_scraping ASC, pr.id ASC",
        )?;
        let rows = stmt.query_map(params![product_id], |row| {
            Ok(PricePoint {
                run_date: row.get(0)?,
                store: row.get(1)?,
                price: row.get(2)?,
                unit_price: row.get(3)?,
                list_price: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn product_identity(&self, product_id: i64) -> Result<Option<ProductIdentity>> {
        let identity = self
            .conn
            .query_row(
                "SELECT id, nombre, marca, tamano_unidades, url, imagen_url \
                 FROM productos WHERE id = ?",
                params![product_id],
                |row| {
                    Ok(ProductIdentity {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        brand: row.get(2)?,
                        unit_count: row.get(3)?,
                        url: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        image_url: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    /// Store display names, alphabetical.
    pub fn stores(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT nombre FROM tiendas ORDER BY nombre")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Highest price ever observed, for the price-ceiling slider.
    pub fn max_price(&self) -> Result<Option<i64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(precio) FROM precios WHERE precio IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// (name, raw brand) of every product that ever had a per-unit price,
    /// for building the brand catalog.
    pub fn products_with_unit_price(&self) -> Result<Vec<(String, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.nombre, p.marca FROM productos p \
             JOIN precios pr ON pr.producto_id = p.id \
             WHERE pr.precio_por_unidad IS NOT NULL \
             GROUP BY p.id ORDER BY p.marca",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Coverage of the accumulated history, or `None` before the first run.
    pub fn history_stats(&self) -> Result<Option<HistoryStats>> {
        let (runs, first, last, observations): (i64, Option<String>, Option<String>, i64) =
            self.conn.query_row(
                "SELECT COUNT(DISTINCT fecha_scraping), MIN(fecha_scraping), \
                 MAX(fecha_scraping), COUNT(*) FROM precios",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
        let (Some(first_run), Some(last_run)) = (first, last) else {
            return Ok(None);
        };
        let tracked_products: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM productos", [], |row| row.get(0))?;
        Ok(Some(HistoryStats {
            distinct_runs: runs,
            first_run,
            last_run,
            total_observations: observations,
            tracked_products,
        }))
    }
}
