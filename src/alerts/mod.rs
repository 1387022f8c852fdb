//! Price-alert subscriptions: creation with a confirmation token, matching
//! against the latest snapshot and a sent log with 24-hour resend
//! suppression. Rendering and delivery of the actual emails happen outside
//! the pipeline; callers get the triggered matches back.

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use rusqlite::{OptionalExtension, params};
use tracing::info;
use uuid::Uuid;

use crate::models::RUN_DATE_FORMAT;
use crate::storage::{PriceDb, ProductScope, SnapshotFilter, SortKey};

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// What a subscription watches: one exact product, or every offer of a brand
/// optionally narrowed by size and pack quantity. The category tags the
/// subscription for display and is not part of the match.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionKind {
    Product {
        product_id: i64,
    },
    Group {
        brand: String,
        size: Option<String>,
        quantity: Option<i64>,
        category: Option<String>,
    },
}

impl SubscriptionKind {
    fn type_tag(&self) -> &'static str {
        match self {
            SubscriptionKind::Product { .. } => "producto",
            SubscriptionKind::Group { .. } => "grupo",
        }
    }
}

/// A stored subscription. Created unconfirmed; only confirmed and active
/// subscriptions are matched.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i64,
    pub email: String,
    pub kind: SubscriptionKind,
    pub display_name: Option<String>,
    pub target_price: i64,
    pub token: String,
    pub confirmed: bool,
    pub active: bool,
    pub created_at: String,
}

/// One subscription whose target was met by the latest snapshot.
#[derive(Debug, Clone)]
pub struct TriggeredAlert {
    pub subscription: Subscription,
    pub product_name: String,
    pub store: String,
    pub found_price: i64,
    pub url: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

/// Creates an unconfirmed subscription and returns its confirmation token.
pub fn create_subscription(
    db: &PriceDb,
    email: &str,
    kind: &SubscriptionKind,
    target_price: i64,
    display_name: Option<&str>,
) -> Result<String> {
    if !is_valid_email(email) {
        bail!("Invalid email address: {email}");
    }

    let token = Uuid::new_v4().to_string();
    let created_at = chrono::Local::now().format(RUN_DATE_FORMAT).to_string();

    let (producto_id, marca, talla, cantidad, categoria) = match kind {
        SubscriptionKind::Product { product_id } => (Some(*product_id), None, None, None, None),
        SubscriptionKind::Group { brand, size, quantity, category } => {
            (None, Some(brand.as_str()), size.as_deref(), *quantity, category.as_deref())
        }
    };

    db.connection().execute(
        "INSERT INTO alertas (email, tipo, producto_id, marca, talla, cantidad, categoria, \
         nombre_display, precio_objetivo, token, confirmada, activa, fecha_creacion) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1, ?)",
        params![
            email,
            kind.type_tag(),
            producto_id,
            marca,
            talla,
            cantidad,
            categoria,
            display_name,
            target_price,
            token,
            created_at
        ],
    )?;
    Ok(token)
}

type SubscriptionParts = (
    i64,
    String,
    String,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<String>,
    i64,
    String,
    i64,
    i64,
    String,
);

fn subscription_from_parts(parts: SubscriptionParts) -> Result<Subscription> {
    let (
        id,
        email,
        tipo,
        producto_id,
        marca,
        talla,
        cantidad,
        categoria,
        nombre_display,
        precio_objetivo,
        token,
        confirmada,
        activa,
        fecha_creacion,
    ) = parts;

    let kind = match tipo.as_str() {
        "producto" => SubscriptionKind::Product {
            product_id: producto_id
                .with_context(|| format!("Subscription {id} has no product id"))?,
        },
        "grupo" => SubscriptionKind::Group {
            brand: marca.with_context(|| format!("Subscription {id} has no brand"))?,
            size: talla,
            quantity: cantidad,
            category: categoria,
        },
        other => bail!("Unknown subscription type {other:?}"),
    };

    Ok(Subscription {
        id,
        email,
        kind,
        display_name: nombre_display,
        target_price: precio_objetivo,
        token,
        confirmed: confirmada != 0,
        active: activa != 0,
        created_at: fecha_creacion,
    })
}

const SUBSCRIPTION_COLUMNS: &str = "id, email, tipo, producto_id, marca, talla, cantidad, \
     categoria, nombre_display, precio_objetivo, token, confirmada, activa, fecha_creacion";

fn read_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriptionParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

pub fn subscription_by_token(db: &PriceDb, token: &str) -> Result<Option<Subscription>> {
    let parts = db
        .connection()
        .query_row(
            &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM alertas WHERE token = ?"),
            params![token],
            read_parts,
        )
        .optional()?;
    parts.map(subscription_from_parts).transpose()
}

/// Confirms the subscription behind a token. `None` for an unknown token.
pub fn confirm_subscription(db: &PriceDb, token: &str) -> Result<Option<Subscription>> {
    let Some(mut sub) = subscription_by_token(db, token)? else {
        return Ok(None);
    };
    db.connection()
        .execute("UPDATE alertas SET confirmada = 1 WHERE token = ?", params![token])?;
    sub.confirmed = true;
    Ok(Some(sub))
}

/// Deactivates the subscription behind a token. `None` for an unknown token.
pub fn cancel_subscription(db: &PriceDb, token: &str) -> Result<Option<Subscription>> {
    let Some(mut sub) = subscription_by_token(db, token)? else {
        return Ok(None);
    };
    db.connection().execute("UPDATE alertas SET activa = 0 WHERE token = ?", params![token])?;
    sub.active = false;
    Ok(Some(sub))
}

fn active_subscriptions(db: &PriceDb) -> Result<Vec<Subscription>> {
    let conn = db.connection();
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM alertas WHERE confirmada = 1 AND activa = 1"
    ))?;
    let rows = stmt.query_map([], read_parts)?;
    let mut subs = Vec::new();
    for parts in rows {
        subs.push(subscription_from_parts(parts?)?);
    }
    Ok(subs)
}

fn sent_within_last_day(db: &PriceDb, subscription_id: i64, now: NaiveDateTime) -> Result<bool> {
    let cutoff = (now - Duration::hours(24)).format(RUN_DATE_FORMAT).to_string();
    let count: i64 = db.connection().query_row(
        "SELECT COUNT(*) FROM alertas_enviadas WHERE alerta_id = ? AND fecha_envio > ?",
        params![subscription_id, cutoff],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Matches every confirmed, active subscription against the latest snapshot.
/// A subscription fires when the best matching offer is at or below its
/// target; fired alerts are recorded so they stay quiet for 24 hours.
///
/// The best offer of a group is the first match in unit-price order, so an
/// offer with a known per-unit price always beats a cheap pack of unknown
/// size.
pub fn check_subscriptions(db: &PriceDb, now: NaiveDateTime) -> Result<Vec<TriggeredAlert>> {
    let subscriptions = active_subscriptions(db)?;
    if subscriptions.is_empty() {
        info!("No active price alerts to check");
        return Ok(Vec::new());
    }

    let filter = SnapshotFilter { scope: ProductScope::All, ..Default::default() };
    let (rows, run_date) = db.latest_snapshot(&filter, SortKey::UnitPrice)?;
    if run_date.is_none() {
        info!("No price data yet; skipping alert checks");
        return Ok(Vec::new());
    }

    let checked = subscriptions.len();
    let mut triggered = Vec::new();
    let sent_at = now.format(RUN_DATE_FORMAT).to_string();

    for sub in subscriptions {
        if sent_within_last_day(db, sub.id, now)? {
            continue;
        }

        let best = match &sub.kind {
            SubscriptionKind::Product { product_id } => {
                rows.iter().find(|row| row.product_id == *product_id)
            }
            SubscriptionKind::Group { brand, size, quantity, .. } => rows.iter().find(|row| {
                row.marca.to_lowercase() == brand.to_lowercase()
                    && quantity.is_none_or(|q| row.cantidad_unidades == Some(q))
                    && size.as_deref().is_none_or(|s| row.talla.as_deref() == Some(s))
            }),
        };
        let Some(row) = best else {
            continue;
        };
        let Some(found) = row.effective_price() else {
            continue;
        };
        if found > sub.target_price {
            continue;
        }

        db.connection().execute(
            "INSERT INTO alertas_enviadas (alerta_id, precio_encontrado, tienda, fecha_envio) \
             VALUES (?, ?, ?, ?)",
            params![sub.id, found, row.tienda, sent_at],
        )?;
        triggered.push(TriggeredAlert {
            subscription: sub,
            product_name: row.nombre.clone(),
            store: row.tienda.clone(),
            found_price: found,
            url: row.url.clone(),
        });
    }

    info!("{} alerts checked, {} triggered", checked, triggered.len());
    Ok(triggered)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::models::ProductRecord;

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

    fn seeded_db() -> PriceDb {
        let db = PriceDb::open_in_memory().unwrap();
        db.record_observations(
            "2025-03-10 08:00:00",
            &[
                record("Pañales Pampers Talla M 68 unidades", "Jumbo", "https://j/1", 16990, Some(68)),
                record("Pañales Pampers Talla M 50 unidades", "Liquimax", "https://l/1", 15000, Some(50)),
                record("Pañales Huggies Talla G 50 unidades", "Jumbo", "https://j/2", 14990, Some(50)),
            ],
            &HashMap::new(),
        )
        .unwrap();
        db
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn group(brand: &str, size: Option<&str>, quantity: Option<i64>) -> SubscriptionKind {
        SubscriptionKind::Group {
            brand: brand.to_string(),
            size: size.map(str::to_string),
            quantity,
            category: None,
        }
    }

    #[test]
    fn test_create_requires_valid_email() {
        let db = PriceDb::open_in_memory().unwrap();
        let kind = group("Pampers", Some("M"), None);
        assert!(create_subscription(&db, "not-an-email", &kind, 280, None).is_err());
        assert!(create_subscription(&db, "ana@example.cl", &kind, 280, None).is_ok());
    }

    #[test]
    fn test_subscription_lifecycle() {
        let db = PriceDb::open_in_memory().unwrap();
        let kind = group("Pampers", Some("M"), None);
        let token =
            create_subscription(&db, "ana@example.cl", &kind, 280, Some("Pampers Talla M")).unwrap();

        let sub = subscription_by_token(&db, &token).unwrap().unwrap();
        assert!(!sub.confirmed);
        assert!(sub.active);
        assert_eq!(sub.kind, kind);
        assert_eq!(sub.target_price, 280);
        assert_eq!(sub.display_name.as_deref(), Some("Pampers Talla M"));

        let confirmed = confirm_subscription(&db, &token).unwrap().unwrap();
        assert!(confirmed.confirmed);

        let cancelled = cancel_subscription(&db, &token).unwrap().unwrap();
        assert!(!cancelled.active);

        assert!(confirm_subscription(&db, "no-such-token").unwrap().is_none());
    }

    #[test]
    fn test_group_alert_fires_at_or_below_target() {
        let db = seeded_db();
        // best Pampers M offer is 16990/68 = 250 per diaper
        let token =
            create_subscription(&db, "ana@example.cl", &group("pampers", Some("M"), None), 280, None)
                .unwrap();
        confirm_subscription(&db, &token).unwrap();

        let triggered = check_subscriptions(&db, noon()).unwrap();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].found_price, 250);
        assert_eq!(triggered[0].store, "Jumbo");
        assert!(triggered[0].product_name.contains("Pampers"));
    }

    #[test]
    fn test_group_alert_does_not_fire_above_target() {
        let db = seeded_db();
        let token =
            create_subscription(&db, "ana@example.cl", &group("Pampers", Some("M"), None), 200, None)
                .unwrap();
        confirm_subscription(&db, &token).unwrap();

        assert!(check_subscriptions(&db, noon()).unwrap().is_empty());
    }

    #[test]
    fn test_unconfirmed_subscription_never_fires() {
        let db = seeded_db();
        create_subscription(&db, "ana@example.cl", &group("Pampers", None, None), 10_000, None)
            .unwrap();

        assert!(check_subscriptions(&db, noon()).unwrap().is_empty());
    }

    #[test]
    fn test_group_quantity_narrows_the_match() {
        let db = seeded_db();
        // only the 50-pack qualifies: 15000/50 = 300
        let token =
            create_subscription(&db, "ana@example.cl", &group("Pampers", None, Some(50)), 300, None)
                .unwrap();
        confirm_subscription(&db, &token).unwrap();

        let triggered = check_subscriptions(&db, noon()).unwrap();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].found_price, 300);
        assert_eq!(triggered[0].store, "Liquimax");
    }

    #[test]
    fn test_product_alert_matches_one_product() {
        let db = seeded_db();
        let filter = SnapshotFilter { scope: ProductScope::All, ..Default::default() };
        let (rows, _) = db.latest_snapshot(&filter, SortKey::UnitPrice).unwrap();
        let huggies = rows.iter().find(|r| r.nombre.contains("Huggies")).unwrap();

        let kind = SubscriptionKind::Product { product_id: huggies.product_id };
        let token = create_subscription(&db, "ana@example.cl", &kind, 300, None).unwrap();
        confirm_subscription(&db, &token).unwrap();

        let triggered = check_subscriptions(&db, noon()).unwrap();
        assert_eq!(triggered.len(), 1);
        // 14990/50 = 300 per diaper
        assert_eq!(triggered[0].found_price, 300);
        assert_eq!(triggered[0].product_name, huggies.nombre);
    }

    #[test]
    fn test_triggered_alert_stays_quiet_for_a_day() {
        let db = seeded_db();
        let token =
            create_subscription(&db, "ana@example.cl", &group("Pampers", Some("M"), None), 280, None)
                .unwrap();
        confirm_subscription(&db, &token).unwrap();

        assert_eq!(check_subscriptions(&db, noon()).unwrap().len(), 1);
        assert!(check_subscriptions(&db, noon()).unwrap().is_empty());
        // an hour later: still suppressed
        assert!(check_subscriptions(&db, noon() + Duration::hours(1)).unwrap().is_empty());
        // the next day the price is still good, so it fires again
        let next_day = noon() + Duration::hours(25);
        assert_eq!(check_subscriptions(&db, next_day).unwrap().len(), 1);
    }
}
