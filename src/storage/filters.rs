use crate::models::Category;
use crate::processor::vocab::{SCOPE_EXCLUDE_ADULT, SCOPE_INCLUDE};

/// Which products a query sees. Distributors mix adult incontinence and
/// random toiletries into their diaper listings, so the default scope keeps
/// baby products only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductScope {
    #[default]
    BabyOnly,
    All,
}

/// Allowlist plus adult-exclusion check, on the lowercased offer name.
pub fn in_baby_scope(name: &str) -> bool {
    let lower = name.to_lowercase();
    SCOPE_INCLUDE.iter().any(|pat| lower.contains(pat))
        && !SCOPE_EXCLUDE_ADULT.iter().any(|pat| lower.contains(pat))
}

/// Sort orders a caller may request by name. Parsing is fail-closed: anything
/// unrecognized becomes the default unit-price order, so user input never
/// reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    UnitPrice,
    Price,
    Brand,
    Store,
}

impl SortKey {
    pub fn parse(value: &str) -> SortKey {
        match value {
            "precio_por_unidad" => SortKey::UnitPrice,
            "precio" => SortKey::Price,
            "marca" => SortKey::Brand,
            "tienda" => SortKey::Store,
            _ => SortKey::UnitPrice,
        }
    }

    /// ORDER BY fragment. Every order ends on the row id so result order is
    /// reproducible across runs of the same query.
    pub(crate) fn order_clause(&self) -> &'static str {
        match self {
            SortKey::UnitPrice => {
                "CASE WHEN pr.precio_por_unidad IS NULL THEN 1 ELSE 0 END, \
                 pr.precio_por_unidad ASC, pr.precio ASC, pr.id ASC"
            }
            SortKey::Price => "pr.precio ASC, pr.id ASC",
            SortKey::Brand => "p.marca ASC, pr.precio ASC, pr.id ASC",
            SortKey::Store => "t.nombre ASC, pr.precio ASC, pr.id ASC",
        }
    }
}

/// Filter set for a snapshot query. `Default` means everything in baby scope.
///
/// Store set, price ceiling, free-text and product id narrow the SQL; brand,
/// category and size compare against attributes derived per row, so they are
/// applied after the rows come back.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
    /// Canonical brand, compared case-insensitively.
    pub brand: Option<String>,
    /// Exact size tag ("M", "RN+", ...).
    pub size: Option<String>,
    /// Any-of size set, as expanded from an age range.
    pub sizes: Option<Vec<String>>,
    pub category: Option<Category>,
    /// Store display names; `None` means all stores.
    pub stores: Option<Vec<String>>,
    pub max_price: Option<i64>,
    /// Free text; every whitespace-separated word must appear in the name.
    pub text: Option<String>,
    /// Exact offer name, used by the formula product selector.
    pub product_name: Option<String>,
    pub product_id: Option<i64>,
    pub scope: ProductScope,
}
