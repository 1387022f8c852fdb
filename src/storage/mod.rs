pub mod filters;
pub mod price_db;

pub use filters::*;
pub use price_db::PriceDb;
