pub mod sqlite;

pub use sqlite::TradeLedger;
