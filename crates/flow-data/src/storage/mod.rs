//! PostgreSQL 저장소 구현.

mod database;
mod records;
mod tokens;

pub use database::Database;
pub use records::PgRecordStore;
pub use tokens::PgTokenStore;
