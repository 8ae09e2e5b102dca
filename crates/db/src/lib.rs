pub mod models;
pub mod queries;
pub mod store;

pub use store::PgStore;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
