pub mod postgres;

pub use postgres::{PostgresStore, DEFAULT_USER_ID};
