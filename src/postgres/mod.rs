// ABOUTME: PostgreSQL backend module
// ABOUTME: Exports connection management, the replay connection, and the scripting provider

pub mod connection;
pub mod ddl;
pub mod provider;

pub use connection::{connect, connect_with_retry, PgConnection};
pub use provider::PgSchemaProvider;
