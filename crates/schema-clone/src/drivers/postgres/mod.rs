//! PostgreSQL driver.
//!
//! - [`PgProvider`]: catalog reads and script execution over deadpool-postgres
//! - [`PgGenerator`]: create-and-populate scripts
//! - [`SslMode`]: rustls setup for the pool

mod generator;
mod provider;
mod tls;

pub use generator::PgGenerator;
pub use provider::PgProvider;
pub use tls::SslMode;
