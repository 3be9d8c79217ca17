//! Microsoft SQL Server driver.
//!
//! - [`MssqlProvider`]: catalog reads and batch execution over a bb8 pool
//! - [`MssqlGenerator`]: T-SQL create-and-populate batches

mod generator;
mod provider;

pub use generator::MssqlGenerator;
pub use provider::{MssqlProvider, TiberiusConnectionManager};
