pub mod file_source;
pub mod http_client;
pub mod http_source;
#[cfg(feature = "db")]
pub mod libsql_store;
pub(crate) mod snapshot_row;
pub mod sqlite_store;
