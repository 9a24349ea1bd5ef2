pub mod cache;
pub mod connectivity;
pub mod database;
pub mod gateway;
pub mod offline;
