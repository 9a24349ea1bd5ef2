pub mod entities;
pub mod status_table;
pub mod value_objects;

pub use status_table::{Classification, GatewayStatusTable};
