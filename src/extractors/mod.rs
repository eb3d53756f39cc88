pub mod connection;

pub use connection::{ConnectionName, CONNECTION_HEADER};
