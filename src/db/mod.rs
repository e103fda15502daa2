mod compile;
mod connection;
mod query;

pub use compile::*;
pub use connection::*;
pub use query::*;
