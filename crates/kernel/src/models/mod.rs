//! Stock-data entities served by the HTTP API.

pub mod exchange;
pub mod symbol;

pub use exchange::Exchange;
pub use symbol::Symbol;
