//! CLI commands.

pub mod open_spread;
pub mod session;
pub mod symbol;

pub use open_spread::{run_open_spread, OpenSpreadArgs};
pub use session::{run_session, SessionArgs};
pub use symbol::{run_symbol, SymbolArgs};
