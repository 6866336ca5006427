//! SQLite driver for formdb.
//!
//! [`SqliteHandle`] implements `TransactionHandle` over a borrowed
//! `rusqlite::Connection` (or `Transaction`). The engine never begins or ends
//! transactions; the caller owns the connection and decides when to commit.
//!
//! Use [`config`] so that CreatedAt/ModifiedAt columns get millisecond
//! timestamps in the same text form the driver binds.
//!
//! ```ignore
//! let mut conn = rusqlite::Connection::open("app.db")?;
//! formdb_sqlite::configure(&conn)?;
//! let tx = conn.transaction()?;
//! let outcome = serve(&form, Operation::Create, &SqliteHandle::new(&tx), &caller, &payload)?;
//! if outcome.is_done() {
//!     tx.commit()?;
//! }
//! ```

pub mod convert;
pub mod handle;

pub use handle::SqliteHandle;

use formdb_core::Config;

/// Current UTC time as stored timestamp text, with milliseconds.
pub const NOW_EXPRESSION: &str = "strftime('%Y-%m-%d %H:%M:%f','now')";

/// Pragmas applied to every connection handed to the engine.
const INITIAL_SQL: &str = r"
PRAGMA busy_timeout = 1000;
PRAGMA foreign_keys = 1;
";

/// Default configuration with the SQLite current-time expression.
pub fn config() -> Config {
    Config::default().now_expression(NOW_EXPRESSION)
}

/// Apply the connection pragmas.
pub fn configure(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    tracing::debug!(path = ?conn.path(), "Configuring sqlite connection");
    conn.execute_batch(INITIAL_SQL)
}
