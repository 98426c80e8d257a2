//! Sequential async transactions with automatic compensation.
//!
//! A [`Transaction`] runs an ordered list of tagged asynchronous steps one at
//! a time. Each successful step stores its result in a shared [`Context`]
//! under its tag. If a step fails, or the caller requests an abort, the
//! compensations of every step that already succeeded run in reverse
//! completion order. Nothing escapes [`Transaction::execute`]: the outcome is
//! read back through the transaction's accessors.
//!
//! ```
//! use futures::FutureExt;
//! use grift::Transaction;
//!
//! # tokio::runtime::Builder::new_current_thread().build().map_err(|_| ())?.block_on(async {
//! let mut txn = Transaction::<i64, String>::new()
//!     .add("year", |_ctx| async { Ok(2018) }.boxed())
//!     .add("next", |ctx| {
//!         let year = ctx.get("year").copied().unwrap_or_default();
//!         async move { Ok(year + 1) }.boxed()
//!     });
//!
//! let txn = txn.execute().await;
//! assert!(txn.success());
//! assert_eq!(txn.results_from("next"), Some(&2019));
//! # });
//! # Ok::<(), ()>(())
//! ```

mod audit;
mod config;
mod context;
mod error;
mod executor;
mod handle;
mod state;
mod step;
mod transaction;

pub use audit::{AuditLog, StepRecord, StepStatus};
pub use config::{DEFAULT_RESERVED_PREFIX, TransactionConfig};
pub use context::{Context, ContextIter};
pub use error::{AbortError, ConfigError, TransactionError};
pub use futures::future::BoxFuture;
pub use handle::TransactionHandle;
pub use state::TransactionState;
pub use step::{Action, Compensation};
pub use transaction::Transaction;
