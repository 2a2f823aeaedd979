//! layerview - federated views over layered feature storages
//!
//! A view stacks several (storage, collection) layers. A request fans out to
//! every participating layer at once, groups the returned rows by feature
//! id, merges each group into one winner, and fetches any obligatory layer
//! a feature is missing in a single follow-up round.
//!
//! ```ignore
//! use std::sync::Arc;
//! use layerview::view::{ReadFilter, View, ViewConfig};
//!
//! let view = View::new(tokio::runtime::Handle::current());
//! view.initialize(ViewConfig::load(path)?, Arc::new(sessions))?;
//! let rows = view.read(["roads"], ReadFilter::all()).await?;
//! ```

pub mod backend;
pub mod cli;
pub mod fanout;
pub mod merge;
pub mod missing;
pub mod observability;
pub mod view;
