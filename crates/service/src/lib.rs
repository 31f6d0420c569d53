//! Record store for the chat bot: one façade over a Postgres or JSON-file backend.
//! - `bootstrap` picks the backend once at startup.
//! - `store` and `tracking` expose the typed operations callers use.
//! - `storage` holds the two backends behind [`storage::DocumentBackend`].

pub mod bootstrap;
pub mod errors;
pub mod query;
pub mod storage;
pub mod store;
pub mod tracking;

pub use bootstrap::{build_store, select_backend};
pub use errors::StoreError;
pub use query::{Filter, ListQuery, SortSpec};
pub use storage::BackendMode;
pub use store::Store;
