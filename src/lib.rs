pub mod error;
pub mod index;
pub mod ledger;
pub mod model;
pub mod parser;
pub mod providers;
pub mod rag;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod vector;

pub use error::{Error, Result};
pub use index::{FlatIndex, VectorIndex};
pub use model::{SearchHit, Transaction};
pub use rag::{QueryOutcome, RagEngine, DEFAULT_K};
