//! Chain data model and store: headers, weak headers, blocks, transactions,
//! and the `Blockchain` itself (§3, §4.1-§4.3, §4.6).

pub mod block;
pub mod chain;
pub mod header;
pub mod transaction;

pub use block::Block;
pub use chain::{BlockValidationStatus, Blockchain};
pub use header::{Header, WeakHeader};
pub use transaction::{Amount, Transaction};
