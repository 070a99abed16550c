//! Rule-based decision engine for a turn-based territorial conquest
//! game played on a graph of nodes, plus the offline arena and runner
//! used to evaluate it.

pub mod arena;
pub mod bots;
pub mod client;
pub mod error;
pub mod levels;
pub mod rng;
pub mod runner;
pub mod snapshot;
pub mod territory;

pub use error::{CommandError, FetchError};
pub use snapshot::{NodeId, Owner, PlayerId, Snapshot};
