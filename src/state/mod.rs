//! Host-owned collaborators: the supported-pairs registry and the committed
//! oracle price store.

mod registry;
mod store;

pub use registry::{PairRegistry, StaticPairRegistry};
pub use store::{InMemoryOracleStore, OracleStore};
