mod memory;
mod transaction;

pub use memory::MemoryStore;
pub use transaction::{MemoryTransaction, MemoryTransactions};
