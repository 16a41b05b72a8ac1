pub mod checker;
pub mod delay;
pub mod fault;
pub mod invariants;
pub mod registry;
pub mod sim;

pub use checker::LogChecker;
pub use delay::DelayedStore;
pub use fault::{FaultConfig, FaultStats, FaultyStore};
pub use invariants::Violation;
pub use registry::CheckerRegistry;
pub use sim::{Sim, SimConfig, SimError, SimReport};
