use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sharedlog_config::{ConfigError, StressConfig};
use sharedlog_core::{
    create_stats, ConditionalStore, KeyGenerator, PrefixKeyGenerator, SharedStats, StatsSnapshot,
    WorkerId,
};
use sharedlog_logic::{
    CompletedOperation, LogicSettings, LogicStatsSnapshot, SharedLogLogic, Stressor,
    StressorReport, WorkerControl,
};
use sharedlog_store::{MemoryStore, MemoryTransactions};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::checker::LogChecker;
use crate::delay::DelayedStore;
use crate::fault::{FaultConfig, FaultStats, FaultyStore};
use crate::invariants::{check_stored_values, Violation};
use crate::registry::CheckerRegistry;

const COMPLETION_BUFFER: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("invalid stress configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("worker task {worker} panicked: {reason}")]
    WorkerPanicked { worker: WorkerId, reason: String },

    #[error("checker task panicked: {0}")]
    CheckerPanicked(String),
}

/// What to run and which faults to inject.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub stress: StressConfig,
    /// Durable operations each worker performs before stopping.
    pub operations_per_worker: u64,
    pub faults: Option<FaultConfig>,
    /// Upper bound of the random delay before each store call.
    pub max_delay: Option<Duration>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            stress: StressConfig::default(),
            operations_per_worker: 50,
            faults: None,
            max_delay: Some(Duration::from_millis(2)),
        }
    }
}

/// Outcome of one simulation run.
#[derive(Debug, Clone)]
pub struct SimReport {
    pub violations: Vec<Violation>,
    pub workers: Vec<StressorReport>,
    pub operations: StatsSnapshot,
    pub logic: LogicStatsSnapshot,
    pub faults: FaultStats,
    /// Operations confirmed by the first checker.
    pub confirmed: u64,
}

impl SimReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn completed(&self) -> u64 {
        self.workers.iter().map(|w| w.completed).sum()
    }
}

/// The simulation harness: workers writing the shared log through optional
/// fault and delay layers, and checkers auditing what they publish.
pub struct Sim {
    config: SimConfig,
    rng: ChaCha8Rng,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<CheckerRegistry>,
    keys: Arc<dyn KeyGenerator>,
    stats: SharedStats,
    faulty: Option<Arc<FaultyStore>>,
}

impl Sim {
    /// Create a new deterministic simulation with the given seed.
    pub fn new(seed: u64, config: SimConfig) -> Result<Self, SimError> {
        let stress = config.stress.effective();
        stress.validate_or_err()?;
        let checkers = stress.log_logic.checkers as usize;

        Ok(Sim {
            config: SimConfig { stress, ..config },
            rng: ChaCha8Rng::seed_from_u64(seed),
            store: Arc::new(MemoryStore::new()),
            registry: Arc::new(CheckerRegistry::new(checkers)),
            keys: Arc::new(PrefixKeyGenerator::default()),
            stats: create_stats(),
            faulty: None,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Store stack the workers talk to: raw memory, then faults, then delays.
    fn worker_store(&mut self) -> Arc<dyn ConditionalStore> {
        let mut store: Arc<dyn ConditionalStore> = self.store.clone();
        if let Some(faults) = self.config.faults.clone() {
            let rng = ChaCha8Rng::seed_from_u64(self.rng.gen());
            let faulty = Arc::new(FaultyStore::new(store, rng, faults));
            self.faulty = Some(faulty.clone());
            store = faulty;
        }
        if let Some(max_delay) = self.config.max_delay {
            let rng = ChaCha8Rng::seed_from_u64(self.rng.gen());
            store = Arc::new(DelayedStore::new(store, rng, max_delay));
        }
        store
    }

    /// Run all workers to completion, then audit.
    pub async fn run(&mut self) -> Result<SimReport, SimError> {
        let stress = self.config.stress.clone();
        let population = stress.worker_population();
        let settings = LogicSettings::from_config(&stress);
        let store = self.worker_store();
        let transactions = Arc::new(MemoryTransactions::new(self.store.clone()));
        let control = WorkerControl::new();
        let (tx, rx) = mpsc::channel(COMPLETION_BUFFER);

        info!(
            workers = population,
            checkers = self.registry.checkers(),
            transaction_size = stress.general.transaction_size,
            value_max_size = settings.value_max_size,
            "simulation started"
        );

        let checkers: Vec<LogChecker> = (0..self.registry.checkers())
            .map(|id| {
                LogChecker::new(
                    id,
                    self.store.clone(),
                    self.keys.clone(),
                    self.registry.clone(),
                )
            })
            .collect();
        let check_interval = stress.log_logic.check_interval.as_duration();
        let checker_task = tokio::spawn(run_checkers(checkers, rx, check_interval));

        let mut handles = Vec::with_capacity(population as usize);
        for worker in 0..population {
            let logic = SharedLogLogic::new(
                worker,
                settings,
                self.keys.clone(),
                self.registry.clone(),
                self.stats.clone(),
                control.clone(),
            );
            let mut stressor = Stressor::new(logic, store.clone(), &stress, self.rng.gen())
                .with_completions(tx.clone())
                .with_operation_limit(self.config.operations_per_worker);
            if stress.is_transactional() {
                stressor = stressor.with_transactions(transactions.clone());
            }
            handles.push((worker, stressor.spawn()));
        }
        drop(tx);

        let mut violations = Vec::new();
        let mut workers = Vec::with_capacity(handles.len());
        let mut logic = LogicStatsSnapshot::default();
        for (worker, handle) in handles {
            match handle.await {
                Ok(Ok(report)) => {
                    logic.merge(&report.logic);
                    workers.push(report);
                }
                Ok(Err(e)) => {
                    warn!(worker, error = %e, "worker stopped with an error");
                    violations.push(Violation::worker_failed(worker, &e));
                }
                Err(e) => {
                    control.interrupt();
                    return Err(SimError::WorkerPanicked {
                        worker,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut checkers = checker_task
            .await
            .map_err(|e| SimError::CheckerPanicked(e.to_string()))?;
        for checker in &mut checkers {
            violations.extend(checker.final_audit());
        }
        let confirmed = checkers.first().map_or(0, LogChecker::confirmed);
        violations.extend(check_stored_values(&self.store, settings.value_max_size));

        let report = SimReport {
            violations,
            workers,
            operations: self.stats.snapshot(),
            logic,
            faults: self
                .faulty
                .as_ref()
                .map(|faulty| faulty.stats())
                .unwrap_or_default(),
            confirmed,
        };
        info!(
            completed = report.completed(),
            confirmed = report.confirmed,
            violations = report.violations.len(),
            "simulation finished"
        );
        Ok(report)
    }
}

/// Feed published operations to every checker and run a pass per tick
/// until all workers have hung up.
async fn run_checkers(
    mut checkers: Vec<LogChecker>,
    mut rx: mpsc::Receiver<CompletedOperation>,
    check_interval: Duration,
) -> Vec<LogChecker> {
    let mut ticker = tokio::time::interval(check_interval.max(Duration::from_millis(1)));

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(op) => {
                    for checker in &mut checkers {
                        checker.enqueue(op);
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                for checker in &mut checkers {
                    checker.check_pending();
                }
            }
        }
    }

    checkers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.stress.general.num_threads = 3;
        config.stress.general.num_entries = 4;
        config.operations_per_worker = 20;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_run() {
        let mut sim = Sim::new(1, small_config()).unwrap();
        let report = sim.run().await.unwrap();

        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.completed(), 60);
        assert_eq!(report.confirmed, 60);
        assert_eq!(report.logic.abandoned, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = small_config();
        config.stress.general.get_ratio = 1;
        assert!(matches!(Sim::new(1, config), Err(SimError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_cover_all_store_calls() {
        let mut sim = Sim::new(2, small_config()).unwrap();
        let report = sim.run().await.unwrap();

        let gets = report.operations.get(sharedlog_core::Operation::Get).unwrap();
        assert!(gets.requests >= 2 * report.completed());
        assert_eq!(report.operations.total_errors(), 0);
    }
}
