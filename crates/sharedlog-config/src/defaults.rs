use crate::types::StressConfig;

impl StressConfig {
    /// Apply default inference rules to the configuration in place.
    pub fn apply_defaults(&mut self) {
        // With more checkers than stressors some checkers would never confirm anything.
        let population = self.worker_population().max(1);
        if self.log_logic.checkers > population {
            self.log_logic.checkers = population;
        }

        // Each stressor needs room for at least its own entry plus one foreign one,
        // otherwise every write goes through compaction.
        if self.log_logic.value_max_size == 0 {
            self.log_logic.value_max_size = (population as usize).saturating_add(1);
        }
    }

    /// Returns a new config with all defaults applied.
    pub fn effective(&self) -> StressConfig {
        let mut config = self.clone();
        config.apply_defaults();
        config
    }
}
