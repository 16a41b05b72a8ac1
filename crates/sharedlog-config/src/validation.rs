use crate::types::StressConfig;
use crate::ConfigError;

impl StressConfig {
    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let general = &self.general;

        if general.num_threads == 0 {
            errors.push(invalid("general.num_threads", "must be at least 1"));
        }
        if general.group_size == 0 {
            errors.push(invalid("general.group_size", "must be at least 1"));
        }
        if self.checked_worker_population().is_none() {
            errors.push(invalid(
                "general.num_threads",
                "num_threads * group_size overflows the worker id space",
            ));
        }
        if general.num_entries == 0 {
            errors.push(invalid("general.num_entries", "must be at least 1"));
        }
        if general.put_ratio + general.remove_ratio == 0 {
            errors.push(ConfigError::InvalidConfig(
                "put_ratio and remove_ratio cannot both be 0".to_string(),
            ));
        }

        // Every operation must land in a log value; reads cannot be recorded.
        if general.get_ratio > 0 {
            errors.push(invalid(
                "general.get_ratio",
                "shared log logic only supports puts and removes",
            ));
        }

        // Backup key ids are the bitwise complement of primary ones, so the
        // primary range must stay non-negative to keep both sides disjoint.
        if general.key_id_offset < 0 {
            errors.push(invalid("general.key_id_offset", "must not be negative"));
        }

        if self.log_logic.value_max_size == 0 {
            errors.push(invalid("log_logic.value_max_size", "must be at least 1"));
        }
        if self.log_logic.checkers == 0 {
            errors.push(invalid("log_logic.checkers", "must be at least 1"));
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
