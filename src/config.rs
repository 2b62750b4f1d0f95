//! Transformer configuration
//!
//! Defaults can be overridden from the environment:
//! - `GRAPHFORGE_MAX_REFINE_ITERATIONS`: refinement pass cap
//! - `GRAPHFORGE_VERIFY_EACH_PASS`: re-check graph invariants after each pass

use std::env;

/// Environment variable for the refinement pass cap
pub const MAX_REFINE_ITERATIONS_ENV: &str = "GRAPHFORGE_MAX_REFINE_ITERATIONS";

/// Environment variable for per-pass verification
pub const VERIFY_EACH_PASS_ENV: &str = "GRAPHFORGE_VERIFY_EACH_PASS";

/// Default refinement pass cap
pub const DEFAULT_MAX_REFINE_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformerConfig {
    /// Passes allowed before refinement is reported as divergent
    pub max_refine_iterations: usize,
    /// Run [`Model::verify`](crate::graph::Model::verify) on every successor model
    pub verify_each_pass: bool,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            max_refine_iterations: DEFAULT_MAX_REFINE_ITERATIONS,
            verify_each_pass: cfg!(debug_assertions),
        }
    }
}

impl TransformerConfig {
    /// Defaults with environment overrides applied.
    ///
    /// Unparseable values and a zero pass cap are ignored.
    pub fn from_env() -> Self {
        let mut config = TransformerConfig::default();

        if let Ok(value) = env::var(MAX_REFINE_ITERATIONS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(cap) if cap > 0 => config.max_refine_iterations = cap,
                _ => tracing::warn!(
                    variable = MAX_REFINE_ITERATIONS_ENV,
                    value = %value,
                    "ignoring invalid refinement cap"
                ),
            }
        }

        if let Ok(value) = env::var(VERIFY_EACH_PASS_ENV) {
            config.verify_each_pass = value != "0" && value.to_lowercase() != "false";
        }

        config
    }

    pub fn with_max_refine_iterations(mut self, cap: usize) -> Self {
        self.max_refine_iterations = cap.max(1);
        self
    }

    pub fn with_verify_each_pass(mut self, verify: bool) -> Self {
        self.verify_each_pass = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var(MAX_REFINE_ITERATIONS_ENV);
        env::remove_var(VERIFY_EACH_PASS_ENV);
    }

    #[test]
    fn test_defaults() {
        let config = TransformerConfig::default();
        assert_eq!(config.max_refine_iterations, 10);
        assert_eq!(config.verify_each_pass, cfg!(debug_assertions));
    }

    #[test]
    fn test_setters() {
        let config = TransformerConfig::default()
            .with_max_refine_iterations(0)
            .with_verify_each_pass(true);
        assert_eq!(config.max_refine_iterations, 1);
        assert!(config.verify_each_pass);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var(MAX_REFINE_ITERATIONS_ENV, "3");
        env::set_var(VERIFY_EACH_PASS_ENV, "false");
        let config = TransformerConfig::from_env();
        assert_eq!(config.max_refine_iterations, 3);
        assert!(!config.verify_each_pass);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env();
        env::set_var(MAX_REFINE_ITERATIONS_ENV, "lots");
        assert_eq!(
            TransformerConfig::from_env().max_refine_iterations,
            DEFAULT_MAX_REFINE_ITERATIONS
        );
        env::set_var(MAX_REFINE_ITERATIONS_ENV, "0");
        assert_eq!(
            TransformerConfig::from_env().max_refine_iterations,
            DEFAULT_MAX_REFINE_ITERATIONS
        );
        clear_env();
    }
}
