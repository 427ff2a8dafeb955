use crate::error::{GeneratorError, Result};
use typed_builder::TypedBuilder;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_COLLISION_THRESHOLD: f64 = 0.01;

/// Configures a [`BatchOrchestrator`](crate::BatchOrchestrator).
#[derive(Debug, Clone, Copy, PartialEq, TypedBuilder)]
pub struct GeneratorSettings {
    /// Code length to start drawing at.
    ///
    /// Callers must persist the final [`code_length`] of a run and pass it
    /// back here next time. Starting from a stale, shorter length makes that
    /// length saturate again before growth resumes.
    ///
    /// [`code_length`]: crate::BatchOrchestrator::code_length
    pub initial_code_length: usize,
    /// Maximum number of candidates reconciled per store call.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Fraction of a batch allowed to collide before the length grows.
    /// Must lie in `[0, 1)`.
    #[builder(default = DEFAULT_COLLISION_THRESHOLD)]
    pub collision_threshold: f64,
}

impl GeneratorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.initial_code_length == 0 {
            return Err(GeneratorError::InvalidConfig(
                "initial code length must be greater than zero".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(GeneratorError::InvalidConfig(
                "batch size must be greater than zero".to_string(),
            ));
        }

        // Also rejects NaN.
        if !(0.0..1.0).contains(&self.collision_threshold) {
            return Err(GeneratorError::InvalidConfig(format!(
                "collision threshold must be in [0, 1), got {}",
                self.collision_threshold
            )));
        }

        Ok(())
    }
}
