/// Tracks the current code length and grows it when batches collide too often.
///
/// Growth is a one-way ratchet: each batch whose collision ratio exceeds the
/// threshold adds exactly one symbol, and the length never shrinks. There is
/// no upper bound.
#[derive(Debug, Clone, PartialEq)]
pub struct LengthController {
    code_length: usize,
    collision_threshold: f64,
}

impl LengthController {
    /// Threshold must already be validated to lie in `[0, 1)`.
    pub(crate) fn new(code_length: usize, collision_threshold: f64) -> Self {
        Self {
            code_length,
            collision_threshold,
        }
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }

    pub fn collision_threshold(&self) -> f64 {
        self.collision_threshold
    }

    /// Feeds one batch's outcome to the controller.
    ///
    /// Returns `true` when the code length grew. An empty batch carries no
    /// signal and is ignored.
    pub fn observe(&mut self, batch_size: usize, accepted: usize) -> bool {
        if batch_size == 0 {
            return false;
        }

        let collisions = batch_size.saturating_sub(accepted);
        let ratio = collisions as f64 / batch_size as f64;
        if ratio > self.collision_threshold {
            self.code_length += 1;
            return true;
        }

        false
    }
}
