//! Adaptive voucher code generation.
//!
//! [`BatchOrchestrator`] draws candidate codes with [`RandomDraw`], reconciles
//! them against a [`UniquenessStore`](voucher_core::UniquenessStore), and lets
//! [`LengthController`] grow the code length once the current length starts
//! to saturate.

pub mod draw;
pub mod error;
pub mod length;
pub mod orchestrator;
pub mod settings;

pub use draw::RandomDraw;
pub use error::{GeneratorError, Result};
pub use length::LengthController;
pub use orchestrator::BatchOrchestrator;
pub use settings::GeneratorSettings;
