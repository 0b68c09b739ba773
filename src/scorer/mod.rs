pub mod predictions;

pub use predictions::PredictionTracker;
