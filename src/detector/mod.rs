pub mod classifier;
pub mod relative;
pub mod signals;
pub mod smart_money;
pub mod trigger;
pub mod volume_trend;

pub use signals::SignalService;
pub use trigger::TriggerEvaluator;
