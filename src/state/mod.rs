pub mod context;

pub use context::EngineContext;
