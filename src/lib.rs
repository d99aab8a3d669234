pub mod animation;
pub mod config;
pub mod culling;
pub mod engine;
pub mod error;
pub mod instancing;
pub mod math;
pub mod rendering;

pub use config::EngineConfig;
pub use engine::{FrameInput, FramePhase, FrameStats, InstancingEngine, Registrar, TransformSource};
pub use error::{EngineError, JoinError};
