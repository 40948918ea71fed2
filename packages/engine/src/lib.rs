pub mod config;
pub mod consumers;
pub mod database;
pub mod dispatch;
pub mod engine;
pub mod entity;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod lineage;
pub mod lock;
pub mod notify;
pub mod params;
pub mod registry;
pub mod scheduler;
pub mod split;
pub mod storage;

pub use engine::Engine;
pub use error::{EngineError, SplitError};
pub use instance::CreateInstance;
pub use split::{SplitOutcome, SplitRequest};
