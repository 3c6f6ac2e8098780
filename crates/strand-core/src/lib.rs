pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::StrandConfig;
pub use context::{merge_contexts, ExecutionContext};
pub use error::{Result, StrandError};
pub use event::TraceBus;
pub use types::*;
