pub mod config;
pub mod engine;
pub mod logging;
pub mod rephrase;
pub mod session;
pub mod source;
pub mod store;

pub use engine::{ConfusionEngine, EngineError};
pub use rephrase::{RephraseDispatcher, RephraseRequest, TextProvider};
pub use session::{CaptureSession, SessionError, SessionEvents, SessionHandle, Suggestion};
