//! Client-side state layer for the clipper: processing session, clip timeline and undo.

pub mod api;
pub mod backend;
pub mod bridge;
pub mod error;
pub mod persist;
pub mod session;
pub mod time;
pub mod timeline;
pub mod undo;

pub use api::{
    Command, Engine, EngineErrorEvent, EngineErrorKind, Event, SessionSnapshot, TimelineSnapshot,
};
pub use backend::{DetectorBackend, JobUpdate, ProcessBackend};
pub use bridge::{EngineCommandSender, EngineEventReceiver, spawn_engine_bridge};
pub use error::{EngineError, Result};
pub use persist::{JsonFileStore, KeyValueStore, MemoryStore};
pub use session::{
    ExportRequest, ProcessOptions, ProcessRequest, ProcessResult, ProcessingSession,
    ProgressSample, SessionPhase,
};
pub use timeline::{Clip, ClipTimeline};
pub use undo::{UndoItem, UndoLog};
