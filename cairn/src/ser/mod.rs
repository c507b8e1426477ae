//! Serialization: the byte sink (C2), pending-pointer sharing used by
//! the engine's dedup pass, and the depth-first engine itself (C6).

pub mod engine;
pub mod sharing;
pub mod sink;

pub use engine::Engine;
pub use sharing::{PendingMap, Sharing};
pub use sink::{serialize_slice, RawSink, RawSinkExt, Sink, SinkExt, VecSink};
