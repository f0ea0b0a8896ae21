//! Fan-out broadcast engine
//!
//! One paced source, many listeners. The controller owns the lifecycle, the
//! registry owns the listeners and the sink connects the two.

pub mod controller;
pub mod registry;
pub mod session;
pub mod sink;

pub use controller::{BroadcastController, BroadcastState, ControllerStatus};
pub use registry::{ClientRegistry, ListenerEvent, ListenerId, ListenerStream};
pub use session::{BroadcastSession, SessionId, SessionOutcome};
pub use sink::{BroadcastSink, SinkStats};
