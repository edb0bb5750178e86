// Streaming generation plumbing
//
// An adapter turns an HTTP response body into a `StreamingSession`:
// `reader` pulls bytes off the connection in a background task, splits them
// into lines (`framing`), lets the adapter's decoder turn each line into a
// frame, and forwards fragments over a bounded channel. The session hands
// them to the caller one at a time, enforcing the idle timeout and
// cancellation.

pub mod connections;
pub mod framing;
pub mod reader;
pub mod session;

pub use connections::{ConnectionGuard, ConnectionTracker};
pub use framing::{Frame, FrameDecoder, LineBuffer};
pub use reader::spawn_reader;
pub use session::{StreamEvent, StreamingSession};
