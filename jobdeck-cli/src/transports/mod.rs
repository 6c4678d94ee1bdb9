//! Transport implementations for the shared event channel

mod fake;
mod ws;

pub use fake::{DEMO_ROOT, FakeServer};
pub use ws::WsTransport;
