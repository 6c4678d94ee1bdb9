pub mod config;
pub mod model;
pub mod protocol;
pub mod transport;

// Synchronization state machines
pub mod logtail;
pub mod registry;
pub mod router;
pub mod tree;

// Session composition + rendering interface
pub mod session;
pub mod view;
