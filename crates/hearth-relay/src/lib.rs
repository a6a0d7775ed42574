//! Relay between an inference fragment stream, the HTTP caller and the persistence sink.

pub mod relay;

pub use relay::{run_relay, RelayContext, RelayExit, RelayOutcome};
