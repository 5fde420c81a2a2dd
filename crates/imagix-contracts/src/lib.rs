//! Shared contracts for the Imagix studio: request vocabulary, model
//! capabilities, error taxonomy, and the client-side history state machines.
//!
//! Nothing in this crate talks to the network. The engine crate layers the
//! backend transport and the synthesis clients on top of these types.

pub mod encoding;
pub mod errors;
pub mod events;
pub mod history;
pub mod models;
pub mod params;
pub mod request;
pub mod session;
