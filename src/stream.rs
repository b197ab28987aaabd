//! Stream Event Decoder
//!
//! Turns the raw response channel (`data: {json}` lines) into the typed
//! [`StreamEvent`] sequence consumed by the reconciliation engine. Events
//! come out in arrival order, one per payload; transport and parse failures
//! surface as a terminal [`StreamEvent::Error`] rather than as `Err`.

mod decoder;
mod event;
mod wire;

pub use decoder::decode_stream;
pub use event::*;
