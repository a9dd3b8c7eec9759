//! # Brainstem
//!
//! Request handling for the warm worker. A [`Dispatcher`] is created once per
//! process and kept alive across requests; each request envelope is routed to
//! its handler and always answered, even when the handler fails or panics.
//!
//! The face swap path itself lives in [`Orchestrator`]: detect faces in both
//! images, pick the requested ones, swap, encode.

pub mod dispatcher;
pub mod orchestrator;

pub use dispatcher::{Dispatcher, API_VERSION};
pub use orchestrator::{clamp_face_index, encode_png, Orchestrator, SwapRequest, SwapResult};
