//! Domain layer: enrollment payment state and the rules that move it.
//!
//! Nothing in here performs I/O. Transitions mutate an [`enrollment::Enrollment`]
//! in memory and hand back the events to emit; persisting and dispatching
//! them is the application layer's job.

pub mod enrollment;
pub mod events;
pub mod money;
pub mod policy;
pub mod ports;
pub mod reminder;
pub mod sweep;
