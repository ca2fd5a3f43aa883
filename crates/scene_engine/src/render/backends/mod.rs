//! Device backends
//!
//! Only a headless backend ships with the engine. It keeps every resource in
//! host memory and records commands, so frames can be driven and inspected
//! without a GPU.

pub mod headless;

pub use headless::{FailurePoint, HeadlessCommandList, HeadlessDevice, RecordedCommand};
