//! Lock-free-style ring buffers connecting capture → DSP → decoder threads.

pub mod spsc;

pub use spsc::{channel, Consumer, Producer};
