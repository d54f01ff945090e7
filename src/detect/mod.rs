pub mod classes;
mod event;

pub use event::{DetectedObject, DetectionEvent};
