//! Tuner context and band scanning.

mod context;
mod scanner;

pub use context::Tuner;
pub use scanner::{BandScanner, ScanEvent, ScanOutcome};
