pub mod control;
pub mod controller;
pub mod detector;
pub mod scanner;

pub use control::{ControlHandle, ControlState};
pub use controller::{JobHandle, ScreenController};
pub use detector::DetectorConfig;
pub use scanner::{BatchOutcome, BatchProgress, BatchScanner};
