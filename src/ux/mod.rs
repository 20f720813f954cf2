mod manager;
mod watchdog;

pub use manager::{DocumentFilter, ScanOutcome, UiStateChange, UxManager, UxSettings};
pub use watchdog::Watchdog;
