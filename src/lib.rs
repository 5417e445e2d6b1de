pub mod catalog;
pub mod config;
pub mod datum;
pub mod error;
pub mod exec;
pub mod procs;
pub mod system_catalog;

pub use catalog::{AggKind, AggRegistry, AggregateDescriptor};
pub use config::EngineConfig;
pub use datum::{Datum, Oid, SortKey};
pub use error::{AggError, AggResult};

// Test-only printing helper: expands to tprintln! during tests and is absent otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
