//! Verification harness for the Triptych append engine.
//!
//! Provides the pieces tests need to observe a log from the outside:
//! a subscriber-semantics frame scanner, structural invariants over
//! scanned terms, and a simulated media driver that owns log lifecycle,
//! publication limits, and liveness exactly the way the real driver
//! does. Nothing here runs in production paths.

pub mod invariants;
pub mod scanner;
pub mod sim_driver;

pub use scanner::{ScannedFrame, reassemble_messages, scan_term};
pub use sim_driver::{DriverConfig, ManualClock, SimDriver};
