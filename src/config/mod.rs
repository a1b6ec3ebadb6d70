// (c) 2024 Ross Younger
//! # Configuration management
//!
//! Run-time configuration is obtained from the following sources, in order:
//! 1. Command-line options
//! 2. Environment variables set by the interop runner:
//!    * `TESTCASE` selects the test case
//!    * `QLOGDIR` names a directory for qlog output
//! 3. Hard-wired defaults
//!
//! Each option may be given in several places; the highest priority source wins.
//! Run `wtinterop --show-config` to see the resolved result.

mod manager;
pub use manager::{ENVIRONMENT_KEYS, Manager};

mod structure;
pub use structure::Configuration;
pub(crate) use structure::ConfigurationOverrides;
