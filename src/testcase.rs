//! Test case selection
// (c) 2024 Ross Younger

/// The interop test cases this implementation supports.
///
/// The name is given by the interop runner in the `TESTCASE` environment variable.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "lowercase")]
pub enum TestCase {
    /// Establish a session and download a single file on one stream
    Handshake,
}

/// A test case name we do not implement.
///
/// The runner expects exit code 127 for this, so it can tell "unsupported" apart from "failed".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported test case: {0:?}")]
pub struct UnsupportedTestCase(pub String);

impl TestCase {
    /// Looks up a test case by its exact name
    pub fn from_name(name: &str) -> Result<Self, UnsupportedTestCase> {
        name.parse()
            .map_err(|_| UnsupportedTestCase(name.to_string()))
    }
}
