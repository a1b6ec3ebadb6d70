// (c) 2024 Ross Younger
//! Command-line arguments

use std::ffi::OsString;

use clap::Parser;

use super::styles::CLAP_STYLES;
use crate::config::ConfigurationOverrides;

/// Interoperability endpoint for file transfer over multiplexed QUIC sessions.
///
/// In client mode, fetches the first URL given and saves it under the downloads directory.
/// In server mode, serves files from the www directory.
/// The test case is normally given by the TESTCASE environment variable.
#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(
    author,
    version,
    about,
    styles = CLAP_STYLES,
    infer_long_args(true),
)]
pub(crate) struct CliArgs {
    /// Run as the server
    #[arg(long, help_heading("Modes"), conflicts_with("urls"))]
    pub server: bool,

    /// Print the resolved configuration, then exit
    #[arg(long, help_heading("Modes"))]
    pub show_config: bool,

    #[command(flatten)]
    pub config: ConfigurationOverrides,

    /// URLs to fetch in client mode. Only the first is used.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,
}

/// The mode of operation selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MainMode {
    Server,
    Client,
    ShowConfig,
}

impl CliArgs {
    /// Parses arguments without exiting the process on error
    pub(crate) fn custom_parse<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args)
    }

    pub(crate) fn mode(&self) -> MainMode {
        if self.show_config {
            MainMode::ShowConfig
        } else if self.server {
            MainMode::Server
        } else {
            MainMode::Client
        }
    }
}
