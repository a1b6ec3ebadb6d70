//! Configuration structure
// (c) 2024 Ross Younger

use std::{
    net::{Ipv6Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::builder::TypedValueParser as _;
use serde::{Deserialize, Serialize};

use crate::util::TimeFormat;

/// The set of configurable options.
///
/// There is no `default()`; the hard-wired values come from [`Configuration::system_default()`].
/// Command-line options and the environment override them (see [`Manager`](super::Manager)).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Configuration {
    /// Name of the test case to run. Read from the `TESTCASE` environment variable.
    pub testcase: String,
    /// Address the server listens on
    pub listen: SocketAddr,
    /// Path of the session endpoint, e.g. `/webtransport`
    pub upgrade_path: String,
    /// Directory the server serves files from
    pub www: PathBuf,
    /// Directory the client saves downloads into
    pub downloads: PathBuf,
    /// Server certificate chain (PEM)
    pub cert_file: PathBuf,
    /// Server private key (PEM)
    pub key_file: PathBuf,
    /// Generate a self-signed certificate instead of reading `cert_file` and `key_file`
    pub generate_cert: bool,
    /// Log file; empty means log to the console only
    pub log_file: PathBuf,
    /// Write TLS secrets to the file named by `SSLKEYLOGFILE`, if set
    pub keylog: bool,
    /// Directory for qlog output. Read from the `QLOGDIR` environment variable.
    pub qlogdir: String,
    /// Deadline for connecting and establishing a session, in seconds
    pub dial_timeout: u64,
    /// Connection idle timeout, in seconds
    pub idle_timeout: u64,
    /// Maximum number of concurrent bidirectional streams the peer may open
    pub max_streams: u32,
    /// Time format for log messages
    pub time_format: TimeFormat,
    /// Enable detailed debug output
    pub debug: bool,
}

impl Configuration {
    /// Hard-wired defaults, matching the layout of the interop runner's containers
    #[must_use]
    pub fn system_default() -> Self {
        Self {
            testcase: String::new(),
            listen: SocketAddr::from((Ipv6Addr::UNSPECIFIED, 443)),
            upgrade_path: "/webtransport".into(),
            www: "/www".into(),
            downloads: "/downloads".into(),
            cert_file: "/certs/cert.pem".into(),
            key_file: "/certs/priv.key".into(),
            generate_cert: false,
            log_file: "/logs/log.txt".into(),
            keylog: true,
            qlogdir: String::new(),
            dial_timeout: 5,
            idle_timeout: 30,
            max_streams: 100,
            time_format: TimeFormat::Local,
            debug: false,
        }
    }

    /// Dial timeout as a [`Duration`]
    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout)
    }

    /// Idle timeout as a [`Duration`]
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    /// The log file, if any
    #[must_use]
    pub fn log_file(&self) -> Option<&std::path::Path> {
        (!self.log_file.as_os_str().is_empty()).then_some(self.log_file.as_path())
    }

    /// Checks for values that can never work
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.upgrade_path.starts_with('/'),
            "upgrade path must begin with '/' (got {:?})",
            self.upgrade_path
        );
        anyhow::ensure!(self.dial_timeout > 0, "dial timeout must be at least 1s");
        anyhow::ensure!(self.idle_timeout > 0, "idle timeout must be at least 1s");
        anyhow::ensure!(self.max_streams > 0, "max streams must be at least 1");
        Ok(())
    }
}

/// Command-line overrides for [`Configuration`].
///
/// Every member is optional; only the ones the user gave are merged over lower-priority sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::Args, Serialize)]
pub(crate) struct ConfigurationOverrides {
    /// Test case to run [default: from the TESTCASE environment variable]
    #[arg(long, value_name = "name", help_heading("Test"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testcase: Option<String>,

    /// Address to listen on in server mode [default: [::]:443]
    #[arg(long, value_name = "addr:port", help_heading("Server"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,

    /// Directory to serve files from [default: /www]
    #[arg(long, value_name = "dir", help_heading("Server"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub www: Option<PathBuf>,

    /// Certificate chain file [default: /certs/cert.pem]
    #[arg(long, value_name = "file", help_heading("Server"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// Private key file [default: /certs/priv.key]
    #[arg(long, value_name = "file", help_heading("Server"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Generate a self-signed certificate instead of reading one
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading("Server"))]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_cert: bool,

    /// Directory to save downloads into [default: /downloads]
    #[arg(long, value_name = "dir", help_heading("Client"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<PathBuf>,

    /// Session endpoint path [default: /webtransport]
    #[arg(long, value_name = "path", help_heading("Session"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_path: Option<String>,

    /// Connect and session establishment deadline, in seconds [default: 5]
    #[arg(long, value_name = "s", help_heading("Session"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial_timeout: Option<u64>,

    /// Connection idle timeout, in seconds [default: 30]
    #[arg(long, value_name = "s", help_heading("Session"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,

    /// Maximum concurrent streams the peer may open [default: 100]
    #[arg(long, value_name = "n", help_heading("Session"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_streams: Option<u32>,

    /// Log file; pass an empty string to log to the console only [default: /logs/log.txt]
    #[arg(
        long,
        value_name = "file",
        help_heading("Output"),
        value_parser = clap::builder::OsStringValueParser::new().map(PathBuf::from),
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Write TLS secrets to $SSLKEYLOGFILE [default: true]
    #[arg(long, value_name = "bool", help_heading("Output"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keylog: Option<bool>,

    /// Directory for qlog output [default: from the QLOGDIR environment variable]
    #[arg(long, value_name = "dir", help_heading("Output"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qlogdir: Option<String>,

    /// Time format for log messages [default: local]
    #[arg(long, value_name = "format", help_heading("Output"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_format: Option<TimeFormat>,

    /// Enable detailed debug output
    #[arg(short, long, action = clap::ArgAction::SetTrue, help_heading("Output"))]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
}
