//! Tracing helpers
// (c) 2024 Ross Younger

use std::{
    fs::File,
    path::Path,
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Context;
use serde::{Deserialize, Serialize, de};
use strum::VariantNames as _;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{
        MakeWriter,
        format::Writer,
        time::{ChronoLocal, ChronoUtc, FormatTime},
    },
    prelude::*,
};

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

const FRIENDLY_FORMAT_LOCAL: &str = "%Y-%m-%d %H:%M:%SL";
const FRIENDLY_FORMAT_UTC: &str = "%Y-%m-%d %H:%M:%SZ";

/// Environment variable that controls what gets logged to stderr
const STANDARD_ENV_VAR: &str = "RUST_LOG";
/// Environment variable that controls what gets logged to file
const LOG_FILE_DETAIL_ENV_VAR: &str = "RUST_LOG_FILE_DETAIL";

/// Computes the trace level for a given configuration
pub(crate) fn trace_level(config: &crate::config::Configuration) -> &'static str {
    if config.debug { "debug" } else { "info" }
}

/// Selects the format of time stamps in output messages
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "kebab-case")]
pub enum TimeFormat {
    /// Local time (as best as we can figure it out), as "year-month-day HH:MM:SS"
    #[default]
    Local,
    /// UTC time, as "year-month-day HH:MM:SS"
    Utc,
    /// UTC time, in the format described in [RFC 3339](https://datatracker.ietf.org/doc/html/rfc3339).
    Rfc3339,
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let lower = s.to_ascii_lowercase();
        std::str::FromStr::from_str(&lower)
            .map_err(|_| de::Error::unknown_variant(&s, TimeFormat::VARIANTS))
    }
}

/// Time stamp source for log lines
#[derive(Debug, Clone)]
enum Timestamps {
    Local(ChronoLocal),
    Utc(ChronoUtc),
}

impl From<TimeFormat> for Timestamps {
    fn from(format: TimeFormat) -> Self {
        match format {
            TimeFormat::Local => Self::Local(ChronoLocal::new(FRIENDLY_FORMAT_LOCAL.into())),
            TimeFormat::Utc => Self::Utc(ChronoUtc::new(FRIENDLY_FORMAT_UTC.into())),
            TimeFormat::Rfc3339 => Self::Local(ChronoLocal::rfc_3339()),
        }
    }
}

impl FormatTime for Timestamps {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        match self {
            Self::Local(t) => t.format_time(w),
            Self::Utc(t) => t.format_time(w),
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Reads a filter from the environment. `None` if the variable is not set.
fn filter_from_env(var: &str) -> anyhow::Result<Option<EnvFilter>> {
    let Ok(directives) = std::env::var(var) else {
        return Ok(None);
    };
    EnvFilter::try_new(directives)
        .map(Some)
        .with_context(|| format!("{var} (set in environment) was not understood"))
}

/// The filter from `var` if set, otherwise our own events at `trace_level`.
///
/// The flag says whether the environment supplied the filter.
fn filter_or_default(var: &str, trace_level: &str) -> anyhow::Result<(EnvFilter, bool)> {
    Ok(match filter_from_env(var)? {
        Some(filter) => (filter, true),
        None => (EnvFilter::try_new(format!("wtinterop={trace_level}"))?, false),
    })
}

fn layer<W>(
    writer: W,
    filter: EnvFilter,
    timestamps: Timestamps,
    show_target: bool,
    ansi: bool,
) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + 'static + Sync + Send,
{
    tracing_subscriber::fmt::layer::<Registry>()
        .compact()
        .with_target(show_target)
        .with_ansi(ansi)
        .with_timer(timestamps)
        .with_writer(writer)
        .with_filter(filter)
        .boxed()
}

/// Sets up tracing to stderr and optionally to a log file.
///
/// By default we log only our own events, at a given trace level.
/// This can be overridden by setting `RUST_LOG`; the log file detail can be set
/// separately with `RUST_LOG_FILE_DETAIL`.
///
/// **CAUTION:** If this function fails, tracing won't be set up; callers must take extra care to report the error.
///
/// **NOTE:** You can only run this once per process. A global bool prevents re-running.
pub(crate) fn setup(
    trace_level: &str,
    log_file: Option<&Path>,
    time_format: TimeFormat,
    ansi_colours: bool,
) -> anyhow::Result<()> {
    if is_initialized() {
        tracing::warn!("tracing::setup called a second time (ignoring)");
        return Ok(());
    }
    let layers = setup_inner(trace_level, log_file, time_format, ansi_colours)?;
    TRACING_INITIALIZED.store(true, Ordering::Relaxed);
    tracing_subscriber::registry().with(layers).init();
    Ok(())
}

fn setup_inner(
    trace_level: &str,
    log_file: Option<&Path>,
    time_format: TimeFormat,
    ansi_colours: bool,
) -> anyhow::Result<Vec<BoxedLayer>> {
    let (filter, from_env) = filter_or_default(STANDARD_ENV_VAR, trace_level)?;
    let mut layers = vec![layer(
        std::io::stderr,
        filter,
        time_format.into(),
        from_env,
        ansi_colours,
    )];

    if let Some(filename) = log_file {
        let out_file = Arc::new(
            File::create(filename)
                .with_context(|| format!("Failed to open log file {}", filename.display()))?,
        );
        let (filter, from_env) = match filter_from_env(LOG_FILE_DETAIL_ENV_VAR)? {
            Some(filter) => (filter, true),
            None => filter_or_default(STANDARD_ENV_VAR, trace_level)?,
        };
        layers.push(layer(out_file, filter, time_format.into(), from_env, false));
    }

    Ok(layers)
}

/// Returns whether tracing has been initialized
pub(crate) fn is_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::Relaxed)
}
