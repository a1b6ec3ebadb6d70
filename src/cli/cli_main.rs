//! Main CLI
// (c) 2024 Ross Younger

use std::{ffi::OsString, process::ExitCode};

use anyhow::{Context as _, Result};
use figment::providers::Serialized;
use tracing::{info, trace};

use super::{
    args::{CliArgs, MainMode},
    styles::{error, reset, use_colours},
};
use crate::{
    client,
    config::{Configuration, Manager},
    server::server_main,
    testcase::{TestCase, UnsupportedTestCase},
    util::{setup_tracing, trace_level},
};

/// Exit code the interop runner reads as "test case not supported"
const EXIT_UNSUPPORTED: u8 = 127;

/// Main CLI entrypoint
///
/// Call this from `main`, passing the arguments to use.
/// Normally you will call `cli(std::env::args_os())` but you can pass in alternate arguments for CLI testing.
///
/// # Exit codes
/// - 0: success
/// - 1: failure
/// - 127: the test case is not supported
///
/// # Note
/// This function starts a tokio runtime and performs work in it.
#[must_use]
pub fn cli<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match cli_inner(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if crate::util::tracing_is_initialised() {
                tracing::error!("{e:#}");
            } else {
                eprintln!("{ERROR}Error:{RESET} {e:#}", ERROR = error(), RESET = reset());
            }
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(e: &anyhow::Error) -> ExitCode {
    if e.chain().any(|c| c.is::<UnsupportedTestCase>()) {
        ExitCode::from(EXIT_UNSUPPORTED)
    } else {
        ExitCode::FAILURE
    }
}

fn cli_inner<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let Some(args) = parse_args(args)? else {
        return Ok(()); // help/version shown; exit
    };

    let mut manager = Manager::standard();
    manager.merge_provider(Serialized::defaults(&args.config));
    let config = manager.get().context("resolving configuration")?;
    config.validate()?;

    let mode = args.mode();
    if mode == MainMode::ShowConfig {
        println!("{config:#?}");
        return Ok(());
    }

    // checked before anything else can fail, so the runner reliably sees 127
    let testcase = TestCase::from_name(&config.testcase)?;

    setup_tracing(
        trace_level(&config),
        config.log_file(),
        config.time_format,
        use_colours(),
    )?; // to provoke error: set RUST_LOG=.
    trace!("test case {testcase}, mode {mode:?}");
    if !config.qlogdir.is_empty() {
        info!(
            "qlog output is not supported by this transport; ignoring QLOGDIR={}",
            config.qlogdir
        );
    }

    handle_mode(mode, &config, &args.urls)
}

fn parse_args<I, T>(args: I) -> Result<Option<CliArgs>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    use clap::error::ErrorKind::{DisplayHelp, DisplayVersion};
    match CliArgs::custom_parse(args) {
        Ok(args) => Ok(Some(args)),
        Err(e) if matches!(e.kind(), DisplayHelp | DisplayVersion) => {
            let message = e.render();
            if use_colours() {
                print!("{}", message.ansi());
            } else {
                print!("{message}");
            }
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

// MODE HANDLERS ///////////////////////////////////////////////////////////

#[tokio::main(flavor = "current_thread")]
async fn handle_mode(mode: MainMode, config: &Configuration, urls: &[String]) -> Result<()> {
    match mode {
        MainMode::Server => server_main(config).await,
        MainMode::Client => client::run(&config.testcase, urls, config).await,
        MainMode::ShowConfig => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use std::process::ExitCode;

    use super::exit_code_for;
    use crate::testcase::UnsupportedTestCase;

    #[test]
    fn unsupported_is_127() {
        let e = anyhow::Error::from(UnsupportedTestCase("zerortt".into())).context("starting up");
        assert_eq!(exit_code_for(&e), ExitCode::from(127));
    }

    #[test]
    fn other_errors_are_1() {
        let e = anyhow::anyhow!("connection refused");
        assert_eq!(exit_code_for(&e), ExitCode::FAILURE);
    }
}
