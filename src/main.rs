//! wtinterop utility - main entrypoint
// (c) 2024 Ross Younger

use std::process::ExitCode;

fn main() -> ExitCode {
    wtinterop::cli(std::env::args_os())
}
