// (c) 2024 Ross Younger
//! CLI output styling

#[allow(clippy::enum_glob_use)]
use anstyle::AnsiColor::*;
use anstyle::Color::Ansi;
use clap::builder::styling::Styles;
use std::io::IsTerminal as _;

const ERROR: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Red)));
const WARNING: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Yellow)));
const INFO: anstyle::Style = anstyle::Style::new().fg_color(Some(Ansi(Cyan)));
const HEADER: anstyle::Style = anstyle::Style::new()
    .underline()
    .fg_color(Some(Ansi(Yellow)));

// clap reads the CLICOLOR variables itself, so this need not be conditional
pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(HEADER)
    .header(HEADER)
    .literal(anstyle::Style::new().bold())
    .invalid(WARNING)
    .error(ERROR)
    .valid(INFO.bold().underline())
    .placeholder(INFO);

/// Should diagnostics on stderr be coloured?
///
/// Honours `NO_COLOR` and `CLICOLOR_FORCE`; otherwise colours only when stderr is a terminal.
pub(crate) fn use_colours() -> bool {
    let set = |var| std::env::var_os(var).is_some_and(|v| !v.is_empty());
    if set("NO_COLOR") {
        false
    } else if set("CLICOLOR_FORCE") {
        true
    } else {
        std::io::stderr().is_terminal()
    }
}

/// Error styling, if colours are enabled
pub(crate) fn error() -> anstyle::Style {
    if use_colours() {
        ERROR
    } else {
        anstyle::Style::new()
    }
}

/// Undoes [`error()`]
pub(crate) fn reset() -> anstyle::Reset {
    anstyle::Reset
}
