// (c) 2024 Ross Younger

#![allow(clippy::doc_markdown)]
//! `wtinterop` is an interoperability endpoint for file transfer over multiplexed QUIC sessions.
//!
//! It plays either role in an interop test run: the client fetches a file, the server
//! serves a directory. Both sides speak the same small stack:
//!
//! 1. A QUIC connection (via [quinn]), TLS 1.3, ALPN `wt-h09`.
//! 2. A *session* negotiated with an HTTP-style upgrade exchange on a bidirectional stream
//!    (see [`session`] and [`protocol::upgrade`]). Several sessions may share a connection.
//! 3. Within a session, one *request* per stream: `GET <path>\r\n`, answered by the raw bytes
//!    of the file (see [`h09`]).
//!
//! ## Running under the interop runner
//!
//! The runner selects the test case with the `TESTCASE` environment variable and passes the
//! URLs to fetch on the command line. The exit code tells it the outcome:
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | failure |
//! | 127 | test case not supported |
//!
//! The server serves `/www`; the client saves into `/downloads`; logs go to `/logs/log.txt`.
//! All of these can be changed, see [`Configuration`] and `--help`.
//!
//! ## 📖 Documentation
//!
//! * [Configuration](config)
//! * [Wire formats](protocol)
//! * [Troubleshooting](doc::troubleshooting)
//!
//! [quinn]: https://docs.rs/quinn

mod cli;
pub use cli::cli;

pub mod client;
pub mod config;
pub use config::Configuration;
pub mod doc;
pub mod endpoint;
pub mod h09;
pub mod protocol;
pub mod server;
pub mod session;
pub mod testcase;
pub mod transport;
pub mod util;
