// (c) 2024 Ross Younger

//! ## 🕵️ Troubleshooting
//!
//! The `--debug` option reports information that may help you diagnose issues.
//!
//! This program also understands the `RUST_LOG` environment variable which might let you dig deeper.
//! Some possible settings for this variable are:
//!
//! * `wtinterop=trace` outputs tracing-level output from this crate, including every stream
//!   and datagram routed by the session layer
//! * `trace` sets all the Rust components to trace mode, which includes an _awful lot_ of output from quinn (the QUIC implementation).
//! * `rustls=debug` shows the TLS handshake (needs the `rustls-log` feature, which is on by default)
//!
//! The log file gets the same detail unless `RUST_LOG_FILE_DETAIL` says otherwise.
//!
//! ### The process exits with code 127
//!
//! The test case named by `TESTCASE` (or `--testcase`) is not one this build supports.
//! Nothing was sent on the network.
//!
//! ### The dial times out
//!
//! * Is the server listening on the address and port in the URL? It binds `[::]:443` by default.
//! * Does a firewall drop inbound UDP to that port?
//! * A server that completes the QUIC handshake but never answers the upgrade request also
//!   produces a timeout. The deadline (`--dial-timeout`) covers both.
//!
//! ### The upgrade is rejected
//!
//! * `404 Not Found`: the URL path does not match the server's `--upgrade-path`.
//!   The client always asks for its own `--upgrade-path`, whatever path the file URL has.
//! * `400 Bad Request`: the request was not a `CONNECT` with `protocol: webtransport`.
//!
//! ### The download is empty
//!
//! The server answers every failed request (missing file, path outside the serving root,
//! unsupported method) with an empty body, exactly like an empty file.
//! Its log says which it was.
//!
//! ### Decrypting a packet capture
//!
//! Set `SSLKEYLOGFILE` to a writable path; TLS secrets are written there unless
//! `--keylog false` is given.
