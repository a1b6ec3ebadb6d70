// (c) 2024 Ross Younger

//! # Wire formats
//!
//! Everything here is plain data and codecs; nothing in this module touches the network.
//!
//! * [`varint`] is the QUIC variable-length integer, used for stream and datagram prefixes.
//! * [`upgrade`] is the text head exchanged on a session's control stream.
//! * [`RequestLine`] is the single line that opens each request stream.
//! * [`ErrorCode`] is the application error space used when resetting streams.
//!
//! [`SendingStream`] and [`ReceivingStream`] describe the stream capabilities the higher
//! layers rely on.

pub mod upgrade;
pub mod varint;

mod common;
mod error_code;
mod request;

pub use common::{ReceivingStream, SendReceivePair, SendingStream, StreamControlError};
pub use error_code::ErrorCode;
pub use request::{MAX_REQUEST_LINE, RequestLine, RequestLineError};
pub use upgrade::{
    HeadError, METHOD, PROTOCOL, RequestHead, ResponseHead, StatusCode, read_head,
};
pub use varint::VarIntError;
