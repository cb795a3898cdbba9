// error.rs -- fatal protocol errors
//
// Anything in here tears the connection down. Stale delta references and
// prediction misses are not errors and never show up as one.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A read ran past the end of the received datagram.
    #[error("end of message: needed {needed} byte(s) at offset {offset} of {size}")]
    EndOfMessage { offset: i32, needed: usize, size: i32 },

    #[error("{context}: bad number:{number}")]
    BadEntityNumber { context: &'static str, number: i32 },

    /// A sub-message appeared where the fixed frame layout requires another.
    #[error("{context}: not {expected} (got command {found})")]
    UnexpectedCommand {
        context: &'static str,
        expected: &'static str,
        found: i32,
    },

    #[error("CL_ParseServerMessage: Illegible server message ({0})")]
    IllegibleMessage(i32),

    /// Player info or entities outside of an svc_frame.
    #[error("CL_ParseServerMessage: out of place frame data ({0})")]
    OutOfPlaceFrameData(i32),

    #[error("configstring > MAX_CONFIGSTRINGS ({0})")]
    BadConfigString(i32),

    #[error("Server returned version {version}, expected {min}-{max}")]
    UnsupportedProtocol { version: i32, min: i32, max: i32 },

    #[error("Server disconnected")]
    ServerDisconnected,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
