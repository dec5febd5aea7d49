use thiserror::Error;

use crate::netstring::MAX_FRAME_LEN;

/// Framing failures. All of these desynchronize the byte stream and are
/// fatal to the connection; an incomplete frame is not an error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid netstring length prefix")]
    BadLength,

    #[error("frame length {0} exceeds cap of {MAX_FRAME_LEN} bytes")]
    TooLarge(usize),

    #[error("netstring missing ',' terminator")]
    MissingTerminator,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("malformed public key frame")]
    BadPublicKey,

    #[error("session key must be {0} bytes")]
    BadKeyLength(usize),

    #[error("no session key established")]
    NoSessionKey,
}

/// Packet-level decode failures. An unknown action tag means the peer is
/// speaking a different catalog and the connection must be closed.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("unknown action tag: {0}")]
    UnknownAction(String),

    #[error("malformed packet: {0}")]
    Malformed(String),
}
