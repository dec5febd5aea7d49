//! Wire protocol: netstring framing, hybrid session encryption and the
//! typed packet catalog.
//!
//! Handshake order on a fresh connection:
//! 1. server -> client: RSA public key frame, unencrypted
//! 2. client -> server: `ClientKey` packet, RSA-OAEP encrypted
//! 3. all later frames: AES-128-CFB under the session key

pub mod crypto;
pub mod error;
pub mod netstring;
pub mod packet;

pub use crypto::{wrap_session_key, ServerKeyPair, SessionCipher, SESSION_KEY_LEN};
pub use error::{CryptoError, FrameError, ProtoError};
pub use netstring::{NetstringDecoder, MAX_FRAME_LEN};
pub use packet::{Direction, Model, Packet, Weather};
