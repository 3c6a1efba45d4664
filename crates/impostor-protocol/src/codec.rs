//! Codec trait and implementations for serializing views and events.
//!
//! The coordinator never touches bytes. Whatever transport is layered on
//! top (HTTP, WebSocket, a test harness printing to stdout) picks a
//! [`Codec`] and turns [`RoomEvent`](crate::RoomEvent)s and
//! [`RoomView`](crate::RoomView)s into wire payloads.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec is typically shared by every
/// connection task of a server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Browser clients consume JSON directly, so this is the default.
///
/// ```rust
/// use impostor_protocol::{Codec, JsonCodec, PlayerId, RoomEvent};
///
/// let codec = JsonCodec;
/// let event = RoomEvent::PlayerEliminated { player: PlayerId(3), round: 2 };
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: RoomEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
