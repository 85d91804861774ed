use crate::message::Message;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The envelope could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),
}

impl<T> Message<T>
where
    T: Serialize,
{
    /// Encodes the envelope as CBOR.
    ///
    /// # Errors
    /// Returns an error if the body cannot be serialized.
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut writer = Vec::new();
        ciborium::ser::into_writer(self, &mut writer)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::from(writer))
    }
}

impl<T> Message<T>
where
    T: DeserializeOwned,
{
    /// Decodes a CBOR encoded envelope.
    ///
    /// # Errors
    /// Returns an error if the bytes are not an envelope of `T`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageError, ReplyMessage};

    use assert_matches::assert_matches;
    use serde::Deserialize;

    #[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
    struct Greeting {
        name: String,
    }

    #[test]
    fn test_envelope_fields_survive_encoding() {
        let message = Message::new(Greeting {
            name: "Ann".to_string(),
        })
        .with_reply_to("mq:tmp:abc")
        .with_priority(1)
        .with_header("trace", "t-1");

        let bytes = message.to_bytes().unwrap();
        let decoded: Message<Greeting> = Message::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn test_error_reply_survives_encoding() {
        let error = MessageError::new("NameTaken", "name already taken").with_stack_trace("at f");
        let reply = ReplyMessage::<Greeting>::failure(uuid::Uuid::new_v4(), error.clone());

        let decoded: ReplyMessage<Greeting> =
            Message::from_bytes(&reply.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.error, Some(error));
        assert_eq!(decoded.body, None);
    }

    #[test]
    fn test_decode_garbage() {
        let result = Message::<Greeting>::from_bytes(b"not cbor at all");

        assert_matches!(result, Err(CodecError::Decode(_)));
    }
}
