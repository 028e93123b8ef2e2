//! A minimal CoAP message implementation.
//!
//! We don't fully implement the CoAP spec, only the subset the registration protocol actually
//! puts on the wire: confirmable and non-confirmable POST requests, piggybacked responses, the
//! Uri-Path option and an opaque payload. For reference, the wire format follows [RFC
//! 7252](https://datatracker.ietf.org/doc/html/rfc7252#section-3). Reliability (retransmission of
//! confirmable messages) is left to the requester.

use std::io;

use bytes::{Buf, BufMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// The only CoAP version in existence.
const COAP_VERSION: u8 = 1;

/// Size of the fixed CoAP header on the wire.
const HEADER_WIRE_SIZE: usize = 4;

/// Maximum size in bytes of a message token.
const TOKEN_MAX_SIZE: usize = 8;

/// Option number of the Uri-Path option. Repeated once per path segment.
const OPTION_URI_PATH: u16 = 11;

/// Byte separating the options from the payload, if a payload is present.
const PAYLOAD_MARKER: u8 = 0xff;

/// Nibble value introducing an 8 bit option delta/length extension.
const EXTEND_ONE_BYTE: u8 = 13;
/// Nibble value introducing a 16 bit option delta/length extension.
const EXTEND_TWO_BYTES: u8 = 14;
/// Offset applied to a 16 bit option delta/length extension.
const EXTEND_TWO_BYTES_OFFSET: u16 = 269;
/// Reserved nibble value, only legal in the payload marker.
const EXTEND_RESERVED: u8 = 15;

/// The transmission type of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// The message must be acknowledged by the receiver.
    Confirmable,
    /// Fire and forget.
    NonConfirmable,
    /// Acknowledges a confirmable message, possibly carrying the response.
    Acknowledgement,
    /// The receiver could not process a message.
    Reset,
}

impl MessageType {
    fn wire(self) -> u8 {
        match self {
            MessageType::Confirmable => 0,
            MessageType::NonConfirmable => 1,
            MessageType::Acknowledgement => 2,
            MessageType::Reset => 3,
        }
    }

    fn from_wire(raw: u8) -> Self {
        match raw & 0b11 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }
}

/// A CoAP code: a 3 bit class and 5 bit detail packed in a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Code(u8);

impl Code {
    /// The empty code, used by bare acknowledgements.
    pub const EMPTY: Code = Code(0x00);
    /// 0.02 POST.
    pub const POST: Code = Code(0x02);
    /// 2.04 Changed, the success response to a POST.
    pub const CHANGED: Code = Code(0x44);

    /// Checks if this code identifies a request.
    pub fn is_request(self) -> bool {
        self.0 >> 5 == 0 && self != Code::EMPTY
    }
}

impl core::fmt::Display for Code {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 >> 5, self.0 & 0x1f)
    }
}

/// A single CoAP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    code: Code,
    message_id: u16,
    token: Vec<u8>,
    uri_path: String,
    payload: Vec<u8>,
}

impl Message {
    /// Create a new confirmable POST request for the given resource path, with a fresh message
    /// id and token.
    pub fn confirmable_post(uri_path: &str) -> Self {
        Self::post(MessageType::Confirmable, uri_path)
    }

    /// Create a new non-confirmable POST request for the given resource path.
    pub fn non_confirmable_post(uri_path: &str) -> Self {
        Self::post(MessageType::NonConfirmable, uri_path)
    }

    fn post(message_type: MessageType, uri_path: &str) -> Self {
        Self {
            message_type,
            code: Code::POST,
            message_id: rand::random(),
            token: rand::random::<[u8; 4]>().to_vec(),
            uri_path: uri_path.to_string(),
            payload: Vec::new(),
        }
    }

    /// Create the piggybacked response for a request: an acknowledgement mirroring the request's
    /// message id and token, with a 2.04 Changed code.
    pub fn response_to(request: &Message) -> Self {
        Self {
            message_type: MessageType::Acknowledgement,
            code: Code::CHANGED,
            message_id: request.message_id,
            token: request.token.clone(),
            uri_path: String::new(),
            payload: Vec::new(),
        }
    }

    /// The [`MessageType`] of this `Message`.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The [`Code`] of this `Message`.
    pub fn code(&self) -> Code {
        self.code
    }

    /// The message id of this `Message`.
    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    /// The token of this `Message`.
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// The resource path of this `Message`, with segments joined by `/`.
    pub fn uri_path(&self) -> &str {
        &self.uri_path
    }

    /// The payload carried by this `Message`.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replace the payload of this `Message`.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
    }

    /// Checks if this `Message` is a confirmable POST request.
    pub fn is_confirmable_post(&self) -> bool {
        self.message_type == MessageType::Confirmable && self.code == Code::POST
    }

    /// Construct a `Message` from wire bytes, consuming the buffer. Returns [`None`] if the
    /// buffer does not hold a single well-formed message.
    pub fn from_bytes(src: &mut bytes::BytesMut) -> Option<Self> {
        if src.remaining() < HEADER_WIRE_SIZE {
            return None;
        }

        let head = src.get_u8();
        if head >> 6 != COAP_VERSION {
            return None;
        }
        let message_type = MessageType::from_wire(head >> 4);
        let token_length = (head & 0x0f) as usize;
        if token_length > TOKEN_MAX_SIZE {
            return None;
        }
        let code = Code(src.get_u8());
        let message_id = src.get_u16();

        if src.remaining() < token_length {
            return None;
        }
        let token = src[..token_length].to_vec();
        src.advance(token_length);

        let mut uri_path = String::new();
        let mut option_number = 0u16;
        while src.has_remaining() {
            let head = src.get_u8();
            if head == PAYLOAD_MARKER {
                // A payload marker with an empty payload is malformed.
                if !src.has_remaining() {
                    return None;
                }
                break;
            }
            let delta = decode_extended(src, head >> 4)?;
            let length = decode_extended(src, head & 0x0f)? as usize;
            if src.remaining() < length {
                return None;
            }
            option_number = option_number.checked_add(delta)?;
            if option_number == OPTION_URI_PATH {
                let segment = std::str::from_utf8(&src[..length]).ok()?;
                if !uri_path.is_empty() {
                    uri_path.push('/');
                }
                uri_path.push_str(segment);
            }
            // Options other than Uri-Path are not used by the protocol, skip them.
            src.advance(length);
        }

        let payload = src[..].to_vec();
        src.advance(payload.len());

        Some(Message {
            message_type,
            code,
            message_id,
            token,
            uri_path,
            payload,
        })
    }

    /// Encode this `Message` on the wire.
    pub fn write_bytes(&self, dst: &mut bytes::BytesMut) {
        dst.put_u8((COAP_VERSION << 6) | (self.message_type.wire() << 4) | self.token.len() as u8);
        dst.put_u8(self.code.0);
        dst.put_u16(self.message_id);
        dst.put_slice(&self.token);

        let mut option_number = 0u16;
        if !self.uri_path.is_empty() {
            for segment in self.uri_path.split('/') {
                let delta = OPTION_URI_PATH - option_number;
                put_option_header(dst, delta, segment.len() as u16);
                dst.put_slice(segment.as_bytes());
                option_number = OPTION_URI_PATH;
            }
        }

        if !self.payload.is_empty() {
            dst.put_u8(PAYLOAD_MARKER);
            dst.put_slice(&self.payload);
        }
    }
}

/// Decode an option delta or length nibble, reading extension bytes as needed.
fn decode_extended(src: &mut bytes::BytesMut, nibble: u8) -> Option<u16> {
    match nibble {
        EXTEND_ONE_BYTE => {
            if !src.has_remaining() {
                return None;
            }
            Some(src.get_u8() as u16 + EXTEND_ONE_BYTE as u16)
        }
        EXTEND_TWO_BYTES => {
            if src.remaining() < 2 {
                return None;
            }
            src.get_u16().checked_add(EXTEND_TWO_BYTES_OFFSET)
        }
        EXTEND_RESERVED => None,
        value => Some(value as u16),
    }
}

/// Write an option header for the given delta and value length.
fn put_option_header(dst: &mut bytes::BytesMut, delta: u16, length: u16) {
    let delta_nibble = option_nibble(delta);
    let length_nibble = option_nibble(length);
    dst.put_u8((delta_nibble << 4) | length_nibble);
    put_option_extension(dst, delta_nibble, delta);
    put_option_extension(dst, length_nibble, length);
}

/// The nibble encoding an option delta or length, per RFC 7252 §3.1.
fn option_nibble(value: u16) -> u8 {
    if value < EXTEND_ONE_BYTE as u16 {
        value as u8
    } else if value < EXTEND_TWO_BYTES_OFFSET {
        EXTEND_ONE_BYTE
    } else {
        EXTEND_TWO_BYTES
    }
}

/// Write the extension bytes announced by an option nibble, if any.
fn put_option_extension(dst: &mut bytes::BytesMut, nibble: u8, value: u16) {
    match nibble {
        EXTEND_ONE_BYTE => dst.put_u8((value - EXTEND_ONE_BYTE as u16) as u8),
        EXTEND_TWO_BYTES => dst.put_u16(value - EXTEND_TWO_BYTES_OFFSET),
        _ => {}
    }
}

/// A codec which sends and receives whole CoAP messages, one per datagram.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    _private: (),
}

impl Codec {
    /// Create a new `Codec`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for Codec {
    type Item = Message;

    type Error = io::Error;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let message = Message::from_bytes(src);
        // One datagram holds exactly one message; drop malformed datagrams and trailing bytes
        // silently so the datagram framer stays in a good state.
        src.clear();
        if message.is_none() {
            trace!("Dropping malformed CoAP datagram");
        }

        Ok(message)
    }
}

impl Encoder<Message> for Codec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        item.write_bytes(dst);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{Code, Message, MessageType};

    #[test]
    fn encoding() {
        let message = Message {
            message_type: MessageType::Confirmable,
            code: Code::POST,
            message_id: 0x1234,
            token: vec![0xde, 0xad, 0xbe, 0xef],
            uri_path: "n/mr".to_string(),
            payload: vec![1, 2, 3],
        };

        let mut buf = BytesMut::new();
        message.write_bytes(&mut buf);

        assert_eq!(
            &buf[..],
            [
                0x44, 0x02, 0x12, 0x34, 0xde, 0xad, 0xbe, 0xef, // header + token
                0xb1, b'n', 0x02, b'm', b'r', // two Uri-Path segments
                0xff, 1, 2, 3, // payload
            ]
        );
    }

    #[test]
    fn decoding() {
        let mut buf = BytesMut::from(
            &[
                0x44, 0x02, 0x12, 0x34, 0xde, 0xad, 0xbe, 0xef, 0xb1, b'n', 0x02, b'm', b'r', 0xff,
                1, 2, 3,
            ][..],
        );

        let message = Message::from_bytes(&mut buf).expect("Can decode a well formed message");
        assert_eq!(message.message_type(), MessageType::Confirmable);
        assert_eq!(message.code(), Code::POST);
        assert_eq!(message.message_id(), 0x1234);
        assert_eq!(message.token(), [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(message.uri_path(), "n/mr");
        assert_eq!(message.payload(), [1, 2, 3]);
    }

    #[test]
    fn roundtrip() {
        let mut message = Message::non_confirmable_post("b/bmr");
        message.set_payload(vec![0; 36]);

        let mut buf = BytesMut::new();
        message.write_bytes(&mut buf);
        let decoded = Message::from_bytes(&mut buf).expect("Can decode an encoded message");

        assert_eq!(message, decoded);
    }

    #[test]
    fn long_uri_segments_roundtrip() {
        // Segment lengths needing the one byte and two byte option
        // extensions.
        let message = Message {
            message_type: MessageType::Confirmable,
            code: Code::POST,
            message_id: 0x1234,
            token: vec![0x01],
            uri_path: format!("{}/{}", "a".repeat(20), "b".repeat(300)),
            payload: vec![],
        };

        let mut buf = BytesMut::new();
        message.write_bytes(&mut buf);
        let decoded = Message::from_bytes(&mut buf).expect("Can decode an encoded message");

        assert_eq!(message, decoded);
    }

    #[test]
    fn response_mirrors_request() {
        let request = Message::confirmable_post("n/dr");
        let response = Message::response_to(&request);

        assert_eq!(response.message_type(), MessageType::Acknowledgement);
        assert_eq!(response.code(), Code::CHANGED);
        assert_eq!(response.message_id(), request.message_id());
        assert_eq!(response.token(), request.token());
    }

    #[test]
    fn decode_rejects_wrong_version() {
        let mut buf = BytesMut::from(&[0x84u8, 0x02, 0x12, 0x34][..]);
        assert_eq!(Message::from_bytes(&mut buf), None);
    }

    #[test]
    fn decode_rejects_truncated_token() {
        let mut buf = BytesMut::from(&[0x48u8, 0x02, 0x12, 0x34, 1, 2, 3][..]);
        assert_eq!(Message::from_bytes(&mut buf), None);
    }

    #[test]
    fn decode_rejects_marker_without_payload() {
        let mut buf = BytesMut::from(&[0x40u8, 0x02, 0x12, 0x34, 0xff][..]);
        assert_eq!(Message::from_bytes(&mut buf), None);
    }

    #[test]
    fn codec_consumes_malformed_datagram() {
        let mut codec = super::Codec::new();
        let mut buf = BytesMut::from(&[0x84u8, 0x02, 0x12, 0x34][..]);

        let decoded = codec.decode(&mut buf).expect("Decode never errors");
        assert_eq!(decoded, None);
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_roundtrip() {
        let mut codec = super::Codec::new();
        let mut message = Message::confirmable_post("n/mr");
        message.set_payload(vec![4, 5, 6]);

        let mut buf = BytesMut::new();
        codec
            .encode(message.clone(), &mut buf)
            .expect("Encode never errors");
        let decoded = codec
            .decode(&mut buf)
            .expect("Decode never errors")
            .expect("Can decode the previously encoded value");

        assert_eq!(message, decoded);
        assert!(buf.is_empty());
    }

    #[test]
    fn post_detection() {
        assert!(Message::confirmable_post("n/mr").is_confirmable_post());
        assert!(!Message::non_confirmable_post("n/mr").is_confirmable_post());
        assert!(Code::POST.is_request());
        assert!(!Code::CHANGED.is_request());
        assert!(!Code::EMPTY.is_request());
    }
}
