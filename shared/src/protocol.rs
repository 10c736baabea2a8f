//! Wire frame codec for the game protocol.
//!
//! Every message travels as `type:1 byte | length:4 bytes big-endian | payload`,
//! with the payload being UTF-8 text. The codec is stateless and treats the
//! payload as opaque; structured payloads (board snapshots, score maps) are
//! serialized/deserialized by the layers that produce and consume them.

use thiserror::Error;

/// Bytes occupied by the type tag plus the big-endian length field.
pub const HEADER_LEN: usize = 5;

/// Upper bound on a single frame payload. A well-formed peer never comes
/// close to this; a declared length above it is treated as a framing error
/// instead of an allocation request.
pub const MAX_PAYLOAD_LEN: u32 = 1024 * 1024;

/// Errors produced while parsing incoming frames.
///
/// All variants are fatal for the connection they occur on: a stream that
/// has delivered a malformed header can no longer be re-synchronized.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("truncated frame header: got {0} bytes, need {HEADER_LEN}")]
    TruncatedHeader(usize),
    #[error("truncated frame body: declared {declared} bytes, got {got}")]
    TruncatedBody { declared: usize, got: usize },
    #[error("declared payload length {0} exceeds limit")]
    Oversized(u32),
    #[error("unknown message type tag {0}")]
    UnknownType(u8),
    #[error("frame payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Message type tags, shared verbatim by both directions of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    // Client -> Server
    Join = 1,
    Start = 2,
    Click = 3,
    NameUpdate = 4,
    PlayAgain = 5,
    ClientLeft = 6,
    // Server -> Client
    Welcome = 10,
    StartGame = 11,
    ClickUpdate = 12,
    GameOver = 13,
    TimerStart = 14,
    ScoreUpdate = 15,
    ServerBusy = 16,
    PlayerLeftUpdateOthers = 17,
    PlayerIdMap = 18,
}

impl TryFrom<u8> for MsgType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, FrameError> {
        Ok(match tag {
            1 => MsgType::Join,
            2 => MsgType::Start,
            3 => MsgType::Click,
            4 => MsgType::NameUpdate,
            5 => MsgType::PlayAgain,
            6 => MsgType::ClientLeft,
            10 => MsgType::Welcome,
            11 => MsgType::StartGame,
            12 => MsgType::ClickUpdate,
            13 => MsgType::GameOver,
            14 => MsgType::TimerStart,
            15 => MsgType::ScoreUpdate,
            16 => MsgType::ServerBusy,
            17 => MsgType::PlayerLeftUpdateOthers,
            18 => MsgType::PlayerIdMap,
            other => return Err(FrameError::UnknownType(other)),
        })
    }
}

/// Parsed frame header: the raw type tag and the declared payload length.
///
/// The tag is kept raw here so the session layer can consume the body of a
/// frame with an unrecognized tag and answer with an error notice instead of
/// dropping the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub tag: u8,
    pub length: u32,
}

impl FrameHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::TruncatedHeader(bytes.len()));
        }
        let tag = bytes[0];
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        if length > MAX_PAYLOAD_LEN {
            return Err(FrameError::Oversized(length));
        }
        Ok(FrameHeader { tag, length })
    }
}

/// Encodes one frame. Infallible: every `MsgType` and payload string has a
/// valid encoding.
pub fn encode_frame(msg_type: MsgType, payload: &str) -> Vec<u8> {
    let body = payload.as_bytes();
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.push(msg_type as u8);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Decodes one complete frame from a byte slice.
///
/// Requires the slice to contain exactly the header plus the declared payload.
/// The session layer reads directly off the socket instead, but clients and
/// tests that buffer whole frames decode through here.
pub fn decode_frame(bytes: &[u8]) -> Result<(MsgType, String), FrameError> {
    let header = FrameHeader::parse(bytes)?;
    let declared = header.length as usize;
    let body = &bytes[HEADER_LEN..];
    if body.len() != declared {
        return Err(FrameError::TruncatedBody {
            declared,
            got: body.len(),
        });
    }
    let msg_type = MsgType::try_from(header.tag)?;
    let payload = String::from_utf8(body.to_vec())?;
    Ok((msg_type, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode_frame(MsgType::Join, "alice");
        assert_eq!(frame[0], 1);
        assert_eq!(&frame[1..5], &5u32.to_be_bytes());
        assert_eq!(&frame[5..], b"alice");
    }

    #[test]
    fn test_roundtrip() {
        let frame = encode_frame(MsgType::Click, "2,4");
        let (msg_type, payload) = decode_frame(&frame).unwrap();
        assert_eq!(msg_type, MsgType::Click);
        assert_eq!(payload, "2,4");
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let frame = encode_frame(MsgType::Start, "");
        assert_eq!(frame.len(), HEADER_LEN);
        let (msg_type, payload) = decode_frame(&frame).unwrap();
        assert_eq!(msg_type, MsgType::Start);
        assert_eq!(payload, "");
    }

    #[test]
    fn test_truncated_header() {
        let err = decode_frame(&[1, 0, 0]).unwrap_err();
        assert!(matches!(err, FrameError::TruncatedHeader(3)));
    }

    #[test]
    fn test_truncated_body() {
        let mut frame = encode_frame(MsgType::Join, "alice");
        frame.truncate(frame.len() - 2);
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            FrameError::TruncatedBody {
                declared: 5,
                got: 3
            }
        ));
    }

    #[test]
    fn test_length_mismatch_excess_bytes() {
        let mut frame = encode_frame(MsgType::Join, "alice");
        frame.extend_from_slice(b"extra");
        assert!(matches!(
            decode_frame(&frame).unwrap_err(),
            FrameError::TruncatedBody { .. }
        ));
    }

    #[test]
    fn test_unknown_type_tag() {
        let mut frame = encode_frame(MsgType::Join, "x");
        frame[0] = 99;
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(err, FrameError::UnknownType(99)));
    }

    #[test]
    fn test_header_keeps_raw_tag() {
        let mut frame = encode_frame(MsgType::Join, "x");
        frame[0] = 99;
        let header = FrameHeader::parse(&frame).unwrap();
        assert_eq!(header.tag, 99);
        assert_eq!(header.length, 1);
    }

    #[test]
    fn test_oversized_declared_length() {
        let mut frame = vec![1u8];
        frame.extend_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
        let err = FrameHeader::parse(&frame).unwrap_err();
        assert!(matches!(err, FrameError::Oversized(_)));
    }

    #[test]
    fn test_invalid_utf8_payload() {
        let mut frame = vec![MsgType::Join as u8];
        frame.extend_from_slice(&2u32.to_be_bytes());
        frame.extend_from_slice(&[0xff, 0xfe]);
        let err = decode_frame(&frame).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8(_)));
    }

    #[test]
    fn test_all_tags_roundtrip() {
        let tags = [
            MsgType::Join,
            MsgType::Start,
            MsgType::Click,
            MsgType::NameUpdate,
            MsgType::PlayAgain,
            MsgType::ClientLeft,
            MsgType::Welcome,
            MsgType::StartGame,
            MsgType::ClickUpdate,
            MsgType::GameOver,
            MsgType::TimerStart,
            MsgType::ScoreUpdate,
            MsgType::ServerBusy,
            MsgType::PlayerLeftUpdateOthers,
            MsgType::PlayerIdMap,
        ];
        for tag in tags {
            assert_eq!(MsgType::try_from(tag as u8).unwrap(), tag);
        }
    }
}
