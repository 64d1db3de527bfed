//! ## gamewarden-protocols::frostbite
//! Frostbite 2 RCON packet codec.
//!
//! Layout, all integers little-endian:
//! - `u32` sequence word: bits 0-29 sequence number, bit 30 set on
//!   responses, bit 31 set when the exchange was started by the client
//! - `u32` total packet size, header included
//! - `u32` number of words
//! - per word: `u32` length, the bytes, a `0x00` terminator

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const HEADER_LEN: usize = 12;
pub const MAX_PACKET_LEN: usize = 16384;
pub const SEQUENCE_MASK: u32 = 0x3fff_ffff;

const RESPONSE_BIT: u32 = 1 << 30;
const CLIENT_ORIGIN_BIT: u32 = 1 << 31;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum FrostbiteParseError {
    #[error("Invalid packet size {size} (header {header})")]
    InvalidSize { size: u32, header: String },
    #[error("Packet declares {expected} words but holds {found}")]
    WordCountMismatch { expected: u32, found: usize },
    #[error("Word {index} runs past the end of the packet")]
    Truncated { index: usize },
    #[error("Word {index} is not NUL-terminated")]
    MissingTerminator { index: usize },
    #[error("{0} unexpected bytes after the last word")]
    TrailingBytes(usize),
    #[error("Encoded packet would be {0} bytes, limit is {MAX_PACKET_LEN}")]
    PacketTooLarge(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u32,
    pub origin: Origin,
    pub is_response: bool,
    pub words: Vec<String>,
}

impl Packet {
    /// Request started by us.
    pub fn request<I, S>(sequence: u32, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sequence: sequence & SEQUENCE_MASK,
            origin: Origin::Client,
            is_response: false,
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// Reply to this packet carrying `words`.
    pub fn response<I, S>(&self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sequence: self.sequence,
            origin: self.origin,
            is_response: true,
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// First word, the command or event name.
    pub fn name(&self) -> Option<&str> {
        self.words.first().map(String::as_str)
    }

    /// Words after the name.
    pub fn args(&self) -> &[String] {
        self.words.get(1..).unwrap_or(&[])
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.words.iter().map(|w| 4 + w.len() + 1).sum::<usize>()
    }

    pub fn encode(&self) -> Result<Bytes, FrostbiteParseError> {
        let len = self.encoded_len();
        if len > MAX_PACKET_LEN {
            return Err(FrostbiteParseError::PacketTooLarge(len));
        }

        let mut header = self.sequence & SEQUENCE_MASK;
        if self.is_response {
            header |= RESPONSE_BIT;
        }
        if self.origin == Origin::Client {
            header |= CLIENT_ORIGIN_BIT;
        }

        let mut buf = BytesMut::with_capacity(len);
        buf.put_u32_le(header);
        buf.put_u32_le(len as u32);
        buf.put_u32_le(self.words.len() as u32);
        for word in &self.words {
            buf.put_u32_le(word.len() as u32);
            buf.put_slice(word.as_bytes());
            buf.put_u8(0);
        }
        Ok(buf.freeze())
    }

    /// Takes one complete packet off the front of `buf`.
    ///
    /// Returns `Ok(None)` until enough bytes have arrived. A malformed size
    /// is an error because the stream can no longer be resynchronised.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Packet>, FrostbiteParseError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let size = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if (size as usize) < HEADER_LEN || size as usize > MAX_PACKET_LEN {
            return Err(FrostbiteParseError::InvalidSize {
                size,
                header: hex::encode(&buf[..HEADER_LEN]),
            });
        }
        if buf.len() < size as usize {
            return Ok(None);
        }

        let mut frame = buf.split_to(size as usize).freeze();
        let header = frame.get_u32_le();
        let _size = frame.get_u32_le();
        let num_words = frame.get_u32_le();

        let mut words = Vec::with_capacity(num_words.min(256) as usize);
        for index in 0..num_words as usize {
            if frame.remaining() < 4 {
                return Err(FrostbiteParseError::WordCountMismatch {
                    expected: num_words,
                    found: index,
                });
            }
            let len = frame.get_u32_le() as usize;
            if frame.remaining() < len + 1 {
                return Err(FrostbiteParseError::Truncated { index });
            }
            let word = frame.split_to(len);
            if frame.get_u8() != 0 {
                return Err(FrostbiteParseError::MissingTerminator { index });
            }
            words.push(String::from_utf8_lossy(&word).into_owned());
        }
        if frame.has_remaining() {
            return Err(FrostbiteParseError::TrailingBytes(frame.remaining()));
        }

        Ok(Some(Packet {
            sequence: header & SEQUENCE_MASK,
            origin: if header & CLIENT_ORIGIN_BIT != 0 {
                Origin::Client
            } else {
                Origin::Server
            },
            is_response: header & RESPONSE_BIT != 0,
            words,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // login.plainText "secret", sequence 5, sent by the client
    const LOGIN: &[u8] = &[
        0x05, 0x00, 0x00, 0x80, // sequence 5, client origin
        0x2b, 0x00, 0x00, 0x00, // 43 bytes total
        0x02, 0x00, 0x00, 0x00, // 2 words
        0x0f, 0x00, 0x00, 0x00, b'l', b'o', b'g', b'i', b'n', b'.', b'p', b'l', b'a', b'i', b'n',
        b'T', b'e', b'x', b't', 0x00, //
        0x06, 0x00, 0x00, 0x00, b's', b'e', b'c', b'r', b'e', b't', 0x00,
    ];

    #[test]
    fn test_encode_matches_wire_bytes() {
        let packet = Packet::request(5, ["login.plainText", "secret"]);
        assert_eq!(&packet.encode().unwrap()[..], LOGIN);
    }

    #[test]
    fn test_decode_wire_bytes() {
        let mut buf = BytesMut::from(LOGIN);
        let packet = Packet::decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.sequence, 5);
        assert_eq!(packet.origin, Origin::Client);
        assert!(!packet.is_response);
        assert_eq!(packet.name(), Some("login.plainText"));
        assert_eq!(packet.args(), ["secret".to_string()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_waits_for_full_packet() {
        let mut buf = BytesMut::from(&LOGIN[..20]);
        assert_eq!(Packet::decode(&mut buf), Ok(None));
        assert_eq!(buf.len(), 20);
        buf.extend_from_slice(&LOGIN[20..]);
        assert!(Packet::decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_decode_two_back_to_back() {
        let event = Packet {
            sequence: 9,
            origin: Origin::Server,
            is_response: false,
            words: vec!["player.onLeave".into(), "Joe".into()],
        };
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&event.encode().unwrap());
        buf.extend_from_slice(LOGIN);
        assert_eq!(Packet::decode(&mut buf).unwrap().unwrap(), event);
        assert_eq!(Packet::decode(&mut buf).unwrap().unwrap().sequence, 5);
    }

    #[test]
    fn test_invalid_size_reports_header() {
        let mut bytes = LOGIN.to_vec();
        bytes[4] = 0x04;
        let mut buf = BytesMut::from(&bytes[..]);
        match Packet::decode(&mut buf) {
            Err(FrostbiteParseError::InvalidSize { size, header }) => {
                assert_eq!(size, 4);
                assert!(header.starts_with("05000080"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_terminator() {
        let mut bytes = LOGIN.to_vec();
        bytes[31] = b'!';
        let mut buf = BytesMut::from(&bytes[..]);
        assert_eq!(
            Packet::decode(&mut buf),
            Err(FrostbiteParseError::MissingTerminator { index: 0 })
        );
    }

    #[test]
    fn test_response_keeps_sequence_and_origin() {
        let request = Packet::request(77, ["serverInfo"]);
        let reply = request.response(["OK", "Server"]);
        let mut buf = BytesMut::from(&reply.encode().unwrap()[..]);
        let decoded = Packet::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.sequence, 77);
        assert!(decoded.is_response);
        assert_eq!(decoded.origin, Origin::Client);
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let packet = Packet::request(1, ["admin.say".to_string(), "x".repeat(MAX_PACKET_LEN)]);
        assert!(matches!(
            packet.encode(),
            Err(FrostbiteParseError::PacketTooLarge(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_split_points_decode(split in 0usize..43) {
            let mut buf = BytesMut::from(&LOGIN[..split]);
            prop_assert_eq!(Packet::decode(&mut buf), Ok(None));
            buf.extend_from_slice(&LOGIN[split..]);
            let packet = Packet::decode(&mut buf).unwrap().unwrap();
            prop_assert_eq!(packet.words.len(), 2);
        }
    }
}
