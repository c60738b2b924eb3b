// Copyright (c) 2020 zenoxygen
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Length-prefixed typed wire message codec. A zero-length frame is a keep-alive and
//! carries no id byte; every other frame starts with a one-byte message id.

use crate::bitfield::Bitfield;
use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};

pub const MESSAGE_CHOKE: u8 = 0;
pub const MESSAGE_UNCHOKE: u8 = 1;
pub const MESSAGE_INTERESTED: u8 = 2;
pub const MESSAGE_NOT_INTERESTED: u8 = 3;
pub const MESSAGE_HAVE: u8 = 4;
pub const MESSAGE_BITFIELD: u8 = 5;
pub const MESSAGE_REQUEST: u8 = 6;
pub const MESSAGE_PIECE: u8 = 7;
pub const MESSAGE_CANCEL: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { index: u32 },
    Bitfield(Bitfield),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    /// An unrecognized message id; the caller has already consumed its payload.
    Unsupported(u8),
}

impl Message {
    /// Byte length of `serialize()`'s output: `4 + 1 + payload_len`, or `4` for a
    /// keep-alive.
    pub fn serialize_len(&self) -> usize {
        match self {
            Message::KeepAlive => 4,
            Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => 4 + 1,
            Message::Have { .. } => 4 + 1 + 4,
            Message::Bitfield(bf) => 4 + 1 + bf.clone().into_raw().len(),
            Message::Request { .. } | Message::Cancel { .. } => 4 + 1 + 12,
            Message::Piece { block, .. } => 4 + 1 + 8 + block.len(),
            Message::Unsupported(_) => 4 + 1,
        }
    }

    /// Serializes the message into its full length-prefixed wire frame.
    pub fn serialize(&self) -> Vec<u8> {
        if let Message::KeepAlive = self {
            return vec![0, 0, 0, 0];
        }

        let mut payload = Vec::new();
        let id = match self {
            Message::Choke => MESSAGE_CHOKE,
            Message::Unchoke => MESSAGE_UNCHOKE,
            Message::Interested => MESSAGE_INTERESTED,
            Message::NotInterested => MESSAGE_NOT_INTERESTED,
            Message::Have { index } => {
                payload.extend_from_slice(&index.to_be_bytes());
                MESSAGE_HAVE
            }
            Message::Bitfield(bf) => {
                payload.extend_from_slice(&bf.clone().into_raw());
                MESSAGE_BITFIELD
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(&length.to_be_bytes());
                MESSAGE_REQUEST
            }
            Message::Piece {
                index,
                begin,
                block,
            } => {
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(block);
                MESSAGE_PIECE
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => {
                payload.extend_from_slice(&index.to_be_bytes());
                payload.extend_from_slice(&begin.to_be_bytes());
                payload.extend_from_slice(&length.to_be_bytes());
                MESSAGE_CANCEL
            }
            Message::Unsupported(id) => *id,
            Message::KeepAlive => unreachable!(),
        };

        let mut frame = Vec::with_capacity(4 + 1 + payload.len());
        let mut len_buf = [0u8; 4];
        BigEndian::write_u32(&mut len_buf, 1 + payload.len() as u32);
        frame.extend_from_slice(&len_buf);
        frame.push(id);
        frame.extend_from_slice(&payload);
        frame
    }

    /// Parses a frame's body (id byte + payload, i.e. everything after the 4-byte
    /// length prefix) of the given `len`. A `len` of 0 is the keep-alive sentinel and
    /// `body` is expected to be empty.
    pub fn parse(len: u32, body: &[u8]) -> Result<Message> {
        if len == 0 {
            return Ok(Message::KeepAlive);
        }
        if body.is_empty() {
            return Err(Error::UnexpectedEof);
        }
        let id = body[0];
        let payload = &body[1..];

        let message = match id {
            MESSAGE_CHOKE => Message::Choke,
            MESSAGE_UNCHOKE => Message::Unchoke,
            MESSAGE_INTERESTED => Message::Interested,
            MESSAGE_NOT_INTERESTED => Message::NotInterested,
            MESSAGE_HAVE => {
                if payload.len() != 4 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Have {
                    index: BigEndian::read_u32(payload),
                }
            }
            MESSAGE_BITFIELD => Message::Bitfield(Bitfield::from_raw(payload.to_vec())),
            MESSAGE_REQUEST => {
                if payload.len() != 12 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Request {
                    index: BigEndian::read_u32(&payload[0..4]),
                    begin: BigEndian::read_u32(&payload[4..8]),
                    length: BigEndian::read_u32(&payload[8..12]),
                }
            }
            MESSAGE_PIECE => {
                if payload.len() < 8 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Piece {
                    index: BigEndian::read_u32(&payload[0..4]),
                    begin: BigEndian::read_u32(&payload[4..8]),
                    block: payload[8..].to_vec(),
                }
            }
            MESSAGE_CANCEL => {
                if payload.len() != 12 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Cancel {
                    index: BigEndian::read_u32(&payload[0..4]),
                    begin: BigEndian::read_u32(&payload[4..8]),
                    length: BigEndian::read_u32(&payload[8..12]),
                }
            }
            other => Message::Unsupported(other),
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(m: &Message) {
        let frame = m.serialize();
        assert_eq!(frame.len(), m.serialize_len());
        let len = BigEndian::read_u32(&frame[0..4]);
        let parsed = Message::parse(len, &frame[4..]).unwrap();
        assert_eq!(&parsed, m);
    }

    #[test]
    fn round_trip_empty_variants() {
        round_trip(&Message::Choke);
        round_trip(&Message::Unchoke);
        round_trip(&Message::Interested);
        round_trip(&Message::NotInterested);
    }

    #[test]
    fn round_trip_have() {
        round_trip(&Message::Have { index: 7 });
    }

    #[test]
    fn round_trip_bitfield() {
        round_trip(&Message::Bitfield(Bitfield::from_raw(vec![0xff, 0x0f])));
    }

    #[test]
    fn round_trip_request_and_cancel() {
        round_trip(&Message::Request {
            index: 1,
            begin: 2,
            length: 16384,
        });
        round_trip(&Message::Cancel {
            index: 1,
            begin: 2,
            length: 16384,
        });
    }

    /// S5.
    #[test]
    fn s5_piece_parse() {
        let frame = Message::Piece {
            index: 0,
            begin: 0,
            block: b"abcd".to_vec(),
        }
        .serialize();
        assert_eq!(&frame[0..4], &0x0000000Du32.to_be_bytes());
        assert_eq!(frame[4], 0x07);
        let parsed = Message::parse(0x0D, &frame[4..]).unwrap();
        assert_eq!(
            parsed,
            Message::Piece {
                index: 0,
                begin: 0,
                block: b"abcd".to_vec()
            }
        );
    }

    #[test]
    fn keep_alive_has_no_id_byte() {
        let frame = Message::KeepAlive.serialize();
        assert_eq!(frame, vec![0, 0, 0, 0]);
        assert_eq!(Message::parse(0, &[]).unwrap(), Message::KeepAlive);
    }

    #[test]
    fn unknown_id_is_unsupported_not_fatal() {
        let parsed = Message::parse(2, &[200, 1]).unwrap();
        assert_eq!(parsed, Message::Unsupported(200));
    }
}
