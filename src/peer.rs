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

//! Decodes the compact 6-bytes-per-peer tracker list (BEP 23): 4 bytes big-endian
//! IPv4 address followed by 2 bytes big-endian port.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use std::net::Ipv4Addr;

const PEER_SIZE: usize = 6;

/// A remote peer address. Set membership is by `(ip, port)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Parses a compact peer list. Fails only when the input length is not a multiple of 6;
/// every individual 6-byte record decodes into a valid `Peer` (any 4 bytes form a legal
/// `Ipv4Addr`), so there is nothing else to silently drop in practice.
pub fn parse_compact_peers(raw: &[u8]) -> Result<Vec<Peer>> {
    if raw.len() % PEER_SIZE != 0 {
        return Err(Error::MalformedBencode(
            "compact peer list length is not a multiple of 6".into(),
        ));
    }

    let peers = raw
        .chunks_exact(PEER_SIZE)
        .map(|chunk| Peer {
            ip: Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
            port: BigEndian::read_u16(&chunk[4..6]),
        })
        .collect();

    Ok(peers)
}
