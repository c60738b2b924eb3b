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

//! One TCP connection to one remote peer: handshake, optional bitfield reception,
//! choke/interest state, and the framed message read/write primitives the worker's
//! piece-download loop drives.

use crate::bitfield::Bitfield;
use crate::error::{Error, Result};
use crate::handshake::Handshake;
use crate::message::Message;
use crate::peer::Peer;
use byteorder::{BigEndian, ByteOrder};
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);
/// Read timeout applied once the piece-download loop begins (spec's Open Question on
/// timeouts, resolved: reject peers that go silent for 30s by tearing the connection
/// down, mapped to `ConnectionResetByPeer`).
pub const PEER_READ_TIMEOUT: Duration = Duration::from_secs(30);
const BITFIELD_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct PeerConnection {
    peer: Peer,
    stream: Option<TcpStream>,
    choked: bool,
    bitfield: Option<Bitfield>,
}

impl PeerConnection {
    /// Opens a TCP connection, performs the handshake, and makes one attempt to read a
    /// post-handshake bitfield. Absence of a bitfield is not an error.
    pub fn connect(peer: Peer, info_hash: [u8; 20], own_peer_id: [u8; 20]) -> Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(peer.ip), peer.port);
        let mut stream = TcpStream::connect_timeout(&addr, HANDSHAKE_TIMEOUT)
            .map_err(|_| Error::ConnectionRefused)?;
        stream
            .set_write_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|_| Error::ConnectionRefused)?;
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|_| Error::ConnectionRefused)?;

        let handshake = Handshake::new(own_peer_id, info_hash);
        stream
            .write_all(&handshake.serialize())
            .map_err(|_| Error::ConnectionResetByPeer)?;

        let mut reply_buf = [0u8; 68];
        stream
            .read_exact(&mut reply_buf)
            .map_err(|_| Error::ConnectionResetByPeer)?;
        let reply = Handshake::parse(&reply_buf)?;
        if reply.info_hash() != &info_hash {
            return Err(Error::IncorrectHash { index: usize::MAX });
        }

        let mut conn = PeerConnection {
            peer,
            stream: Some(stream),
            choked: true,
            bitfield: None,
        };
        conn.probe_bitfield()?;

        Ok(conn)
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::EndOfStream)
    }

    /// One best-effort read right after the handshake: retains a bitfield message,
    /// otherwise dispatches whatever arrived (or nothing, on timeout).
    fn probe_bitfield(&mut self) -> Result<()> {
        {
            let stream = self.stream_mut()?;
            let _ = stream.set_read_timeout(Some(BITFIELD_PROBE_TIMEOUT));
        }

        match self.read_frame() {
            Ok(Message::Bitfield(bf)) => self.bitfield = Some(bf),
            Ok(other) => self.dispatch_passive(other),
            Err(_) => {}
        }

        let stream = self.stream_mut()?;
        let _ = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT));
        Ok(())
    }

    fn dispatch_passive(&mut self, message: Message) {
        match message {
            Message::Choke => self.choked = true,
            Message::Unchoke => self.choked = false,
            Message::Have { index } => {
                if let Some(bf) = self.bitfield.as_mut() {
                    bf.set(index as usize);
                }
            }
            _ => {}
        }
    }

    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn set_choked(&mut self, choked: bool) {
        self.choked = choked;
    }

    pub fn bitfield(&self) -> Option<&Bitfield> {
        self.bitfield.as_ref()
    }

    pub fn note_have(&mut self, index: usize) {
        if let Some(bf) = self.bitfield.as_mut() {
            bf.set(index);
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Sets the per-read timeout used by the piece-download loop.
    pub fn set_download_timeout(&mut self) -> Result<()> {
        self.stream_mut()?
            .set_read_timeout(Some(PEER_READ_TIMEOUT))
            .map_err(|_| Error::ConnectionResetByPeer)
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.serialize();
        self.stream_mut()?
            .write_all(&frame)
            .map_err(|_| Error::ConnectionResetByPeer)
    }

    pub fn send_interested(&mut self) -> Result<()> {
        self.send(&Message::Interested)
    }

    /// Sends an `unchoke`. Nonsensical from a leecher (only the seeding side chokes a
    /// connection), but historically sent by clients anyway and silently tolerated by
    /// peers; kept for wire compatibility.
    pub fn send_unchoke(&mut self) -> Result<()> {
        self.send(&Message::Unchoke)
    }

    pub fn send_not_interested(&mut self) -> Result<()> {
        self.send(&Message::NotInterested)
    }

    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        self.send(&Message::Request {
            index,
            begin,
            length,
        })
    }

    pub fn send_have(&mut self, index: u32) -> Result<()> {
        self.send(&Message::Have { index })
    }

    /// Reads the next frame off the wire: a 4-byte big-endian length prefix followed by
    /// that many bytes. A zero-length frame surfaces as `Message::KeepAlive`.
    pub fn read_frame(&mut self) -> Result<Message> {
        let stream = self.stream_mut()?;

        let mut len_buf = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut len_buf) {
            return Err(classify_io_error(e));
        }
        let len = BigEndian::read_u32(&len_buf);
        if len == 0 {
            return Ok(Message::KeepAlive);
        }

        let mut body = vec![0u8; len as usize];
        if let Err(e) = stream.read_exact(&mut body) {
            return Err(classify_io_error(e));
        }

        Message::parse(len, &body)
    }

    /// Reads the next non-keep-alive frame, applying choke/unchoke/have state updates
    /// transparently so callers only see the messages relevant to piece assembly.
    pub fn read(&mut self) -> Result<Message> {
        loop {
            let message = self.read_frame()?;
            match &message {
                Message::KeepAlive => continue,
                Message::Choke => {
                    self.choked = true;
                    return Ok(message);
                }
                Message::Unchoke => {
                    self.choked = false;
                    return Ok(message);
                }
                Message::Have { index } => {
                    self.note_have(*index as usize);
                    return Ok(message);
                }
                _ => return Ok(message),
            }
        }
    }

    /// Idempotent: releases the socket and any retained bitfield buffer.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.bitfield = None;
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn classify_io_error(e: std::io::Error) -> Error {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::UnexpectedEof => Error::EndOfStream,
        ErrorKind::TimedOut | ErrorKind::WouldBlock => Error::ConnectionResetByPeer,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            Error::ConnectionResetByPeer
        }
        _ => Error::ConnectionResetByPeer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Handshake;
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    /// Exercises connect() end-to-end against an in-process stub peer: handshake
    /// exchange, info-hash verification, and bitfield retention.
    #[test]
    fn connects_and_retains_bitfield() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let info_hash = [9u8; 20];
        let remote_peer_id = [5u8; 20];

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 68];
            sock.read_exact(&mut buf).unwrap();
            let hs = Handshake::parse(&buf).unwrap();
            assert_eq!(hs.info_hash(), &info_hash);

            let reply = Handshake::new(remote_peer_id, info_hash);
            sock.write_all(&reply.serialize()).unwrap();

            let bf_msg = Message::Bitfield(Bitfield::from_raw(vec![0xff]));
            sock.write_all(&bf_msg.serialize()).unwrap();
        });

        let peer = Peer {
            ip: Ipv4Addr::new(127, 0, 0, 1),
            port: addr.port(),
        };
        let mut conn = PeerConnection::connect(peer, info_hash, [1u8; 20]).unwrap();
        server.join().unwrap();

        assert!(conn.bitfield().unwrap().has(0));
        assert!(conn.is_choked());
        conn.close();
        conn.close(); // idempotent
    }

    #[test]
    fn rejects_info_hash_mismatch() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 68];
            sock.read_exact(&mut buf).unwrap();
            let reply = Handshake::new([2u8; 20], [0xAAu8; 20]);
            sock.write_all(&reply.serialize()).unwrap();
        });

        let peer = Peer {
            ip: Ipv4Addr::new(127, 0, 0, 1),
            port: addr.port(),
        };
        let err = PeerConnection::connect(peer, [1u8; 20], [1u8; 20]).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, Error::IncorrectHash { .. }));
    }
}
