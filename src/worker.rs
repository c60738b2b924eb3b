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

//! One worker thread per active peer connection: claims a peer slot, connects, and
//! drains jobs from the shared [`WorkQueue`] until none remain or the connection is
//! torn down by a fatal transport/integrity error.

use crate::connection::PeerConnection;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::queue::{Job, WorkQueue};
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// Maximum outstanding `request` frames per connection.
pub const MAX_BACKLOG: u32 = 5;
/// Maximum block size requested per frame.
pub const MAX_BLOCK: u32 = 16384;

/// Runs one worker to completion: `take_peer_slot -> connect -> interested -> loop
/// pop_job/download/verify/write`, per spec's worker pseudocode.
pub fn run(queue: &Arc<WorkQueue>, info_hash: [u8; 20], peer_id: [u8; 20]) {
    let peer = match queue.take_peer_slot() {
        Some(peer) => peer,
        None => return,
    };

    let mut conn = match PeerConnection::connect(peer, info_hash, peer_id) {
        Ok(conn) => conn,
        Err(e) => {
            debug!("could not connect to peer {:?}: {}", peer, e);
            return;
        }
    };

    // Tolerated wire artifact: send `unchoke` before `interested`, matching what real
    // clients in this ecosystem historically do (see `PeerConnection::send_unchoke`).
    let _ = conn.send_unchoke();
    if let Err(e) = conn.send_interested() {
        debug!("could not send interested to peer {:?}: {}", peer, e);
        return;
    }

    while let Some(mut job) = queue.pop_job() {
        if let Some(bitfield) = conn.bitfield() {
            if !bitfield.has(job.index as usize) {
                queue.push_job(job);
                continue;
            }
        }

        match download_piece(&mut conn, &mut job) {
            Ok(()) => {}
            Err(e) if is_fatal(&e) => {
                debug!("peer {:?} torn down on piece {}: {}", peer, job.index, e);
                job.release_buffer();
                queue.push_job(job);
                conn.close();
                return;
            }
            Err(e) => {
                debug!("peer {:?} skipped piece {}: {}", peer, job.index, e);
                job.release_buffer();
                queue.push_job(job);
                continue;
            }
        }

        if !hash_matches(&job) {
            warn!("piece {} failed hash verification, recycling", job.index);
            job.release_buffer();
            queue.push_job(job);
            continue;
        }

        let index = job.index;
        if let Err(e) = queue.write(job) {
            error!("failed to write piece {}: {}", index, e);
            return;
        }
        let _ = conn.send_have(index);
    }
}

fn hash_matches(job: &Job) -> bool {
    let buffer = match &job.buffer {
        Some(buffer) => buffer,
        None => return false,
    };
    let mut hasher = Sha1::new();
    hasher.update(buffer);
    hasher.finalize().as_slice() == job.expected_hash
}

/// Transport/integrity failures that require tearing down the connection, per spec
/// §4.9/§4.10. Every other error just recycles the job and tries the next one on the
/// same connection.
fn is_fatal(err: &Error) -> bool {
    matches!(
        err,
        Error::ConnectionResetByPeer
            | Error::EndOfStream
            | Error::OutOfMemory
            | Error::IncorrectIndex { .. }
            | Error::IncorrectOffset { .. }
    )
}

/// The piece-download loop (§4.9): while unchoked, keeps up to `MAX_BACKLOG` requests
/// of up to `MAX_BLOCK` bytes in flight, assembling `piece` blocks into `job.buffer` as
/// they arrive.
pub fn download_piece(conn: &mut PeerConnection, job: &mut Job) -> Result<()> {
    job.ensure_buffer();
    let size = job.size;
    let index = job.index;

    conn.set_download_timeout()?;

    let mut downloaded: u32 = 0;
    let mut requested: u32 = 0;
    let mut backlog: u32 = 0;

    while downloaded < size {
        if !conn.is_choked() {
            while backlog < MAX_BACKLOG && requested < size {
                let block_len = MAX_BLOCK.min(size - requested);
                conn.send_request(index, requested, block_len)?;
                backlog += 1;
                requested += block_len;
            }
        }

        if let Message::Piece {
            index: got,
            begin,
            block,
        } = conn.read()?
        {
            if got != index {
                return Err(Error::IncorrectIndex { got, expected: index });
            }
            let block_len = block.len() as u32;
            let end = begin
                .checked_add(block_len)
                .filter(|&end| end <= size)
                .ok_or(Error::IncorrectOffset {
                    begin,
                    len: block_len,
                    size,
                })?;
            let buffer = job
                .buffer
                .as_mut()
                .expect("buffer allocated by ensure_buffer");
            buffer[begin as usize..end as usize].copy_from_slice(&block);
            downloaded += block_len;
            backlog = backlog.saturating_sub(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfield::Bitfield;
    use crate::handshake::Handshake;
    use crate::peer::Peer;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    /// Drives `download_piece` against an in-process stub peer that serves two 8-byte
    /// blocks for a single 16-byte piece, exercising the request/piece pipeline.
    #[test]
    fn downloads_piece_from_stub_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let info_hash = [1u8; 20];

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 68];
            sock.read_exact(&mut buf).unwrap();
            let reply = Handshake::new([2u8; 20], info_hash);
            sock.write_all(&reply.serialize()).unwrap();
            sock.write_all(&Message::Bitfield(Bitfield::from_raw(vec![0xff])).serialize())
                .unwrap();
            sock.write_all(&Message::Unchoke.serialize()).unwrap();

            // Expect two 8-byte requests, then answer them out of order.
            for _ in 0..2 {
                let mut len_buf = [0u8; 4];
                sock.read_exact(&mut len_buf).unwrap();
                let len = u32::from_be_bytes(len_buf);
                let mut body = vec![0u8; len as usize];
                sock.read_exact(&mut body).unwrap();
            }

            sock.write_all(
                &Message::Piece {
                    index: 0,
                    begin: 8,
                    block: vec![2u8; 8],
                }
                .serialize(),
            )
            .unwrap();
            sock.write_all(
                &Message::Piece {
                    index: 0,
                    begin: 0,
                    block: vec![1u8; 8],
                }
                .serialize(),
            )
            .unwrap();
        });

        let peer = Peer {
            ip: Ipv4Addr::new(127, 0, 0, 1),
            port: addr.port(),
        };
        let mut conn = PeerConnection::connect(peer, info_hash, [3u8; 20]).unwrap();
        let mut job = Job::new(0, [0u8; 20], 16);
        download_piece(&mut conn, &mut job).unwrap();
        server.join().unwrap();

        let buffer = job.buffer.unwrap();
        assert_eq!(&buffer[0..8], &[1u8; 8]);
        assert_eq!(&buffer[8..16], &[2u8; 8]);
    }

    #[test]
    fn rejects_piece_with_wrong_index() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let info_hash = [4u8; 20];

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 68];
            sock.read_exact(&mut buf).unwrap();
            let reply = Handshake::new([2u8; 20], info_hash);
            sock.write_all(&reply.serialize()).unwrap();
            sock.write_all(&Message::Unchoke.serialize()).unwrap();

            let mut len_buf = [0u8; 4];
            sock.read_exact(&mut len_buf).unwrap();
            let mut body = vec![0u8; u32::from_be_bytes(len_buf) as usize];
            sock.read_exact(&mut body).unwrap();

            sock.write_all(
                &Message::Piece {
                    index: 7,
                    begin: 0,
                    block: vec![0u8; 4],
                }
                .serialize(),
            )
            .unwrap();
        });

        let peer = Peer {
            ip: Ipv4Addr::new(127, 0, 0, 1),
            port: addr.port(),
        };
        let mut conn = PeerConnection::connect(peer, info_hash, [3u8; 20]).unwrap();
        let mut job = Job::new(0, [0u8; 20], 4);
        let err = download_piece(&mut conn, &mut job).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, Error::IncorrectIndex { got: 7, expected: 0 }));
        assert!(is_fatal(&err));
    }
}
