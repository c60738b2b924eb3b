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

//! Entry point (C10): generates a peer id, fetches the tracker's peer list, builds one
//! job per piece, spawns the worker pool, and awaits completion.

use crate::error::{Error, Result};
use crate::metainfo::Metainfo;
use crate::peer::Peer;
use crate::queue::{Job, WorkQueue};
use crate::tracker::{self, HttpGet, ReqwestHttpGet};
use crate::worker;
use crate::writer::FileWriter;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::thread;

/// Port advertised to the tracker. The core never listens for incoming connections
/// (seeding is out of scope), so this is nominal.
const LISTEN_PORT: u16 = 6881;
const PEER_ID_PREFIX: &[u8; 8] = b"-RM0010-";

/// Generates a fresh 20-byte peer id: the literal `-RM0010-` prefix followed by 12
/// random alphanumeric bytes.
pub fn generate_peer_id() -> [u8; 20] {
    let mut id = [0u8; 20];
    id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
    let suffix: Vec<u8> = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(id.len() - PEER_ID_PREFIX.len())
        .collect();
    id[PEER_ID_PREFIX.len()..].copy_from_slice(&suffix);
    id
}

/// Downloads every piece described by `metainfo` into `out_path`.
pub fn download(metainfo: &Metainfo, out_path: &Path) -> Result<()> {
    let http = ReqwestHttpGet::new()?;
    download_with(metainfo, out_path, &http)
}

/// Same as [`download`], parameterized over the tracker's HTTP transport so tests can
/// stub the tracker round trip.
pub fn download_with(metainfo: &Metainfo, out_path: &Path, http: &dyn HttpGet) -> Result<()> {
    let peer_id = generate_peer_id();

    let peers: Vec<Peer> = tracker::request_peers(
        http,
        &metainfo.announce,
        &metainfo.info_hash,
        &peer_id,
        LISTEN_PORT,
        metainfo.total_size,
    )?;

    let jobs: Vec<Job> = (0..metainfo.n_pieces())
        .map(|i| {
            Job::new(
                i as u32,
                metainfo.piece_hashes[i],
                metainfo.piece_size(i) as u32,
            )
        })
        .collect();

    let writer = Box::new(FileWriter::create_exclusive(out_path)?);
    let queue = Arc::new(WorkQueue::new(
        jobs,
        peers.clone(),
        metainfo.piece_length,
        metainfo.total_size,
        writer,
    ));

    spawn_workers(&queue, metainfo.info_hash, peer_id, peers.len());

    if !queue.is_complete() {
        return Err(Error::StalledDownload);
    }

    Ok(())
}

/// Spawns `min(n_peers, available_parallelism)` worker threads and joins them all.
fn spawn_workers(queue: &Arc<WorkQueue>, info_hash: [u8; 20], peer_id: [u8; 20], n_peers: usize) {
    let parallelism = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let n_workers = n_peers.min(parallelism);

    let handles: Vec<_> = (0..n_workers)
        .map(|_| {
            let queue = Arc::clone(queue);
            thread::spawn(move || worker::run(&queue, info_hash, peer_id))
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_has_fixed_prefix_and_length() {
        let id = generate_peer_id();
        assert_eq!(&id[..8], PEER_ID_PREFIX);
        assert_eq!(id.len(), 20);
    }

    #[test]
    fn peer_ids_are_not_constant() {
        let a = generate_peer_id();
        let b = generate_peer_id();
        assert_ne!(&a[8..], &b[8..]);
    }

    struct StubHttp {
        body: Vec<u8>,
    }

    impl HttpGet for StubHttp {
        fn get(&self, _url: &str) -> Result<(u16, Vec<u8>)> {
            Ok((200, self.body.clone()))
        }
    }

    /// No peers in the tracker response means no worker ever touches the queue: the
    /// download must surface `StalledDownload` rather than hang.
    #[test]
    fn no_peers_is_a_stalled_download() {
        use crate::bencode::{self, Value};
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        let torrent_path = dir.path().join("sample.torrent");
        let out_path = dir.path().join("out.bin");

        let info = Value::Dict(vec![
            (b"length".to_vec(), Value::Int(4)),
            (b"name".to_vec(), Value::Bytes(b"x".to_vec())),
            (b"piece length".to_vec(), Value::Int(4)),
            (b"pieces".to_vec(), Value::Bytes(vec![0u8; 20])),
        ]);
        let root = Value::Dict(vec![
            (b"announce".to_vec(), Value::Bytes(b"http://x".to_vec())),
            (b"info".to_vec(), info),
        ]);
        std::fs::write(&torrent_path, bencode::encode(&root)).unwrap();
        let mut raw = Vec::new();
        std::fs::File::open(&torrent_path)
            .unwrap()
            .read_to_end(&mut raw)
            .unwrap();
        let metainfo = Metainfo::parse(&raw).unwrap();

        let tracker_body = bencode::encode(&Value::Dict(vec![
            (b"interval".to_vec(), Value::Int(1800)),
            (b"peers".to_vec(), Value::Bytes(vec![])),
        ]));
        let http = StubHttp { body: tracker_body };

        let err = download_with(&metainfo, &out_path, &http).unwrap_err();
        assert!(matches!(err, Error::StalledDownload));
    }
}
