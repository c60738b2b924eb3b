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

//! Parses a `.torrent` file's bencoded bytes into a validated [`Metainfo`] descriptor,
//! and derives the info-hash and per-piece SHA-1 hashes.

use crate::bencode::{self, Value};
use crate::error::{Error, Result};
use sha1::{Digest, Sha1};
use std::path::Path;

const SHA1_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub length: u64,
    pub path: String,
}

/// A validated, decoded `.torrent` descriptor.
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub announce: String,
    pub name: String,
    pub piece_length: u64,
    pub piece_hashes: Vec<[u8; SHA1_SIZE]>,
    pub info_hash: [u8; SHA1_SIZE],
    /// `length`, for single-file torrents, or the sum of `files[*].length`.
    pub total_size: u64,
    /// Populated for multi-file torrents; empty for single-file ones.
    pub files: Vec<FileEntry>,
}

impl Metainfo {
    /// Reads and decodes a `.torrent` file. `path` must end in `.torrent`.
    pub fn open(path: &Path) -> Result<Metainfo> {
        if path.extension().and_then(|e| e.to_str()) != Some("torrent") {
            return Err(Error::WrongFormat(format!(
                "{} does not end in .torrent",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)?;
        Metainfo::parse(&bytes)
    }

    /// Decodes a `.torrent` file's bytes without touching the filesystem (used by the
    /// end-to-end test, which builds its metainfo bytes in memory).
    pub fn parse(bytes: &[u8]) -> Result<Metainfo> {
        let root = bencode::decode(bytes)?;

        let announce = root
            .dict_get("announce")
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();

        let info = root
            .dict_get("info")
            .ok_or_else(|| Error::MalformedBencode("missing info dict".into()))?;

        let name = info
            .dict_get("name")
            .and_then(Value::as_bytes)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();

        let piece_length = info
            .dict_get("piece_length")
            .and_then(Value::as_int)
            .ok_or_else(|| Error::MalformedBencode("missing piece length".into()))?
            as u64;

        let pieces = info
            .dict_get("pieces")
            .and_then(Value::as_bytes)
            .ok_or_else(|| Error::MalformedBencode("missing pieces".into()))?;

        if pieces.is_empty() {
            return Err(Error::EmptyPieces);
        }
        if pieces.len() % SHA1_SIZE != 0 {
            return Err(Error::PiecesNotMultipleOf20);
        }
        let piece_hashes: Vec<[u8; SHA1_SIZE]> = pieces
            .chunks_exact(SHA1_SIZE)
            .map(|c| {
                let mut h = [0u8; SHA1_SIZE];
                h.copy_from_slice(c);
                h
            })
            .collect();

        let (total_size, files) = if let Some(length) = info.dict_get("length").and_then(Value::as_int) {
            (length as u64, Vec::new())
        } else {
            let files_value = info
                .dict_get("files")
                .and_then(|v| match v {
                    Value::List(list) => Some(list),
                    _ => None,
                })
                .ok_or_else(|| Error::MalformedBencode("missing length/files".into()))?;

            let mut files = Vec::with_capacity(files_value.len());
            let mut total = 0u64;
            for entry in files_value {
                let length = entry
                    .dict_get("length")
                    .and_then(Value::as_int)
                    .ok_or_else(|| Error::MalformedBencode("file entry missing length".into()))?
                    as u64;
                let path_components = entry
                    .dict_get("path")
                    .and_then(|v| match v {
                        Value::List(list) => Some(list),
                        _ => None,
                    })
                    .ok_or_else(|| Error::MalformedBencode("file entry missing path".into()))?;
                let path = path_components
                    .iter()
                    .filter_map(Value::as_bytes)
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                total += length;
                files.push(FileEntry { length, path });
            }
            (total, files)
        };

        let expected_pieces = (total_size as usize).div_ceil(piece_length as usize);
        if piece_hashes.len() != expected_pieces {
            return Err(Error::MalformedBencode(format!(
                "expected {} piece hashes for total size {} at piece length {}, got {}",
                expected_pieces,
                total_size,
                piece_length,
                piece_hashes.len()
            )));
        }

        // The info-hash is SHA-1 of the info sub-dict re-encoded exactly as decoded:
        // the decoder preserves dict key order, so `encode` is a true inverse here.
        let info_bytes = bencode::encode(info);
        let mut hasher = Sha1::new();
        hasher.update(&info_bytes);
        let digest = hasher.finalize();
        let mut info_hash = [0u8; SHA1_SIZE];
        info_hash.copy_from_slice(&digest);

        Ok(Metainfo {
            announce,
            name,
            piece_length,
            piece_hashes,
            info_hash,
            total_size,
            files,
        })
    }

    pub fn n_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// `piece_size(i) = min(piece_length, total_size - i * piece_length)`.
    pub fn piece_size(&self, index: usize) -> u64 {
        let consumed = index as u64 * self.piece_length;
        self.piece_length.min(self.total_size - consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::Value;

    fn single_file_torrent(piece_length: u64, total_size: u64, piece_hashes: &[[u8; 20]]) -> Vec<u8> {
        let pieces: Vec<u8> = piece_hashes.iter().flat_map(|h| h.to_vec()).collect();
        let info = Value::Dict(vec![
            (b"length".to_vec(), Value::Int(total_size as i64)),
            (b"name".to_vec(), Value::Bytes(b"file.bin".to_vec())),
            (b"piece length".to_vec(), Value::Int(piece_length as i64)),
            (b"pieces".to_vec(), Value::Bytes(pieces)),
        ]);
        let root = Value::Dict(vec![
            (b"announce".to_vec(), Value::Bytes(b"http://tracker.example/announce".to_vec())),
            (b"info".to_vec(), info),
        ]);
        bencode::encode(&root)
    }

    #[test]
    fn parses_single_file_torrent() {
        let hash = [7u8; 20];
        let bytes = single_file_torrent(16384, 16384, &[hash]);
        let m = Metainfo::parse(&bytes).unwrap();
        assert_eq!(m.announce, "http://tracker.example/announce");
        assert_eq!(m.name, "file.bin");
        assert_eq!(m.total_size, 16384);
        assert_eq!(m.piece_hashes, vec![hash]);
    }

    /// Property 2: info-hash stability across repeated decodes.
    #[test]
    fn info_hash_is_stable() {
        let bytes = single_file_torrent(16384, 16384, &[[1u8; 20]]);
        let a = Metainfo::parse(&bytes).unwrap();
        let b = Metainfo::parse(&bytes).unwrap();
        assert_eq!(a.info_hash, b.info_hash);
    }

    /// Property 3: piece count and size.
    #[test]
    fn piece_sizes_sum_to_total() {
        let piece_length = 10u64;
        let total_size = 25u64; // 3 pieces: 10, 10, 5
        let hashes = vec![[0u8; 20]; 3];
        let bytes = single_file_torrent(piece_length, total_size, &hashes);
        let m = Metainfo::parse(&bytes).unwrap();

        let sum: u64 = (0..m.n_pieces()).map(|i| m.piece_size(i)).sum();
        assert_eq!(sum, total_size);
        for i in 0..m.n_pieces() - 1 {
            assert_eq!(m.piece_size(i), piece_length);
        }
        assert_eq!(m.piece_size(m.n_pieces() - 1), 5);
    }

    #[test]
    fn rejects_pieces_not_multiple_of_20() {
        let info = Value::Dict(vec![
            (b"length".to_vec(), Value::Int(10)),
            (b"name".to_vec(), Value::Bytes(b"x".to_vec())),
            (b"piece length".to_vec(), Value::Int(10)),
            (b"pieces".to_vec(), Value::Bytes(vec![0u8; 19])),
        ]);
        let root = Value::Dict(vec![
            (b"announce".to_vec(), Value::Bytes(b"x".to_vec())),
            (b"info".to_vec(), info),
        ]);
        let bytes = bencode::encode(&root);
        assert!(matches!(
            Metainfo::parse(&bytes),
            Err(Error::PiecesNotMultipleOf20)
        ));
    }

    #[test]
    fn rejects_empty_pieces() {
        let info = Value::Dict(vec![
            (b"length".to_vec(), Value::Int(0)),
            (b"name".to_vec(), Value::Bytes(b"x".to_vec())),
            (b"piece length".to_vec(), Value::Int(10)),
            (b"pieces".to_vec(), Value::Bytes(vec![])),
        ]);
        let root = Value::Dict(vec![
            (b"announce".to_vec(), Value::Bytes(b"x".to_vec())),
            (b"info".to_vec(), info),
        ]);
        let bytes = bencode::encode(&root);
        assert!(matches!(Metainfo::parse(&bytes), Err(Error::EmptyPieces)));
    }

    #[test]
    fn rejects_wrong_extension() {
        let err = Metainfo::open(Path::new("/tmp/not-a-torrent.txt")).unwrap_err();
        assert!(matches!(err, Error::WrongFormat(_)));
    }
}
