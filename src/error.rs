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

use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Integrity and input errors are fatal at the orchestrator. Transport and protocol
/// errors are local to one worker/one job.
#[derive(Debug, Error)]
pub enum Error {
    // --- Input ---
    #[error("wrong format: {0}")]
    WrongFormat(String),
    #[error("malformed bencode: {0}")]
    MalformedBencode(String),
    #[error("unexpected end of bencode input")]
    UnexpectedEof,
    #[error("unsupported field type for bencode schema mapping")]
    UnsupportedFieldType,
    #[error("bencode integer overflow")]
    IntegerOverflow,
    #[error("bad handshake: {0}")]
    BadHandshake(String),

    // --- Integrity ---
    #[error("piece {index} failed hash verification")]
    IncorrectHash { index: usize },
    #[error("piece message carried index {got}, expected {expected}")]
    IncorrectIndex { got: u32, expected: u32 },
    #[error("piece message block offset {begin} + {len} exceeds piece size {size}")]
    IncorrectOffset { begin: u32, len: u32, size: u32 },
    #[error("pieces blob length is not a multiple of 20")]
    PiecesNotMultipleOf20,
    #[error("metainfo has an empty pieces blob")]
    EmptyPieces,

    // --- Transport ---
    #[error("connection refused by peer")]
    ConnectionRefused,
    #[error("connection reset by peer")]
    ConnectionResetByPeer,
    #[error("end of stream while reading from peer")]
    EndOfStream,
    #[error("tracker rejected request: {0}")]
    TrackerRejected(String),

    // --- Protocol ---
    #[error("unsupported message id {0}")]
    Unsupported(u8),
    #[error("unexpected message type")]
    UnexpectedMessageType,

    // --- Resource ---
    #[error("out of memory allocating piece buffer")]
    OutOfMemory,
    #[error("download stalled: queue non-empty but no workers remain")]
    StalledDownload,

    // --- Plumbing ---
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
