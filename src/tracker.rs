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

//! Builds the tracker GET URL and decodes the bencoded reply. The HTTP GET itself is
//! behind the [`HttpGet`] trait so the core only ever requires "fetch URL -> status +
//! bytes", matching spec's external-collaborator boundary.

use crate::bencode::{self, Value};
use crate::error::{Error, Result};
use crate::peer::{self, Peer};
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;

/// RFC 3986 unreserved set: alphanumerics plus `- . _ ~` pass through unencoded.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Fetches a URL over HTTP GET. Implemented by [`ReqwestHttpGet`] in production and by
/// stubs in tests.
pub trait HttpGet {
    fn get(&self, url: &str) -> Result<(u16, Vec<u8>)>;
}

/// Blocking `reqwest`-backed implementation used by the orchestrator.
pub struct ReqwestHttpGet {
    client: reqwest::blocking::Client,
}

impl ReqwestHttpGet {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::TrackerRejected(e.to_string()))?;
        Ok(ReqwestHttpGet { client })
    }
}

impl HttpGet for ReqwestHttpGet {
    fn get(&self, url: &str) -> Result<(u16, Vec<u8>)> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::TrackerRejected(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| Error::TrackerRejected(e.to_string()))?
            .to_vec();
        Ok((status, body))
    }
}

/// Builds the tracker announce URL per spec §4.4. `info_hash` and `peer_id` are the raw
/// 20 bytes (not hex); every value is percent-encoded against the unreserved set.
pub fn build_announce_url(
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> String {
    format!(
        "{}?info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&compact=1&left={}",
        announce,
        percent_encode(info_hash, UNRESERVED),
        percent_encode(peer_id, UNRESERVED),
        port,
        left,
    )
}

/// Performs the tracker GET and decodes the peer list from the response.
pub fn request_peers(
    http: &dyn HttpGet,
    announce: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> Result<Vec<Peer>> {
    let url = build_announce_url(announce, info_hash, peer_id, port, left);
    let (status, body) = http.get(&url)?;
    if status != 200 {
        return Err(Error::TrackerRejected(format!("http status {}", status)));
    }

    decode_tracker_response(&body)
}

fn decode_tracker_response(body: &[u8]) -> Result<Vec<Peer>> {
    let root = bencode::decode(body)?;

    if let Some(reason) = root
        .dict_get("failure_reason")
        .and_then(Value::as_bytes)
    {
        return Err(Error::TrackerRejected(
            String::from_utf8_lossy(reason).into_owned(),
        ));
    }

    let peers_raw = root
        .dict_get("peers")
        .and_then(Value::as_bytes)
        .ok_or_else(|| Error::MalformedBencode("tracker response missing peers".into()))?;

    peer::parse_compact_peers(peers_raw)
}
