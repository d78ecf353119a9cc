//! Wire-format definitions for every datagram the protocol exchanges.
//!
//! Two directions, two vocabularies:
//! - client → server: [`Request`] (upload-begin, data fragment, `END`,
//!   `END_SESSION`, `DELETE`, `DELETE_FOLDER`).
//! - server → client: [`Ack`] during a transfer, plain UTF-8 text in reply to
//!   a delete request.
//!
//! No I/O happens here; this is pure data transformation.  Anything that
//! does not match a known shape decodes to a [`PacketError`] and the caller
//! drops it.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  Data fragment
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   Sequence Number (>= 1)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Fragment Index         |        Fragment Count         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Payload (1..=200 bytes) ...                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//!  Upload-begin:   0x00000000 | UTF-8 destination path
//!  Acknowledgment: sequence number (4 bytes, nothing else)
//!  Literals:       "END", "END_SESSION", "DELETE"<path>, "DELETE_FOLDER"<path>
//! ```

use thiserror::Error;

/// Maximum number of file bytes carried by one chunk.
pub const CHUNK_SIZE: usize = 1024;

/// Maximum number of chunk bytes carried by one fragment.
pub const FRAGMENT_SIZE: usize = 200;

/// Upper bound on the fragment count any valid chunk can declare.
pub const MAX_FRAGMENTS: usize = CHUNK_SIZE.div_ceil(FRAGMENT_SIZE);

/// Byte length of the fixed fragment header.
/// seq(4) + index(2) + total(2)
pub const FRAGMENT_HEADER_LEN: usize = 8;

/// Sequence number reserved for the upload-begin message.
pub const UPLOAD_BEGIN_SEQ: u32 = 0;

/// First sequence number assigned to a data chunk.
pub const FIRST_DATA_SEQ: u32 = 1;

/// Literal control tokens, matched by exact bytes or byte prefix.
pub mod tokens {
    /// End of one file transfer.
    pub const END: &[u8] = b"END";
    /// Shut the server down.
    pub const END_SESSION: &[u8] = b"END_SESSION";
    /// Prefix of a delete-file request.
    pub const DELETE: &[u8] = b"DELETE";
    /// Prefix of a recursive delete-folder request.
    pub const DELETE_FOLDER: &[u8] = b"DELETE_FOLDER";
}

// Byte offsets of each field within a fragment header.
const OFF_SEQ: usize = 0;
const OFF_INDEX: usize = 4;
const OFF_TOTAL: usize = 6;

#[inline]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline]
fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// One wire-sized piece of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Sequence number of the chunk this fragment belongs to.
    pub seq: u32,
    /// Position of this fragment inside its chunk (0-based).
    pub index: u16,
    /// Number of fragments the chunk was split into.
    pub total: u16,
    /// Fragment bytes: 1 to [`FRAGMENT_SIZE`] of them.
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Serialise this fragment into a newly allocated datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; FRAGMENT_HEADER_LEN + self.payload.len()];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_INDEX..OFF_INDEX + 2].copy_from_slice(&self.index.to_be_bytes());
        buf[OFF_TOTAL..OFF_TOTAL + 2].copy_from_slice(&self.total.to_be_bytes());
        buf[FRAGMENT_HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a fragment whose sequence number is already known to be non-zero.
    fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < FRAGMENT_HEADER_LEN {
            return Err(PacketError::TooShort(buf.len()));
        }

        let seq = read_u32(buf, OFF_SEQ);
        let index = read_u16(buf, OFF_INDEX);
        let total = read_u16(buf, OFF_TOTAL);
        let payload = &buf[FRAGMENT_HEADER_LEN..];

        if total == 0 || usize::from(total) > MAX_FRAGMENTS {
            return Err(PacketError::BadFragmentCount(total));
        }
        if index >= total {
            return Err(PacketError::BadFragmentIndex { index, total });
        }
        if payload.is_empty() || payload.len() > FRAGMENT_SIZE {
            return Err(PacketError::BadPayloadLen(payload.len()));
        }

        Ok(Fragment {
            seq,
            index,
            total,
            payload: payload.to_vec(),
        })
    }
}

/// Number of fragments a chunk of `len` bytes splits into: ⌈len / 200⌉.
pub fn fragment_count(len: usize) -> usize {
    len.div_ceil(FRAGMENT_SIZE)
}

/// Split `chunk` into its fragments, in index order.
pub fn fragment_chunk(seq: u32, chunk: &[u8]) -> Vec<Fragment> {
    debug_assert!(chunk.len() <= CHUNK_SIZE, "chunk of {} bytes", chunk.len());
    let total = fragment_count(chunk.len()) as u16;
    chunk
        .chunks(FRAGMENT_SIZE)
        .enumerate()
        .map(|(index, payload)| Fragment {
            seq,
            index: index as u16,
            total,
            payload: payload.to_vec(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Request (client → server)
// ---------------------------------------------------------------------------

/// Every datagram shape a client may send to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Open a transfer into `path`, relative to the server root.
    UploadBegin { path: String },
    Fragment(Fragment),
    /// The current transfer has no more data.
    End,
    /// Shut the server down.
    EndSession,
    DeleteFile { path: String },
    DeleteFolder { path: String },
}

impl Request {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::UploadBegin { .. } => "UPLOAD_BEGIN",
            Request::Fragment(_) => "FRAGMENT",
            Request::End => "END",
            Request::EndSession => "END_SESSION",
            Request::DeleteFile { .. } => "DELETE",
            Request::DeleteFolder { .. } => "DELETE_FOLDER",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Request::UploadBegin { path } => {
                let mut buf = UPLOAD_BEGIN_SEQ.to_be_bytes().to_vec();
                buf.extend_from_slice(path.as_bytes());
                buf
            }
            Request::Fragment(fragment) => fragment.encode(),
            Request::End => tokens::END.to_vec(),
            Request::EndSession => tokens::END_SESSION.to_vec(),
            Request::DeleteFile { path } => [tokens::DELETE, path.as_bytes()].concat(),
            Request::DeleteFolder { path } => [tokens::DELETE_FOLDER, path.as_bytes()].concat(),
        }
    }

    /// Classify a raw datagram.
    ///
    /// Literal tokens win over the numeric-header interpretation; among the
    /// delete prefixes the longer `DELETE_FOLDER` is tried first.  A zero
    /// sequence number means upload-begin, anything else must be a valid
    /// data fragment.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf == tokens::END_SESSION {
            return Ok(Request::EndSession);
        }
        if buf == tokens::END {
            return Ok(Request::End);
        }
        if let Some(rest) = buf.strip_prefix(tokens::DELETE_FOLDER) {
            return Ok(Request::DeleteFolder {
                path: decode_path(rest)?.trim().to_string(),
            });
        }
        if let Some(rest) = buf.strip_prefix(tokens::DELETE) {
            return Ok(Request::DeleteFile {
                path: decode_path(rest)?.trim().to_string(),
            });
        }

        if buf.len() < 4 {
            return Err(PacketError::TooShort(buf.len()));
        }
        if read_u32(buf, OFF_SEQ) == UPLOAD_BEGIN_SEQ {
            return Ok(Request::UploadBegin {
                path: decode_path(&buf[4..])?.to_string(),
            });
        }
        Fragment::decode(buf).map(Request::Fragment)
    }
}

fn decode_path(bytes: &[u8]) -> Result<&str, PacketError> {
    std::str::from_utf8(bytes).map_err(|_| PacketError::InvalidPath)
}

// ---------------------------------------------------------------------------
// Ack (server → client)
// ---------------------------------------------------------------------------

/// Acknowledgment of one completed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Sequence number of the acknowledged chunk.
    pub seq: u32,
}

impl Ack {
    /// Exact datagram length of an acknowledgment.
    pub const LEN: usize = 4;

    pub fn encode(&self) -> [u8; Self::LEN] {
        self.seq.to_be_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != Self::LEN {
            return Err(PacketError::BadAckLength(buf.len()));
        }
        Ok(Ack {
            seq: read_u32(buf, 0),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a datagram was not recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is too short for any known shape")]
    TooShort(usize),
    #[error("fragment count {0} is out of range")]
    BadFragmentCount(u16),
    #[error("fragment index {index} is out of range for {total} fragments")]
    BadFragmentIndex { index: u16, total: u16 },
    #[error("fragment payload of {0} bytes is out of range")]
    BadPayloadLen(usize),
    #[error("path is not valid UTF-8")]
    InvalidPath,
    #[error("acknowledgment must be exactly 4 bytes, got {0}")]
    BadAckLength(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(seq: u32, index: u16, total: u16, payload: &[u8]) -> Fragment {
        Fragment {
            seq,
            index,
            total,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn fragment_encode_decode() {
        let frag = fragment(7, 2, 3, b"hello");
        let decoded = Request::decode(&frag.encode()).unwrap();
        assert_eq!(decoded, Request::Fragment(frag));
    }

    #[test]
    fn fragment_header_big_endian_on_wire() {
        let bytes = fragment(0x0102_0304, 0x0005, 0x0006, b"x").encode();
        assert_eq!(&bytes[..8], &[0x01, 0x02, 0x03, 0x04, 0x00, 0x05, 0x00, 0x06]);
        assert_eq!(bytes.len(), FRAGMENT_HEADER_LEN + 1);
    }

    #[test]
    fn upload_begin_layout() {
        let bytes = Request::UploadBegin {
            path: "docs/a.txt".into(),
        }
        .encode();
        assert_eq!(&bytes[..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[4..], b"docs/a.txt");
        assert_eq!(
            Request::decode(&bytes).unwrap(),
            Request::UploadBegin {
                path: "docs/a.txt".into()
            }
        );
    }

    #[test]
    fn literal_tokens_decode() {
        assert_eq!(Request::decode(b"END").unwrap(), Request::End);
        assert_eq!(Request::decode(b"END_SESSION").unwrap(), Request::EndSession);
    }

    #[test]
    fn delete_folder_prefix_wins_over_delete() {
        assert_eq!(
            Request::decode(b"DELETE_FOLDERphotos").unwrap(),
            Request::DeleteFolder {
                path: "photos".into()
            }
        );
        assert_eq!(
            Request::decode(b"DELETEnotes.txt").unwrap(),
            Request::DeleteFile {
                path: "notes.txt".into()
            }
        );
    }

    #[test]
    fn delete_path_is_trimmed() {
        assert_eq!(
            Request::decode(b"DELETE  a/b.txt \n").unwrap(),
            Request::DeleteFile {
                path: "a/b.txt".into()
            }
        );
    }

    #[test]
    fn literal_takes_precedence_over_numeric_header() {
        // "END_SESSION" is 11 bytes and would otherwise parse as a fragment.
        assert_eq!(Request::decode(b"END_SESSION").unwrap(), Request::EndSession);
        // A longer datagram starting with "END" is not the END token.
        assert!(Request::decode(b"ENDX").is_err());
    }

    #[test]
    fn short_datagram_is_unrecognised() {
        assert_eq!(Request::decode(&[]), Err(PacketError::TooShort(0)));
        assert_eq!(Request::decode(&[0, 0, 1]), Err(PacketError::TooShort(3)));
        assert_eq!(
            Request::decode(&[0, 0, 0, 9, 0, 0]),
            Err(PacketError::TooShort(6))
        );
    }

    #[test]
    fn fragment_with_garbled_count_is_rejected() {
        let bytes = fragment(1, 0, 500, b"x").encode();
        assert_eq!(Request::decode(&bytes), Err(PacketError::BadFragmentCount(500)));

        let bytes = fragment(1, 0, 0, b"x").encode();
        assert_eq!(Request::decode(&bytes), Err(PacketError::BadFragmentCount(0)));
    }

    #[test]
    fn fragment_index_beyond_count_is_rejected() {
        let bytes = fragment(1, 3, 3, b"x").encode();
        assert_eq!(
            Request::decode(&bytes),
            Err(PacketError::BadFragmentIndex { index: 3, total: 3 })
        );
    }

    #[test]
    fn oversized_or_empty_payload_is_rejected() {
        let bytes = fragment(1, 0, 1, &[7u8; FRAGMENT_SIZE + 1]).encode();
        assert_eq!(
            Request::decode(&bytes),
            Err(PacketError::BadPayloadLen(FRAGMENT_SIZE + 1))
        );
        let bytes = fragment(1, 0, 1, b"").encode();
        assert_eq!(Request::decode(&bytes), Err(PacketError::BadPayloadLen(0)));
    }

    #[test]
    fn invalid_utf8_path_is_rejected() {
        assert_eq!(
            Request::decode(&[0, 0, 0, 0, 0xff, 0xfe]),
            Err(PacketError::InvalidPath)
        );
    }

    #[test]
    fn ack_is_exactly_four_bytes() {
        let ack = Ack { seq: 0x0A0B_0C0D };
        assert_eq!(ack.encode(), [0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(Ack::decode(&ack.encode()), Ok(ack));
        assert_eq!(Ack::decode(b"File"), Ok(Ack { seq: 0x4669_6C65 }));
        assert_eq!(Ack::decode(b"Files"), Err(PacketError::BadAckLength(5)));
    }

    #[test]
    fn fragment_count_is_ceiling() {
        assert_eq!(fragment_count(0), 0);
        assert_eq!(fragment_count(1), 1);
        assert_eq!(fragment_count(200), 1);
        assert_eq!(fragment_count(201), 2);
        assert_eq!(fragment_count(CHUNK_SIZE), 6);
        assert_eq!(MAX_FRAGMENTS, 6);
    }

    #[test]
    fn fragment_chunk_covers_every_byte() {
        let chunk: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let frags = fragment_chunk(4, &chunk);
        assert_eq!(frags.len(), 5);
        assert!(frags.iter().all(|f| f.seq == 4 && f.total == 5));
        assert!(frags.iter().all(|f| f.payload.len() <= FRAGMENT_SIZE));
        let joined: Vec<u8> = frags.iter().flat_map(|f| f.payload.clone()).collect();
        assert_eq!(joined, chunk);
    }

    #[test]
    fn max_size_fragment_survives_decode() {
        for frag in fragment_chunk(9, &[0xAB; CHUNK_SIZE]) {
            let decoded = Request::decode(&frag.encode()).unwrap();
            assert_eq!(decoded, Request::Fragment(frag));
        }
    }
}
