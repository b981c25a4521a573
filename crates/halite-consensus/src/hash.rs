use sha2::{Digest, Sha256};

/// 32-byte hash stored as a little-endian 256-bit integer.
pub type Hash256 = [u8; 32];

pub const ZERO_HASH: Hash256 = [0u8; 32];

pub fn sha256(b: &[u8]) -> [u8; 32] {
    let out = Sha256::digest(b);
    let mut r = [0u8; 32];
    r.copy_from_slice(&out);
    r
}

pub fn sha256d(b: &[u8]) -> Hash256 {
    sha256(&sha256(b))
}

/// Display form: byte-reversed hex, as block explorers print hashes.
pub fn to_hex(h: &Hash256) -> String {
    let mut rev = *h;
    rev.reverse();
    hex::encode(rev)
}

pub fn from_hex(s: &str) -> Option<Hash256> {
    let raw = hex::decode(s).ok()?;
    if raw.len() != 32 {
        return None;
    }
    let mut h = [0u8; 32];
    h.copy_from_slice(&raw);
    h.reverse();
    Some(h)
}
