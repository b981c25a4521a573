use crate::hash::{sha256d, Hash256, ZERO_HASH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MerkleRoot {
    pub root: Hash256,
    /// Set when some level hashed two identical adjacent nodes. Such a tree has
    /// the same root as a different transaction list (CVE-2012-2459).
    pub mutated: bool,
}

pub fn block_merkle_root(ids: &[Hash256]) -> MerkleRoot {
    if ids.is_empty() {
        return MerkleRoot {
            root: ZERO_HASH,
            mutated: false,
        };
    }

    let mut level: Vec<Hash256> = ids.to_vec();
    let mut mutated = false;
    let mut preimage = [0u8; 64];
    while level.len() > 1 {
        let mut next: Vec<Hash256> = Vec::with_capacity((level.len() + 1) / 2);
        let mut i = 0usize;
        while i < level.len() {
            let left = level[i];
            let right = if i + 1 < level.len() {
                if level[i + 1] == left {
                    mutated = true;
                }
                level[i + 1]
            } else {
                // Odd level: pair the last element with itself.
                left
            };
            preimage[..32].copy_from_slice(&left);
            preimage[32..].copy_from_slice(&right);
            next.push(sha256d(&preimage));
            i += 2;
        }
        level = next;
    }

    MerkleRoot {
        root: level[0],
        mutated,
    }
}
