use crate::compactsize::{encode_compact_size, encode_var_bytes, read_compact_size, read_var_bytes};
use crate::error::ConsensusError;
use crate::hash::{sha256d, Hash256};
use crate::merkle::{block_merkle_root, MerkleRoot};
use crate::target::CompactTarget;
use crate::tx::Transaction;
use crate::wire_read::Reader;

pub const BLOCK_HEADER_BYTES: usize = 80;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: CompactTarget,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn to_bytes(&self) -> [u8; BLOCK_HEADER_BYTES] {
        let mut b = [0u8; BLOCK_HEADER_BYTES];
        b[0..4].copy_from_slice(&self.version.to_le_bytes());
        b[4..36].copy_from_slice(&self.prev_block_hash);
        b[36..68].copy_from_slice(&self.merkle_root);
        b[68..72].copy_from_slice(&self.time.to_le_bytes());
        b[72..76].copy_from_slice(&self.bits.0.to_le_bytes());
        b[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        b
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, ConsensusError> {
        Ok(BlockHeader {
            version: r.read_i32_le()?,
            prev_block_hash: r.read_hash()?,
            merkle_root: r.read_hash()?,
            time: r.read_u32_le()?,
            bits: CompactTarget(r.read_u32_le()?),
            nonce: r.read_u32_le()?,
        })
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, ConsensusError> {
        let mut r = Reader::new(b);
        let h = Self::decode(&mut r)?;
        r.expect_end()?;
        Ok(h)
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// DER ECDSA signature over the block hash. Empty on proof-of-work blocks.
    pub signature: Vec<u8>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
            signature: Vec::new(),
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Proof-of-stake blocks carry a coinstake in second position.
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    pub fn merkle_root(&self) -> MerkleRoot {
        let txids: Vec<Hash256> = self.transactions.iter().map(Transaction::txid).collect();
        block_merkle_root(&txids)
    }

    /// Recomputes and stores the header merkle root.
    pub fn update_merkle_root(&mut self) {
        self.header.merkle_root = self.merkle_root().root;
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.header.to_bytes());
        encode_compact_size(self.transactions.len() as u64, out);
        for tx in &self.transactions {
            tx.encode(out);
        }
        encode_var_bytes(&self.signature, out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Serialized size without the block signature, as counted against the
    /// block size limit.
    pub fn base_size(&self) -> usize {
        let mut out = Vec::with_capacity(BLOCK_HEADER_BYTES);
        out.extend_from_slice(&self.header.to_bytes());
        encode_compact_size(self.transactions.len() as u64, &mut out);
        for tx in &self.transactions {
            tx.encode(&mut out);
        }
        out.len()
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, ConsensusError> {
        let mut r = Reader::new(b);
        let header = BlockHeader::decode(&mut r)?;
        let n = read_compact_size(&mut r)?;
        let mut transactions = Vec::with_capacity(n.min(1024) as usize);
        for _ in 0..n {
            transactions.push(Transaction::decode(&mut r)?);
        }
        let signature = read_var_bytes(&mut r)?.to_vec();
        r.expect_end()?;
        Ok(Block {
            header,
            transactions,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use crate::tx::{OutPoint, TxIn, TxOut};

    fn header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: [3u8; 32],
            merkle_root: [4u8; 32],
            time: 1_296_688_602,
            bits: CompactTarget(0x207f_ffff),
            nonce: 2,
        }
    }

    #[test]
    fn header_is_80_bytes() {
        let h = header();
        let b = h.to_bytes();
        assert_eq!(b.len(), 80);
        assert_eq!(BlockHeader::from_bytes(&b).expect("decode"), h);
        assert!(BlockHeader::from_bytes(&b[..79]).is_err());
    }

    #[test]
    fn block_signature_is_not_in_base_size() {
        let cb = Transaction::new(
            1,
            vec![TxIn::new(OutPoint::NULL, Script(vec![0x51, 0x51]))],
            vec![TxOut::new(50, Script::empty())],
            0,
        );
        let mut block = Block::new(header(), vec![cb]);
        block.update_merkle_root();
        let base = block.base_size();
        block.signature = vec![0x30; 70];
        assert_eq!(block.base_size(), base);
        assert_eq!(block.to_bytes().len(), base + 71);
        assert_eq!(Block::from_bytes(&block.to_bytes()).expect("decode"), block);
        assert!(block.is_proof_of_work());
    }
}
