use core::fmt;

use crate::compactsize::{encode_compact_size, read_compact_size};
use crate::error::{ConsensusError, ErrorCode};
use crate::hash::{to_hex, Hash256};
use crate::tx::{OutPoint, TxOut};
use crate::wire_read::Reader;

const FLAG_COINBASE: u8 = 0x01;
const FLAG_COINSTAKE: u8 = 0x02;
const FLAG_TIME: u8 = 0x04;

/// One unspent output with the context needed to validate spending it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coins {
    pub height: u32,
    pub tx_out: TxOut,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
    /// Transaction time on proof-of-stake networks; used by the stake kernel.
    pub time: Option<u32>,
}

impl Coins {
    /// Never stored; pruned as soon as it is created.
    pub fn is_prunable(&self) -> bool {
        self.tx_out.script_pubkey.is_unspendable()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.height.to_le_bytes());
        let mut flags = 0u8;
        if self.is_coinbase {
            flags |= FLAG_COINBASE;
        }
        if self.is_coinstake {
            flags |= FLAG_COINSTAKE;
        }
        if self.time.is_some() {
            flags |= FLAG_TIME;
        }
        out.push(flags);
        if let Some(t) = self.time {
            out.extend_from_slice(&t.to_le_bytes());
        }
        self.tx_out.encode(out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(48);
        self.encode(&mut out);
        out
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, ConsensusError> {
        let height = r.read_u32_le()?;
        let flags = r.read_u8()?;
        if flags & !(FLAG_COINBASE | FLAG_COINSTAKE | FLAG_TIME) != 0 {
            return Err(ConsensusError::new(ErrorCode::Malformed, "coins: unknown flags"));
        }
        let time = if flags & FLAG_TIME != 0 {
            Some(r.read_u32_le()?)
        } else {
            None
        };
        let tx_out = TxOut::decode(r)?;
        Ok(Coins {
            height,
            tx_out,
            is_coinbase: flags & FLAG_COINBASE != 0,
            is_coinstake: flags & FLAG_COINSTAKE != 0,
            time,
        })
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, ConsensusError> {
        let mut r = Reader::new(b);
        let c = Self::decode(&mut r)?;
        r.expect_end()?;
        Ok(c)
    }
}

/// An outpoint and its coins. `coins == None` is the spent / unknown state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub coins: Option<Coins>,
}

impl UnspentOutput {
    pub fn new(outpoint: OutPoint, coins: Option<Coins>) -> Self {
        Self { outpoint, coins }
    }

    pub fn spent(outpoint: OutPoint) -> Self {
        Self {
            outpoint,
            coins: None,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.coins.is_none()
    }
}

/// Identity of a coin database tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HashHeightPair {
    pub hash: Hash256,
    pub height: u32,
}

impl HashHeightPair {
    pub fn new(hash: Hash256, height: u32) -> Self {
        Self { hash, height }
    }

    pub fn to_bytes(&self) -> [u8; 36] {
        let mut b = [0u8; 36];
        b[..32].copy_from_slice(&self.hash);
        b[32..].copy_from_slice(&self.height.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, ConsensusError> {
        let mut r = Reader::new(b);
        let hash = r.read_hash()?;
        let height = r.read_u32_le()?;
        r.expect_end()?;
        Ok(Self { hash, height })
    }
}

impl fmt::Display for HashHeightPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.height, to_hex(&self.hash))
    }
}

/// Undo record for one committed block, stored under the block's height.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewindData {
    pub previous_tip: Option<HashHeightPair>,
    pub outputs_to_remove: Vec<OutPoint>,
    pub outputs_to_restore: Vec<(OutPoint, Coins)>,
}

impl RewindData {
    pub fn new(previous_tip: HashHeightPair) -> Self {
        Self {
            previous_tip: Some(previous_tip),
            outputs_to_remove: Vec::new(),
            outputs_to_restore: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match &self.previous_tip {
            Some(tip) => {
                out.push(1);
                out.extend_from_slice(&tip.to_bytes());
            }
            None => out.push(0),
        }
        encode_compact_size(self.outputs_to_remove.len() as u64, &mut out);
        for op in &self.outputs_to_remove {
            out.extend_from_slice(&op.key_bytes());
        }
        encode_compact_size(self.outputs_to_restore.len() as u64, &mut out);
        for (op, coins) in &self.outputs_to_restore {
            out.extend_from_slice(&op.key_bytes());
            coins.encode(&mut out);
        }
        out
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, ConsensusError> {
        let mut r = Reader::new(b);
        let previous_tip = match r.read_u8()? {
            0 => None,
            1 => Some(HashHeightPair::from_bytes(r.read_bytes(36)?)?),
            _ => {
                return Err(ConsensusError::new(
                    ErrorCode::Malformed,
                    "rewind: bad tip marker",
                ))
            }
        };

        let n = read_compact_size(&mut r)?;
        let mut outputs_to_remove = Vec::with_capacity(n.min(4096) as usize);
        for _ in 0..n {
            outputs_to_remove.push(read_outpoint_key(&mut r)?);
        }

        let n = read_compact_size(&mut r)?;
        let mut outputs_to_restore = Vec::with_capacity(n.min(4096) as usize);
        for _ in 0..n {
            let op = read_outpoint_key(&mut r)?;
            outputs_to_restore.push((op, Coins::decode(&mut r)?));
        }
        r.expect_end()?;

        Ok(RewindData {
            previous_tip,
            outputs_to_remove,
            outputs_to_restore,
        })
    }
}

fn read_outpoint_key(r: &mut Reader<'_>) -> Result<OutPoint, ConsensusError> {
    OutPoint::from_key_bytes(r.read_bytes(36)?)
        .ok_or_else(|| ConsensusError::new(ErrorCode::Malformed, "rewind: bad outpoint"))
}
