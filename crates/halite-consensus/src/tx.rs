use core::fmt;

use crate::compactsize::{encode_compact_size, encode_var_bytes, read_compact_size, read_var_bytes};
use crate::error::ConsensusError;
use crate::hash::{sha256d, to_hex, Hash256, ZERO_HASH};
use crate::script::Script;
use crate::wire_read::Reader;

pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Reference to a transaction output. Ordered by txid bytes, then index; this
/// is the order in which the coin database writes entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub n: u32,
}

impl OutPoint {
    pub const NULL: OutPoint = OutPoint {
        txid: ZERO_HASH,
        n: u32::MAX,
    };

    pub fn new(txid: Hash256, n: u32) -> Self {
        Self { txid, n }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// Storage key: txid followed by the big-endian index, so byte order of
    /// keys equals `Ord` order.
    pub fn key_bytes(&self) -> [u8; 36] {
        let mut k = [0u8; 36];
        k[..32].copy_from_slice(&self.txid);
        k[32..].copy_from_slice(&self.n.to_be_bytes());
        k
    }

    pub fn from_key_bytes(b: &[u8]) -> Option<Self> {
        if b.len() != 36 {
            return None;
        }
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&b[..32]);
        let n = u32::from_be_bytes([b[32], b[33], b[34], b[35]]);
        Some(Self { txid, n })
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.txid);
        out.extend_from_slice(&self.n.to_le_bytes());
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, ConsensusError> {
        let txid = r.read_hash()?;
        let n = r.read_u32_le()?;
        Ok(Self { txid, n })
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", to_hex(&self.txid), self.n)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint, script_sig: Script) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: i64, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    /// Zero value and empty script: the coinstake marker and the PoS coinbase output.
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        encode_var_bytes(self.script_pubkey.as_bytes(), out);
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, ConsensusError> {
        let value = r.read_i64_le()?;
        let script_pubkey = Script(read_var_bytes(r)?.to_vec());
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(version: i32, inputs: Vec<TxIn>, outputs: Vec<TxOut>, lock_time: u32) -> Self {
        Self {
            version,
            inputs,
            outputs,
            lock_time,
        }
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].prevout.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    pub fn total_out(&self) -> i64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        encode_compact_size(self.inputs.len() as u64, out);
        for i in &self.inputs {
            i.prevout.encode(out);
            encode_var_bytes(i.script_sig.as_bytes(), out);
            out.extend_from_slice(&i.sequence.to_le_bytes());
        }
        encode_compact_size(self.outputs.len() as u64, out);
        for o in &self.outputs {
            o.encode(out);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    pub fn serialized_size(&self) -> usize {
        self.to_bytes().len()
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, ConsensusError> {
        let version = r.read_i32_le()?;

        let in_count = read_compact_size(r)?;
        let mut inputs = Vec::with_capacity(in_count.min(1024) as usize);
        for _ in 0..in_count {
            let prevout = OutPoint::decode(r)?;
            let script_sig = Script(read_var_bytes(r)?.to_vec());
            let sequence = r.read_u32_le()?;
            inputs.push(TxIn {
                prevout,
                script_sig,
                sequence,
            });
        }

        let out_count = read_compact_size(r)?;
        let mut outputs = Vec::with_capacity(out_count.min(1024) as usize);
        for _ in 0..out_count {
            outputs.push(TxOut::decode(r)?);
        }

        let lock_time = r.read_u32_le()?;
        Ok(Transaction::new(version, inputs, outputs, lock_time))
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, ConsensusError> {
        let mut r = Reader::new(b);
        let tx = Self::decode(&mut r)?;
        r.expect_end()?;
        Ok(tx)
    }

    /// Final at (height, time) per nLockTime semantics: lock times below
    /// 500,000,000 are heights, otherwise timestamps.
    pub fn is_final(&self, height: u32, block_time: i64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let lt = self.lock_time as i64;
        let limit = if self.lock_time < LOCKTIME_THRESHOLD {
            height as i64
        } else {
            block_time
        };
        if lt < limit {
            return true;
        }
        self.inputs.iter().all(|i| i.sequence == SEQUENCE_FINAL)
    }
}

pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
