use bitflags::bitflags;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use num_bigint::BigUint;

use crate::block::Block;
use crate::chain::ChainedHeader;
use crate::coins::Coins;
use crate::error::{ConsensusError, EngineError, ErrorCode};
use crate::hash::{sha256d, Hash256, ZERO_HASH};
use crate::target::Target;
use crate::tx::OutPoint;
use crate::wire_read::Reader;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BlockStakeFlags: u32 {
        const PROOF_OF_STAKE = 0x01;
        const STAKE_ENTROPY = 0x02;
        const STAKE_MODIFIER = 0x04;
    }
}

/// Per-block proof-of-stake metadata.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BlockStake {
    pub flags: BlockStakeFlags,
    pub stake_modifier_v2: Hash256,
    pub stake_time: u32,
    pub hash_proof: Hash256,
    pub prevout_stake: Option<OutPoint>,
}

impl BlockStake {
    /// Stake record for a block before its modifier and proof are computed.
    pub fn for_block(block: &Block) -> Self {
        let mut s = BlockStake {
            stake_time: block.header.time,
            ..Default::default()
        };
        if block.is_proof_of_stake() {
            s.flags |= BlockStakeFlags::PROOF_OF_STAKE;
            s.prevout_stake = Some(block.transactions[1].inputs[0].prevout);
        }
        if stake_entropy_bit(&block.hash()) {
            s.flags |= BlockStakeFlags::STAKE_ENTROPY;
        }
        s
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags.contains(BlockStakeFlags::PROOF_OF_STAKE)
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + 32 + 4 + 32 + 1 + 36);
        out.extend_from_slice(&self.flags.bits().to_le_bytes());
        out.extend_from_slice(&self.stake_modifier_v2);
        out.extend_from_slice(&self.stake_time.to_le_bytes());
        out.extend_from_slice(&self.hash_proof);
        match &self.prevout_stake {
            Some(op) => {
                out.push(1);
                op.encode(&mut out);
            }
            None => out.push(0),
        }
        out
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self, ConsensusError> {
        let mut r = Reader::new(b);
        let flags = BlockStakeFlags::from_bits(r.read_u32_le()?)
            .ok_or_else(|| ConsensusError::new(ErrorCode::Malformed, "stake: unknown flags"))?;
        let stake_modifier_v2 = r.read_hash()?;
        let stake_time = r.read_u32_le()?;
        let hash_proof = r.read_hash()?;
        let prevout_stake = match r.read_u8()? {
            0 => None,
            1 => Some(OutPoint::decode(&mut r)?),
            _ => {
                return Err(ConsensusError::new(
                    ErrorCode::Malformed,
                    "stake: bad prevout marker",
                ))
            }
        };
        r.expect_end()?;
        Ok(BlockStake {
            flags,
            stake_modifier_v2,
            stake_time,
            hash_proof,
            prevout_stake,
        })
    }
}

/// Cached stake entry. `in_store` is false until the entry has been flushed
/// to the coin database.
#[derive(Clone, Debug)]
pub struct StakeItem {
    pub block_id: Hash256,
    pub block_stake: BlockStake,
    pub in_store: bool,
    pub height: u32,
}

/// Stake metadata per block, keyed by block hash.
pub trait StakeChain: Send + Sync {
    fn get(&self, hash: &Hash256) -> Result<Option<BlockStake>, EngineError>;

    fn set(&self, header: &ChainedHeader, stake: BlockStake) -> Result<(), EngineError>;

    /// Warms the cache with the stake entries of the chain ending at `tip`.
    fn load(&self, tip: &ChainedHeader) -> Result<(), EngineError>;
}

pub fn stake_entropy_bit(block_hash: &Hash256) -> bool {
    block_hash[0] & 1 == 1
}

/// `sha256d(kernel || previous modifier)`. The kernel is the staked prevout
/// hash for PoS blocks and the block hash for PoW blocks.
pub fn compute_stake_modifier_v2(prev_modifier: Option<&Hash256>, kernel: &Hash256) -> Hash256 {
    let Some(prev) = prev_modifier else {
        return ZERO_HASH;
    };
    let mut b = [0u8; 64];
    b[..32].copy_from_slice(kernel);
    b[32..].copy_from_slice(prev);
    sha256d(&b)
}

pub fn stake_kernel_hash(
    stake_modifier_v2: &Hash256,
    prev_time: u32,
    prevout: &OutPoint,
    block_time: u32,
) -> Hash256 {
    let mut b = Vec::with_capacity(32 + 4 + 32 + 4 + 4);
    b.extend_from_slice(stake_modifier_v2);
    b.extend_from_slice(&prev_time.to_le_bytes());
    b.extend_from_slice(&prevout.txid);
    b.extend_from_slice(&prevout.n.to_le_bytes());
    b.extend_from_slice(&block_time.to_le_bytes());
    sha256d(&b)
}

/// Checks that the staked coins meet the weighted target and returns the
/// proof hash.
pub fn check_stake_kernel_hash(
    target: &Target,
    prev_modifier: &Hash256,
    staked: &Coins,
    prevout: &OutPoint,
    block_time: u32,
) -> Result<Hash256, ConsensusError> {
    let prev_time = staked.time.unwrap_or(0);
    if block_time < prev_time {
        return Err(ConsensusError::new(
            ErrorCode::StakeTimeViolation,
            "kernel timestamp before staked coins",
        ));
    }
    if staked.tx_out.value <= 0 {
        return Err(ConsensusError::new(
            ErrorCode::StakeHashInvalidTarget,
            "zero-weight stake",
        ));
    }

    let hash_proof = stake_kernel_hash(prev_modifier, prev_time, prevout, block_time);
    let weighted = target.value() * BigUint::from(staked.tx_out.value as u64);
    if BigUint::from_bytes_le(&hash_proof) > weighted {
        return Err(ConsensusError::new(
            ErrorCode::StakeHashInvalidTarget,
            "kernel hash above weighted target",
        ));
    }
    Ok(hash_proof)
}

/// Public key that must have signed a proof-of-stake block: the P2PK key of
/// the coinstake's second output, or an `OP_RETURN <pubkey>` output.
pub fn block_signing_key(block: &Block) -> Option<Vec<u8>> {
    let coinstake = block.transactions.get(1)?;
    if let Some(k) = coinstake.outputs.get(1).and_then(|o| o.script_pubkey.p2pk_pubkey()) {
        return Some(k.to_vec());
    }
    coinstake
        .outputs
        .iter()
        .find_map(|o| o.script_pubkey.op_return_pubkey())
        .map(|k| k.to_vec())
}

pub fn check_block_signature(block: &Block) -> bool {
    if block.is_proof_of_work() {
        return block.signature.is_empty();
    }
    let Some(pubkey) = block_signing_key(block) else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_sec1_bytes(&pubkey) else {
        return false;
    };
    let Ok(sig) = Signature::from_der(&block.signature) else {
        return false;
    };
    let sig = sig.normalize_s().unwrap_or(sig);
    vk.verify_prehash(&block.hash(), &sig).is_ok()
}

/// DER signature of the block hash.
pub fn sign_block(block: &mut Block, key: &SigningKey) -> Result<(), EngineError> {
    let sig: Signature = key
        .sign_prehash(&block.hash())
        .map_err(|e| EngineError::Corruption(format!("sign block: {e}")))?;
    block.signature = sig.to_der().as_bytes().to_vec();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use crate::script::Script;
    use crate::target::CompactTarget;
    use crate::tx::{Transaction, TxIn, TxOut};

    fn staked(value: i64, time: u32) -> Coins {
        Coins {
            height: 1,
            tx_out: TxOut::new(value, Script::p2pkh([1u8; 20])),
            is_coinbase: false,
            is_coinstake: false,
            time: Some(time),
        }
    }

    fn pos_block(pubkey: &[u8]) -> Block {
        let coinbase = Transaction::new(
            1,
            vec![TxIn::new(OutPoint::NULL, Script(vec![0x51, 0x51]))],
            vec![TxOut::new(0, Script::empty())],
            0,
        );
        let coinstake = Transaction::new(
            1,
            vec![TxIn::new(OutPoint::new([8u8; 32], 0), Script::empty())],
            vec![TxOut::new(0, Script::empty()), TxOut::new(10, Script::p2pk(pubkey))],
            0,
        );
        let mut b = Block::new(
            BlockHeader {
                version: 1,
                prev_block_hash: [1u8; 32],
                merkle_root: [0u8; 32],
                time: 1_600_000_000,
                bits: CompactTarget(0x1e0f_ffff),
                nonce: 0,
            },
            vec![coinbase, coinstake],
        );
        b.update_merkle_root();
        b
    }

    #[test]
    fn modifier_is_zero_without_parent() {
        assert_eq!(compute_stake_modifier_v2(None, &[5u8; 32]), ZERO_HASH);
        let m = compute_stake_modifier_v2(Some(&[1u8; 32]), &[5u8; 32]);
        assert_ne!(m, ZERO_HASH);
        assert_ne!(m, compute_stake_modifier_v2(Some(&[2u8; 32]), &[5u8; 32]));
    }

    #[test]
    fn kernel_weight_scales_target() {
        let prevout = OutPoint::new([3u8; 32], 0);
        let max = Target::from_biguint((BigUint::from(1u8) << 256usize) - 1u8);
        let ok = check_stake_kernel_hash(&max, &[0u8; 32], &staked(1, 100), &prevout, 200);
        assert!(ok.is_ok());

        let zero = Target::from_u64(0);
        let err = check_stake_kernel_hash(&zero, &[0u8; 32], &staked(1_000, 100), &prevout, 200)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::StakeHashInvalidTarget);

        let err = check_stake_kernel_hash(&max, &[0u8; 32], &staked(1, 300), &prevout, 200)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::StakeTimeViolation);
    }

    #[test]
    fn block_signature_roundtrip() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).expect("key");
        let pubkey = key.verifying_key().to_sec1_bytes();
        let mut block = pos_block(&pubkey);
        assert!(block.is_proof_of_stake());
        assert!(!check_block_signature(&block));
        sign_block(&mut block, &key).expect("sign");
        assert!(check_block_signature(&block));

        let other = SigningKey::from_slice(&[0x43u8; 32]).expect("key");
        sign_block(&mut block, &other).expect("sign");
        assert!(!check_block_signature(&block));
    }

    #[test]
    fn stake_encoding() {
        let s = BlockStake {
            flags: BlockStakeFlags::PROOF_OF_STAKE | BlockStakeFlags::STAKE_ENTROPY,
            stake_modifier_v2: [9u8; 32],
            stake_time: 12,
            hash_proof: [8u8; 32],
            prevout_stake: Some(OutPoint::new([7u8; 32], 2)),
        };
        assert_eq!(BlockStake::from_bytes(&s.to_bytes()).expect("decode"), s);
        assert_eq!(
            BlockStake::from_bytes(&BlockStake::default().to_bytes()).expect("decode"),
            BlockStake::default()
        );
    }
}
