use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::chain::ChainedHeader;
use crate::hash::Hash256;
use crate::params::{Bip9Deployment, ConsensusParams, DeploymentId};

pub const VERSIONBITS_TOP_MASK: i32 = 0xe000_0000u32 as i32;
pub const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureBitState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

impl FeatureBitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureBitState::Defined => "DEFINED",
            FeatureBitState::Started => "STARTED",
            FeatureBitState::LockedIn => "LOCKED_IN",
            FeatureBitState::Active => "ACTIVE",
            FeatureBitState::Failed => "FAILED",
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ScriptFlags: u32 {
        const P2SH = 1 << 0;
        const STRICTENC = 1 << 1;
        const DERSIG = 1 << 2;
        const NULLDUMMY = 1 << 4;
        const CHECKLOCKTIMEVERIFY = 1 << 9;
        const CHECKSEQUENCEVERIFY = 1 << 10;
        const WITNESS = 1 << 11;
        const CHECKCOLDSTAKEVERIFY = 1 << 20;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct LockTimeFlags: u32 {
        const VERIFY_SEQUENCE = 1 << 0;
        const MEDIAN_TIME_PAST = 1 << 1;
    }
}

/// Rules in force for one block, computed from its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DeploymentFlags {
    pub script_flags: ScriptFlags,
    pub lock_time_flags: LockTimeFlags,
    pub enforce_bip30: bool,
    pub enforce_bip34: bool,
    pub cold_staking_active: bool,
}

fn signals(header: &ChainedHeader, d: &Bip9Deployment) -> bool {
    let v = header.header.version;
    (v & VERSIONBITS_TOP_MASK) == VERSIONBITS_TOP_BITS && (v as u32 & d.mask()) != 0
}

/// BIP9 state tracker. States are cached per period-boundary block, so each
/// period is evaluated once per branch.
#[derive(Default)]
pub struct NodeDeployments {
    cache: Mutex<HashMap<(DeploymentId, Option<Hash256>), FeatureBitState>>,
}

impl NodeDeployments {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `id` for the block whose parent is `prev`.
    pub fn state(
        &self,
        params: &ConsensusParams,
        id: DeploymentId,
        prev: Option<&Arc<ChainedHeader>>,
    ) -> FeatureBitState {
        let Some(d) = params.deployment(id) else {
            return FeatureBitState::Defined;
        };
        if d.start_time == Bip9Deployment::ALWAYS_ACTIVE {
            return FeatureBitState::Active;
        }
        let period = params.miner_confirmation_window;
        let threshold = params.rule_change_activation_threshold;

        // Every block in a period shares the state of the period's first block,
        // which is determined by the last block of the previous period.
        let mut cur: Option<Arc<ChainedHeader>> = prev.and_then(|p| {
            p.height
                .checked_sub((p.height + 1) % period)
                .and_then(|h| p.get_ancestor(h))
        });

        let mut cache = self.cache.lock();
        let mut to_compute: Vec<Arc<ChainedHeader>> = Vec::new();
        let mut state = loop {
            let key = (id, cur.as_ref().map(|c| c.hash));
            if let Some(s) = cache.get(&key) {
                break *s;
            }
            match cur {
                None => {
                    cache.insert(key, FeatureBitState::Defined);
                    break FeatureBitState::Defined;
                }
                Some(ref c) if (c.median_time_past() as i64) < d.start_time => {
                    cache.insert(key, FeatureBitState::Defined);
                    break FeatureBitState::Defined;
                }
                Some(c) => {
                    let back = c.height.checked_sub(period);
                    cur = back.and_then(|h| c.get_ancestor(h));
                    to_compute.push(c);
                }
            }
        };

        while let Some(c) = to_compute.pop() {
            state = match state {
                FeatureBitState::Defined => {
                    if c.median_time_past() as i64 >= d.start_time {
                        FeatureBitState::Started
                    } else {
                        FeatureBitState::Defined
                    }
                }
                FeatureBitState::Started => {
                    if c.median_time_past() as i64 >= d.timeout {
                        FeatureBitState::Failed
                    } else {
                        let mut count = 0u32;
                        let mut walk = Some(Arc::clone(&c));
                        for _ in 0..period {
                            let Some(w) = walk else { break };
                            if signals(&w, d) {
                                count += 1;
                            }
                            walk = w.previous().cloned();
                        }
                        if count >= threshold {
                            FeatureBitState::LockedIn
                        } else {
                            FeatureBitState::Started
                        }
                    }
                }
                FeatureBitState::LockedIn => FeatureBitState::Active,
                s @ (FeatureBitState::Active | FeatureBitState::Failed) => s,
            };
            cache.insert((id, Some(c.hash)), state);
        }
        state
    }

    pub fn is_active(
        &self,
        params: &ConsensusParams,
        id: DeploymentId,
        prev: Option<&Arc<ChainedHeader>>,
    ) -> bool {
        self.state(params, id, prev) == FeatureBitState::Active
    }

    /// Flags for `header`, derived from buried heights and BIP9 states.
    pub fn flags(&self, params: &ConsensusParams, header: &ChainedHeader) -> DeploymentFlags {
        let height = header.height;
        let prev = header.previous();

        let mut script_flags = ScriptFlags::P2SH;
        if height >= params.buried.bip66 {
            script_flags |= ScriptFlags::DERSIG;
        }
        if height >= params.buried.bip65 {
            script_flags |= ScriptFlags::CHECKLOCKTIMEVERIFY;
        }

        let mut lock_time_flags = LockTimeFlags::empty();
        if self.is_active(params, DeploymentId::Csv, prev) {
            script_flags |= ScriptFlags::CHECKSEQUENCEVERIFY;
            lock_time_flags |= LockTimeFlags::VERIFY_SEQUENCE | LockTimeFlags::MEDIAN_TIME_PAST;
        }
        if self.is_active(params, DeploymentId::Segwit, prev) {
            script_flags |= ScriptFlags::WITNESS | ScriptFlags::NULLDUMMY;
        }
        let cold_staking_active = self.is_active(params, DeploymentId::ColdStaking, prev);
        if cold_staking_active {
            script_flags |= ScriptFlags::CHECKCOLDSTAKEVERIFY;
        }

        let enforce_bip34 = height >= params.buried.bip34;
        DeploymentFlags {
            script_flags,
            lock_time_flags,
            enforce_bip30: !enforce_bip34,
            enforce_bip34,
            cold_staking_active,
        }
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}
