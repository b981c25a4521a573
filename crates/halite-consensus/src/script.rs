pub const MAX_SCRIPT_SIZE: usize = 10_000;
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

pub mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_IF: u8 = 0x63;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_RETURN: u8 = 0x6a;
    pub const OP_ROT: u8 = 0x7b;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;
    pub const OP_CHECKMULTISIG: u8 = 0xae;
    pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
    /// Redefined OP_NOP10.
    pub const OP_CHECKCOLDSTAKEVERIFY: u8 = 0xb9;
}

use opcodes::*;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Script(pub Vec<u8>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction<'a> {
    Push(&'a [u8]),
    Op(u8),
}

/// Iterates script instructions. Stops with `Err(())` at a truncated push.
pub struct Instructions<'a> {
    b: &'a [u8],
    off: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.off >= self.b.len() {
            return None;
        }
        let op = self.b[self.off];
        self.off += 1;
        let n = match op {
            0x01..=0x4b => op as usize,
            OP_PUSHDATA1 => match self.b.get(self.off) {
                Some(&n) => {
                    self.off += 1;
                    n as usize
                }
                None => return self.fail(),
            },
            OP_PUSHDATA2 => match self.b.get(self.off..self.off + 2) {
                Some(s) => {
                    self.off += 2;
                    u16::from_le_bytes([s[0], s[1]]) as usize
                }
                None => return self.fail(),
            },
            OP_PUSHDATA4 => match self.b.get(self.off..self.off + 4) {
                Some(s) => {
                    self.off += 4;
                    u32::from_le_bytes([s[0], s[1], s[2], s[3]]) as usize
                }
                None => return self.fail(),
            },
            OP_0 => return Some(Ok(Instruction::Push(&[]))),
            _ => return Some(Ok(Instruction::Op(op))),
        };
        if n > self.b.len() - self.off {
            return self.fail();
        }
        let data = &self.b[self.off..self.off + n];
        self.off += n;
        Some(Ok(Instruction::Push(data)))
    }
}

impl<'a> Instructions<'a> {
    fn fail(&mut self) -> Option<Result<Instruction<'a>, ()>> {
        self.off = self.b.len();
        Some(Err(()))
    }
}

impl Script {
    pub fn new(b: Vec<u8>) -> Self {
        Script(b)
    }

    pub fn empty() -> Self {
        Script(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions { b: &self.0, off: 0 }
    }

    /// Outputs with an unspendable script are pruned and never stored.
    pub fn is_unspendable(&self) -> bool {
        self.0.first() == Some(&OP_RETURN) || self.0.len() > MAX_SCRIPT_SIZE
    }

    pub fn is_push_only(&self) -> bool {
        self.instructions().all(|i| match i {
            Ok(Instruction::Push(_)) => true,
            Ok(Instruction::Op(op)) => op == OP_1NEGATE || (OP_1..=OP_16).contains(&op),
            Err(()) => false,
        })
    }

    /// Legacy sigop count. With `accurate`, CHECKMULTISIG preceded by OP_n
    /// counts n keys instead of the maximum.
    pub fn sigop_count(&self, accurate: bool) -> usize {
        let mut n = 0usize;
        let mut last: Option<u8> = None;
        for ins in self.instructions() {
            let Ok(ins) = ins else { break };
            match ins {
                Instruction::Op(OP_CHECKSIG) | Instruction::Op(OP_CHECKSIGVERIFY) => n += 1,
                Instruction::Op(OP_CHECKMULTISIG) | Instruction::Op(OP_CHECKMULTISIGVERIFY) => {
                    n += match last {
                        Some(op) if accurate && (OP_1..=OP_16).contains(&op) => {
                            (op - OP_1 + 1) as usize
                        }
                        _ => MAX_PUBKEYS_PER_MULTISIG,
                    };
                }
                _ => {}
            }
            last = match ins {
                Instruction::Op(op) => Some(op),
                Instruction::Push(_) => None,
            };
        }
        n
    }

    /// Sigops of the redeem script when this is a P2SH output spent by
    /// `script_sig`.
    pub fn p2sh_sigop_count(&self, script_sig: &Script) -> usize {
        if !self.is_p2sh() {
            return self.sigop_count(true);
        }
        let mut redeem: Option<&[u8]> = None;
        for ins in script_sig.instructions() {
            match ins {
                Ok(Instruction::Push(d)) => redeem = Some(d),
                Ok(Instruction::Op(op))
                    if op == OP_1NEGATE || (OP_1..=OP_16).contains(&op) =>
                {
                    redeem = None
                }
                _ => return 0,
            }
        }
        redeem
            .map(|d| Script(d.to_vec()).sigop_count(true))
            .unwrap_or(0)
    }

    pub fn is_p2sh(&self) -> bool {
        let b = &self.0;
        b.len() == 23 && b[0] == OP_HASH160 && b[1] == 0x14 && b[22] == OP_EQUAL
    }

    pub fn is_p2pkh(&self) -> bool {
        let b = &self.0;
        b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 0x14
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
    }

    /// `<pubkey> OP_CHECKSIG` with a compressed or uncompressed key.
    pub fn p2pk_pubkey(&self) -> Option<&[u8]> {
        let b = &self.0;
        match b.len() {
            35 if b[0] == 33 && b[34] == OP_CHECKSIG => Some(&b[1..34]),
            67 if b[0] == 65 && b[66] == OP_CHECKSIG => Some(&b[1..66]),
            _ => None,
        }
    }

    /// `OP_RETURN <pubkey>` as used by coinstakes whose reward output is not P2PK.
    pub fn op_return_pubkey(&self) -> Option<&[u8]> {
        let b = &self.0;
        if b.len() < 2 || b[0] != OP_RETURN {
            return None;
        }
        let n = b[1] as usize;
        if (n == 33 || n == 65) && b.len() == 2 + n {
            Some(&b[2..])
        } else {
            None
        }
    }

    pub fn is_op_return_pubkey(&self) -> bool {
        self.op_return_pubkey().is_some()
    }

    /// `OP_DUP OP_HASH160 OP_ROT OP_IF OP_CHECKCOLDSTAKEVERIFY <hot> OP_ELSE <cold>
    ///  OP_ENDIF OP_EQUALVERIFY OP_CHECKSIG`
    pub fn cold_staking_keys(&self) -> Option<([u8; 20], [u8; 20])> {
        let b = &self.0;
        if b.len() != 51 {
            return None;
        }
        let head = [OP_DUP, OP_HASH160, OP_ROT, OP_IF, OP_CHECKCOLDSTAKEVERIFY, 0x14];
        if b[..6] != head || b[26] != OP_ELSE || b[27] != 0x14 {
            return None;
        }
        if b[48..] != [OP_ENDIF, OP_EQUALVERIFY, OP_CHECKSIG] {
            return None;
        }
        let mut hot = [0u8; 20];
        let mut cold = [0u8; 20];
        hot.copy_from_slice(&b[6..26]);
        cold.copy_from_slice(&b[28..48]);
        Some((hot, cold))
    }

    pub fn is_cold_staking(&self) -> bool {
        self.cold_staking_keys().is_some()
    }

    pub fn cold_staking(hot: [u8; 20], cold: [u8; 20]) -> Self {
        let mut b = Vec::with_capacity(51);
        b.extend_from_slice(&[OP_DUP, OP_HASH160, OP_ROT, OP_IF, OP_CHECKCOLDSTAKEVERIFY, 0x14]);
        b.extend_from_slice(&hot);
        b.extend_from_slice(&[OP_ELSE, 0x14]);
        b.extend_from_slice(&cold);
        b.extend_from_slice(&[OP_ENDIF, OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(b)
    }

    pub fn p2pk(pubkey: &[u8]) -> Self {
        let mut b = Vec::with_capacity(pubkey.len() + 2);
        b.push(pubkey.len() as u8);
        b.extend_from_slice(pubkey);
        b.push(OP_CHECKSIG);
        Script(b)
    }

    pub fn p2pkh(hash: [u8; 20]) -> Self {
        let mut b = vec![OP_DUP, OP_HASH160, 0x14];
        b.extend_from_slice(&hash);
        b.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(b)
    }

    pub fn op_return(data: &[u8]) -> Self {
        let mut b = vec![OP_RETURN];
        push_data(&mut b, data);
        Script(b)
    }
}

pub fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => out.push(OP_0),
        n @ 1..=0x4b => out.push(n as u8),
        n @ 0x4c..=0xff => {
            out.push(OP_PUSHDATA1);
            out.push(n as u8);
        }
        n @ 0x100..=0xffff => {
            out.push(OP_PUSHDATA2);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        n => {
            out.push(OP_PUSHDATA4);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
    }
    out.extend_from_slice(data);
}

/// Minimal script-number push of `n`, the BIP34 coinbase height prefix.
pub fn script_num_push(n: i64) -> Vec<u8> {
    let mut out = Vec::new();
    if n == 0 {
        out.push(OP_0);
        return out;
    }
    if (1..=16).contains(&n) {
        out.push(OP_1 + (n as u8) - 1);
        return out;
    }
    if n == -1 {
        out.push(OP_1NEGATE);
        return out;
    }
    push_data(&mut out, &script_num_encode(n));
    out
}

pub fn script_num_encode(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let neg = n < 0;
    let mut abs = n.unsigned_abs();
    let mut v = Vec::new();
    while abs > 0 {
        v.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if v[v.len() - 1] & 0x80 != 0 {
        v.push(if neg { 0x80 } else { 0x00 });
    } else if neg {
        let last = v.len() - 1;
        v[last] |= 0x80;
    }
    v
}
