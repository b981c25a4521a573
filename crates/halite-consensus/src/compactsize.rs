use crate::error::{ConsensusError, ErrorCode};
use crate::wire_read::Reader;

/// Upper bound for any length prefix. Larger values cannot describe data that
/// fits in a block and are rejected before allocation.
pub const MAX_SIZE: u64 = 0x0200_0000;

pub fn read_compact_size(r: &mut Reader<'_>) -> Result<u64, ConsensusError> {
    let tag = r.read_u8()?;

    let (v, minimal_ok) = match tag {
        0x00..=0xfc => (tag as u64, true),
        0xfd => {
            let v = r.read_u16_le()? as u64;
            (v, v >= 0xfd)
        }
        0xfe => {
            let v = r.read_u32_le()? as u64;
            (v, v > 0xffff)
        }
        0xff => {
            let v = r.read_u64_le()?;
            (v, v > 0xffff_ffff)
        }
    };

    if !minimal_ok {
        return Err(ConsensusError::new(
            ErrorCode::Malformed,
            "non-minimal CompactSize",
        ));
    }
    if v > MAX_SIZE {
        return Err(ConsensusError::new(ErrorCode::Malformed, "size too large"));
    }

    Ok(v)
}

pub fn read_var_bytes<'a>(r: &mut Reader<'a>) -> Result<&'a [u8], ConsensusError> {
    let n = read_compact_size(r)?;
    r.read_bytes(n as usize)
}

pub fn encode_compact_size(n: u64, out: &mut Vec<u8>) {
    match n {
        0x00..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

pub fn encode_var_bytes(b: &[u8], out: &mut Vec<u8>) {
    encode_compact_size(b.len() as u64, out);
    out.extend_from_slice(b);
}

pub fn compact_size_len(n: u64) -> usize {
    match n {
        0x00..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}
