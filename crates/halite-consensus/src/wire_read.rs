use crate::error::{ConsensusError, ErrorCode};

pub struct Reader<'a> {
    b: &'a [u8],
    off: usize,
}

fn eof(what: &'static str) -> ConsensusError {
    ConsensusError::new(ErrorCode::Malformed, what)
}

impl<'a> Reader<'a> {
    pub fn new(b: &'a [u8]) -> Self {
        Self { b, off: 0 }
    }

    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn is_empty(&self) -> bool {
        self.off >= self.b.len()
    }

    fn take<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], ConsensusError> {
        if self.off + N > self.b.len() {
            return Err(eof(what));
        }
        let mut v = [0u8; N];
        v.copy_from_slice(&self.b[self.off..self.off + N]);
        self.off += N;
        Ok(v)
    }

    pub fn read_u8(&mut self) -> Result<u8, ConsensusError> {
        Ok(self.take::<1>("unexpected EOF (u8)")?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ConsensusError> {
        Ok(u16::from_le_bytes(self.take("unexpected EOF (u16le)")?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ConsensusError> {
        Ok(u32::from_le_bytes(self.take("unexpected EOF (u32le)")?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, ConsensusError> {
        Ok(i32::from_le_bytes(self.take("unexpected EOF (i32le)")?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, ConsensusError> {
        Ok(u64::from_le_bytes(self.take("unexpected EOF (u64le)")?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, ConsensusError> {
        Ok(i64::from_le_bytes(self.take("unexpected EOF (i64le)")?))
    }

    pub fn read_hash(&mut self) -> Result<[u8; 32], ConsensusError> {
        self.take("unexpected EOF (hash)")
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ConsensusError> {
        if n > self.b.len().saturating_sub(self.off) {
            return Err(eof("unexpected EOF (bytes)"));
        }
        let v = &self.b[self.off..self.off + n];
        self.off += n;
        Ok(v)
    }

    pub fn expect_end(&self) -> Result<(), ConsensusError> {
        if self.off != self.b.len() {
            return Err(ConsensusError::new(ErrorCode::Malformed, "trailing bytes"));
        }
        Ok(())
    }
}
