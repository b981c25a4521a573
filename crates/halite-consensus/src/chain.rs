use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigUint;

use crate::block::BlockHeader;
use crate::error::EngineError;
use crate::hash::{to_hex, Hash256};
use crate::target::Target;

const MEDIAN_TIME_SPAN: usize = 11;

/// A header accepted into the header chain. Immutable once built; parents are
/// shared, so many branches can hang off one common prefix.
#[derive(Debug)]
pub struct ChainedHeader {
    pub header: BlockHeader,
    pub hash: Hash256,
    pub height: u32,
    pub chain_work: BigUint,
    previous: Option<Arc<ChainedHeader>>,
}

impl ChainedHeader {
    pub fn genesis(header: BlockHeader) -> Arc<Self> {
        let work = header_work(&header);
        Arc::new(ChainedHeader {
            hash: header.hash(),
            header,
            height: 0,
            chain_work: work,
            previous: None,
        })
    }

    pub fn new(header: BlockHeader, previous: Arc<ChainedHeader>) -> Arc<Self> {
        let chain_work = &previous.chain_work + header_work(&header);
        Arc::new(ChainedHeader {
            hash: header.hash(),
            height: previous.height + 1,
            header,
            chain_work,
            previous: Some(previous),
        })
    }

    pub fn previous(&self) -> Option<&Arc<ChainedHeader>> {
        self.previous.as_ref()
    }

    /// Ancestor at `height`, or `None` when it is above this header.
    pub fn get_ancestor(self: &Arc<Self>, height: u32) -> Option<Arc<ChainedHeader>> {
        if height > self.height {
            return None;
        }
        let mut cur = Arc::clone(self);
        while cur.height > height {
            cur = Arc::clone(cur.previous.as_ref()?);
        }
        Some(cur)
    }

    /// Median of the last eleven block times ending at this header.
    pub fn median_time_past(&self) -> u32 {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        times.push(self.header.time);
        let mut cur = self.previous.as_ref();
        while let Some(h) = cur {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            times.push(h.header.time);
            cur = h.previous.as_ref();
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Last common ancestor of two headers.
    pub fn find_fork(self: &Arc<Self>, other: &Arc<ChainedHeader>) -> Option<Arc<ChainedHeader>> {
        let h = self.height.min(other.height);
        let mut a = self.get_ancestor(h)?;
        let mut b = other.get_ancestor(h)?;
        while a.hash != b.hash {
            a = Arc::clone(a.previous.as_ref()?);
            b = Arc::clone(b.previous.as_ref()?);
        }
        Some(a)
    }
}

impl Drop for ChainedHeader {
    // Unlink parents one at a time so dropping a long chain does not recurse.
    fn drop(&mut self) {
        let mut next = self.previous.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut inner) => next = inner.previous.take(),
                Err(_) => break,
            }
        }
    }
}

fn header_work(header: &BlockHeader) -> BigUint {
    Target::from_compact(header.bits)
        .map(|t| t.work())
        .unwrap_or_default()
}

/// Minimal hash-indexed header store with a best tip.
#[derive(Default)]
pub struct ChainIndex {
    headers: HashMap<Hash256, Arc<ChainedHeader>>,
    tip: Option<Arc<ChainedHeader>>,
}

impl ChainIndex {
    pub fn new(genesis: BlockHeader) -> Self {
        let g = ChainedHeader::genesis(genesis);
        let mut headers = HashMap::new();
        headers.insert(g.hash, Arc::clone(&g));
        Self {
            headers,
            tip: Some(g),
        }
    }

    pub fn get(&self, hash: &Hash256) -> Option<Arc<ChainedHeader>> {
        self.headers.get(hash).cloned()
    }

    pub fn tip(&self) -> Option<Arc<ChainedHeader>> {
        self.tip.clone()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Links `header` to its parent. The best tip moves when the new header
    /// carries more cumulative work.
    pub fn insert(&mut self, header: BlockHeader) -> Result<Arc<ChainedHeader>, EngineError> {
        let hash = header.hash();
        if let Some(existing) = self.headers.get(&hash) {
            return Ok(Arc::clone(existing));
        }
        let parent = self
            .headers
            .get(&header.prev_block_hash)
            .cloned()
            .ok_or_else(|| EngineError::UnknownParent(to_hex(&header.prev_block_hash)))?;
        let chained = ChainedHeader::new(header, parent);
        self.headers.insert(hash, Arc::clone(&chained));
        let better = match &self.tip {
            Some(tip) => chained.chain_work > tip.chain_work,
            None => true,
        };
        if better {
            self.tip = Some(Arc::clone(&chained));
        }
        Ok(chained)
    }
}
