use crate::error::{Error, Result};
use logrestore_catalog::DownstreamID;

/// Source of global ids in the restored cluster.
pub trait IdAllocator: Send {
    /// Allocate `count` unique ids.
    fn alloc_ids(&mut self, count: usize) -> Result<Vec<DownstreamID>>;

    #[inline]
    fn next_id(&mut self) -> Result<DownstreamID> {
        self.alloc_ids(1)?
            .pop()
            .ok_or_else(|| Error::IdAllocation("allocator returned no id".to_string()))
    }
}

/// Hands out increasing ids from a start value.
#[derive(Debug, Clone)]
pub struct SequentialIdAllocator {
    next: DownstreamID,
}

impl SequentialIdAllocator {
    #[inline]
    pub fn new(start: DownstreamID) -> Self {
        SequentialIdAllocator { next: start }
    }

    /// Next id to be returned.
    #[inline]
    pub fn peek(&self) -> DownstreamID {
        self.next
    }
}

impl IdAllocator for SequentialIdAllocator {
    #[inline]
    fn alloc_ids(&mut self, count: usize) -> Result<Vec<DownstreamID>> {
        let end = i64::try_from(count)
            .ok()
            .and_then(|c| self.next.checked_add(c))
            .ok_or_else(|| Error::IdAllocation(format!("{count} ids overflow from {}", self.next)))?;
        let ids = (self.next..end).collect();
        self.next = end;
        Ok(ids)
    }
}
