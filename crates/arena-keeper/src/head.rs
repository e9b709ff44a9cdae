use std::sync::{
    Arc,
    atomic::{
        AtomicU64,
        Ordering,
    },
};

/// Highest block number observed by any component.
///
/// The synchronizer and scheduler raise it as they see blocks; the gateway
/// reads it to derive `Active`/`Revealing` at request time.
#[derive(Debug, Clone, Default)]
pub struct ChainHead(Arc<AtomicU64>);

impl ChainHead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, block: u64) {
        self.0.fetch_max(block, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_only_rises() {
        let head = ChainHead::new();
        let clone = head.clone();
        head.observe(10);
        clone.observe(7);
        assert_eq!(head.get(), 10);
        clone.observe(12);
        assert_eq!(head.get(), 12);
    }
}
