//! Chain constants.
//!
//! The target chain runs a constant base fee, so fees are fixed rather than
//! estimated: `eth_gasPrice` pads the fee and the priority fee is never used.

use std::time::Duration;

/// Fixed max fee per gas in wei (0.001 gwei, the chain's constant base fee).
pub const MAX_FEE_PER_GAS: u128 = 1_000_000;

/// Priority fee in wei. Always zero on the target chain.
pub const MAX_PRIORITY_FEE_PER_GAS: u128 = 0;

/// Default block time of the target chain (~100 blocks per second).
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_millis(10);

/// Converts a wall-clock duration into a block count, rounding up.
///
/// A non-zero duration always maps to at least one block. A zero block time
/// is treated as one block per millisecond.
pub fn blocks_for(duration: Duration, block_time: Duration) -> u64 {
    let block_ms = block_time.as_millis().max(1);
    let total_ms = duration.as_millis();
    let blocks = total_ms.div_ceil(block_ms);
    u64::try_from(blocks).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_for_default_block_time() {
        // 100 blocks per second
        assert_eq!(blocks_for(Duration::from_secs(60), DEFAULT_BLOCK_TIME), 6_000);
        assert_eq!(blocks_for(Duration::from_secs(30), DEFAULT_BLOCK_TIME), 3_000);
    }

    #[test]
    fn test_blocks_for_rounds_up() {
        assert_eq!(
            blocks_for(Duration::from_millis(1_001), Duration::from_secs(1)),
            2
        );
        assert_eq!(blocks_for(Duration::from_millis(1), Duration::from_secs(2)), 1);
    }

    #[test]
    fn test_blocks_for_zero() {
        assert_eq!(blocks_for(Duration::ZERO, DEFAULT_BLOCK_TIME), 0);
        assert_eq!(blocks_for(Duration::from_millis(5), Duration::ZERO), 5);
    }
}
