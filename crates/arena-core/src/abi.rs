//! Arena engine contract surface.
//!
//! Only the functions the keeper calls and the events it mirrors are declared.

use alloy::sol;

sol! {
    #[sol(rpc)]
    #[derive(Debug, PartialEq, Eq)]
    interface IArenaEngine {
        struct ArenaInfo {
            uint40 startBlock;
            uint40 endBlock;
            uint128 pot;
            uint16 playerCount;
            uint8 tier;
            bool finalized;
            uint256 tournamentId;
        }

        event ArenaCreated(
            uint256 indexed arenaId,
            uint8 tier,
            uint256 entryFee,
            uint256 startBlock,
            uint256 endBlock,
            string assetPair
        );
        event PlayerJoined(uint256 indexed arenaId, address indexed player);
        event PredictionCommitted(uint256 indexed arenaId, address indexed player, bytes32 commitHash);
        event PredictionRevealed(uint256 indexed arenaId, address indexed player, uint256 prediction);
        event ArenaFinalized(uint256 indexed arenaId, uint256 finalPrice);
        event GodStreakUpdate(address indexed player, uint256 streak);
        event PotDistributed(uint256 indexed arenaId, address indexed winner, uint256 amount);

        function createArena(uint8 tier, uint256 entryFee, uint256 durationBlocks, string assetPair)
            external
            returns (uint256 arenaId);
        function submitPriceTape(uint256 arenaId, uint256[] tape) external;
        function finalizeArena(uint256 arenaId, address[] players) external;
        function getArena(uint256 id) external view returns (ArenaInfo memory);
    }
}
