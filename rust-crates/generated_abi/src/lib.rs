use ethers::{
    contract::EthEvent,
    types::H256,
};

pub mod slot_types {
    use ethers::{
        contract::{
            EthEvent,
            abigen,
        },
        types::{
            Address,
            U256,
            Uint8,
        },
    };

    abigen!(
        SlotMachine,
        r#"[
            function playLottery(uint256 betAmount) external
            function registerUser(string nickname) external
            function claimRewards() external
            function users(address player) external view returns (bool isRegistered, string nickname, uint256 registrationTime, uint256 totalBets, uint256 totalWins, uint256 gamesPlayed, uint256 pendingRewards)
        ]"#
    );

    /// Emitted once per played game. Written by hand because the generated
    /// display impl does not cover `uint8[3]`.
    #[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
    #[ethevent(
        name = "GamePlayed",
        abi = "GamePlayed(address,uint256,uint8[3],uint256,uint256,address)"
    )]
    pub struct GamePlayedFilter {
        #[ethevent(indexed)]
        pub player: Address,
        #[ethevent(indexed)]
        pub game_id: U256,
        pub symbols: [Uint8; 3],
        pub bet_amount: U256,
        pub win_amount: U256,
        pub token_contract: Address,
    }
}

pub mod token_types {
    use ethers::contract::abigen;

    abigen!(
        ChipToken,
        r#"[
            function balanceOf(address account) external view returns (uint256)
            function approve(address spender, uint256 amount) external returns (bool)
            function allowance(address owner, address spender) external view returns (uint256)
        ]"#
    );
}

#[cfg(feature = "test-helpers")]
pub mod test_helpers;

/// Canonical signature of the event emitted once per played game.
pub const GAME_PLAYED_SIGNATURE: &str =
    "GamePlayed(address,uint256,uint8[3],uint256,uint256,address)";

/// topic0 of every `GamePlayed` log
pub fn game_played_topic() -> H256 {
    <slot_types::GamePlayedFilter as EthEvent>::signature()
}
