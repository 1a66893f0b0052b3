use ethers::{
    abi::{
        self,
        Token,
    },
    types::{
        Address,
        Bytes,
        H256,
        Log,
        U64,
        U256,
    },
};

use crate::game_played_topic;

/// Builder for `GamePlayed` logs as a node would return them.
#[derive(Clone, Debug)]
pub struct GamePlayedLog {
    pub contract: Address,
    pub player: Address,
    pub game_id: U256,
    pub symbols: [u8; 3],
    pub bet_amount: U256,
    pub win_amount: U256,
    pub token: Address,
    pub block_number: u64,
    pub transaction_hash: Option<H256>,
}

impl GamePlayedLog {
    pub fn new(contract: Address, player: Address) -> Self {
        Self {
            contract,
            player,
            game_id: U256::one(),
            symbols: [0, 1, 2],
            bet_amount: U256::from(50_000u64),
            win_amount: U256::zero(),
            token: Address::repeat_byte(0x77),
            block_number: 100,
            transaction_hash: None,
        }
    }

    pub fn game_id(mut self, game_id: u64) -> Self {
        self.game_id = U256::from(game_id);
        self
    }

    pub fn symbols(mut self, symbols: [u8; 3]) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn bet_amount(mut self, amount: impl Into<U256>) -> Self {
        self.bet_amount = amount.into();
        self
    }

    pub fn win_amount(mut self, amount: impl Into<U256>) -> Self {
        self.win_amount = amount.into();
        self
    }

    pub fn block_number(mut self, block_number: u64) -> Self {
        self.block_number = block_number;
        self
    }

    pub fn transaction_hash(mut self, hash: H256) -> Self {
        self.transaction_hash = Some(hash);
        self
    }

    pub fn build(&self) -> Log {
        let data = abi::encode(&[
            Token::FixedArray(
                self.symbols
                    .iter()
                    .map(|code| Token::Uint(U256::from(*code)))
                    .collect(),
            ),
            Token::Uint(self.bet_amount),
            Token::Uint(self.win_amount),
            Token::Address(self.token),
        ]);
        let topics = vec![
            game_played_topic(),
            H256::from(self.player),
            u256_topic(self.game_id),
        ];
        raw_log(self.contract, topics, data, self.block_number, self.transaction_hash)
    }
}

pub fn u256_topic(value: U256) -> H256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    H256::from(buf)
}

/// A log with arbitrary topics and payload, for shape-mismatch cases.
pub fn raw_log(
    contract: Address,
    topics: Vec<H256>,
    data: Vec<u8>,
    block_number: u64,
    transaction_hash: Option<H256>,
) -> Log {
    Log {
        address: contract,
        topics,
        data: Bytes::from(data),
        block_number: Some(U64::from(block_number)),
        transaction_hash,
        ..Default::default()
    }
}
