use crate::{
    error::{
        Error,
        Result,
    },
    ledger::TxHandle,
    symbols::Symbol,
};
use ethers::types::{
    Address,
    U256,
};

/// One wager as requested by the player, in the token's base units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WagerRequest {
    pub amount: U256,
    pub player: Address,
}

impl WagerRequest {
    pub fn new(amount: U256, player: Address) -> Result<Self> {
        if amount.is_zero() {
            return Err(Error::ZeroWager);
        }
        Ok(Self { amount, player })
    }
}

/// Which path produced an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeSource {
    /// decoded from the transaction's own receipt
    Receipt,
    /// decoded from a recent-history event query
    History,
    /// nothing decodable was found; symbols are random and the win amount is not real
    Synthetic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameOutcome {
    pub wager_amount: U256,
    pub symbols: [Symbol; 3],
    pub win_amount: U256,
    pub game_id: Option<U256>,
    pub source_transaction: TxHandle,
    pub source: OutcomeSource,
}

impl GameOutcome {
    pub fn is_win(&self) -> bool {
        !self.win_amount.is_zero()
    }

    /// `false` for synthetic outcomes, which must never be shown as a real result.
    pub fn is_confirmed(&self) -> bool {
        self.source != OutcomeSource::Synthetic
    }
}
