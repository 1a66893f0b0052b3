use crate::{
    error::LedgerError,
    player::PlayerRecord,
};
use ethers::types::{
    Address,
    H256,
    Log,
    TransactionReceipt,
    U64,
    U256,
};
use std::fmt;

pub mod evm_ledger;

/// A log entry exactly as the ledger returned it.
pub type RawEvent = Log;

/// Identifier of a submitted transaction, known before it confirms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TxHandle(pub H256);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationRecord {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    pub succeeded: bool,
    pub events: Vec<RawEvent>,
}

impl From<TransactionReceipt> for ConfirmationRecord {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            // receipts without a status field predate status codes and only exist for
            // mined transactions
            succeeded: receipt.status != Some(U64::zero()),
            events: receipt.logs,
        }
    }
}

/// Historical event query, bounded to a block range and one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFilter {
    pub event_signature: H256,
    pub account: Address,
    pub from_block: u64,
    /// `None` means the latest block
    pub to_block: Option<u64>,
}

/// The remote contract service, consumed as a black box.
pub trait Ledger {
    /// Send the wager transaction. Resolves as soon as the transaction is accepted.
    fn submit_wager(
        &self,
        amount: U256,
        fee_price: U256,
    ) -> impl Future<Output = Result<TxHandle, LedgerError>>;

    /// Grant `spender` the right to move `amount` of the player's chips. Resolves
    /// once the approval is confirmed.
    fn approve_allowance(
        &self,
        spender: Address,
        amount: U256,
        fee_price: U256,
    ) -> impl Future<Output = Result<ConfirmationRecord, LedgerError>>;

    /// Register the signing account under `nickname`. Resolves once confirmed.
    fn register_player(
        &self,
        nickname: &str,
        fee_price: U256,
    ) -> impl Future<Output = Result<ConfirmationRecord, LedgerError>>;

    /// Pay out the signing account's pending rewards. Resolves once confirmed.
    fn claim_rewards(
        &self,
        fee_price: U256,
    ) -> impl Future<Output = Result<ConfirmationRecord, LedgerError>>;

    fn read_player(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<PlayerRecord, LedgerError>>;

    fn read_allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>>;

    fn read_balance(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<U256, LedgerError>>;

    /// `Ok(None)` while the transaction is still unconfirmed.
    fn fetch_receipt(
        &self,
        handle: &TxHandle,
    ) -> impl Future<Output = Result<Option<ConfirmationRecord>, LedgerError>>;

    /// Matching events in ascending block order.
    fn query_past_events(
        &self,
        filter: &EventFilter,
    ) -> impl Future<Output = Result<Vec<RawEvent>, LedgerError>>;

    fn block_number(&self) -> impl Future<Output = Result<u64, LedgerError>>;

    fn current_fee_price(&self) -> impl Future<Output = Result<U256, LedgerError>>;
}
