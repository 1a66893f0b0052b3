use super::{
    ConfirmationRecord,
    EventFilter,
    Ledger,
    RawEvent,
    TxHandle,
};
use crate::{
    error::LedgerError,
    player::PlayerRecord,
};
use ethers::{
    abi::Detokenize,
    contract::ContractCall,
    providers::Middleware,
    types::{
        Address,
        BlockNumber,
        Filter,
        H256,
        U256,
    },
};
use generated_abi::{
    slot_types::SlotMachine,
    token_types::ChipToken,
};
use std::{
    fmt::Display,
    sync::Arc,
};
use tracing::debug;

/// `Ledger` backed by an EVM JSON-RPC node and a signing middleware.
pub struct EvmLedger<M> {
    client: Arc<M>,
    game: SlotMachine<M>,
    token: ChipToken<M>,
}

impl<M: Middleware> EvmLedger<M> {
    pub fn new(client: Arc<M>, game_address: Address, token_address: Address) -> Self {
        let game = SlotMachine::new(game_address, client.clone());
        let token = ChipToken::new(token_address, client.clone());
        Self {
            client,
            game,
            token,
        }
    }

    pub fn game_address(&self) -> Address {
        self.game.address()
    }

    pub fn token_address(&self) -> Address {
        self.token.address()
    }
}

fn ledger_error(err: impl Display) -> LedgerError {
    LedgerError::classify(err.to_string())
}

/// Send `call` and wait for it to be mined.
async fn send_and_confirm<M: Middleware + 'static, D: Detokenize>(
    call: ContractCall<M, D>,
    what: &'static str,
) -> Result<ConfirmationRecord, LedgerError> {
    let pending = call.send().await.map_err(ledger_error)?;
    debug!(tx = ?pending.tx_hash(), what, "transaction accepted by node");
    let receipt = pending.await.map_err(ledger_error)?.ok_or_else(|| {
        LedgerError::Network(format!("{what} transaction dropped from mempool"))
    })?;
    Ok(receipt.into())
}

impl<M: Middleware + 'static> Ledger for EvmLedger<M> {
    async fn submit_wager(
        &self,
        amount: U256,
        fee_price: U256,
    ) -> Result<TxHandle, LedgerError> {
        // X Layer has no EIP-1559 support
        let call = self.game.play_lottery(amount).legacy().gas_price(fee_price);
        let pending = call.send().await.map_err(ledger_error)?;
        let handle = TxHandle(pending.tx_hash());
        debug!(tx = %handle, %amount, "playLottery accepted by node");
        Ok(handle)
    }

    async fn approve_allowance(
        &self,
        spender: Address,
        amount: U256,
        fee_price: U256,
    ) -> Result<ConfirmationRecord, LedgerError> {
        let call = self
            .token
            .approve(spender, amount)
            .legacy()
            .gas_price(fee_price);
        send_and_confirm(call, "approval").await
    }

    async fn register_player(
        &self,
        nickname: &str,
        fee_price: U256,
    ) -> Result<ConfirmationRecord, LedgerError> {
        let call = self
            .game
            .register_user(nickname.to_string())
            .legacy()
            .gas_price(fee_price);
        send_and_confirm(call, "registration").await
    }

    async fn claim_rewards(&self, fee_price: U256) -> Result<ConfirmationRecord, LedgerError> {
        let call = self.game.claim_rewards().legacy().gas_price(fee_price);
        send_and_confirm(call, "claim").await
    }

    async fn read_player(&self, account: Address) -> Result<PlayerRecord, LedgerError> {
        let (
            is_registered,
            nickname,
            registration_time,
            total_bets,
            total_wins,
            games_played,
            pending_rewards,
        ) = self.game.users(account).call().await.map_err(ledger_error)?;
        Ok(PlayerRecord {
            is_registered,
            nickname,
            registration_time,
            total_bets,
            total_wins,
            games_played,
            pending_rewards,
        })
    }

    async fn read_allowance(
        &self,
        owner: Address,
        spender: Address,
    ) -> Result<U256, LedgerError> {
        self.token
            .allowance(owner, spender)
            .call()
            .await
            .map_err(ledger_error)
    }

    async fn read_balance(&self, account: Address) -> Result<U256, LedgerError> {
        self.token
            .balance_of(account)
            .call()
            .await
            .map_err(ledger_error)
    }

    async fn fetch_receipt(
        &self,
        handle: &TxHandle,
    ) -> Result<Option<ConfirmationRecord>, LedgerError> {
        let receipt = self
            .client
            .get_transaction_receipt(handle.0)
            .await
            .map_err(ledger_error)?;
        Ok(receipt.map(Into::into))
    }

    async fn query_past_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<RawEvent>, LedgerError> {
        let to_block = filter
            .to_block
            .map(BlockNumber::from)
            .unwrap_or(BlockNumber::Latest);
        let query = Filter::new()
            .address(self.game.address())
            .topic0(filter.event_signature)
            .topic1(H256::from(filter.account))
            .from_block(filter.from_block)
            .to_block(to_block);
        self.client.get_logs(&query).await.map_err(ledger_error)
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        let number = self.client.get_block_number().await.map_err(ledger_error)?;
        Ok(number.as_u64())
    }

    async fn current_fee_price(&self) -> Result<U256, LedgerError> {
        self.client.get_gas_price().await.map_err(ledger_error)
    }
}
