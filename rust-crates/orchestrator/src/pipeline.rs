use crate::{
    allowance::{
        AllowanceGuard,
        DEFAULT_APPROVAL_MULTIPLIER,
    },
    audio::AudioHandle,
    decoder::{
        DEFAULT_HISTORY_WINDOW,
        OutcomeDecoder,
    },
    error::{
        Error,
        Result,
    },
    ledger::Ledger,
    outcome::{
        GameOutcome,
        WagerRequest,
    },
    player::{
        Claim,
        PlayerRecord,
        PlayerRegistry,
        Registration,
    },
    retry::{
        RetryPolicy,
        poll_until_some,
        with_retry,
    },
};
use ethers::types::{
    Address,
    U256,
};
use tracing::{
    debug,
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// The game contract: spender of the allowance and emitter of `GamePlayed`.
    pub spender: Address,
    pub read_policy: RetryPolicy,
    pub receipt_policy: RetryPolicy,
    pub approval_multiplier: u64,
    pub history_window: u64,
}

impl OrchestratorConfig {
    pub fn new(spender: Address) -> Self {
        Self {
            spender,
            read_policy: RetryPolicy::READ,
            receipt_policy: RetryPolicy::RECEIPT,
            approval_multiplier: DEFAULT_APPROVAL_MULTIPLIER,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

/// Everything the player sees about their account between spins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerStatus {
    pub player: PlayerRecord,
    pub balance: U256,
    /// chips held by the game contract
    pub prize_pool: U256,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineStage {
    #[default]
    Ready,
    /// registration, balance and allowance checks
    Preparing,
    Submitting,
    AwaitingReceipt,
    Decoding,
    Done,
    Failed,
}

/// Runs wagers end to end and feeds their outcomes to the audio worker.
pub struct Orchestrator<L> {
    ledger: L,
    config: OrchestratorConfig,
    allowance: AllowanceGuard,
    registry: PlayerRegistry,
    decoder: OutcomeDecoder,
    audio: AudioHandle,
    stage: PipelineStage,
}

impl<L: Ledger> Orchestrator<L> {
    pub fn new(ledger: L, config: OrchestratorConfig, audio: AudioHandle) -> Self {
        Self {
            allowance: AllowanceGuard::new(config.approval_multiplier, config.read_policy),
            registry: PlayerRegistry::new(config.read_policy),
            decoder: OutcomeDecoder::new(
                config.spender,
                config.history_window,
                config.read_policy,
            ),
            ledger,
            config,
            audio,
            stage: PipelineStage::Ready,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn audio(&self) -> &AudioHandle {
        &self.audio
    }

    /// Stage the last wager reached.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub async fn balance(&self, account: Address) -> Result<U256> {
        with_retry(self.config.read_policy, "balance", || {
            self.ledger.read_balance(account)
        })
        .await
        .map_err(Error::read("balance"))
    }

    /// Chips held by the game contract, out of which wins are paid.
    pub async fn prize_pool(&self) -> Result<U256> {
        with_retry(self.config.read_policy, "prize pool", || {
            self.ledger.read_balance(self.config.spender)
        })
        .await
        .map_err(Error::read("prize pool"))
    }

    pub async fn player(&self, account: Address) -> Result<PlayerRecord> {
        self.registry.read(&self.ledger, account).await
    }

    pub async fn status(&self, account: Address) -> Result<PlayerStatus> {
        Ok(PlayerStatus {
            player: self.player(account).await?,
            balance: self.balance(account).await?,
            prize_pool: self.prize_pool().await?,
        })
    }

    /// Register `account` so it may wager. See [`PlayerRegistry::register`].
    pub async fn register(
        &mut self,
        account: Address,
        nickname: Option<&str>,
    ) -> Result<Registration> {
        self.registry.register(&self.ledger, account, nickname).await
    }

    pub async fn claim_rewards(&mut self, account: Address) -> Result<Claim> {
        self.registry.claim(&self.ledger, account).await
    }

    /// Check funds, approve if needed, submit, wait for confirmation and decode.
    ///
    /// Errors before or during submission are returned and nothing further happens.
    /// Once the ledger has accepted the transaction the call always yields an outcome,
    /// unless the receipt shows the transaction reverted. Taking `&mut self` keeps a
    /// second wager from starting while one is in flight.
    pub async fn submit_and_resolve_wager(
        &mut self,
        request: &WagerRequest,
    ) -> Result<GameOutcome> {
        let result = self.run(request).await;
        match &result {
            Ok(outcome) => {
                self.enter(PipelineStage::Done);
                info!(
                    tx = %outcome.source_transaction,
                    source = ?outcome.source,
                    win = %outcome.win_amount,
                    "wager resolved"
                );
            }
            Err(err) => {
                self.enter(PipelineStage::Failed);
                warn!(%err, "wager failed");
            }
        }
        result
    }

    async fn run(&mut self, request: &WagerRequest) -> Result<GameOutcome> {
        self.enter(PipelineStage::Preparing);
        if !self.player(request.player).await?.is_registered {
            return Err(Error::NotRegistered(request.player));
        }
        let balance = self.balance(request.player).await?;
        if balance < request.amount {
            return Err(Error::InsufficientBalance {
                balance,
                required: request.amount,
            });
        }
        self.audio.notify_spin_started();
        self.allowance
            .ensure(&self.ledger, request.player, self.config.spender, request.amount)
            .await?;

        self.enter(PipelineStage::Submitting);
        let fee_price = with_retry(self.config.read_policy, "fee price", || {
            self.ledger.current_fee_price()
        })
        .await
        .map_err(Error::read("fee price"))?;
        let handle = self
            .ledger
            .submit_wager(request.amount, fee_price)
            .await
            .map_err(Error::Submission)?;
        info!(tx = %handle, amount = %request.amount, %fee_price, "wager submitted");

        self.enter(PipelineStage::AwaitingReceipt);
        let record = poll_until_some(self.config.receipt_policy, "receipt", || {
            self.ledger.fetch_receipt(&handle)
        })
        .await;
        match &record {
            Some(record) if !record.succeeded => return Err(Error::Reverted(handle)),
            Some(record) => debug!(tx = %handle, block = ?record.block_number, "receipt"),
            None => warn!(
                tx = %handle,
                waited = ?self.config.receipt_policy.max_wait(),
                "no receipt within the polling budget"
            ),
        }

        self.enter(PipelineStage::Decoding);
        let outcome = self
            .decoder
            .resolve(&self.ledger, request, &handle, record.as_ref())
            .await;
        if outcome.is_confirmed() {
            self.audio.notify_outcome(&outcome);
        }
        Ok(outcome)
    }

    /// Try once more to find the real result behind an unconfirmed outcome.
    ///
    /// Returns the outcome unchanged if it is already confirmed, the decoded outcome if
    /// the receipt or recent history now carries it, and `None` otherwise.
    pub async fn reconcile(
        &self,
        request: &WagerRequest,
        outcome: &GameOutcome,
    ) -> Option<GameOutcome> {
        if outcome.is_confirmed() {
            return Some(outcome.clone());
        }
        let handle = outcome.source_transaction;
        let record = match self.ledger.fetch_receipt(&handle).await {
            Ok(record) => record,
            Err(err) => {
                warn!(tx = %handle, %err, "reconcile: receipt unavailable");
                None
            }
        };
        if let Some(record) = &record
            && !record.succeeded
        {
            warn!(tx = %handle, "reconcile: transaction reverted");
            return None;
        }
        let (game, source) = self
            .decoder
            .decode(&self.ledger, request.player, &handle, record.as_ref())
            .await?;
        let confirmed = game.into_outcome(handle, source);
        info!(tx = %handle, ?source, win = %confirmed.win_amount, "outcome reconciled");
        self.audio.notify_outcome(&confirmed);
        Some(confirmed)
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(from = ?self.stage, to = ?stage, "pipeline stage");
        self.stage = stage;
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        audio::{
            AudioConfig,
            Tone,
        },
        error::LedgerError,
        ledger::ConfirmationRecord,
        outcome::OutcomeSource,
        test_helpers::{
            BackendCall,
            FakeLedger,
            RecordingBackend,
        },
    };
    use ethers::types::H256;
    use generated_abi::test_helpers::GamePlayedLog;
    use std::time::Duration;
    use tokio::time::{
        self,
        Instant,
    };

    const CONTRACT: Address = Address::repeat_byte(0xc0);
    const PLAYER: Address = Address::repeat_byte(0xaa);

    fn orchestrator(ledger: FakeLedger) -> Orchestrator<FakeLedger> {
        Orchestrator::new(
            ledger,
            OrchestratorConfig::new(CONTRACT),
            AudioHandle::detached(),
        )
    }

    fn wager(amount: u64) -> WagerRequest {
        WagerRequest::new(U256::from(amount), PLAYER).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__decodes_receipt_event() {
        // given
        let event = GamePlayedLog::new(CONTRACT, PLAYER)
            .symbols([0, 0, 0])
            .win_amount(75_000u64)
            .build();
        let ledger = FakeLedger::new()
            .with_allowance(U256::exp10(7))
            .with_receipts([Ok(Some(FakeLedger::receipt(vec![event])))]);
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        let outcome = orchestrator
            .submit_and_resolve_wager(&wager(50_000))
            .await
            .unwrap();

        // then
        assert_eq!(outcome.source, OutcomeSource::Receipt);
        assert_eq!(outcome.win_amount, U256::from(75_000));
        assert_eq!(orchestrator.stage(), PipelineStage::Done);
        assert_eq!(ledger.submissions(), vec![(U256::from(50_000), U256::exp10(9))]);
        assert_eq!(ledger.calls().query_past_events, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__stops_on_insufficient_balance() {
        // given
        let ledger = FakeLedger::new().with_balance(10_000u64);
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        let result = orchestrator.submit_and_resolve_wager(&wager(50_000)).await;

        // then
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        assert_eq!(ledger.calls().submit_wager, 0);
        assert_eq!(ledger.calls().approve_allowance, 0);
        assert_eq!(orchestrator.stage(), PipelineStage::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__refuses_unregistered_players() {
        // given
        let ledger = FakeLedger::new()
            .with_unregistered_player()
            .with_allowance(U256::exp10(7));
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        let result = orchestrator.submit_and_resolve_wager(&wager(50_000)).await;

        // then
        assert!(matches!(result, Err(Error::NotRegistered(account)) if account == PLAYER));
        assert_eq!(ledger.calls().read_balance, 0);
        assert_eq!(ledger.calls().submit_wager, 0);
        assert_eq!(orchestrator.stage(), PipelineStage::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__proceeds_once_registered() {
        // given
        let ledger = FakeLedger::new()
            .with_unregistered_player()
            .with_allowance(U256::exp10(7))
            .with_receipts([Ok(Some(FakeLedger::receipt(vec![
                GamePlayedLog::new(CONTRACT, PLAYER).build(),
            ])))]);
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        orchestrator.register(PLAYER, Some("spinner")).await.unwrap();
        let outcome = orchestrator.submit_and_resolve_wager(&wager(50_000)).await;

        // then
        assert!(outcome.is_ok());
        assert_eq!(ledger.registrations(), vec!["spinner".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn status__reads_the_prize_pool_from_the_game_contract() {
        // given
        let ledger = FakeLedger::new()
            .with_balance(70_000u64)
            .with_balance_of(CONTRACT, 9_000_000u64)
            .with_pending_rewards(12u64);
        let orchestrator = orchestrator(ledger);

        // when
        let status = orchestrator.status(PLAYER).await.unwrap();

        // then
        assert_eq!(status.balance, U256::from(70_000));
        assert_eq!(status.prize_pool, U256::from(9_000_000));
        assert_eq!(status.player.pending_rewards, U256::from(12));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__retries_flaky_balance_reads() {
        // given
        let ledger = FakeLedger::new()
            .with_flaky_balance(2)
            .with_receipts([Ok(Some(FakeLedger::receipt(vec![
                GamePlayedLog::new(CONTRACT, PLAYER).build(),
            ])))]);
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        let outcome = orchestrator.submit_and_resolve_wager(&wager(30_000)).await;

        // then
        assert!(outcome.is_ok());
        assert_eq!(ledger.calls().read_balance, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__rejected_submission_is_neither_retried_nor_polled() {
        // given
        let ledger = FakeLedger::new()
            .with_allowance(U256::exp10(7))
            .with_submit_error(LedgerError::UserRejected);
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        let err = orchestrator
            .submit_and_resolve_wager(&wager(50_000))
            .await
            .unwrap_err();

        // then
        assert!(err.is_user_rejection());
        assert_eq!(ledger.calls().submit_wager, 1);
        assert_eq!(ledger.calls().fetch_receipt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__network_failure_on_submit_is_not_retried() {
        // given
        let ledger = FakeLedger::new()
            .with_allowance(U256::exp10(7))
            .with_submit_error(LedgerError::Network("timeout".to_string()));
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        let result = orchestrator.submit_and_resolve_wager(&wager(50_000)).await;

        // then
        assert!(matches!(result, Err(Error::Submission(LedgerError::Network(_)))));
        assert_eq!(ledger.calls().submit_wager, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__reverted_receipt_fails_without_history() {
        // given
        let reverted = ConfirmationRecord {
            succeeded: false,
            ..FakeLedger::receipt(Vec::new())
        };
        let ledger = FakeLedger::new()
            .with_allowance(U256::exp10(7))
            .with_receipts([Ok(Some(reverted))]);
        let mut orchestrator = orchestrator(ledger.clone());

        // when
        let result = orchestrator.submit_and_resolve_wager(&wager(50_000)).await;

        // then
        assert!(matches!(result, Err(Error::Reverted(_))));
        assert_eq!(ledger.calls().query_past_events, 0);
        assert_eq!(orchestrator.stage(), PipelineStage::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__is_bounded_by_the_retry_budgets() {
        // given
        let ledger = FakeLedger::new().with_allowance(U256::exp10(7));
        let mut orchestrator = orchestrator(ledger.clone());
        let started = Instant::now();

        // when
        let outcome = orchestrator
            .submit_and_resolve_wager(&wager(50_000))
            .await
            .unwrap();

        // then
        assert_eq!(outcome.source, OutcomeSource::Synthetic);
        assert_eq!(ledger.calls().fetch_receipt, 10);
        let budget = RetryPolicy::RECEIPT.max_wait() + RetryPolicy::READ.max_wait() * 5;
        assert!(started.elapsed() <= budget);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_and_resolve_wager__announces_confirmed_outcomes_only() {
        // given
        let backend = RecordingBackend::new().with_asset("bgm.mp3", None);
        let (audio, _task) = AudioHandle::spawn(backend.clone(), AudioConfig::default());
        let ledger = FakeLedger::new().with_allowance(U256::exp10(7));
        let mut orchestrator =
            Orchestrator::new(ledger, OrchestratorConfig::new(CONTRACT), audio);

        // when
        let outcome = orchestrator
            .submit_and_resolve_wager(&wager(50_000))
            .await
            .unwrap();
        time::sleep(Duration::from_millis(10)).await;

        // then
        assert!(!outcome.is_confirmed());
        let calls = backend.calls();
        assert!(calls.contains(&BackendCall::Synthesize(Tone::Spin)));
        assert!(!calls.contains(&BackendCall::Synthesize(Tone::Lose)));
        assert!(!calls.contains(&BackendCall::Synthesize(Tone::Win)));
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile__confirms_once_the_receipt_shows_up() {
        // given
        let handle_hash = H256::repeat_byte(0x42);
        let event = GamePlayedLog::new(CONTRACT, PLAYER)
            .game_id(9)
            .win_amount(100_000u64)
            .transaction_hash(handle_hash)
            .build();
        let ledger = FakeLedger::new()
            .with_allowance(U256::exp10(7))
            .with_tx_hash(handle_hash);
        let mut orchestrator = orchestrator(ledger.clone());
        let request = wager(50_000);
        let unconfirmed = orchestrator.submit_and_resolve_wager(&request).await.unwrap();
        let ledger = ledger.with_receipts([Ok(Some(FakeLedger::receipt(vec![event])))]);

        // when
        let confirmed = orchestrator.reconcile(&request, &unconfirmed).await.unwrap();

        // then
        assert_eq!(ledger.calls().fetch_receipt, 11);
        assert_eq!(confirmed.source, OutcomeSource::Receipt);
        assert_eq!(confirmed.game_id, Some(U256::from(9)));
        assert_eq!(confirmed.source_transaction, unconfirmed.source_transaction);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile__gives_up_when_nothing_is_decodable() {
        // given
        let ledger = FakeLedger::new().with_allowance(U256::exp10(7));
        let mut orchestrator = orchestrator(ledger);
        let request = wager(50_000);
        let unconfirmed = orchestrator.submit_and_resolve_wager(&request).await.unwrap();

        // when
        let reconciled = orchestrator.reconcile(&request, &unconfirmed).await;

        // then
        assert_eq!(reconciled, None);
    }
}
