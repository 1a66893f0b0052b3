//! In-memory stand-ins for the ledger and the audio device.
use crate::{
    audio::{
        AssetError,
        AudioAsset,
        AudioBackend,
        Tone,
    },
    error::LedgerError,
    ledger::{
        ConfirmationRecord,
        EventFilter,
        Ledger,
        RawEvent,
        TxHandle,
    },
    player::PlayerRecord,
};
use ethers::types::{
    Address,
    H256,
    U256,
};
use std::{
    collections::{
        HashMap,
        HashSet,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

/// How often each ledger operation was invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub submit_wager: usize,
    pub approve_allowance: usize,
    pub register_player: usize,
    pub claim_rewards: usize,
    pub read_player: usize,
    pub read_allowance: usize,
    pub read_balance: usize,
    pub fetch_receipt: usize,
    pub query_past_events: usize,
    pub block_number: usize,
    pub current_fee_price: usize,
}

#[derive(Debug)]
struct LedgerState {
    balance: U256,
    balances: HashMap<Address, U256>,
    player: PlayerRecord,
    allowance: U256,
    fee_price: U256,
    block_number: u64,
    tx_hash: H256,
    receipts: VecDeque<Result<Option<ConfirmationRecord>, LedgerError>>,
    past_events: Vec<RawEvent>,
    submit_error: Option<LedgerError>,
    approve_error: Option<LedgerError>,
    approval_reverts: bool,
    register_error: Option<LedgerError>,
    claim_reverts: bool,
    balance_failures: u32,
    calls: CallCounts,
    approvals: Vec<(Address, U256)>,
    submissions: Vec<(U256, U256)>,
    registrations: Vec<String>,
    filters: Vec<EventFilter>,
}

/// Scriptable [`Ledger`]. Clones share state, so a test can keep one and hand the
/// other to the code under test.
#[derive(Clone, Debug)]
pub struct FakeLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLedger {
    pub const DEFAULT_TX_HASH: H256 = H256::repeat_byte(0x11);

    pub fn new() -> Self {
        let state = LedgerState {
            balance: U256::exp10(24),
            balances: HashMap::new(),
            player: PlayerRecord {
                is_registered: true,
                nickname: "tester".to_string(),
                ..PlayerRecord::default()
            },
            allowance: U256::zero(),
            fee_price: U256::exp10(9),
            block_number: 100,
            tx_hash: Self::DEFAULT_TX_HASH,
            receipts: VecDeque::new(),
            past_events: Vec::new(),
            submit_error: None,
            approve_error: None,
            approval_reverts: false,
            register_error: None,
            claim_reverts: false,
            balance_failures: 0,
            calls: CallCounts::default(),
            approvals: Vec::new(),
            submissions: Vec::new(),
            registrations: Vec::new(),
            filters: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn with(self, f: impl FnOnce(&mut LedgerState)) -> Self {
        f(&mut *self.state.lock().unwrap());
        self
    }

    pub fn with_balance(self, balance: impl Into<U256>) -> Self {
        let balance = balance.into();
        self.with(|s| s.balance = balance)
    }

    /// Balance reported for `account` instead of the default one.
    pub fn with_balance_of(self, account: Address, balance: impl Into<U256>) -> Self {
        let balance = balance.into();
        self.with(|s| {
            s.balances.insert(account, balance);
        })
    }

    /// Players start out registered; this makes the contract not know them.
    pub fn with_unregistered_player(self) -> Self {
        self.with(|s| s.player = PlayerRecord::default())
    }

    pub fn with_pending_rewards(self, rewards: impl Into<U256>) -> Self {
        let rewards = rewards.into();
        self.with(|s| s.player.pending_rewards = rewards)
    }

    pub fn with_register_error(self, err: LedgerError) -> Self {
        self.with(|s| s.register_error = Some(err))
    }

    pub fn with_reverted_claim(self) -> Self {
        self.with(|s| s.claim_reverts = true)
    }

    pub fn with_allowance(self, allowance: impl Into<U256>) -> Self {
        let allowance = allowance.into();
        self.with(|s| s.allowance = allowance)
    }

    pub fn with_fee_price(self, fee_price: impl Into<U256>) -> Self {
        let fee_price = fee_price.into();
        self.with(|s| s.fee_price = fee_price)
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with(|s| s.block_number = block_number)
    }

    pub fn with_tx_hash(self, tx_hash: H256) -> Self {
        self.with(|s| s.tx_hash = tx_hash)
    }

    /// Answers for successive `fetch_receipt` calls. Once exhausted every call returns
    /// `Ok(None)`.
    pub fn with_receipts(
        self,
        receipts: impl IntoIterator<Item = Result<Option<ConfirmationRecord>, LedgerError>>,
    ) -> Self {
        self.with(|s| s.receipts.extend(receipts))
    }

    pub fn with_past_events(self, events: Vec<RawEvent>) -> Self {
        self.with(|s| s.past_events = events)
    }

    pub fn with_submit_error(self, err: LedgerError) -> Self {
        self.with(|s| s.submit_error = Some(err))
    }

    pub fn with_approve_error(self, err: LedgerError) -> Self {
        self.with(|s| s.approve_error = Some(err))
    }

    pub fn with_reverted_approval(self) -> Self {
        self.with(|s| s.approval_reverts = true)
    }

    /// The first `failures` balance reads fail with a transient network error.
    pub fn with_flaky_balance(self, failures: u32) -> Self {
        self.with(|s| s.balance_failures = failures)
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    pub fn approvals(&self) -> Vec<(Address, U256)> {
        self.state.lock().unwrap().approvals.clone()
    }

    /// `(amount, fee_price)` of every accepted submission.
    pub fn submissions(&self) -> Vec<(U256, U256)> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Nicknames of every confirmed registration.
    pub fn registrations(&self) -> Vec<String> {
        self.state.lock().unwrap().registrations.clone()
    }

    pub fn player(&self) -> PlayerRecord {
        self.state.lock().unwrap().player.clone()
    }

    pub fn allowance(&self) -> U256 {
        self.state.lock().unwrap().allowance
    }

    pub fn last_filter(&self) -> Option<EventFilter> {
        self.state.lock().unwrap().filters.last().cloned()
    }

    /// A successful receipt for the default transaction carrying `events`.
    pub fn receipt(events: Vec<RawEvent>) -> ConfirmationRecord {
        ConfirmationRecord {
            transaction_hash: Self::DEFAULT_TX_HASH,
            block_number: Some(100),
            succeeded: true,
            events,
        }
    }
}

impl Ledger for FakeLedger {
    async fn submit_wager(
        &self,
        amount: U256,
        fee_price: U256,
    ) -> Result<TxHandle, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.submit_wager += 1;
        if let Some(err) = s.submit_error.clone() {
            return Err(err);
        }
        s.submissions.push((amount, fee_price));
        Ok(TxHandle(s.tx_hash))
    }

    async fn approve_allowance(
        &self,
        spender: Address,
        amount: U256,
        _fee_price: U256,
    ) -> Result<ConfirmationRecord, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.approve_allowance += 1;
        if let Some(err) = s.approve_error.clone() {
            return Err(err);
        }
        let succeeded = !s.approval_reverts;
        if succeeded {
            s.allowance = amount;
            s.approvals.push((spender, amount));
        }
        Ok(ConfirmationRecord {
            transaction_hash: H256::repeat_byte(0xa0),
            block_number: Some(s.block_number),
            succeeded,
            events: Vec::new(),
        })
    }

    async fn register_player(
        &self,
        nickname: &str,
        _fee_price: U256,
    ) -> Result<ConfirmationRecord, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.register_player += 1;
        if let Some(err) = s.register_error.clone() {
            return Err(err);
        }
        s.player.is_registered = true;
        s.player.nickname = nickname.to_string();
        s.registrations.push(nickname.to_string());
        Ok(ConfirmationRecord {
            transaction_hash: H256::repeat_byte(0xb0),
            block_number: Some(s.block_number),
            succeeded: true,
            events: Vec::new(),
        })
    }

    async fn claim_rewards(&self, _fee_price: U256) -> Result<ConfirmationRecord, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.claim_rewards += 1;
        let succeeded = !s.claim_reverts;
        if succeeded {
            s.player.pending_rewards = U256::zero();
        }
        Ok(ConfirmationRecord {
            transaction_hash: H256::repeat_byte(0xc1),
            block_number: Some(s.block_number),
            succeeded,
            events: Vec::new(),
        })
    }

    async fn read_player(&self, _account: Address) -> Result<PlayerRecord, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.read_player += 1;
        Ok(s.player.clone())
    }

    async fn read_allowance(
        &self,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.read_allowance += 1;
        Ok(s.allowance)
    }

    async fn read_balance(&self, account: Address) -> Result<U256, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.read_balance += 1;
        if s.balance_failures > 0 {
            s.balance_failures -= 1;
            return Err(LedgerError::Network("connection reset".to_string()));
        }
        Ok(s.balances.get(&account).copied().unwrap_or(s.balance))
    }

    async fn fetch_receipt(
        &self,
        _handle: &TxHandle,
    ) -> Result<Option<ConfirmationRecord>, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.fetch_receipt += 1;
        s.receipts.pop_front().unwrap_or(Ok(None))
    }

    async fn query_past_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<RawEvent>, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.query_past_events += 1;
        s.filters.push(filter.clone());
        let events = s
            .past_events
            .iter()
            .filter(|event| {
                let block = event.block_number.map(|n| n.as_u64()).unwrap_or_default();
                block >= filter.from_block
                    && filter.to_block.is_none_or(|to| block <= to)
            })
            .cloned()
            .collect();
        Ok(events)
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.block_number += 1;
        Ok(s.block_number)
    }

    async fn current_fee_price(&self) -> Result<U256, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.current_fee_price += 1;
        Ok(s.fee_price)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    Load(String),
    PlayLoop(String),
    PauseLoop,
    PlayOnce(String),
    StopCues,
    Synthesize(Tone),
}

/// [`AudioBackend`] that only records what it was asked to do.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    assets: HashMap<String, Option<Duration>>,
    failing: HashSet<String>,
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, name: &str, duration: Option<Duration>) -> Self {
        self.assets.insert(name.to_string(), duration);
        self
    }

    /// The asset loads but refuses to play.
    pub fn with_failing_playback(mut self, name: &str) -> Self {
        self.assets.entry(name.to_string()).or_insert(None);
        self.failing.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn playback(&self, asset: &AudioAsset) -> Result<(), AssetError> {
        if self.failing.contains(&asset.name) {
            return Err(AssetError::Playback {
                name: asset.name.clone(),
                reason: "autoplay blocked".to_string(),
            });
        }
        Ok(())
    }
}

impl AudioBackend for RecordingBackend {
    fn load(&mut self, name: &str) -> Result<AudioAsset, AssetError> {
        self.record(BackendCall::Load(name.to_string()));
        match self.assets.get(name) {
            Some(duration) => Ok(AudioAsset {
                name: name.to_string(),
                duration: *duration,
            }),
            None => Err(AssetError::Missing(name.to_string())),
        }
    }

    fn play_loop(&mut self, asset: &AudioAsset, _volume: f32) -> Result<(), AssetError> {
        self.playback(asset)?;
        self.record(BackendCall::PlayLoop(asset.name.clone()));
        Ok(())
    }

    fn pause_loop(&mut self) {
        self.record(BackendCall::PauseLoop);
    }

    fn play_once(&mut self, asset: &AudioAsset, _volume: f32) -> Result<(), AssetError> {
        self.playback(asset)?;
        self.record(BackendCall::PlayOnce(asset.name.clone()));
        Ok(())
    }

    fn stop_cues(&mut self) {
        self.record(BackendCall::StopCues);
    }

    fn synthesize(&mut self, tone: Tone) {
        self.record(BackendCall::Synthesize(tone));
    }
}
