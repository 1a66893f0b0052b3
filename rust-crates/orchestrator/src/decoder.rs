use crate::{
    ledger::{
        ConfirmationRecord,
        EventFilter,
        Ledger,
        RawEvent,
        TxHandle,
    },
    outcome::{
        GameOutcome,
        OutcomeSource,
        WagerRequest,
    },
    retry::{
        RetryPolicy,
        with_retry,
    },
    symbols::{
        Symbol,
        random_reels,
    },
};
use ethers::{
    abi::RawLog,
    contract::EthLogDecode,
    types::{
        Address,
        H256,
        U256,
    },
};
use generated_abi::{
    game_played_topic,
    slot_types::GamePlayedFilter,
};
use rand::Rng;
use tracing::{
    debug,
    info,
    warn,
};

/// Number of recent blocks searched when the receipt has no usable event.
pub const DEFAULT_HISTORY_WINDOW: u64 = 5;

/// A `GamePlayed` event that passed shape validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedGame {
    pub player: Address,
    pub game_id: U256,
    pub symbols: [Symbol; 3],
    pub wager_amount: U256,
    pub win_amount: U256,
    pub token: Address,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<H256>,
}

impl DecodedGame {
    pub fn into_outcome(self, handle: TxHandle, source: OutcomeSource) -> GameOutcome {
        GameOutcome {
            wager_amount: self.wager_amount,
            symbols: self.symbols,
            win_amount: self.win_amount,
            game_id: Some(self.game_id),
            source_transaction: handle,
            source,
        }
    }
}

/// Decode a raw log as `GamePlayed`.
///
/// Returns `None` for logs with another signature, malformed payloads, or symbol codes
/// outside the symbol table.
pub fn decode_game_played(event: &RawEvent) -> Option<DecodedGame> {
    if event.topics.first() != Some(&game_played_topic()) {
        return None;
    }
    let raw = RawLog {
        topics: event.topics.clone(),
        data: event.data.to_vec(),
    };
    let decoded = match <GamePlayedFilter as EthLogDecode>::decode_log(&raw) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(%err, "GamePlayed log failed to decode");
            return None;
        }
    };
    let [a, b, c] = decoded.symbols;
    let symbols = [
        Symbol::from_code(u8::from(a))?,
        Symbol::from_code(u8::from(b))?,
        Symbol::from_code(u8::from(c))?,
    ];
    Some(DecodedGame {
        player: decoded.player,
        game_id: decoded.game_id,
        symbols,
        wager_amount: decoded.bet_amount,
        win_amount: decoded.win_amount,
        token: decoded.token_contract,
        block_number: event.block_number.map(|n| n.as_u64()),
        transaction_hash: event.transaction_hash,
    })
}

/// Turns whatever confirmation data is available into exactly one outcome.
#[derive(Clone, Debug)]
pub struct OutcomeDecoder {
    game_contract: Address,
    history_window: u64,
    read_policy: RetryPolicy,
}

impl OutcomeDecoder {
    pub fn new(game_contract: Address, history_window: u64, read_policy: RetryPolicy) -> Self {
        Self {
            game_contract,
            history_window,
            read_policy,
        }
    }

    /// Path A: the receipt's own logs. Only events emitted by the game contract for
    /// `player` count.
    pub fn from_receipt(
        &self,
        record: &ConfirmationRecord,
        player: Address,
    ) -> Option<DecodedGame> {
        record
            .events
            .iter()
            .filter(|event| event.address == self.game_contract)
            .filter_map(decode_game_played)
            .find(|game| game.player == player)
    }

    /// Path B: `GamePlayed` events for `player` over the last few blocks.
    ///
    /// An event from the wager's own transaction wins; otherwise the most recent one.
    /// Query failures are logged and end the path.
    pub async fn from_history<L: Ledger>(
        &self,
        ledger: &L,
        player: Address,
        handle: &TxHandle,
    ) -> Option<DecodedGame> {
        let latest = match with_retry(self.read_policy, "block number", || {
            ledger.block_number()
        })
        .await
        {
            Ok(latest) => latest,
            Err(err) => {
                warn!(%err, "history fallback: latest block unavailable");
                return None;
            }
        };
        let filter = EventFilter {
            event_signature: game_played_topic(),
            account: player,
            from_block: latest.saturating_sub(self.history_window),
            to_block: None,
        };
        let events = match with_retry(self.read_policy, "past events", || {
            ledger.query_past_events(&filter)
        })
        .await
        {
            Ok(events) => events,
            Err(err) => {
                warn!(%err, "history fallback: event query failed");
                return None;
            }
        };
        debug!(count = events.len(), from_block = filter.from_block, "history events");

        let mut games: Vec<DecodedGame> = events
            .iter()
            .filter_map(decode_game_played)
            .filter(|game| game.player == player)
            .collect();
        games.sort_by_key(|game| game.block_number);
        if let Some(own) = games
            .iter()
            .rposition(|game| game.transaction_hash == Some(handle.0))
        {
            return Some(games.swap_remove(own));
        }
        games.pop()
    }

    /// Path C: random reels and no winnings, marked as synthetic.
    pub fn synthetic(
        request: &WagerRequest,
        handle: TxHandle,
        rng: &mut impl Rng,
    ) -> GameOutcome {
        GameOutcome {
            wager_amount: request.amount,
            symbols: random_reels(rng),
            win_amount: U256::zero(),
            game_id: None,
            source_transaction: handle,
            source: OutcomeSource::Synthetic,
        }
    }

    /// Decoded event if Path A or Path B finds one.
    pub async fn decode<L: Ledger>(
        &self,
        ledger: &L,
        player: Address,
        handle: &TxHandle,
        record: Option<&ConfirmationRecord>,
    ) -> Option<(DecodedGame, OutcomeSource)> {
        if let Some(record) = record
            && let Some(game) = self.from_receipt(record, player)
        {
            return Some((game, OutcomeSource::Receipt));
        }
        match record {
            Some(_) => info!(tx = %handle, "receipt has no GamePlayed event; querying history"),
            None => info!(tx = %handle, "no receipt; querying history"),
        }
        self.from_history(ledger, player, handle)
            .await
            .map(|game| (game, OutcomeSource::History))
    }

    /// Paths A, B, C in order; always yields an outcome.
    pub async fn resolve<L: Ledger>(
        &self,
        ledger: &L,
        request: &WagerRequest,
        handle: &TxHandle,
        record: Option<&ConfirmationRecord>,
    ) -> GameOutcome {
        if let Some((game, source)) =
            self.decode(ledger, request.player, handle, record).await
        {
            info!(tx = %handle, ?source, game_id = %game.game_id, "outcome decoded");
            return game.into_outcome(*handle, source);
        }
        warn!(tx = %handle, "no decodable GamePlayed event; outcome is unconfirmed");
        Self::synthetic(request, *handle, &mut rand::rng())
    }
}
