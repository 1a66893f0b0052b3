#![allow(non_snake_case)]

use ethers::types::{
    Address,
    H256,
    U256,
};
use generated_abi::test_helpers::GamePlayedLog;
use proptest::prelude::*;
use tokio::time::Instant;
use wager_orchestrator::{
    AudioHandle,
    LedgerError,
    Orchestrator,
    OrchestratorConfig,
    OutcomeSource,
    Symbol,
    WagerRequest,
    decoder::{
        DEFAULT_HISTORY_WINDOW,
        OutcomeDecoder,
    },
    ledger::TxHandle,
    retry::RetryPolicy,
    test_helpers::FakeLedger,
};

const GAME: Address = Address::repeat_byte(0xc0);
const PLAYER: Address = Address::repeat_byte(0xaa);

fn orchestrator(ledger: &FakeLedger) -> Orchestrator<FakeLedger> {
    Orchestrator::new(
        ledger.clone(),
        OrchestratorConfig::new(GAME),
        AudioHandle::detached(),
    )
}

fn wager(amount: u64) -> WagerRequest {
    WagerRequest::new(U256::from(amount), PLAYER).unwrap()
}

#[tokio::test(start_paused = true)]
async fn submit_and_resolve_wager__falls_back_to_history_when_receipt_never_arrives() {
    // given
    let historical = GamePlayedLog::new(GAME, PLAYER)
        .game_id(77)
        .symbols([7, 7, 7])
        .bet_amount(100_000u64)
        .win_amount(5_000_000u64)
        .block_number(99)
        .transaction_hash(FakeLedger::DEFAULT_TX_HASH)
        .build();
    let ledger = FakeLedger::new()
        .with_allowance(10_000_000u64)
        .with_block_number(100)
        .with_past_events(vec![historical]);
    let mut orchestrator = orchestrator(&ledger);

    // when
    let outcome = orchestrator
        .submit_and_resolve_wager(&wager(100_000))
        .await
        .unwrap();

    // then
    assert_eq!(ledger.calls().fetch_receipt, 10);
    assert_eq!(ledger.calls().query_past_events, 1);
    assert_eq!(outcome.source, OutcomeSource::History);
    assert_eq!(outcome.symbols, [Symbol::Diamond; 3]);
    assert_eq!(outcome.win_amount, U256::from(5_000_000));
    assert_eq!(outcome.game_id, Some(U256::from(77)));
    assert!(outcome.is_confirmed());
}

#[tokio::test(start_paused = true)]
async fn submit_and_resolve_wager__uses_history_when_receipt_lacks_the_event() {
    // given
    let historical = GamePlayedLog::new(GAME, PLAYER)
        .game_id(5)
        .symbols([1, 2, 3])
        .block_number(98)
        .build();
    let ledger = FakeLedger::new()
        .with_allowance(10_000_000u64)
        .with_receipts([Ok(Some(FakeLedger::receipt(Vec::new())))])
        .with_past_events(vec![historical]);
    let mut orchestrator = orchestrator(&ledger);

    // when
    let outcome = orchestrator
        .submit_and_resolve_wager(&wager(30_000))
        .await
        .unwrap();

    // then
    assert_eq!(ledger.calls().fetch_receipt, 1);
    assert_eq!(outcome.source, OutcomeSource::History);
    assert_eq!(
        outcome.symbols,
        [Symbol::Lemon, Symbol::Orange, Symbol::Grape]
    );
    let filter = ledger.last_filter().unwrap();
    assert_eq!(filter.from_block, 100 - DEFAULT_HISTORY_WINDOW);
    assert_eq!(filter.account, PLAYER);
}

#[tokio::test(start_paused = true)]
async fn submit_and_resolve_wager__polling_errors_count_as_not_yet_available() {
    // given
    let event = GamePlayedLog::new(GAME, PLAYER).game_id(3).build();
    let ledger = FakeLedger::new().with_allowance(10_000_000u64).with_receipts([
        Err(LedgerError::Network("502 bad gateway".to_string())),
        Ok(None),
        Err(LedgerError::Network("timeout".to_string())),
        Ok(Some(FakeLedger::receipt(vec![event]))),
    ]);
    let mut orchestrator = orchestrator(&ledger);

    // when
    let outcome = orchestrator
        .submit_and_resolve_wager(&wager(30_000))
        .await
        .unwrap();

    // then
    assert_eq!(ledger.calls().fetch_receipt, 4);
    assert_eq!(outcome.source, OutcomeSource::Receipt);
    assert_eq!(outcome.game_id, Some(U256::from(3)));
}

#[tokio::test(start_paused = true)]
async fn submit_and_resolve_wager__nothing_decodable_yields_unconfirmed_zero_win() {
    // given
    let ledger = FakeLedger::new().with_allowance(10_000_000u64);
    let mut orchestrator = orchestrator(&ledger);
    let started = Instant::now();

    // when
    let outcome = orchestrator
        .submit_and_resolve_wager(&wager(30_000))
        .await
        .unwrap();

    // then
    assert!(!outcome.is_win());
    assert_eq!(outcome.win_amount, U256::zero());
    assert!(!outcome.is_confirmed());
    assert_eq!(outcome.source, OutcomeSource::Synthetic);
    assert_eq!(outcome.source_transaction, TxHandle(FakeLedger::DEFAULT_TX_HASH));
    assert!(started.elapsed() <= RetryPolicy::RECEIPT.max_wait());
}

#[tokio::test(start_paused = true)]
async fn submit_and_resolve_wager__ignores_other_players_history() {
    // given
    let stranger = GamePlayedLog::new(GAME, Address::repeat_byte(0x99))
        .win_amount(1_000_000u64)
        .build();
    let ledger = FakeLedger::new()
        .with_allowance(10_000_000u64)
        .with_past_events(vec![stranger]);
    let mut orchestrator = orchestrator(&ledger);

    // when
    let outcome = orchestrator
        .submit_and_resolve_wager(&wager(30_000))
        .await
        .unwrap();

    // then
    assert_eq!(outcome.source, OutcomeSource::Synthetic);
    assert_eq!(outcome.win_amount, U256::zero());
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn resolve__history_matches_the_decoded_entry(
        codes in prop::array::uniform3(0u8..8),
        bet in 1u64..=1_000_000,
        win in 0u64..=50_000_000,
        game_id in 1u64..=u64::MAX,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            // given
            let event = GamePlayedLog::new(GAME, PLAYER)
                .game_id(game_id)
                .symbols(codes)
                .bet_amount(bet)
                .win_amount(win)
                .block_number(97)
                .build();
            let ledger = FakeLedger::new().with_past_events(vec![event]);
            let decoder = OutcomeDecoder::new(GAME, DEFAULT_HISTORY_WINDOW, RetryPolicy::READ);
            let request = WagerRequest::new(U256::from(bet), PLAYER).unwrap();
            let handle = TxHandle(H256::repeat_byte(0x55));

            // when
            let outcome = decoder
                .resolve(&ledger, &request, &handle, Some(&FakeLedger::receipt(Vec::new())))
                .await;

            // then
            let expected: Vec<_> = codes.iter().map(|c| Symbol::from_code(*c).unwrap()).collect();
            assert_eq!(outcome.source, OutcomeSource::History);
            assert_eq!(outcome.symbols.to_vec(), expected);
            assert_eq!(outcome.wager_amount, U256::from(bet));
            assert_eq!(outcome.win_amount, U256::from(win));
            assert_eq!(outcome.game_id, Some(U256::from(game_id)));
        });
    }
}
