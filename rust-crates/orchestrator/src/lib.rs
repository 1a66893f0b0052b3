//! Wager lifecycle for the slot machine: registration, allowance, submission,
//! confirmation, outcome decoding and the audio feedback that follows a spin.
pub mod allowance;
pub mod audio;
pub mod decoder;
pub mod error;
pub mod ledger;
pub mod outcome;
pub mod pipeline;
pub mod player;
pub mod retry;
pub mod symbols;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use audio::{
    AudioConfig,
    AudioHandle,
    AudioState,
};
pub use error::{
    Error,
    LedgerError,
    Result,
};
pub use ledger::{
    Ledger,
    TxHandle,
    evm_ledger::EvmLedger,
};
pub use outcome::{
    GameOutcome,
    OutcomeSource,
    WagerRequest,
};
pub use pipeline::{
    Orchestrator,
    OrchestratorConfig,
    PipelineStage,
    PlayerStatus,
};
pub use player::{
    Claim,
    PlayerRecord,
    Registration,
    default_nickname,
};
pub use symbols::Symbol;
