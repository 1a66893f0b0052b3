use crate::ledger::TxHandle;
use ethers::types::{
    Address,
    U256,
};
use thiserror::Error;

/// Failure modes of a single remote call against the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("request rejected by the user")]
    UserRejected,
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("network error: {0}")]
    Network(String),
}

impl LedgerError {
    /// Sort a raw node/wallet error message into the taxonomy.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("rejected by user")
        {
            LedgerError::UserRejected
        } else if lower.contains("insufficient funds")
            || lower.contains("exceeds balance")
            || lower.contains("insufficient allowance")
            || lower.contains("exceeds allowance")
        {
            LedgerError::InsufficientFunds(message)
        } else {
            LedgerError::Network(message)
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_))
    }

    /// The contract refused a registration for an account it already knows.
    pub fn is_already_registered(&self) -> bool {
        match self {
            LedgerError::UserRejected => false,
            LedgerError::InsufficientFunds(message) | LedgerError::Network(message) => {
                message.to_ascii_lowercase().contains("already registered")
            }
        }
    }
}

/// Error type for wager operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("wager amount must be greater than zero")]
    ZeroWager,
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: U256, required: U256 },
    #[error("failed to read {context}: {source}")]
    Read {
        context: &'static str,
        #[source]
        source: LedgerError,
    },
    #[error("allowance approval failed: {0}")]
    Approval(#[source] LedgerError),
    #[error("allowance approval {0} reverted")]
    ApprovalReverted(TxHandle),
    #[error("wager submission failed: {0}")]
    Submission(#[source] LedgerError),
    #[error("wager transaction {0} reverted")]
    Reverted(TxHandle),
    #[error("account {0:#x} is not registered")]
    NotRegistered(Address),
    #[error("nickname must not be empty")]
    EmptyNickname,
    #[error("registration failed: {0}")]
    Registration(#[source] LedgerError),
    #[error("registration {0} reverted")]
    RegistrationReverted(TxHandle),
    #[error("registration {0} confirmed but the account is still unregistered")]
    RegistrationUnconfirmed(TxHandle),
    #[error("no rewards to claim")]
    NoRewards,
    #[error("reward claim failed: {0}")]
    Claim(#[source] LedgerError),
    #[error("reward claim {0} reverted")]
    ClaimReverted(TxHandle),
}

impl Error {
    pub(crate) fn read(context: &'static str) -> impl FnOnce(LedgerError) -> Self {
        move |source| Error::Read { context, source }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self,
            Error::Approval(LedgerError::UserRejected)
                | Error::Submission(LedgerError::UserRejected)
                | Error::Registration(LedgerError::UserRejected)
                | Error::Claim(LedgerError::UserRejected)
        )
    }
}

/// Result type for wager operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn classify__recognises_wallet_rejection() {
        let err = LedgerError::classify("MetaMask Tx Signature: User denied transaction");
        assert_eq!(err, LedgerError::UserRejected);
        assert!(!err.is_transient());
    }

    #[test]
    fn classify__recognises_insufficient_funds() {
        let err = LedgerError::classify(
            "(code: -32000, message: insufficient funds for gas * price + value)",
        );
        assert!(matches!(err, LedgerError::InsufficientFunds(_)));
    }

    #[test]
    fn is_already_registered__matches_the_revert_reason_only() {
        assert!(
            LedgerError::classify("execution reverted: User already registered")
                .is_already_registered()
        );
        assert!(!LedgerError::classify("nonce too low").is_already_registered());
        assert!(!LedgerError::UserRejected.is_already_registered());
    }

    #[test]
    fn classify__defaults_to_transient_network_error() {
        let err = LedgerError::classify("error sending request for url");
        assert!(err.is_transient());
    }
}
