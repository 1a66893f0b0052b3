use crate::{
    error::{
        Error,
        Result,
    },
    ledger::{
        ConfirmationRecord,
        Ledger,
        TxHandle,
    },
    retry::{
        RetryPolicy,
        with_retry,
    },
};
use ethers::types::{
    Address,
    U256,
};
use tracing::info;

/// Approve this many times the wager so that later wagers of the same size or smaller
/// need no approval round trip.
pub const DEFAULT_APPROVAL_MULTIPLIER: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowanceCheck {
    Sufficient { current: U256 },
    Approved {
        amount: U256,
        record: ConfirmationRecord,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct AllowanceGuard {
    multiplier: u64,
    read_policy: RetryPolicy,
}

impl Default for AllowanceGuard {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVAL_MULTIPLIER, RetryPolicy::READ)
    }
}

impl AllowanceGuard {
    pub fn new(multiplier: u64, read_policy: RetryPolicy) -> Self {
        Self {
            multiplier: multiplier.max(1),
            read_policy,
        }
    }

    /// Make sure `spender` may move `required` of `owner`'s chips.
    ///
    /// Issues at most one approval; a failed approval leaves the allowance untouched and
    /// is returned to the caller.
    pub async fn ensure<L: Ledger>(
        &self,
        ledger: &L,
        owner: Address,
        spender: Address,
        required: U256,
    ) -> Result<AllowanceCheck> {
        let current = with_retry(self.read_policy, "allowance", || {
            ledger.read_allowance(owner, spender)
        })
        .await
        .map_err(Error::read("allowance"))?;
        if current >= required {
            return Ok(AllowanceCheck::Sufficient { current });
        }

        let amount = required.saturating_mul(U256::from(self.multiplier));
        let fee_price = with_retry(self.read_policy, "fee price", || {
            ledger.current_fee_price()
        })
        .await
        .map_err(Error::read("fee price"))?;
        info!(%current, %required, %amount, "allowance too low; approving");
        let record = ledger
            .approve_allowance(spender, amount, fee_price)
            .await
            .map_err(Error::Approval)?;
        if !record.succeeded {
            return Err(Error::ApprovalReverted(TxHandle(record.transaction_hash)));
        }
        Ok(AllowanceCheck::Approved { amount, record })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        error::LedgerError,
        test_helpers::FakeLedger,
    };

    const OWNER: Address = Address::repeat_byte(0xaa);
    const SPENDER: Address = Address::repeat_byte(0xc0);

    #[tokio::test]
    async fn ensure__skips_approval_when_allowance_covers_wager() {
        // given
        let ledger = FakeLedger::new().with_allowance(U256::from(50_000));

        // when
        let check = AllowanceGuard::default()
            .ensure(&ledger, OWNER, SPENDER, U256::from(50_000))
            .await
            .unwrap();

        // then
        assert_eq!(
            check,
            AllowanceCheck::Sufficient {
                current: U256::from(50_000)
            }
        );
        assert_eq!(ledger.calls().approve_allowance, 0);
    }

    #[tokio::test]
    async fn ensure__approves_ten_times_the_wager() {
        // given
        let ledger = FakeLedger::new().with_allowance(U256::zero());

        // when
        let check = AllowanceGuard::default()
            .ensure(&ledger, OWNER, SPENDER, U256::from(50_000))
            .await
            .unwrap();

        // then
        assert!(matches!(check, AllowanceCheck::Approved { amount, .. } if amount == U256::from(500_000)));
        assert_eq!(ledger.approvals(), vec![(SPENDER, U256::from(500_000))]);
        assert_eq!(ledger.allowance(), U256::from(500_000));
    }

    #[tokio::test]
    async fn ensure__reports_rejected_approval_without_changing_allowance() {
        // given
        let ledger = FakeLedger::new()
            .with_allowance(U256::from(10))
            .with_approve_error(LedgerError::UserRejected);

        // when
        let result = AllowanceGuard::default()
            .ensure(&ledger, OWNER, SPENDER, U256::from(50_000))
            .await;

        // then
        let err = result.unwrap_err();
        assert!(err.is_user_rejection());
        assert_eq!(ledger.allowance(), U256::from(10));
    }
}
