use crate::{
    error::{
        Error,
        Result,
    },
    ledger::{
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
use tracing::{
    info,
    warn,
};

/// Profile the game contract keeps for every account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerRecord {
    pub is_registered: bool,
    pub nickname: String,
    /// unix seconds
    pub registration_time: U256,
    pub total_bets: U256,
    pub total_wins: U256,
    pub games_played: U256,
    pub pending_rewards: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    Registered(PlayerRecord),
    AlreadyRegistered(PlayerRecord),
}

impl Registration {
    pub fn record(&self) -> &PlayerRecord {
        match self {
            Registration::Registered(record) | Registration::AlreadyRegistered(record) => record,
        }
    }
}

/// Rewards paid out by a confirmed claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Claim {
    pub amount: U256,
    pub transaction: TxHandle,
}

/// `Player_` followed by the last six hex digits of the account.
pub fn default_nickname(account: Address) -> String {
    let hex = format!("{account:x}");
    format!("Player_{}", &hex[hex.len() - 6..])
}

/// Registration and reward bookkeeping against the game contract.
#[derive(Clone, Copy, Debug)]
pub struct PlayerRegistry {
    read_policy: RetryPolicy,
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::READ)
    }
}

impl PlayerRegistry {
    pub fn new(read_policy: RetryPolicy) -> Self {
        Self { read_policy }
    }

    pub async fn read<L: Ledger>(&self, ledger: &L, account: Address) -> Result<PlayerRecord> {
        with_retry(self.read_policy, "player", || ledger.read_player(account))
            .await
            .map_err(Error::read("player"))
    }

    /// Register `account`, unless the contract already knows it.
    ///
    /// Without a nickname the account gets [`default_nickname`]. A registration the
    /// contract refuses because the account is already registered counts as success.
    pub async fn register<L: Ledger>(
        &self,
        ledger: &L,
        account: Address,
        nickname: Option<&str>,
    ) -> Result<Registration> {
        let nickname = match nickname.map(str::trim) {
            Some("") => return Err(Error::EmptyNickname),
            Some(nickname) => nickname.to_string(),
            None => default_nickname(account),
        };
        let current = self.read(ledger, account).await?;
        if current.is_registered {
            return Ok(Registration::AlreadyRegistered(current));
        }

        let fee_price = self.fee_price(ledger).await?;
        info!(%account, %nickname, "registering player");
        let record = match ledger.register_player(&nickname, fee_price).await {
            Ok(record) => record,
            Err(err) if err.is_already_registered() => {
                warn!(%account, "contract reports the account as registered");
                let record = self.read(ledger, account).await?;
                return Ok(Registration::AlreadyRegistered(record));
            }
            Err(err) => return Err(Error::Registration(err)),
        };
        let handle = TxHandle(record.transaction_hash);
        if !record.succeeded {
            return Err(Error::RegistrationReverted(handle));
        }

        let registered = self.read(ledger, account).await?;
        if !registered.is_registered {
            return Err(Error::RegistrationUnconfirmed(handle));
        }
        info!(tx = %handle, nickname = %registered.nickname, "player registered");
        Ok(Registration::Registered(registered))
    }

    /// Claim every pending reward of `account`.
    pub async fn claim<L: Ledger>(&self, ledger: &L, account: Address) -> Result<Claim> {
        let player = self.read(ledger, account).await?;
        if !player.is_registered {
            return Err(Error::NotRegistered(account));
        }
        if player.pending_rewards.is_zero() {
            return Err(Error::NoRewards);
        }

        let fee_price = self.fee_price(ledger).await?;
        let record = ledger
            .claim_rewards(fee_price)
            .await
            .map_err(Error::Claim)?;
        let transaction = TxHandle(record.transaction_hash);
        if !record.succeeded {
            return Err(Error::ClaimReverted(transaction));
        }
        info!(tx = %transaction, amount = %player.pending_rewards, "rewards claimed");
        Ok(Claim {
            amount: player.pending_rewards,
            transaction,
        })
    }

    async fn fee_price<L: Ledger>(&self, ledger: &L) -> Result<U256> {
        with_retry(self.read_policy, "fee price", || ledger.current_fee_price())
            .await
            .map_err(Error::read("fee price"))
    }
}
