use crate::{
    bets::{
        self,
        BET_TIERS,
    },
    wallets,
};
use chrono::Local;
use color_eyre::eyre::{
    Report,
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DEFAULT_TOKEN_DECIMALS,
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use ethers::{
    middleware::SignerMiddleware,
    providers::{
        Http,
        Middleware,
        Provider,
    },
    signers::{
        LocalWallet,
        Signer,
    },
    types::{
        Address,
        U256,
    },
};
use std::{
    io::Write,
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{
        AsyncBufReadExt,
        BufReader,
    },
    time,
};
use tracing::info;
use wager_orchestrator::{
    AudioConfig,
    AudioHandle,
    EvmLedger,
    GameOutcome,
    Orchestrator,
    OrchestratorConfig,
    Registration,
    WagerRequest,
    audio::terminal_backend::TerminalAudio,
};

pub const DEFAULT_MAINNET_RPC_URL: &str = "https://rpc.xlayer.tech";
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://testrpc.xlayer.tech";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_GAME_CONTRACT: &str = "0x7415e413f49f0AE94D741b8d9D3cBAA362EF1099";
pub const DEFAULT_TOKEN_CONTRACT: &str = "0x798095d5BF06edeF0aEB82c10DCDa5a92f58834E";
const DEFAULT_TICKER: &str = "tokens";
const RECONCILE_DELAY: Duration = Duration::from_secs(5);

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkTarget {
    Mainnet { url: Option<String> },
    Testnet { url: Option<String> },
    LocalNode { url: Option<String> },
}

impl NetworkTarget {
    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Mainnet { .. } => DeploymentEnv::Mainnet,
            NetworkTarget::Testnet { .. } => DeploymentEnv::Testnet,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }

    fn custom_url(&self) -> Option<&str> {
        match self {
            NetworkTarget::Mainnet { url }
            | NetworkTarget::Testnet { url }
            | NetworkTarget::LocalNode { url } => url.as_deref(),
        }
    }

    fn default_url(&self) -> &'static str {
        match self {
            NetworkTarget::Mainnet { .. } => DEFAULT_MAINNET_RPC_URL,
            NetworkTarget::Testnet { .. } => DEFAULT_TESTNET_RPC_URL,
            NetworkTarget::LocalNode { .. } => DEFAULT_LOCAL_RPC_URL,
        }
    }
}

/// Addresses given on the command line; they win over the deployment record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContractOverrides {
    pub contract: Option<String>,
    pub token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WalletConfig {
    pub name: String,
    pub dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct AudioSettings {
    pub enabled: bool,
    pub asset_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub overrides: ContractOverrides,
    pub wallet: WalletConfig,
    pub audio: AudioSettings,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDeployment {
    pub rpc_url: String,
    pub game: Address,
    pub token: Address,
    pub decimals: u32,
    pub ticker: String,
}

pub fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|e| eyre!("Invalid address '{raw}': {e}"))
}

/// Command-line values first, then the stored record, then the published mainnet
/// deployment. Other networks have no built-in addresses.
pub fn resolve_deployment(
    network: &NetworkTarget,
    overrides: &ContractOverrides,
    record: Option<&DeploymentRecord>,
) -> Result<ResolvedDeployment> {
    let builtin = |value: &'static str| match network {
        NetworkTarget::Mainnet { .. } => Some(value.to_string()),
        _ => None,
    };
    let pick = |flag: &Option<String>, stored: Option<&String>, fallback: &'static str| {
        flag.clone()
            .or_else(|| stored.cloned())
            .or_else(|| builtin(fallback))
    };

    let game = pick(
        &overrides.contract,
        record.map(|r| &r.contract_address),
        DEFAULT_GAME_CONTRACT,
    )
    .ok_or_else(|| {
        eyre!(
            "No game contract known for {}; pass --contract or run `configure`",
            network.env()
        )
    })?;
    let token = pick(
        &overrides.token,
        record.map(|r| &r.token_address),
        DEFAULT_TOKEN_CONTRACT,
    )
    .ok_or_else(|| {
        eyre!(
            "No token contract known for {}; pass --token or run `configure`",
            network.env()
        )
    })?;
    let rpc_url = network
        .custom_url()
        .map(str::to_string)
        .or_else(|| record.map(|r| r.network_url.clone()))
        .unwrap_or_else(|| network.default_url().to_string());

    Ok(ResolvedDeployment {
        rpc_url,
        game: parse_address(&game)?,
        token: parse_address(&token)?,
        decimals: record.map_or(DEFAULT_TOKEN_DECIMALS, DeploymentRecord::decimals),
        ticker: record
            .and_then(|r| r.token_ticker.clone())
            .unwrap_or_else(|| DEFAULT_TICKER.to_string()),
    })
}

pub fn load_record(env: DeploymentEnv) -> Result<Option<DeploymentRecord>> {
    let store = DeploymentStore::new(env).map_err(|e| eyre!("{e:#}"))?;
    store.load().map_err(|e| eyre!("{e:#}"))
}

pub async fn connect_provider(rpc_url: &str) -> Result<(Provider<Http>, u64)> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .wrap_err_with(|| format!("Invalid RPC URL {rpc_url}"))?;
    let chain_id = provider
        .get_chainid()
        .await
        .wrap_err("Failed to fetch chain id")?
        .as_u64();
    Ok((provider, chain_id))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayCommand {
    Spin(u64),
    Repeat,
    Balance,
    Status,
    /// `None` registers under the default nickname
    Register(Option<String>),
    Claim,
    ToggleAudio,
    Payouts,
    Help,
    Quit,
    Empty,
}

pub fn parse_command(line: &str) -> Result<PlayCommand> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    if matches!(word.to_ascii_lowercase().as_str(), "r" | "register") {
        let nickname = rest.trim();
        return Ok(PlayCommand::Register(
            (!nickname.is_empty()).then(|| nickname.to_string()),
        ));
    }
    let command = match line.to_ascii_lowercase().as_str() {
        "" => PlayCommand::Empty,
        "s" | "spin" => PlayCommand::Repeat,
        "b" | "balance" => PlayCommand::Balance,
        "i" | "status" => PlayCommand::Status,
        "c" | "claim" => PlayCommand::Claim,
        "m" | "mute" | "audio" => PlayCommand::ToggleAudio,
        "p" | "payouts" => PlayCommand::Payouts,
        "h" | "help" | "?" => PlayCommand::Help,
        "q" | "quit" | "exit" => PlayCommand::Quit,
        other => {
            let tokens: u64 = other
                .replace(['_', ','], "")
                .parse()
                .map_err(|_| eyre!("Unknown command '{line}'; type h for help"))?;
            PlayCommand::Spin(bets::validate_tier(tokens)?)
        }
    };
    Ok(command)
}

fn help_text() -> String {
    format!(
        "Commands:\n\
         \x20 <tier>   spin with that bet ({})\n\
         \x20 s        spin again with the last bet\n\
         \x20 b        show balance\n\
         \x20 i        show registration, rewards and prize pool\n\
         \x20 r [name] register, optionally under a nickname\n\
         \x20 c        claim pending rewards\n\
         \x20 m        toggle audio\n\
         \x20 p        show payouts\n\
         \x20 q        quit",
        bets::tier_list()
    )
}

/// Start the audio worker on the speakers when built with them, otherwise on the
/// terminal bell.
#[cfg(feature = "speaker")]
fn spawn_audio(settings: &AudioSettings) -> AudioHandle {
    use wager_orchestrator::audio::speaker_backend::SpeakerAudio;

    let config = audio_config(settings);
    match SpeakerAudio::open(settings.asset_dir.clone()) {
        Ok(speaker) => AudioHandle::spawn(speaker, config).0,
        Err(err) => {
            tracing::warn!(%err, "no audio output device; using the terminal bell");
            AudioHandle::spawn(TerminalAudio::new(), config).0
        }
    }
}

#[cfg(not(feature = "speaker"))]
fn spawn_audio(settings: &AudioSettings) -> AudioHandle {
    tracing::debug!(
        assets = %settings.asset_dir.display(),
        "built without speaker support; audio assets are not played"
    );
    let config = audio_config(settings);
    AudioHandle::spawn(TerminalAudio::new(), config).0
}

fn audio_config(settings: &AudioSettings) -> AudioConfig {
    AudioConfig {
        enabled: settings.enabled,
        ..AudioConfig::default()
    }
}

pub struct AppController {
    orchestrator: Orchestrator<EvmLedger<Client>>,
    player: Address,
    deployment: ResolvedDeployment,
    audio_enabled: bool,
    last_bet: u64,
}

impl AppController {
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let record = load_record(config.network.env())?;
        let deployment =
            resolve_deployment(&config.network, &config.overrides, record.as_ref())?;
        let (provider, chain_id) = connect_provider(&deployment.rpc_url).await?;

        let descriptor = wallets::find_wallet(&config.wallet.dir, &config.wallet.name)?;
        let wallet = wallets::unlock_wallet(&descriptor, chain_id)?;
        let player = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let ledger = EvmLedger::new(client, deployment.game, deployment.token);

        let audio = spawn_audio(&config.audio);
        let orchestrator =
            Orchestrator::new(ledger, OrchestratorConfig::new(deployment.game), audio);

        info!(
            %player,
            game = ?deployment.game,
            token = ?deployment.token,
            chain_id,
            rpc = %deployment.rpc_url,
            "connected"
        );
        Ok(Self {
            orchestrator,
            player,
            deployment,
            audio_enabled: config.audio.enabled,
            last_bet: BET_TIERS[0],
        })
    }

    pub fn player(&self) -> Address {
        self.player
    }

    fn format(&self, amount: U256) -> String {
        format!(
            "{} {}",
            bets::format_amount(amount, self.deployment.decimals),
            self.deployment.ticker
        )
    }

    pub async fn print_balance(&self) -> Result<()> {
        let balance = self.orchestrator.balance(self.player).await?;
        println!("Balance of {:?}: {}", self.player, self.format(balance));
        Ok(())
    }

    pub async fn print_status(&self) -> Result<()> {
        let status = self.orchestrator.status(self.player).await?;
        let player = &status.player;
        if player.is_registered {
            println!(
                "{} ({:?}): {} games, bet {}, won {}",
                player.nickname,
                self.player,
                player.games_played,
                self.format(player.total_bets),
                self.format(player.total_wins)
            );
        } else {
            println!("{:?} is not registered; type r [nickname] to register", self.player);
        }
        println!("Balance:         {}", self.format(status.balance));
        println!("Pending rewards: {}", self.format(player.pending_rewards));
        println!("Prize pool:      {}", self.format(status.prize_pool));
        Ok(())
    }

    pub async fn register(&mut self, nickname: Option<&str>) -> Result<()> {
        match self.orchestrator.register(self.player, nickname).await? {
            Registration::Registered(record) => {
                println!("Registered as {}", record.nickname)
            }
            Registration::AlreadyRegistered(record) => {
                println!("Already registered as {}", record.nickname)
            }
        }
        Ok(())
    }

    pub async fn claim(&mut self) -> Result<()> {
        let claim = self.orchestrator.claim_rewards(self.player).await?;
        println!(
            "Claimed {} (tx {})",
            self.format(claim.amount),
            claim.transaction
        );
        Ok(())
    }

    /// One wager. An unconfirmed result is checked once more after a short delay.
    pub async fn spin(&mut self, tokens: u64) -> Result<GameOutcome> {
        let tokens = bets::validate_tier(tokens)?;
        let amount = bets::to_base_units(tokens, self.deployment.decimals)?;
        let request = WagerRequest::new(amount, self.player)?;
        self.last_bet = tokens;

        println!("Spinning for {}...", self.format(amount));
        let outcome = self.orchestrator.submit_and_resolve_wager(&request).await?;
        self.report(&outcome);
        if outcome.is_confirmed() {
            return Ok(outcome);
        }

        println!(
            "Result not confirmed yet; checking again in {}s",
            RECONCILE_DELAY.as_secs()
        );
        time::sleep(RECONCILE_DELAY).await;
        match self.orchestrator.reconcile(&request, &outcome).await {
            Some(confirmed) => {
                self.report(&confirmed);
                Ok(confirmed)
            }
            None => {
                println!(
                    "Could not confirm the result of {}; check your balance before spinning again",
                    outcome.source_transaction
                );
                Ok(outcome)
            }
        }
    }

    fn report(&self, outcome: &GameOutcome) {
        let reels = outcome
            .symbols
            .iter()
            .map(|symbol| symbol.glyph())
            .collect::<Vec<_>>()
            .join(" | ");
        let stamp = Local::now().format("%H:%M:%S");
        let tx = outcome.source_transaction;
        if !outcome.is_confirmed() {
            println!("[{stamp}] [ {reels} ]  UNCONFIRMED  (tx {tx})");
            return;
        }
        let game = outcome
            .game_id
            .map(|id| format!("game #{id}, "))
            .unwrap_or_default();
        if outcome.is_win() {
            println!(
                "[{stamp}] [ {reels} ]  WIN {}  ({game}tx {tx})",
                self.format(outcome.win_amount)
            );
        } else {
            println!("[{stamp}] [ {reels} ]  no win  ({game}tx {tx})");
        }
    }

    fn report_error(&self, err: &Report) {
        match err.downcast_ref::<wager_orchestrator::Error>() {
            Some(err) if err.is_user_rejection() => {
                println!("Transaction rejected; spin again to retry")
            }
            Some(wager_orchestrator::Error::InsufficientBalance { balance, required }) => {
                println!(
                    "Insufficient balance: have {}, need {}",
                    self.format(*balance),
                    self.format(*required)
                )
            }
            Some(wager_orchestrator::Error::NotRegistered(_)) => {
                println!("Register first: type r [nickname]")
            }
            Some(wager_orchestrator::Error::NoRewards) => println!("No rewards to claim"),
            _ => println!("Failed: {err}; try again"),
        }
    }

    fn toggle_audio(&mut self) {
        self.audio_enabled = !self.audio_enabled;
        self.orchestrator
            .audio()
            .set_master_audio_enabled(self.audio_enabled);
        println!("Audio {}", if self.audio_enabled { "on" } else { "off" });
    }

    pub async fn run_play_loop(&mut self) -> Result<()> {
        println!("{}", help_text());
        if let Err(err) = self.print_status().await {
            println!("Status unavailable: {err}");
        }
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("bet {} > ", self.last_bet);
            std::io::stdout().flush().wrap_err("Failed to flush stdout")?;
            let Some(line) = lines.next_line().await.wrap_err("Failed to read input")? else {
                break;
            };
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            };
            match command {
                PlayCommand::Spin(tokens) => {
                    if let Err(err) = self.spin(tokens).await {
                        self.report_error(&err);
                    }
                }
                PlayCommand::Repeat => {
                    if let Err(err) = self.spin(self.last_bet).await {
                        self.report_error(&err);
                    }
                }
                PlayCommand::Balance => {
                    if let Err(err) = self.print_balance().await {
                        println!("Balance unavailable: {err}");
                    }
                }
                PlayCommand::Status => {
                    if let Err(err) = self.print_status().await {
                        println!("Status unavailable: {err}");
                    }
                }
                PlayCommand::Register(nickname) => {
                    if let Err(err) = self.register(nickname.as_deref()).await {
                        self.report_error(&err);
                    }
                }
                PlayCommand::Claim => {
                    if let Err(err) = self.claim().await {
                        self.report_error(&err);
                    }
                }
                PlayCommand::ToggleAudio => self.toggle_audio(),
                PlayCommand::Payouts => print!("{}", bets::payout_table()),
                PlayCommand::Help => println!("{}", help_text()),
                PlayCommand::Quit => break,
                PlayCommand::Empty => {}
            }
        }
        Ok(())
    }
}
