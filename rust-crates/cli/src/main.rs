use clap::{
    ArgGroup,
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentStore,
    record_deployment,
};
use std::path::{
    Path,
    PathBuf,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod bets;
mod client;
mod wallets;

const DEFAULT_LOG_FILTER: &str = "warn,wager_orchestrator=info,slot_cli=info";
const LOG_FILE_PREFIX: &str = "slot-cli.log";

#[derive(Parser, Debug)]
#[command(
    name = "slot-cli",
    about = "Play the on-chain slot machine from a terminal",
    version,
    group(ArgGroup::new("network").args(["mainnet", "testnet", "local"]))
)]
struct Args {
    /// X Layer mainnet (default)
    #[arg(long)]
    mainnet: bool,

    /// X Layer testnet
    #[arg(long)]
    testnet: bool,

    /// A local development node
    #[arg(long)]
    local: bool,

    /// Override the RPC URL for the selected network
    #[arg(long)]
    rpc_url: Option<String>,

    /// Game contract address
    #[arg(long)]
    contract: Option<String>,

    /// Chip token address
    #[arg(long)]
    token: Option<String>,

    /// Keystore wallet to play with
    #[arg(long)]
    wallet: Option<String>,

    /// Keystore directory (defaults to ~/.slot/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Directory holding the audio assets
    #[arg(long, default_value = "assets")]
    audio_dir: PathBuf,

    /// Start with audio off
    #[arg(long)]
    no_audio: bool,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Interactive play loop (default)
    Play,
    /// Spin once and exit
    Spin {
        /// Bet in whole tokens; must be one of the bet tiers
        #[arg(long)]
        amount: u64,
    },
    /// Show the wallet's chip balance
    Balance,
    /// Show registration, pending rewards and the prize pool
    Status,
    /// Register the wallet with the game contract
    Register {
        /// Defaults to Player_ and the last six hex digits of the address
        #[arg(long)]
        nickname: Option<String>,
    },
    /// Claim pending rewards
    Claim,
    /// Show the payout table
    Payouts,
    /// Record contract and token addresses for the selected network
    Configure {
        /// Token decimals (defaults to 18)
        #[arg(long)]
        decimals: Option<u32>,
    },
}

impl Args {
    fn network(&self) -> client::NetworkTarget {
        let url = self.rpc_url.clone();
        if self.testnet {
            client::NetworkTarget::Testnet { url }
        } else if self.local {
            client::NetworkTarget::LocalNode { url }
        } else {
            client::NetworkTarget::Mainnet { url }
        }
    }

    fn app_config(&self) -> Result<client::AppConfig> {
        let name = self
            .wallet
            .clone()
            .ok_or_else(|| eyre!("Specify --wallet <name> to select a keystore"))?;
        let dir = wallets::resolve_wallet_dir(self.wallet_dir.as_deref())?;
        Ok(client::AppConfig {
            network: self.network(),
            overrides: client::ContractOverrides {
                contract: self.contract.clone(),
                token: self.token.clone(),
            },
            wallet: client::WalletConfig { name, dir },
            audio: client::AudioSettings {
                enabled: !self.no_audio,
                asset_dir: self.audio_dir.clone(),
            },
        })
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            builder
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .map_err(|e| eyre!("Failed to install log subscriber: {e}"))?;
            Ok(Some(guard))
        }
        None => {
            builder
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| eyre!("Failed to install log subscriber: {e}"))?;
            Ok(None)
        }
    }
}

async fn configure(args: &Args, decimals: Option<u32>) -> Result<()> {
    let network = args.network();
    let record = client::load_record(network.env())?;
    let resolved = client::resolve_deployment(
        &network,
        &client::ContractOverrides {
            contract: args.contract.clone(),
            token: args.token.clone(),
        },
        record.as_ref(),
    )?;
    let (_, chain_id) = client::connect_provider(&resolved.rpc_url).await?;
    let store = DeploymentStore::new(network.env()).map_err(|e| eyre!("{e:#}"))?;
    let saved = record_deployment(
        &store,
        format!("{:?}", resolved.game),
        format!("{:?}", resolved.token),
        &resolved.rpc_url,
        chain_id,
        decimals.or(record.and_then(|r| r.token_decimals)),
    )
    .map_err(|e| eyre!("{e:#}"))?;
    println!(
        "Recorded {} deployment in {}: game {}, token {}, chain {}",
        network.env(),
        store.path().display(),
        saved.contract_address,
        saved.token_address,
        saved.chain_id
    );
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let command = args.command.clone().unwrap_or(Command::Play);
    match command {
        Command::Payouts => {
            print!("{}", bets::payout_table());
            Ok(())
        }
        Command::Configure { decimals } => configure(&args, decimals).await,
        Command::Balance => {
            let controller = client::AppController::connect(args.app_config()?).await?;
            controller.print_balance().await
        }
        Command::Status => {
            let controller = client::AppController::connect(args.app_config()?).await?;
            controller.print_status().await
        }
        Command::Register { nickname } => {
            let mut controller = client::AppController::connect(args.app_config()?).await?;
            controller.register(nickname.as_deref()).await
        }
        Command::Claim => {
            let mut controller = client::AppController::connect(args.app_config()?).await?;
            controller.claim().await
        }
        Command::Spin { amount } => {
            let mut controller = client::AppController::connect(args.app_config()?).await?;
            controller.spin(amount).await.map(|_| ())
        }
        Command::Play => {
            let mut controller = client::AppController::connect(args.app_config()?).await?;
            println!("Playing as {:?}", controller.player());
            controller.run_play_loop().await
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref())?;
    tracing::info!("starting slot-cli");
    deployments::ensure_structure().map_err(|e| eyre!("{e:#}"))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("Failed to start async runtime")?;
    runtime.block_on(run(args))
}
