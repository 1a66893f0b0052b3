use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";
pub const DEFAULT_TOKEN_DECIMALS: u32 = 18;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Mainnet,
    Testnet,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Mainnet => "mainnet",
            DeploymentEnv::Testnet => "testnet",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Mainnet => "Mainnet",
            DeploymentEnv::Testnet => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Where the game and its chip token live on one network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub contract_address: String,
    pub token_address: String,
    pub network_url: String,
    pub chain_id: u64,
    #[serde(default)]
    pub token_decimals: Option<u32>,
    #[serde(default)]
    pub token_ticker: Option<String>,
    #[serde(default)]
    pub deployment_block_height: Option<u64>,
}

impl DeploymentRecord {
    pub fn decimals(&self) -> u32 {
        self.token_decimals.unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::new_in(DEPLOYMENTS_ROOT, env)
    }

    pub fn new_in(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: DeploymentRecord) -> Result<()> {
        write_record(&self.path, &record)
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in [
        DeploymentEnv::Mainnet,
        DeploymentEnv::Testnet,
        DeploymentEnv::Local,
    ] {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    if !root.exists() {
        fs::create_dir_all(root).with_context(|| {
            format!("Failed to create deployments directory {}", root.display())
        })?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create {} directory", env_dir.display())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"").with_context(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) || data.is_empty() {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}

pub fn record_deployment(
    store: &DeploymentStore,
    contract_address: impl AsRef<str>,
    token_address: impl AsRef<str>,
    network_url: impl AsRef<str>,
    chain_id: u64,
    token_decimals: Option<u32>,
) -> Result<DeploymentRecord> {
    let record = DeploymentRecord {
        recorded_at: Utc::now().to_rfc3339(),
        contract_address: contract_address.as_ref().to_string(),
        token_address: token_address.as_ref().to_string(),
        network_url: network_url.as_ref().to_string(),
        chain_id,
        token_decimals,
        token_ticker: None,
        deployment_block_height: None,
    };
    store.save(record.clone())?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn load__returns_none_for_fresh_store() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::new_in(dir.path(), DeploymentEnv::Local).unwrap();

        // when
        let record = store.load().unwrap();

        // then
        assert!(record.is_none());
    }

    #[test]
    fn record_deployment__is_read_back_by_load() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::new_in(dir.path(), DeploymentEnv::Testnet).unwrap();

        // when
        let saved = record_deployment(
            &store,
            "0x7415e413f49f0AE94D741b8d9D3cBAA362EF1099",
            "0x798095d5BF06edeF0aEB82c10DCDa5a92f58834E",
            "https://testrpc.xlayer.tech",
            195,
            None,
        )
        .unwrap();

        // then
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(saved, loaded);
        assert_eq!(loaded.decimals(), DEFAULT_TOKEN_DECIMALS);
    }

    #[test]
    fn load__takes_last_entry_of_a_record_list() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::new_in(dir.path(), DeploymentEnv::Local).unwrap();
        let first = DeploymentRecord {
            recorded_at: "2024-01-01T00:00:00Z".into(),
            contract_address: "0x01".into(),
            token_address: "0x02".into(),
            network_url: "http://localhost:8545".into(),
            chain_id: 31337,
            token_decimals: Some(6),
            token_ticker: None,
            deployment_block_height: None,
        };
        let second = DeploymentRecord {
            contract_address: "0x03".into(),
            ..first.clone()
        };
        fs::write(store.path(), serde_json::to_vec(&vec![first, second.clone()]).unwrap())
            .unwrap();

        // when
        let loaded = store.load().unwrap();

        // then
        assert_eq!(loaded, Some(second));
    }
}
