use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use ethers::signers::{
    LocalWallet,
    Signer,
};
use rpassword::prompt_password;
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

const KEYSTORE_EXTENSIONS: [&str; 2] = ["json", "wallet"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".slot").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => Ok(PathBuf::from(shellexpand::tilde(raw).into_owned())),
        None => default_wallet_dir(),
    }
}

/// Keystore files in `dir`, sorted by name. A missing directory has no wallets.
pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let path = entry.wrap_err("Failed to read wallet entry")?.path();
        let is_keystore = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| KEYSTORE_EXTENSIONS.contains(&ext));
        if !path.is_file() || !is_keystore {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {}", path.display()))?
            .to_owned();
        wallets.push(WalletDescriptor { name, path });
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    list_wallets(dir)?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.display()))
}

/// Prompt for the keystore password and build a signer bound to `chain_id`.
pub fn unlock_wallet(descriptor: &WalletDescriptor, chain_id: u64) -> Result<LocalWallet> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;

    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;

    let wallet = LocalWallet::from_bytes(&secret).map_err(|_| {
        eyre!(
            "Wallet '{}' contained unsupported key material",
            descriptor.name
        )
    })?;
    Ok(wallet.with_chain_id(chain_id))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn list_wallets__returns_sorted_keystores_only() {
        // given
        let dir = TempDir::new("wallets").unwrap();
        fs::write(dir.path().join("zed.json"), b"{}").unwrap();
        fs::write(dir.path().join("alice.wallet"), b"{}").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        // when
        let wallets = list_wallets(dir.path()).unwrap();

        // then
        let names: Vec<_> = wallets.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "zed"]);
    }

    #[test]
    fn find_wallet__reports_unknown_names() {
        // given
        let dir = TempDir::new("wallets").unwrap();

        // then
        assert!(find_wallet(dir.path(), "bob").is_err());
    }

    #[test]
    fn resolve_wallet_dir__expands_tilde() {
        // given
        let home = std::env::var("HOME").unwrap();

        // when
        let dir = resolve_wallet_dir(Some("~/keys")).unwrap();

        // then
        assert_eq!(dir, PathBuf::from(home).join("keys"));
    }
}
