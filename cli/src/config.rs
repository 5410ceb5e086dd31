use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use envi_backends::{Backend, LocalBackend};
use envi_core::Secret;
use envi_sync::{
    BackendRegistry, LocalTransport, RepositoryLocator, SyncClient, SyncConfig, SyncServer,
    TrustedLocalIdentity,
};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG_FILE: &str = "envi.toml";
pub const SNAPSHOT_DIR: &str = ".envi";

/// Per-project settings kept in `envi.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("{} not found, run `envi init` first", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid {}", path.display()))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(dir.join(CONFIG_FILE), text)?;
        Ok(())
    }

    pub fn locator(&self) -> Result<RepositoryLocator> {
        let repository = self
            .repository
            .as_deref()
            .ok_or_else(|| anyhow!("No repository configured (envi init --repository OWNER/NAME)"))?;
        Ok(repository.parse()?)
    }
}

/// The project directory with its configuration and resolved store.
pub struct Workspace {
    pub dir: PathBuf,
    pub config: ProjectConfig,
    pub store: PathBuf,
}

impl Workspace {
    pub fn open(cli: &crate::Cli) -> Result<Self> {
        let dir = std::env::current_dir()?;
        let config = ProjectConfig::load(&dir)?;
        let store = resolve_store(cli.store.as_deref(), config.store.as_deref())?;
        Ok(Self { dir, config, store })
    }

    pub fn snapshot_root(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_DIR)
    }

    pub async fn server(&self) -> Result<Arc<SyncServer>> {
        open_server(&self.store).await
    }

    pub async fn client(&self, secret: Secret) -> Result<SyncClient<LocalTransport>> {
        let config = SyncConfig::new(
            self.snapshot_root(),
            self.config.locator()?,
            self.config.user.clone(),
            secret,
        );
        Ok(SyncClient::new(LocalTransport::new(self.server().await?), config))
    }
}

/// Command line, then `envi.toml`, then the platform data directory.
pub fn resolve_store(flag: Option<&Path>, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = flag.or(configured) {
        return Ok(path.to_path_buf());
    }
    let dirs = ProjectDirs::from("dev", "envi", "envi")
        .ok_or_else(|| anyhow!("Could not determine a data directory, pass --store"))?;
    Ok(dirs.data_dir().join("store"))
}

pub async fn open_server(store: &Path) -> Result<Arc<SyncServer>> {
    let backend = LocalBackend::new(store);
    backend.init().await?;
    let backend: Arc<dyn Backend> = Arc::new(backend);
    let registry = Arc::new(BackendRegistry::new(backend.clone()));
    Ok(Arc::new(SyncServer::new(
        Arc::new(TrustedLocalIdentity),
        registry,
        backend,
    )))
}

pub fn read_secret(cli: &crate::Cli) -> Result<Secret> {
    let secret = cli
        .secret
        .clone()
        .or_else(|| {
            print!("Enter repository secret: ");
            io::stdout().flush().ok()?;
            rpassword::read_password().ok()
        })
        .ok_or_else(|| anyhow!("Secret required (--secret or ENVI_SECRET)"))?;
    Ok(Secret::new(secret)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig {
            user: "alice".to_string(),
            repository: Some("alice/web".to_string()),
            store: None,
        };
        config.save(dir.path()).unwrap();

        let text = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(!text.contains("store"));
        assert_eq!(ProjectConfig::load(dir.path()).unwrap(), config);
        assert_eq!(config.locator().unwrap().to_string(), "alice/web");
    }

    #[test]
    fn missing_repository_is_reported() {
        let config = ProjectConfig {
            user: "alice".to_string(),
            ..Default::default()
        };
        assert!(config.locator().is_err());
    }

    #[test]
    fn store_flag_wins() {
        let flag = PathBuf::from("/tmp/flag");
        let configured = PathBuf::from("/tmp/configured");
        assert_eq!(
            resolve_store(Some(&flag), Some(&configured)).unwrap(),
            flag
        );
        assert_eq!(resolve_store(None, Some(&configured)).unwrap(), configured);
    }
}
