//! Durable storage for the device identity and gateway-issued device tokens.
//!
//! Defines the [`IdentityStore`] trait and two backends: [`FileIdentityStore`],
//! which keeps JSON files under `~/.gatelink/identity/`, and
//! [`MemoryIdentityStore`] for tests and ephemeral sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gatelink_core::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::Result;

/// Current on-disk identity record version.
pub const IDENTITY_RECORD_VERSION: u32 = 1;

const IDENTITY_FILE: &str = "device.json";
const DEVICE_AUTH_FILE: &str = "device-auth.json";

/// Persisted device keypair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredIdentity {
    pub version: u32,
    pub device_id: String,
    /// Raw public key, base64url.
    pub public_key: String,
    /// 32-byte Ed25519 seed, base64url.
    pub private_key: String,
    pub created_at_ms: u64,
}

/// Token the gateway issued to this device for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTokenEntry {
    pub device_id: String,
    pub role: String,
    pub token: SecretString,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub updated_at_ms: u64,
}

/// Async trait for identity storage backends.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Load the stored keypair. Unreadable records are reported as absent.
    async fn load_identity(&self) -> Result<Option<StoredIdentity>>;

    /// Persist the keypair, replacing any previous record.
    async fn save_identity(&self, identity: &StoredIdentity) -> Result<()>;

    /// Remove the stored keypair.
    async fn clear_identity(&self) -> Result<()>;

    /// Load the device token for `(device_id, role)`.
    async fn load_device_token(&self, device_id: &str, role: &str)
        -> Result<Option<DeviceTokenEntry>>;

    /// Persist a device token.
    async fn save_device_token(&self, entry: &DeviceTokenEntry) -> Result<()>;

    /// Remove the device token for `(device_id, role)`.
    async fn clear_device_token(&self, device_id: &str, role: &str) -> Result<()>;
}

/// On-disk layout of the device token file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDeviceAuth {
    version: u32,
    device_id: String,
    #[serde(default)]
    tokens: HashMap<String, DeviceTokenEntry>,
}

/// File-system-backed identity store.
///
/// Files are created with mode `0600` on Unix, the directory with `0700`.
pub struct FileIdentityStore {
    base_dir: PathBuf,
}

impl FileIdentityStore {
    /// Create a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create a store in the default directory (`~/.gatelink/identity/`).
    pub fn from_default_dir() -> Result<Self> {
        let dir = gatelink_core::paths::identity_dir()
            .map_err(|e| GatewayError::Identity(e.to_string()))?;
        Ok(Self::new(dir))
    }

    /// Directory holding the identity files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn identity_path(&self) -> PathBuf {
        self.base_dir.join(IDENTITY_FILE)
    }

    fn device_auth_path(&self) -> PathBuf {
        self.base_dir.join(DEVICE_AUTH_FILE)
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&self.base_dir, perms).await?;
        }

        Ok(())
    }

    async fn read_device_auth(&self) -> Result<Option<StoredDeviceAuth>> {
        let Some(data) = read_optional(&self.device_auth_path()).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&data) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                warn!(error = %e, "discarding unreadable device token file");
                Ok(None)
            }
        }
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Write `data` to `path` atomically with mode 0600 on Unix.
async fn write_private_file(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp, perms).await?;
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load_identity(&self) -> Result<Option<StoredIdentity>> {
        let Some(data) = read_optional(&self.identity_path()).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&data) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                warn!(error = %e, "discarding unreadable identity record");
                Ok(None)
            }
        }
    }

    async fn save_identity(&self, identity: &StoredIdentity) -> Result<()> {
        self.ensure_dir().await?;
        let json = serde_json::to_string_pretty(identity)?;
        let path = self.identity_path();
        debug!(device_id = %identity.device_id, path = %path.display(), "writing identity");
        write_private_file(&path, json.as_bytes()).await
    }

    async fn clear_identity(&self) -> Result<()> {
        remove_optional(&self.identity_path()).await
    }

    async fn load_device_token(
        &self,
        device_id: &str,
        role: &str,
    ) -> Result<Option<DeviceTokenEntry>> {
        let Some(stored) = self.read_device_auth().await? else {
            return Ok(None);
        };
        if stored.device_id != device_id {
            return Ok(None);
        }
        Ok(stored.tokens.get(role).cloned())
    }

    async fn save_device_token(&self, entry: &DeviceTokenEntry) -> Result<()> {
        self.ensure_dir().await?;
        let mut stored = match self.read_device_auth().await? {
            Some(stored) if stored.device_id == entry.device_id => stored,
            // Tokens for another device are useless to this one.
            _ => StoredDeviceAuth {
                version: IDENTITY_RECORD_VERSION,
                device_id: entry.device_id.clone(),
                tokens: HashMap::new(),
            },
        };
        stored.tokens.insert(entry.role.clone(), entry.clone());

        let json = serde_json::to_string_pretty(&stored)?;
        debug!(device_id = %entry.device_id, role = %entry.role, "writing device token");
        write_private_file(&self.device_auth_path(), json.as_bytes()).await
    }

    async fn clear_device_token(&self, device_id: &str, role: &str) -> Result<()> {
        let Some(mut stored) = self.read_device_auth().await? else {
            return Ok(());
        };
        if stored.device_id != device_id || stored.tokens.remove(role).is_none() {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&stored)?;
        write_private_file(&self.device_auth_path(), json.as_bytes()).await
    }
}

/// In-memory identity store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryIdentityStore {
    identity: Mutex<Option<StoredIdentity>>,
    tokens: Mutex<HashMap<(String, String), DeviceTokenEntry>>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn load_identity(&self) -> Result<Option<StoredIdentity>> {
        Ok(self.identity.lock().await.clone())
    }

    async fn save_identity(&self, identity: &StoredIdentity) -> Result<()> {
        *self.identity.lock().await = Some(identity.clone());
        Ok(())
    }

    async fn clear_identity(&self) -> Result<()> {
        *self.identity.lock().await = None;
        Ok(())
    }

    async fn load_device_token(
        &self,
        device_id: &str,
        role: &str,
    ) -> Result<Option<DeviceTokenEntry>> {
        let tokens = self.tokens.lock().await;
        Ok(tokens.get(&(device_id.to_string(), role.to_string())).cloned())
    }

    async fn save_device_token(&self, entry: &DeviceTokenEntry) -> Result<()> {
        let mut tokens = self.tokens.lock().await;
        tokens.insert((entry.device_id.clone(), entry.role.clone()), entry.clone());
        Ok(())
    }

    async fn clear_device_token(&self, device_id: &str, role: &str) -> Result<()> {
        let mut tokens = self.tokens.lock().await;
        tokens.remove(&(device_id.to_string(), role.to_string()));
        Ok(())
    }
}
