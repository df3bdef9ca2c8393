//! Device identity: a persistent Ed25519 keypair that identifies this
//! installation to the gateway, and the payload it signs during the
//! handshake.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use gatelink_core::id;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::GatewayError;
use crate::store::{IdentityStore, StoredIdentity, IDENTITY_RECORD_VERSION};
use crate::Result;

/// A loaded device keypair.
///
/// The signing key never leaves this struct except as the seed handed to the
/// identity store.
pub struct DeviceIdentity {
    device_id: String,
    public_key: String,
    signing_key: SigningKey,
}

impl DeviceIdentity {
    /// Generate a fresh keypair from the OS random source.
    pub fn generate() -> Result<Self> {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(&mut seed[..])
            .map_err(|e| GatewayError::CryptoUnavailable(e.to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    /// Build the identity for a known 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let raw_public = signing_key.verifying_key().to_bytes();
        Self {
            device_id: id::sha256_hex(&raw_public),
            public_key: URL_SAFE_NO_PAD.encode(raw_public),
            signing_key,
        }
    }

    /// Decode a stored record. The device id is always recomputed from the
    /// key, so a stale id in the record is harmless.
    pub fn from_stored(stored: &StoredIdentity) -> std::result::Result<Self, String> {
        if stored.version != IDENTITY_RECORD_VERSION {
            return Err(format!("unsupported identity version {}", stored.version));
        }
        let seed = Zeroizing::new(decode_b64url(&stored.private_key)?);
        let seed: &[u8; 32] = seed
            .as_slice()
            .try_into()
            .map_err(|_| format!("private key is {} bytes, expected 32", seed.len()))?;
        let identity = Self::from_seed(seed);
        if identity.public_key != stored.public_key.trim_end_matches('=') {
            return Err("public key does not match private key".to_string());
        }
        Ok(identity)
    }

    /// Record for the identity store.
    pub fn to_stored(&self, created_at_ms: u64) -> StoredIdentity {
        let seed = Zeroizing::new(self.signing_key.to_bytes());
        StoredIdentity {
            version: IDENTITY_RECORD_VERSION,
            device_id: self.device_id.clone(),
            public_key: self.public_key.clone(),
            private_key: URL_SAFE_NO_PAD.encode(seed.as_slice()),
            created_at_ms,
        }
    }

    /// Hex SHA-256 of the raw public key.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Raw public key, base64url without padding.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Sign `payload`, returning a base64url signature.
    pub fn sign(&self, payload: &str) -> String {
        URL_SAFE_NO_PAD.encode(self.signing_key.sign(payload.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("device_id", &self.device_id)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

fn decode_b64url(value: &str) -> std::result::Result<Vec<u8>, String> {
    URL_SAFE_NO_PAD
        .decode(value.trim().trim_end_matches('='))
        .map_err(|e| format!("invalid base64url: {e}"))
}

/// Check a base64url signature against a base64url public key.
pub fn verify_signature(public_key: &str, payload: &str, signature: &str) -> bool {
    let Ok(key) = decode_b64url(public_key) else {
        return false;
    };
    let Ok(sig) = decode_b64url(signature) else {
        return false;
    };
    let Ok(key): std::result::Result<[u8; 32], _> = key.try_into() else {
        return false;
    };
    let Ok(sig): std::result::Result<[u8; 64], _> = sig.try_into() else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key) else {
        return false;
    };
    key.verify(payload.as_bytes(), &Signature::from_bytes(&sig)).is_ok()
}

/// The string a device signs to authenticate a connection.
///
/// `v1|deviceId|clientId|clientMode|role|scopes|signedAtMs|token`, with
/// `v2` and a trailing `|nonce` when the gateway issued a challenge nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    pub device_id: String,
    pub client_id: String,
    pub client_mode: String,
    pub role: String,
    pub scopes: Vec<String>,
    pub signed_at_ms: u64,
    pub token: Option<String>,
    pub nonce: Option<String>,
}

impl AuthPayload {
    /// Version tag: `v2` binds the signature to a challenge nonce.
    pub fn version(&self) -> &'static str {
        if self.nonce.is_some() {
            "v2"
        } else {
            "v1"
        }
    }
}

impl fmt::Display for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.version(),
            self.device_id,
            self.client_id,
            self.client_mode,
            self.role,
            self.scopes.join(","),
            self.signed_at_ms,
            self.token.as_deref().unwrap_or(""),
        )?;
        if let Some(nonce) = &self.nonce {
            write!(f, "|{}", nonce)?;
        }
        Ok(())
    }
}

/// Resolves the device identity once and caches it.
pub struct IdentityManager {
    store: Arc<dyn IdentityStore>,
    cached: OnceCell<Arc<DeviceIdentity>>,
}

impl IdentityManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            cached: OnceCell::new(),
        }
    }

    /// The backing store (device tokens live there too).
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Load the stored identity, or generate and persist a new one.
    ///
    /// Idempotent: later calls return the same identity.
    pub async fn get_or_create(&self) -> Result<Arc<DeviceIdentity>> {
        self.cached
            .get_or_try_init(|| self.resolve())
            .await
            .map(Arc::clone)
    }

    async fn resolve(&self) -> Result<Arc<DeviceIdentity>> {
        if let Some(stored) = self.store.load_identity().await? {
            match DeviceIdentity::from_stored(&stored) {
                Ok(identity) => {
                    if identity.device_id != stored.device_id {
                        warn!(device_id = %identity.device_id, "repairing stored device id");
                        self.store
                            .save_identity(&identity.to_stored(stored.created_at_ms))
                            .await?;
                    }
                    return Ok(Arc::new(identity));
                }
                Err(reason) => {
                    warn!(%reason, "discarding corrupt device identity");
                    self.store.clear_identity().await?;
                }
            }
        }

        let identity = DeviceIdentity::generate()?;
        self.store.save_identity(&identity.to_stored(id::now_ms())).await?;
        info!(device_id = %identity.device_id, "generated new device identity");
        Ok(Arc::new(identity))
    }
}
