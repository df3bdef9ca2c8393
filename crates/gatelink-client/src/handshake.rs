//! Session handshake: answering `connect.challenge` with a signed
//! `connect` request, and keeping device tokens in step with the outcome.

use gatelink_core::{id, ClientDescriptor, ConnectAuth, ConnectParams, DeviceProof, HelloOk, PROTOCOL_VERSION};
use gatelink_core::SecretString;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::identity::{AuthPayload, DeviceIdentity};
use crate::options::ClientOptions;
use crate::store::{DeviceTokenEntry, IdentityStore};

/// Where the current connection is in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HandshakeState {
    /// No connection attempt in progress.
    Idle,
    /// Waiting for the socket and then the challenge, until `deadline`.
    AwaitingChallenge { deadline: Instant },
    /// `connect` sent, waiting for its response.
    InFlight { used_device_token: bool },
    /// Handshake complete; application traffic may flow.
    Done,
}

impl HandshakeState {
    pub fn challenge_deadline(&self) -> Option<Instant> {
        match self {
            Self::AwaitingChallenge { deadline } => Some(*deadline),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// A `connect` request ready to send.
#[derive(Debug)]
pub(crate) struct PreparedConnect {
    pub params: ConnectParams,
    /// True when a stored device token was presented instead of the shared one.
    pub used_device_token: bool,
}

/// Build the signed `connect` parameters.
///
/// A stored device token for this device and role wins over the shared
/// token. Store failures only lose the device token; they never abort.
pub(crate) async fn prepare_connect(
    options: &ClientOptions,
    identity: &DeviceIdentity,
    store: &dyn IdentityStore,
    nonce: Option<String>,
) -> PreparedConnect {
    let role = &options.client.role;
    let stored = match store.load_device_token(identity.device_id(), role).await {
        Ok(entry) => entry.and_then(|e| e.token.non_blank()),
        Err(e) => {
            warn!(error = %e, "failed to load device token");
            None
        }
    };
    let used_device_token = stored.is_some();
    let token: Option<SecretString> = stored.or_else(|| options.token.clone());

    let signed_at = id::now_ms();
    let payload = AuthPayload {
        device_id: identity.device_id().to_string(),
        client_id: options.client.id.clone(),
        client_mode: options.client.mode.clone(),
        role: role.clone(),
        scopes: options.client.scopes.clone(),
        signed_at_ms: signed_at,
        token: token.as_ref().map(|t| t.expose_secret().to_string()),
        nonce: nonce.clone(),
    };
    let fingerprint = token.as_ref().map(SecretString::fingerprint);
    debug!(
        version = payload.version(),
        used_device_token,
        token = fingerprint.as_deref().unwrap_or("none"),
        "signing connect payload"
    );
    let signature = identity.sign(&payload.to_string());

    let params = ConnectParams {
        min_protocol: PROTOCOL_VERSION,
        max_protocol: PROTOCOL_VERSION,
        client: ClientDescriptor {
            id: options.client.id.clone(),
            version: options.client_version.clone(),
            platform: options.platform.clone(),
            mode: options.client.mode.clone(),
        },
        role: role.clone(),
        scopes: options.client.scopes.clone(),
        device: DeviceProof {
            id: identity.device_id().to_string(),
            public_key: identity.public_key().to_string(),
            signature,
            signed_at,
            nonce,
        },
        caps: Vec::new(),
        auth: ConnectAuth { token: payload.token },
        user_agent: options.user_agent(),
        locale: options.client.locale.clone(),
    };

    PreparedConnect {
        params,
        used_device_token,
    }
}

/// Persist the device token issued in `hello-ok`, if any.
pub(crate) async fn record_hello(
    store: &dyn IdentityStore,
    identity: &DeviceIdentity,
    options: &ClientOptions,
    hello: &HelloOk,
) {
    let Some(token) = hello.device_token() else {
        return;
    };
    let auth = hello.auth.as_ref();
    let entry = DeviceTokenEntry {
        device_id: identity.device_id().to_string(),
        role: auth
            .and_then(|a| a.role.clone())
            .unwrap_or_else(|| options.client.role.clone()),
        token: SecretString::new(token),
        scopes: auth.map(|a| a.scopes.clone()).unwrap_or_default(),
        updated_at_ms: id::now_ms(),
    };
    match store.save_device_token(&entry).await {
        Ok(()) => info!(role = %entry.role, "stored device token"),
        Err(e) => warn!(error = %e, "failed to store device token"),
    }
}

/// Forget the device token after the gateway refused it.
pub(crate) async fn forget_device_token(
    store: &dyn IdentityStore,
    identity: &DeviceIdentity,
    options: &ClientOptions,
) {
    match store
        .clear_device_token(identity.device_id(), &options.client.role)
        .await
    {
        Ok(()) => info!("cleared rejected device token"),
        Err(e) => warn!(error = %e, "failed to clear device token"),
    }
}
