use crate::error::Result;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks an `X-Hub-Signature-256` header (`sha256=<hex>`) against the payload.
pub fn verify_signature(secret: &str, signature_header: &str, payload: &[u8]) -> bool {
    let Some(signature) = signature_header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    // constant-time
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
struct Id {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct FullName {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    action: Option<String>,
    installation: Option<Id>,
    organization: Option<Login>,
    repository: Option<FullName>,
    sender: Option<Login>,
}

/// The routing fields every webhook delivery shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEnvelope {
    pub action: Option<String>,
    pub installation_id: Option<u64>,
    pub organization: Option<String>,
    pub repository: Option<String>,
    pub sender: Option<String>,
}

impl WebhookEnvelope {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: RawEnvelope = serde_json::from_slice(payload)?;
        Ok(Self {
            action: raw.action,
            installation_id: raw.installation.map(|i| i.id),
            organization: raw.organization.map(|o| o.login),
            repository: raw.repository.map(|r| r.full_name),
            sender: raw.sender.map(|s| s.login),
        })
    }
}
