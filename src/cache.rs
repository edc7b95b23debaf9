//! Secret key cache
//!
//! Keeps the most recent secret key per device MAC address, optionally
//! persisted as JSON so keys survive restarts. Entries never expire; a new
//! key for the same MAC overwrites the old one, keys for other MACs are
//! left alone.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A secret key obtained from the trust service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRecord {
    pub mac_address: String,
    pub secret_key: String,
    pub obtained_at: DateTime<Utc>,
}

impl fmt::Debug for SecretKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyRecord")
            .field("mac_address", &self.mac_address)
            .field("secret_key", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Process-wide, MAC-keyed secret key store
#[derive(Clone)]
pub struct SecretCache {
    records: Arc<Mutex<BTreeMap<String, SecretKeyRecord>>>,
    path: Option<PathBuf>,
}

impl SecretCache {
    /// A cache that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
            path: None,
        }
    }

    /// Open a file-backed cache, loading existing records if the file exists
    pub async fn open(path: PathBuf) -> Result<Self> {
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<BTreeMap<String, SecretKeyRecord>>(&content)
                .with_context(|| format!("failed to parse secret cache {:?}", path))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read secret cache {:?}", path))
            }
        };

        info!("Secret cache at {:?} ({} key(s) loaded)", path, records.len());

        Ok(Self {
            records: Arc::new(Mutex::new(records)),
            path: Some(path),
        })
    }

    /// Record a key for `mac_address`, replacing any previous one for it.
    ///
    /// The in-memory entry is updated even if persisting fails.
    pub async fn store(&self, mac_address: &str, secret_key: &str) -> Result<SecretKeyRecord> {
        let record = SecretKeyRecord {
            mac_address: mac_address.to_string(),
            secret_key: secret_key.to_string(),
            obtained_at: Utc::now(),
        };

        let mut records = self.records.lock().await;
        records.insert(mac_address.to_string(), record.clone());
        debug!("Cached secret key for {}", mac_address);

        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&*records)
                .context("failed to serialize secret cache")?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("failed to write secret cache {:?}", path))?;
        }

        Ok(record)
    }

    pub async fn get(&self, mac_address: &str) -> Option<SecretKeyRecord> {
        self.records.lock().await.get(mac_address).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}
