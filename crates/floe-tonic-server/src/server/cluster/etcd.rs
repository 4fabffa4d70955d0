//! etcd-backed [`CoordinationStore`].
//!
//! Liveness-bound keys are modeled with etcd leases: each registration is
//! written under a fresh lease and a background task renews it for the
//! process lifetime. If the process dies (or the renewal task loses its
//! connection for longer than the TTL), etcd expires the lease and deletes
//! the key, surrendering the worker slot to the next claimant.
//!
//! Atomic create-if-absent is a transaction predicated on the key's
//! `create_revision` being zero, i.e. "never written". The transaction
//! either writes our value under our lease or tells us someone else got
//! there first; there is no window where two processes both believe they
//! own a slot.

use core::time::Duration;
use etcd_client::{Client, Compare, CompareOp, ConnectOptions, GetOptions, PutOptions, Txn, TxnOp};

use crate::server::cluster::store::{CoordinationStore, CreateOutcome, StoreError};

/// How long to wait for the initial etcd connection and for individual
/// store operations.
const STORE_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// [`CoordinationStore`] implementation over an etcd cluster.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
    lease_ttl: Duration,
}

impl EtcdStore {
    /// Connects to the etcd cluster at `endpoints`.
    ///
    /// `lease_ttl` bounds how long a crashed process's registration
    /// lingers before its slot is reclaimable.
    pub async fn connect(endpoints: &[String], lease_ttl: Duration) -> Result<Self, StoreError> {
        let options = ConnectOptions::new()
            .with_connect_timeout(STORE_OP_TIMEOUT)
            .with_timeout(STORE_OP_TIMEOUT);
        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(StoreError::transport)?;
        Ok(Self { client, lease_ttl })
    }
}

impl CoordinationStore for EtcdStore {
    async fn create_live(&self, path: &str, value: &str) -> Result<CreateOutcome, StoreError> {
        let mut client = self.client.clone();
        let ttl_secs = self.lease_ttl.as_secs().max(1) as i64;

        let lease = client
            .lease_grant(ttl_secs, None)
            .await
            .map_err(StoreError::transport)?;

        let txn = Txn::new()
            .when(vec![Compare::create_revision(path, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(
                path,
                value,
                Some(PutOptions::new().with_lease(lease.id())),
            )]);
        let resp = client.txn(txn).await.map_err(StoreError::transport)?;

        if !resp.succeeded() {
            // Lost the race for this key; hand the unused lease back so it
            // does not linger until TTL expiry.
            let _ = client.lease_revoke(lease.id()).await;
            return Ok(CreateOutcome::AlreadyExists);
        }

        let (mut keeper, mut responses) = client
            .lease_keep_alive(lease.id())
            .await
            .map_err(StoreError::transport)?;

        // Renew at a third of the TTL for the process lifetime. If renewal
        // fails for good, the lease expires and the registry reclaims the
        // slot; that is the liveness contract, so log loudly and stop.
        let renew_every = Duration::from_secs((ttl_secs as u64 / 3).max(1));
        let key = path.to_string();
        tokio::spawn(async move {
            loop {
                if let Err(e) = keeper.keep_alive().await {
                    tracing::error!("lease renewal for {key} failed, registration will expire: {e}");
                    break;
                }
                match responses.message().await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        tracing::error!(
                            "lease renewal stream for {key} closed, registration will expire"
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::error!(
                            "lease renewal for {key} failed, registration will expire: {e}"
                        );
                        break;
                    }
                }
                tokio::time::sleep(renew_every).await;
            }
        });

        Ok(CreateOutcome::Created)
    }

    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.get(path, None).await.map_err(StoreError::transport)?;
        match resp.kvs().first() {
            Some(kv) => {
                let value = kv.value_str().map_err(|e| StoreError::MalformedValue {
                    path: path.to_string(),
                    reason: format!("value is not UTF-8: {e}"),
                })?;
                Ok(Some(value.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn list_children(&self, path: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut client = self.client.clone();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let resp = client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await
            .map_err(StoreError::transport)?;

        let mut children = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let malformed = |reason: String| StoreError::MalformedValue {
                path: prefix.clone(),
                reason,
            };
            let key = kv
                .key_str()
                .map_err(|e| malformed(format!("key is not UTF-8: {e}")))?;
            let Some(child) = key.strip_prefix(&prefix) else {
                continue;
            };
            // A prefix get also matches deeper descendants; the registry
            // only has direct children, anything else is ignored here and
            // judged by the caller's parser.
            if child.is_empty() || child.contains('/') {
                continue;
            }
            let value = kv
                .value_str()
                .map_err(|e| malformed(format!("value at {key} is not UTF-8: {e}")))?;
            children.push((child.to_string(), value.to_string()));
        }
        Ok(children)
    }

    async fn ensure_path(&self, _path: &str) -> Result<(), StoreError> {
        // etcd's keyspace is flat: prefixes exist implicitly, so there is
        // nothing to create and no race to lose.
        Ok(())
    }
}
