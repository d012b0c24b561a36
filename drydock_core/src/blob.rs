//! A chunked, revision-tagged byte payload persisted as Kubernetes secrets.
//!
//! One header secret (`<name>`) carries `{name, revision, checksum, chunks}`;
//! `header.chunks` chunk secrets (`<name>-<revision>-<i>`) carry the split
//! payload. `save` implements revision-atomic replace against a backing
//! store that only offers per-object create/get/patch/delete plus
//! label-selector bulk delete — there is no multi-object transaction, so the
//! header patch in step 8 below is the single commit point.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use rand::RngCore;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::fingerprint;

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_VAL_MANAGED_BY: &str = "ezblob.drydock.example";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_VAL_COMPONENT: &str = "chunk";
pub const LABEL_NAME: &str = "drydock.example/ezblob-name";
pub const LABEL_REVISION: &str = "drydock.example/ezblob-revision";

const KEY_NAME: &str = "name";
const KEY_REVISION: &str = "revision";
const KEY_CHUNKS: &str = "chunks";
const KEY_CHECKSUM: &str = "checksum";
const KEY_DATA: &str = "data";

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct Options {
    pub name: String,
    pub namespace: String,
    pub chunk_size: usize,
}

impl Options {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Options { name: name.into(), namespace: namespace.into(), chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

#[derive(Debug, Clone)]
struct Header {
    name: String,
    revision: String,
    checksum: String,
    chunks: usize,
}

impl Header {
    fn to_data(&self) -> BTreeMap<String, k8s_openapi::ByteString> {
        let mut m = BTreeMap::new();
        m.insert(KEY_NAME.to_string(), k8s_openapi::ByteString(self.name.clone().into_bytes()));
        m.insert(KEY_REVISION.to_string(), k8s_openapi::ByteString(self.revision.clone().into_bytes()));
        m.insert(KEY_CHECKSUM.to_string(), k8s_openapi::ByteString(self.checksum.clone().into_bytes()));
        m.insert(KEY_CHUNKS.to_string(), k8s_openapi::ByteString(self.chunks.to_string().into_bytes()));
        m
    }
}

pub struct Blob {
    client: Client,
    opts: Options,
    lock: Mutex<()>,
}

impl Blob {
    pub fn new(client: Client, opts: Options) -> Self {
        let chunk_size = if opts.chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { opts.chunk_size };
        Blob { client, opts: Options { chunk_size, ..opts }, lock: Mutex::new(()) }
    }

    fn api(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.opts.namespace)
    }

    fn chunk_name(&self, revision: &str, idx: usize) -> String {
        format!("{}-{}-{}", self.opts.name, revision, idx)
    }

    fn chunk_selector(&self) -> String {
        format!(
            "{LABEL_MANAGED_BY}={LABEL_VAL_MANAGED_BY},{LABEL_COMPONENT}={LABEL_VAL_COMPONENT},{LABEL_NAME}={}",
            self.opts.name
        )
    }

    fn chunk_selector_revision(&self, revision: &str) -> String {
        format!("{},{LABEL_REVISION}={revision}", self.chunk_selector())
    }

    fn chunk_selector_not_revision(&self, revision: &str) -> String {
        format!("{},{LABEL_REVISION}!={revision}", self.chunk_selector())
    }

    fn chunk_labels(&self, revision: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), LABEL_VAL_MANAGED_BY.to_string()),
            (LABEL_COMPONENT.to_string(), LABEL_VAL_COMPONENT.to_string()),
            (LABEL_NAME.to_string(), self.opts.name.clone()),
            (LABEL_REVISION.to_string(), revision.to_string()),
        ])
    }

    async fn header_get(&self) -> Result<Header> {
        let secret = self.api().get(&self.opts.name).await?;
        header_from_secret(&self.opts.name, &secret)
    }

    async fn header_create(&self, header: &Header) -> Result<()> {
        let secret = Secret {
            metadata: ObjectMeta { name: Some(self.opts.name.clone()), ..Default::default() },
            data: Some(header.to_data()),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        self.api().create(&PostParams::default(), &secret).await?;
        Ok(())
    }

    async fn header_patch(&self, header: &Header) -> Result<()> {
        let patch = Secret { data: Some(header.to_data()), ..Default::default() };
        self.api()
            .patch(&self.opts.name, &PatchParams::default(), &Patch::Strategic(patch))
            .await?;
        Ok(())
    }

    async fn header_delete(&self) -> Result<()> {
        self.api().delete(&self.opts.name, &DeleteParams::default()).await.map(|_| ()).or_else(|e| {
            if is_not_found(&e) {
                Ok(())
            } else {
                Err(e.into())
            }
        })
    }

    async fn chunk_get(&self, revision: &str, idx: usize) -> Result<Vec<u8>> {
        let secret = self.api().get(&self.chunk_name(revision, idx)).await?;
        Ok(secret
            .data
            .and_then(|mut d| d.remove(KEY_DATA))
            .map(|b| b.0)
            .unwrap_or_default())
    }

    async fn chunk_create(&self, revision: &str, idx: usize, data: &[u8]) -> Result<()> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.chunk_name(revision, idx)),
                labels: Some(self.chunk_labels(revision)),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(KEY_DATA.to_string(), k8s_openapi::ByteString(data.to_vec()))])),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        self.api().create(&PostParams::default(), &secret).await?;
        Ok(())
    }

    async fn chunk_delete_by_selector(&self, selector: &str) -> Result<()> {
        let lp = ListParams::default().labels(selector);
        self.api().delete_collection(&DeleteParams::default(), &lp).await?;
        Ok(())
    }

    pub async fn delete(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.header_delete().await?;
        self.chunk_delete_by_selector(&self.chunk_selector()).await?;
        Ok(())
    }

    /// Load all data, verifying the whole-payload checksum against the header.
    pub async fn load(&self) -> Result<Vec<u8>> {
        let _guard = self.lock.lock().await;

        let header = match self.header_get().await {
            Ok(h) => h,
            Err(Error::Kube(e)) if is_not_found(&e) => return Err(Error::NotFound),
            Err(e) => return Err(e),
        };

        let mut buf = Vec::new();
        for i in 0..header.chunks {
            let chunk = self.chunk_get(&header.revision, i).await?;
            buf.extend_from_slice(&chunk);
        }

        if header.checksum != fingerprint::of_bytes(&buf) {
            return Err(Error::ChecksumMismatch);
        }

        Ok(buf)
    }

    /// Save `buf`, replacing whatever revision is currently live.
    ///
    /// Steps 1-9 of the design: get-or-create a placeholder header, draw a
    /// fresh revision, split into chunks, create them under the new
    /// revision, commit by patching the header to point at it, then
    /// best-effort garbage-collect the old revision's chunks.
    pub async fn save(&self, buf: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut created_placeholder = false;
        let mut header = match self.header_get().await {
            Ok(h) => h,
            Err(Error::Kube(e)) if is_not_found(&e) => {
                let placeholder =
                    Header { name: self.opts.name.clone(), revision: String::new(), checksum: String::new(), chunks: 0 };
                self.header_create(&placeholder).await?;
                created_placeholder = true;
                placeholder
            }
            Err(e) => return Err(e),
        };

        let result = self.save_inner(&mut header, buf).await;

        if result.is_err() {
            // Mirror the original's unconditional defers: unwind the chunks
            // created under the new revision regardless of how far
            // `save_inner` got, and additionally drop the placeholder header
            // if this save is the one that created it.
            let _ = self.chunk_delete_by_selector(&self.chunk_selector_revision(&header.revision)).await;
            if created_placeholder {
                let _ = self.header_delete().await;
            }
        }

        result
    }

    async fn save_inner(&self, header: &mut Header, buf: &[u8]) -> Result<()> {
        let old_revision = header.revision.clone();
        loop {
            header.revision = random_revision();
            if header.revision != old_revision {
                break;
            }
        }

        let chunks = split_bytes(buf, self.opts.chunk_size);
        header.chunks = chunks.len();

        // defend against a previous crashed writer that picked the same revision
        self.chunk_delete_by_selector(&self.chunk_selector_revision(&header.revision)).await?;

        for (i, chunk) in chunks.iter().enumerate() {
            self.chunk_create(&header.revision, i, chunk).await?;
        }

        header.checksum = fingerprint::of_bytes(buf);

        // commit point
        self.header_patch(header).await?;

        if !old_revision.is_empty() {
            let _ = self.chunk_delete_by_selector(&self.chunk_selector_not_revision(&header.revision)).await;
        }

        Ok(())
    }
}

fn header_from_secret(expected_name: &str, secret: &Secret) -> Result<Header> {
    let data = secret.data.clone().unwrap_or_default();

    let name = data
        .get(KEY_NAME)
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
        .ok_or(Error::InvalidHeaderFieldName)?;
    if name != expected_name {
        return Err(Error::InvalidHeaderFieldName);
    }

    let revision = data
        .get(KEY_REVISION)
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
        .filter(|s| !s.is_empty())
        .ok_or(Error::InvalidHeaderFieldRevision)?;

    let chunks: i64 = data
        .get(KEY_CHUNKS)
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidHeaderFieldChunks)?;
    if chunks < 0 {
        return Err(Error::InvalidHeaderFieldChunks);
    }

    let checksum = data
        .get(KEY_CHECKSUM)
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
        .filter(|s| !s.is_empty())
        .ok_or(Error::InvalidHeaderFieldChecksum)?;

    Ok(Header { name, revision, checksum, chunks: chunks as usize })
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 404)
}

fn random_revision() -> String {
    let mut buf = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut buf);
    base32::encode(base32::Alphabet::RFC4648 { padding: false }, &buf).to_lowercase()
}

/// Split `buf` into chunks of at most `size` bytes; the last chunk may be
/// short, and an empty payload yields zero chunks.
pub fn split_bytes(buf: &[u8], size: usize) -> Vec<Vec<u8>> {
    buf.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_bytes_matches_reference_examples() {
        assert_eq!(
            split_bytes(b"hello,world", 4),
            vec![b"hell".to_vec(), b"o,wo".to_vec(), b"rld".to_vec()]
        );
        assert_eq!(split_bytes(b"hello,wo", 4), vec![b"hell".to_vec(), b"o,wo".to_vec()]);
        assert!(split_bytes(b"", 4).is_empty());
    }

    #[test]
    fn split_bytes_round_trips() {
        let data: Vec<u8> = (0u8..=255).cycle().take(755).collect();
        for size in [1usize, 7, 128, 4096] {
            let chunks = split_bytes(&data, size);
            let joined: Vec<u8> = chunks.iter().flatten().copied().collect();
            assert_eq!(joined, data);
            for c in chunks.iter().take(chunks.len().saturating_sub(1)) {
                assert_eq!(c.len(), size);
            }
        }
    }

    #[test]
    fn random_revision_is_seven_lowercase_base32_chars() {
        let r = random_revision();
        assert_eq!(r.len(), 7);
        assert!(r.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
