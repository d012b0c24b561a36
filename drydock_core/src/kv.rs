//! A persistent `String -> String` map backed by a [`Blob`], used to skip
//! unchanged work across runs.

use std::collections::HashMap;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tokio::sync::RwLock;

use crate::blob::{Blob, Options as BlobOptions};
use crate::error::{Error, Result};
use kube::Client;

pub struct Kv {
    blob: Blob,
    data: RwLock<HashMap<String, String>>,
}

impl Kv {
    /// Construct the backing blob and attempt to load existing data;
    /// `NotFound` is not an error here, it just starts empty.
    pub async fn open(client: Client, opts: BlobOptions) -> Result<Self> {
        let blob = Blob::new(client, opts);
        let data = match blob.load().await {
            Ok(buf) => decode(&buf)?,
            Err(Error::NotFound) => HashMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Kv { blob, data: RwLock::new(data) })
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.data.read().await.get(key).cloned()
    }

    pub async fn put(&self, key: impl Into<String>, val: impl Into<String>) {
        self.data.write().await.insert(key.into(), val.into());
    }

    pub async fn del(&self, key: &str) {
        self.data.write().await.remove(key);
    }

    /// Iterate a snapshot of entries, removing any for which `f` returns
    /// `true`. `f` may also request early termination.
    pub async fn purge(&self, mut f: impl FnMut(&str, &str) -> (bool, bool)) {
        let mut data = self.data.write().await;
        let keys: Vec<String> = data.keys().cloned().collect();
        for key in keys {
            let val = match data.get(&key) {
                Some(v) => v.clone(),
                None => continue,
            };
            let (del, stop) = f(&key, &val);
            if del {
                data.remove(&key);
            }
            if stop {
                break;
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let buf = {
            let data = self.data.read().await;
            encode(&data)?
        };
        self.blob.save(&buf).await
    }
}

fn encode(data: &HashMap<String, String>) -> Result<Vec<u8>> {
    let serialized = bincode::serialize(data)?;
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&serialized).map_err(|e| Error::io("<kv>", e))?;
    gz.finish().map_err(|e| Error::io("<kv>", e))
}

fn decode(buf: &[u8]) -> Result<HashMap<String, String>> {
    let mut gz = GzDecoder::new(buf);
    let mut raw = Vec::new();
    gz.read_to_end(&mut raw).map_err(|e| Error::io("<kv>", e))?;
    Ok(bincode::deserialize(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let mut data = HashMap::new();
        for i in 0..1000 {
            data.insert(format!("hello-{i}"), format!("world-{i}"));
        }
        let buf = encode(&data).unwrap();
        let back = decode(&buf).unwrap();
        assert_eq!(data, back);
    }
}
