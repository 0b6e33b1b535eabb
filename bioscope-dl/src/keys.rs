use crate::{Error, Options, Result};
use bytes::Bytes;
use log::debug;
use reqwest::{Client, Url, header};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::OnceCell;

/// Cache of raw decryption keys by key uri.
///
/// Lookups and the first insertion of the same uri are mutually exclusive:
/// concurrent first requests for one key wait on a single fetch, while
/// different keys are fetched independently. Once stored, a key is never
/// replaced. A failed fetch stores nothing, so the next lookup tries again,
/// and leaves no entry behind.
pub struct KeyStore {
    client: Client,
    referer: String,
    scheme: String,
    keys: Mutex<HashMap<String, Arc<OnceCell<Bytes>>>>,
}

impl KeyStore {
    pub fn new(client: Client, options: &Options) -> Self {
        Self {
            client,
            referer: options.referer.clone(),
            scheme: options.key_scheme.clone(),
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Seeds the cache with an already known key. An existing key is kept.
    pub fn insert(&self, uri: &str, key: impl Into<Bytes>) {
        let _ = self.cell(uri).set(key.into());
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .is_some_and(|x| x.initialized())
    }

    pub async fn resolve(&self, uri: &str) -> Result<Bytes> {
        let cell = self.cell(uri);

        match cell.get_or_try_init(|| self.fetch(uri)).await {
            Ok(key) => Ok(key.clone()),
            Err(e) => {
                self.forget(uri, &cell);
                Err(e)
            }
        }
    }

    fn cell(&self, uri: &str) -> Arc<OnceCell<Bytes>> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(uri.to_owned())
            .or_default()
            .clone()
    }

    /// Drops the empty cell of a failed lookup unless another lookup of the
    /// same uri is still waiting on it.
    fn forget(&self, uri: &str, cell: &Arc<OnceCell<Bytes>>) {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(x) = keys.get(uri)
            && Arc::ptr_eq(x, cell)
            && !x.initialized()
            && Arc::strong_count(cell) == 2
        {
            keys.remove(uri);
        }
    }

    async fn fetch(&self, uri: &str) -> Result<Bytes> {
        let url = force_scheme(Url::parse(uri)?, &self.scheme)?;
        debug!("Fetching key {}", url);

        let response = self
            .client
            .get(url)
            .header(header::REFERER, &self.referer)
            .send()
            .await?;
        let status = response.status();

        if status.as_u16() >= 400 {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }
}

fn force_scheme(mut url: Url, scheme: &str) -> Result<Url> {
    if url.scheme() == scheme || url.set_scheme(scheme).is_ok() {
        return Ok(url);
    }

    // special and non-special schemes can't be swapped in place
    Ok(Url::parse(&format!(
        "{}:{}",
        scheme,
        &url[url::Position::AfterScheme..]
    ))?)
}

/// Decodes a hex iv, with or without a `0x` prefix. The length is not checked.
pub fn parse_iv(iv: &str) -> Result<Vec<u8>> {
    let iv = iv
        .strip_prefix("0x")
        .or_else(|| iv.strip_prefix("0X"))
        .unwrap_or(iv);
    Ok(hex::decode(iv)?)
}
