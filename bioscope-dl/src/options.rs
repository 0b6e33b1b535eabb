use crate::Result;
use reqwest::{Client, Proxy, Url};
use std::time::Duration;

pub const CONTENT_BASE: &str = "https://vod.bioscopelive.com/vod/vod/";
pub const REFERER: &str = "https://www.bioscopelive.com/";
pub const KEY_SCHEME: &str = "http";
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";

/// Origin and client settings shared by the fetcher, the key store and the manifest adapter.
#[derive(Clone, Debug)]
pub struct Options {
    pub(crate) content_base: Url,
    pub(crate) referer: String,
    pub(crate) key_scheme: String,
    pub(crate) user_agent: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) proxy: Option<Proxy>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            content_base: Url::parse(CONTENT_BASE).expect("CONTENT_BASE is a valid url"),
            referer: REFERER.to_owned(),
            key_scheme: KEY_SCHEME.to_owned(),
            user_agent: USER_AGENT.to_owned(),
            timeout: None,
            proxy: None,
        }
    }
}

impl Options {
    /// Base url that item paths (`a/b/abc/abc_1.ts`) are joined onto.
    pub fn content_base(mut self, mut url: Url) -> Self {
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        self.content_base = url;
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    /// Scheme every key url is rewritten to before it is requested.
    pub fn key_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.key_scheme = scheme.into();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Total timeout of a single request. None by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn get_content_base(&self) -> &Url {
        &self.content_base
    }

    pub fn get_referer(&self) -> &str {
        &self.referer
    }

    pub fn client(&self) -> Result<Client> {
        let mut client_builder = Client::builder().user_agent(&self.user_agent);

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        if let Some(proxy) = &self.proxy {
            client_builder = client_builder.proxy(proxy.clone());
        }

        Ok(client_builder.build()?)
    }
}
