#![allow(dead_code)]

use aes::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use bioscope_dl::{Key, Options, Playlist, Segment, reqwest::Url};
use bytes::Bytes;
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::net::TcpListener;

pub const ITEM_ID: &str = "abc123";
pub const RESOURCE: &str = "abc123_720p.ts";
pub const RESOURCE_PATH: &str = "/vod/vod/a/b/abc123/abc123_720p.ts";
pub const REFERER: &str = "https://www.example.com/";

#[derive(Clone)]
pub enum Route {
    /// Serves the requested byte range of the body.
    Body(Bytes),
    /// Serves the requested byte range of the body, one byte short.
    Short(Bytes),
    Status(u16),
    /// Serves the whole body with an arbitrary status.
    StatusBody(u16, Bytes),
}

#[derive(Default)]
struct Shared {
    routes: Mutex<HashMap<String, Route>>,
    hits: Mutex<HashMap<String, usize>>,
    ranges: Mutex<Vec<String>>,
    referers: Mutex<Vec<Option<String>>>,
    min_delay: AtomicU64,
    max_delay: AtomicU64,
}

pub struct StubServer {
    base_url: String,
    shared: Arc<Shared>,
}

impl StubServer {
    pub async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());

        let app = Router::new().fallback(handle).with_state(shared.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", addr.port()),
            shared,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn options(&self) -> Options {
        Options::default()
            .content_base(Url::parse(&self.url("/vod/vod")).unwrap())
            .referer(REFERER)
            .timeout(Duration::from_secs(10))
    }

    pub fn route(&self, path: &str, route: Route) {
        self.shared
            .routes
            .lock()
            .unwrap()
            .insert(path.to_owned(), route);
    }

    /// Every request waits a random time in `min..=max` milliseconds.
    pub fn delay(&self, min: u64, max: u64) {
        self.shared.min_delay.store(min, Ordering::SeqCst);
        self.shared.max_delay.store(max, Ordering::SeqCst);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.shared
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.shared.hits.lock().unwrap().values().sum()
    }

    /// Range headers of all requests, in arrival order.
    pub fn ranges(&self) -> Vec<String> {
        self.shared.ranges.lock().unwrap().clone()
    }

    pub fn referers(&self) -> Vec<Option<String>> {
        self.shared.referers.lock().unwrap().clone()
    }
}

async fn handle(State(shared): State<Arc<Shared>>, headers: HeaderMap, uri: Uri) -> Response {
    let path = uri.path().to_owned();
    let range = headers
        .get(header::RANGE)
        .and_then(|x| x.to_str().ok())
        .map(str::to_owned);

    *shared.hits.lock().unwrap().entry(path.clone()).or_default() += 1;
    shared.referers.lock().unwrap().push(
        headers
            .get(header::REFERER)
            .and_then(|x| x.to_str().ok())
            .map(str::to_owned),
    );

    if let Some(range) = &range {
        shared.ranges.lock().unwrap().push(range.clone());
    }

    let min = shared.min_delay.load(Ordering::SeqCst);
    let max = shared.max_delay.load(Ordering::SeqCst);

    if max > 0 {
        let millis = rand::rng().random_range(min..=max.max(min));
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    let route = shared.routes.lock().unwrap().get(&path).cloned();

    match route {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(Route::Status(code)) => StatusCode::from_u16(code).unwrap().into_response(),
        Some(Route::StatusBody(code, body)) => {
            (StatusCode::from_u16(code).unwrap(), body).into_response()
        }
        Some(Route::Body(body)) => ranged(range.as_deref(), body, 0),
        Some(Route::Short(body)) => ranged(range.as_deref(), body, 1),
    }
}

fn ranged(range: Option<&str>, body: Bytes, short: usize) -> Response {
    let Some((start, end)) = range
        .and_then(|x| x.strip_prefix("bytes="))
        .and_then(|x| x.split_once('-'))
    else {
        return (StatusCode::OK, body.slice(..body.len() - short)).into_response();
    };

    let start = start.parse::<usize>().unwrap().min(body.len());
    let end = (end.parse::<usize>().unwrap() + 1).min(body.len());
    let end = end.saturating_sub(short).max(start);

    (StatusCode::PARTIAL_CONTENT, body.slice(start..end)).into_response()
}

pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut data = plaintext.to_vec();
    let len = data.len();
    cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
        .unwrap()
        .encrypt_padded_mut::<NoPadding>(&mut data, len)
        .unwrap();
    data
}

/// Deterministic plaintext of segment `index`.
pub fn plaintext(index: usize, len: usize) -> Vec<u8> {
    (0..len).map(|x| (index * 31 + x * 7) as u8).collect()
}

pub fn key(index: usize) -> [u8; 16] {
    [index as u8 + 1; 16]
}

/// Segments of one resource, each encrypted with its own key.
pub struct Stream {
    pub playlist: Playlist,
    pub plaintext: Vec<u8>,
    pub lengths: Vec<usize>,
}

impl Stream {
    /// Lengths must be multiples of 16. Even segments carry an explicit iv,
    /// odd ones fall back to their sequence number.
    pub fn serve(server: &StubServer, lengths: &[usize]) -> Self {
        let mut resource = Vec::new();
        let mut plain = Vec::new();
        let mut segments = Vec::new();

        for (i, &len) in lengths.iter().enumerate() {
            let sequence = 10 + i as u64;
            let (iv, iv_hex) = if i % 2 == 0 {
                let iv = [0xa0 + i as u8; 16];
                (iv, Some(format!("0x{}", hex::encode(iv))))
            } else {
                ((sequence as u128).to_be_bytes(), None)
            };

            let key_path = format!("/keys/{}", i);
            server.route(&key_path, Route::Body(Bytes::copy_from_slice(&key(i))));

            let data = plaintext(i, len);
            segments.push(Some(Segment {
                uri: RESOURCE.to_owned(),
                offset: resource.len() as u64,
                limit: len as u64,
                sequence,
                key: Some(Key {
                    uri: server.url(&key_path),
                    iv: iv_hex,
                }),
            }));
            resource.extend(encrypt(&key(i), &iv, &data));
            plain.extend(data);
        }

        server.route(RESOURCE_PATH, Route::Body(Bytes::from(resource)));

        Self {
            playlist: Playlist::new(segments),
            plaintext: plain,
            lengths: lengths.to_vec(),
        }
    }

    /// Byte offsets at which a whole number of segments ends.
    pub fn boundaries(&self) -> Vec<usize> {
        let mut boundaries = vec![0];
        let mut sum = 0;

        for len in &self.lengths {
            sum += len;
            boundaries.push(sum);
        }

        boundaries
    }
}
