use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

// Some origins reject requests with a default or empty user agent, so every
// fetch presents the same fixed browser-like header set.
pub const FETCH_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";
pub const FETCH_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

pub fn build_client() -> Client {
    let timeout = std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(20);
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(FETCH_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(FETCH_ACCEPT));

    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .default_headers(headers)
        .build()
        .unwrap_or_else(|_| Client::new())
}
