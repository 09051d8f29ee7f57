use std::collections::HashMap;

use reqwest::{redirect::Policy, StatusCode};

const USER_AGENT: &str = "Metorial CodeBucket (https://metorial.com)";
/// `reader.go`'s `downloadFile` follows redirects recursively with no depth
/// limit; we cap it so a redirect loop fails fast instead of hanging.
const MAX_REDIRECTS: u32 = 10;

/// Downloads `url` into memory, following redirects manually so the caller's
/// `headers` (e.g. an auth token for a private archive) are resent on each
/// hop, matching `zip-importer/reader.go`'s `downloadFile`.
pub async fn download_zip(url: &str, headers: &HashMap<String, String>) -> anyhow::Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10 * 60))
        .redirect(Policy::none())
        .build()?;

    let mut current_url = url.to_owned();
    for _ in 0..MAX_REDIRECTS {
        let mut request = client.get(&current_url).header("User-Agent", USER_AGENT);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => return Ok(response.bytes().await?.to_vec()),
            StatusCode::FOUND | StatusCode::MOVED_PERMANENTLY | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| anyhow::anyhow!("redirect response missing Location header"))?
                    .to_owned();
                current_url = location;
            },
            status => anyhow::bail!("bad status: {status}"),
        }
    }
    anyhow::bail!("too many redirects downloading {url}")
}
