use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::KiraError;
use crate::store;

pub trait Transport: Send + Sync {
    /// Writes `url` to `destination`, calling `progress(transferred, total)`
    /// with cumulative counts (`total` is 0 when the server does not say).
    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<u64, KiraError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-rd/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::Http(err.to_string()))?,
        );
        // Whole-file transfers run for many minutes; only connecting is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| KiraError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<u64, KiraError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(KiraError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let total = response.content_length().unwrap_or(0);

        store::ensure_parent(destination)?;
        let file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let mut writer = BufWriter::new(file);
        copy_with_progress(&mut response, &mut writer, total, progress)?;
        writer
            .flush()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let written = writer
            .get_ref()
            .metadata()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?
            .len();
        Ok(written)
    }
}

pub(crate) fn copy_with_progress(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    total: u64,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<u64, KiraError> {
    let mut buffer = vec![0u8; 64 * 1024];
    let mut transferred = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(KiraError::Http(err.to_string())),
        };
        writer
            .write_all(&buffer[..read])
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        transferred += read as u64;
        progress(transferred, total);
    }
    Ok(transferred)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_reports_cumulative_counts() {
        let data = vec![7u8; 150 * 1024];
        let mut reader = data.as_slice();
        let mut out = Vec::new();
        let mut seen = Vec::new();
        let copied = copy_with_progress(&mut reader, &mut out, 0, &mut |done, total| {
            seen.push((done, total))
        })
        .unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
        assert!(seen.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert_eq!(seen.last().unwrap().0, data.len() as u64);
    }
}
