use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use std::{
    fmt,
    fs::File,
    io::Write,
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use crate::{
    codec::{self, DynamicImage},
    config::{Config, MAX_ATTEMPTS, RETRY_DELAY},
    transport::{HttpRequest, Transport},
    Error, Result,
};

const USER_AGENT: &str = "Mozilla/5.0";

/// Response of an API call.
///
/// Field accessors read the stored JSON. The image itself is only resolved by
/// [`ApiResult::data`], which downloads it again on every call when the
/// response points to a URL.
#[derive(Clone)]
pub struct ApiResult {
    content: Value,
    transport: Arc<dyn Transport>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ApiResult {
    pub fn new(content: Value, transport: Arc<dyn Transport>) -> Self {
        Self {
            content,
            transport,
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }

    pub(crate) fn with_config(
        content: Value,
        transport: Arc<dyn Transport>,
        config: &Config,
    ) -> Self {
        Self::new(content, transport).retry(config.max_attempts, config.retry_delay)
    }

    /// Override how often and how patiently a missing image is downloaded.
    ///
    /// At least one attempt is always made.
    pub fn retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// The decoded JSON body, as returned by the API.
    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn seed(&self) -> Option<i64> {
        self.content.get("seed").and_then(Value::as_i64)
    }

    pub fn url(&self) -> Option<&str> {
        self.content.get("image_url").and_then(Value::as_str)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.content.get("mime_type").and_then(Value::as_str)
    }

    /// Seconds between `started_at` and `completed_at`.
    pub fn duration(&self) -> Option<f64> {
        let started_at = self.timestamp("started_at")?;
        let completed_at = self.timestamp("completed_at")?;
        let elapsed = (completed_at - started_at).num_microseconds()?;
        Some(elapsed as f64 / 1e6)
    }

    fn timestamp(&self, key: &str) -> Option<NaiveDateTime> {
        let text = self.content.get(key)?.as_str()?;
        let parsed = parse_timestamp(text);
        if parsed.is_none() {
            log::warn!("Ignoring unparseable {}: {:?}", key, text);
        }
        parsed
    }

    /// The image bytes, or `None` if the response has no image.
    ///
    /// Inline `image_data` wins over `image_url`. A URL answering 404 is
    /// retried, since the image may not have been uploaded yet.
    pub fn data(&self) -> Result<Option<Vec<u8>>> {
        if let Some(data) = self.content.get("image_data").and_then(Value::as_str) {
            return Ok(Some(STANDARD.decode(data)?));
        }
        match self.url() {
            Some(url) => self.download(url).map(Some),
            None => Ok(None),
        }
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        for attempt in 1..=self.max_attempts {
            log::info!("Fetching {} ({}/{})", url, attempt, self.max_attempts);
            let response = self
                .transport
                .send(HttpRequest::get(url).header("User-Agent", USER_AGENT))?;
            match response.status {
                200 => return Ok(response.body),
                404 => {
                    if attempt < self.max_attempts {
                        thread::sleep(self.retry_delay);
                    }
                }
                status => {
                    return Err(Error::UnexpectedHttpStatus {
                        status,
                        url: url.to_owned(),
                    })
                }
            }
        }
        Err(Error::TimeoutExceeded {
            url: url.to_owned(),
            attempts: self.max_attempts,
        })
    }

    pub fn image(&self) -> Result<DynamicImage> {
        if !codec::AVAILABLE {
            return Err(Error::CapabilityMissing("image codec"));
        }
        let data = self.data()?.ok_or(Error::NoImage)?;
        codec::decode(&data)
    }

    /// Write the image to `path`, creating or truncating the file.
    ///
    /// The image is resolved before the file is touched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.data()?.ok_or(Error::NoImage)?;
        write_bytes(File::create(path)?, &data)
    }

    /// Write the image to `writer`, which is dropped before returning.
    pub fn write_to(&self, writer: impl Write) -> Result<()> {
        let data = self.data()?.ok_or(Error::NoImage)?;
        write_bytes(writer, &data)
    }
}

impl fmt::Debug for ApiResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResult")
            .field("content", &self.content)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

fn write_bytes(mut writer: impl Write, data: &[u8]) -> Result<()> {
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;
    use serde_json::json;
    use std::{
        io,
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex,
        },
        time::Instant,
    };
    use tokio_test::{assert_err, assert_ok};

    /// Answers downloads with a fixed list of statuses and remembers the requests.
    struct Replay {
        responses: Mutex<Vec<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl Replay {
        fn new(responses: &[(u16, &str)]) -> Arc<Self> {
            let mut responses: Vec<_> = responses
                .iter()
                .map(|&(status, body)| HttpResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                })
                .collect();
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for Replay {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop()
                .expect("no response left"))
        }
    }

    fn result(content: Value, transport: &Arc<Replay>) -> ApiResult {
        ApiResult::new(content, transport.clone()).retry(MAX_ATTEMPTS, Duration::from_millis(20))
    }

    #[test]
    fn accessors() {
        let transport = Replay::new(&[]);
        let result = result(
            json!({
                "seed": 1234,
                "mime_type": "image/jpeg",
                "image_url": "https://imagepig.com/pig.jpeg",
                "started_at": "2024-01-01T00:00:00.000000",
                "completed_at": "2024-01-01T00:00:02.500000",
            }),
            &transport,
        );
        assert_eq!(result.seed(), Some(1234));
        assert_eq!(result.mime_type(), Some("image/jpeg"));
        assert_eq!(result.url(), Some("https://imagepig.com/pig.jpeg"));
        assert_eq!(result.duration(), Some(2.5));
        assert!(transport.requests().is_empty());

        let empty = self::result(json!({}), &transport);
        assert_eq!(empty.seed(), None);
        assert_eq!(empty.mime_type(), None);
        assert_eq!(empty.url(), None);
        assert_eq!(empty.duration(), None);
    }

    #[test]
    fn duration() {
        let transport = Replay::new(&[]);
        let duration = |started_at: &str, completed_at: &str| {
            result(
                json!({ "started_at": started_at, "completed_at": completed_at }),
                &transport,
            )
            .duration()
        };
        assert_eq!(
            duration("2024-01-01T00:00:00Z", "2024-01-01T01:00:00+01:00"),
            Some(0.0)
        );
        assert_eq!(
            duration("2024-01-01T23:59:59", "2024-01-02T00:00:01.25"),
            Some(2.25)
        );
        assert_eq!(duration("yesterday", "2024-01-01T00:00:00"), None);
        assert_eq!(
            result(json!({ "started_at": "2024-01-01T00:00:00" }), &transport).duration(),
            None
        );
    }

    #[test]
    fn inline_data() {
        let transport = Replay::new(&[]);
        let result = result(
            json!({
                "image_data": STANDARD.encode("PIGDATA"),
                "image_url": "https://imagepig.com/pig.jpeg",
            }),
            &transport,
        );
        assert_eq!(assert_ok!(result.data()), Some(b"PIGDATA".to_vec()));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn malformed_inline_data() {
        let transport = Replay::new(&[]);
        let result = result(json!({ "image_data": "not base64!" }), &transport);
        assert!(matches!(assert_err!(result.data()), Error::Base64(_)));
    }

    #[test]
    fn no_image() {
        let transport = Replay::new(&[]);
        let result = result(json!({ "seed": 1 }), &transport);
        assert_eq!(assert_ok!(result.data()), None);
        assert!(matches!(assert_err!(result.save("unused.png")), Error::NoImage));
        assert!(!Path::new("unused.png").exists());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn download_retries_missing_image() {
        let transport = Replay::new(&[(404, ""), (200, "IMG")]);
        let result = result(json!({ "image_url": "https://imagepig.com/pig.jpeg" }), &transport);
        let start = Instant::now();
        assert_eq!(assert_ok!(result.data()), Some(b"IMG".to_vec()));
        assert!(start.elapsed() >= Duration::from_millis(20));

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert_eq!(request.method, reqwest::Method::GET);
            assert_eq!(request.url, "https://imagepig.com/pig.jpeg");
            assert_eq!(request.header_value("User-Agent"), Some("Mozilla/5.0"));
        }
    }

    #[test]
    fn download_fails_on_server_error() {
        let transport = Replay::new(&[(500, "oops"), (200, "IMG")]);
        let result = result(json!({ "image_url": "https://imagepig.com/pig.jpeg" }), &transport);
        match assert_err!(result.data()) {
            Error::UnexpectedHttpStatus { status, url } => {
                assert_eq!(status, 500);
                assert_eq!(url, "https://imagepig.com/pig.jpeg");
            }
            e => panic!("unexpected error: {:?}", e),
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn download_gives_up() {
        let transport = Replay::new(&[(404, ""); 3]);
        let result = result(json!({ "image_url": "https://imagepig.com/pig.jpeg" }), &transport)
            .retry(3, Duration::ZERO);
        assert!(matches!(
            assert_err!(result.data()),
            Error::TimeoutExceeded { attempts: 3, .. }
        ));
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn at_least_one_attempt() {
        let transport = Replay::new(&[(404, "")]);
        let result = result(json!({ "image_url": "https://x/y.png" }), &transport)
            .retry(0, Duration::ZERO);
        assert!(matches!(
            assert_err!(result.data()),
            Error::TimeoutExceeded { attempts: 1, .. }
        ));
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn downloads_every_time() {
        let transport = Replay::new(&[(200, "IMG"), (200, "IMG2")]);
        let result = result(json!({ "image_url": "https://imagepig.com/pig.jpeg" }), &transport);
        assert_eq!(assert_ok!(result.data()), Some(b"IMG".to_vec()));
        assert_eq!(assert_ok!(result.data()), Some(b"IMG2".to_vec()));
    }

    #[test]
    fn save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pig.jpeg");
        let transport = Replay::new(&[]);
        let result = result(json!({ "image_data": STANDARD.encode("PIGDATA") }), &transport);
        assert_ok!(result.save(&path));
        assert_eq!(std::fs::read(&path).unwrap(), b"PIGDATA");
    }

    /// Accepts a few bytes, then fails; records when it is dropped.
    struct Flaky<'a> {
        budget: usize,
        dropped: &'a AtomicBool,
    }

    impl Write for Flaky<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for Flaky<'_> {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn failed_write_releases_writer() {
        let dropped = AtomicBool::new(false);
        let transport = Replay::new(&[]);
        let result = result(json!({ "image_data": STANDARD.encode("PIGDATA") }), &transport);
        let writer = Flaky {
            budget: 3,
            dropped: &dropped,
        };
        assert!(matches!(assert_err!(result.write_to(writer)), Error::Io(_)));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[cfg(feature = "image")]
    #[test]
    fn image() {
        let transport = Replay::new(&[]);
        let png = crate::codec::tests::png(4, 3);
        let result = result(json!({ "image_data": STANDARD.encode(&png) }), &transport);
        let decoded = assert_ok!(result.image());
        assert_eq!(image::GenericImageView::dimensions(&decoded), (4, 3));

        let garbage = self::result(json!({ "image_data": STANDARD.encode("PIGDATA") }), &transport);
        assert!(matches!(assert_err!(garbage.image()), Error::Image(_)));
    }

    #[cfg(not(feature = "image"))]
    #[test]
    fn image_without_codec() {
        let transport = Replay::new(&[(200, "IMG")]);
        let result = result(json!({ "image_url": "https://imagepig.com/pig.jpeg" }), &transport);
        assert!(matches!(
            assert_err!(result.image()),
            Error::CapabilityMissing("image codec")
        ));
        assert!(transport.requests().is_empty());
    }
}
