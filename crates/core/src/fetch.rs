use crate::config::FetchOptions;
use crate::error::ExtractError;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

// Redirect hops followed before the 3xx response is returned as is.
const MAX_REDIRECTS: usize = 5;

/// Downloads PDF bytes from allow-listed hosts. Every redirect hop is held
/// to the same allow-list.
///
/// The first request asks for a byte range. Servers that answer `206` are
/// read range by range up to the total they advertise; servers that ignore
/// the range and answer `200` are streamed with a running size cap.
#[derive(Debug, Clone)]
pub struct PdfFetcher {
    client: Client,
    options: FetchOptions,
}

impl PdfFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .redirect(redirect_policy(options.allowed_hosts.clone()))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client, options })
    }

    /// Parses `raw` and checks its host against the allow-list.
    pub fn validate_url(&self, raw: &str) -> Result<Url, ExtractError> {
        let url = Url::parse(raw)?;
        let host = url.host_str().unwrap_or_default();
        if !host_allowed(&self.options.allowed_hosts, host) {
            return Err(ExtractError::HostNotAllowed(host.to_string()));
        }
        Ok(url)
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<Vec<u8>, ExtractError> {
        let url = self.validate_url(raw_url)?;
        let chunk = self.options.range_chunk_bytes.max(1);

        let response = self.request_range(&url, 0, chunk).await?;
        match response.status() {
            StatusCode::PARTIAL_CONTENT => self.read_ranges(&url, response).await,
            status if status.is_success() => self.read_full(response).await,
            status => Err(ExtractError::FetchStatus {
                status: status.as_u16(),
            }),
        }
    }

    async fn request_range(&self, url: &Url, start: u64, len: u64) -> Result<Response, ExtractError> {
        let end = start + len - 1;
        Ok(self
            .client
            .get(url.clone())
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(send_error)?)
    }

    async fn read_ranges(&self, url: &Url, first: Response) -> Result<Vec<u8>, ExtractError> {
        let limit = self.options.max_bytes;
        let chunk = self.options.range_chunk_bytes.max(1);
        let total = first
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total);

        if let Some(total) = total {
            if total > limit {
                return Err(ExtractError::TooLarge { limit, actual: total });
            }
        }

        let mut bytes = first.bytes().await?.to_vec();
        let mut last_len = bytes.len() as u64;
        loop {
            let offset = bytes.len() as u64;
            let finished = match total {
                Some(total) => offset >= total,
                // Unknown total: a short range means the end was reached.
                None => last_len < chunk,
            };
            if finished || last_len == 0 {
                break;
            }
            if offset > limit {
                return Err(ExtractError::TooLarge { limit, actual: offset });
            }

            let len = total.map_or(chunk, |total| chunk.min(total - offset));
            let response = self.request_range(url, offset, len).await?;
            if response.status() != StatusCode::PARTIAL_CONTENT {
                return Err(ExtractError::FetchStatus {
                    status: response.status().as_u16(),
                });
            }
            let part = response.bytes().await?;
            last_len = part.len() as u64;
            bytes.extend_from_slice(&part);
        }

        if bytes.len() as u64 > limit {
            return Err(ExtractError::TooLarge {
                limit,
                actual: bytes.len() as u64,
            });
        }
        debug!(bytes = bytes.len(), "fetched pdf in ranges");
        Ok(bytes)
    }

    async fn read_full(&self, mut response: Response) -> Result<Vec<u8>, ExtractError> {
        let limit = self.options.max_bytes;
        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(ExtractError::TooLarge { limit, actual: length });
            }
        }

        let mut bytes = Vec::new();
        while let Some(part) = response.chunk().await? {
            bytes.extend_from_slice(&part);
            if bytes.len() as u64 > limit {
                return Err(ExtractError::TooLarge {
                    limit,
                    actual: bytes.len() as u64,
                });
            }
        }
        debug!(bytes = bytes.len(), "fetched pdf");
        Ok(bytes)
    }
}

fn host_allowed(allowed_hosts: &[String], host: &str) -> bool {
    allowed_hosts.iter().any(|allowed| allowed == host)
}

fn redirect_policy(allowed_hosts: Vec<String>) -> Policy {
    Policy::custom(move |attempt| {
        let host = attempt.url().host_str().unwrap_or_default().to_string();
        if !host_allowed(&allowed_hosts, &host) {
            attempt.error(ExtractError::HostNotAllowed(host))
        } else if attempt.previous().len() > MAX_REDIRECTS {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

/// Unwraps a redirect refused by the allow-list back into `HostNotAllowed`.
fn send_error(error: reqwest::Error) -> ExtractError {
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        if let Some(ExtractError::HostNotAllowed(host)) = cause.downcast_ref::<ExtractError>() {
            return ExtractError::HostNotAllowed(host.clone());
        }
        source = cause.source();
    }
    ExtractError::Http(error)
}

/// Total length from a `Content-Range: bytes 0-99/1234` header; `None` for `*`.
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_bytes: u64, range_chunk_bytes: u64) -> PdfFetcher {
        PdfFetcher::new(FetchOptions {
            allowed_hosts: vec!["127.0.0.1".to_string()],
            max_bytes,
            range_chunk_bytes,
        })
        .unwrap()
    }

    #[test]
    fn content_range_total_reads_suffix() {
        assert_eq!(content_range_total("bytes 0-99/1234"), Some(1234));
        assert_eq!(content_range_total("bytes 0-99/*"), None);
    }

    #[test]
    fn host_outside_allow_list_is_rejected() {
        let fetcher = PdfFetcher::new(FetchOptions::default()).unwrap();
        assert!(fetcher.validate_url("https://arxiv.org/pdf/2401.00001").is_ok());
        let result = fetcher.validate_url("https://evil.example.com/paper.pdf");
        assert!(matches!(result, Err(ExtractError::HostNotAllowed(host)) if host == "evil.example.com"));
    }

    #[tokio::test]
    async fn server_without_ranges_returns_whole_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 body".to_vec()))
            .mount(&server)
            .await;

        let bytes = fetcher(1024, 4)
            .fetch(&format!("{}/pdf/1", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn redirect_to_disallowed_host_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/moved"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("{}/internal", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"INTERNAL".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = PdfFetcher::new(FetchOptions {
            allowed_hosts: vec!["localhost".to_string()],
            ..FetchOptions::default()
        })
        .unwrap();
        let port = server.address().port();
        let result = fetcher.fetch(&format!("http://localhost:{port}/pdf/moved")).await;
        assert!(matches!(result, Err(ExtractError::HostNotAllowed(host)) if host == "127.0.0.1"));
    }

    #[tokio::test]
    async fn redirect_within_allowed_host_is_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abs/1"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/pdf/1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pdf/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .mount(&server)
            .await;

        let bytes = fetcher(1024, 4)
            .fetch(&format!("{}/abs/1", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn oversized_full_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64]))
            .mount(&server)
            .await;

        let result = fetcher(16, 4).fetch(&format!("{}/pdf/big", server.uri())).await;
        assert!(matches!(result, Err(ExtractError::TooLarge { limit: 16, .. })));
    }

    #[tokio::test]
    async fn upstream_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let error = fetcher(1024, 4)
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "failed to fetch PDF (404)");
    }

    #[tokio::test]
    async fn partial_content_is_assembled_from_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=0-3"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 0-3/6")
                    .set_body_bytes(b"%PDF".to_vec()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=4-5"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 4-5/6")
                    .set_body_bytes(b"-1".to_vec()),
            )
            .mount(&server)
            .await;

        let bytes = fetcher(1024, 4)
            .fetch(&format!("{}/pdf/ranged", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1");
    }

    #[tokio::test]
    async fn advertised_total_above_limit_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 0-3/4096")
                    .set_body_bytes(b"%PDF".to_vec()),
            )
            .mount(&server)
            .await;

        let result = fetcher(1024, 4).fetch(&format!("{}/pdf/huge", server.uri())).await;
        assert!(matches!(
            result,
            Err(ExtractError::TooLarge { limit: 1024, actual: 4096 })
        ));
    }
}
