use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed with status {status}")]
    Status { url: Url, status: StatusCode },
    #[error("redirect from {url} points to an invalid location {location:?}")]
    BadLocation { url: Url, location: String },
    #[error("gave up after {max} redirects")]
    TooManyRedirects { max: usize },
}

impl FetchError {
    /// HTTP status of the final response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// GET-only client that follows redirects itself so the hop count is bounded
/// and each hop is logged.
pub struct Fetcher {
    client: Client,
    max_redirects: usize,
}

impl Fetcher {
    pub fn new(timeout: Duration, max_redirects: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            max_redirects,
        })
    }

    /// Fetch `url` and return the body of the first 200 response.
    pub async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            debug!("GET {}", current);
            let response = match self.client.get(current.clone()).send().await {
                Ok(r) => r,
                Err(source) => return Err(FetchError::Request { url: current, source }),
            };
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = response.headers().get(LOCATION) {
                    if hops >= self.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            max: self.max_redirects,
                        });
                    }
                    let next = location
                        .to_str()
                        .ok()
                        .and_then(|l| current.join(l).ok())
                        .ok_or_else(|| FetchError::BadLocation {
                            url: current.clone(),
                            location: String::from_utf8_lossy(location.as_bytes()).into_owned(),
                        })?;
                    info!("Redirecting to: {}", next);
                    hops += 1;
                    current = next;
                    continue;
                }
            }

            if status != StatusCode::OK {
                return Err(FetchError::Status {
                    url: current,
                    status,
                });
            }

            return match response.text().await {
                Ok(body) => Ok(body),
                Err(source) => Err(FetchError::Request { url: current, source }),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> Fetcher {
        Fetcher::new(Duration::from_secs(5), 5).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn returns_body_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Title\nDune\n"))
            .mount(&server)
            .await;

        let body = fetcher().fetch(&url(&server, "/export")).await.unwrap();
        assert_eq!(body, "Title\nDune\n");
    }

    #[tokio::test]
    async fn follows_302_to_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/export"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/final", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/final"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Title\nFinal\n"))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetcher().fetch(&url(&server, "/export")).await.unwrap();
        assert_eq!(body, "Title\nFinal\n");
    }

    #[tokio::test]
    async fn resolves_relative_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a/export"))
            .respond_with(ResponseTemplate::new(307).insert_header("Location", "../b/data.csv"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b/data.csv"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = fetcher().fetch(&url(&server, "/a/export")).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn redirect_loop_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .expect(6)
            .mount(&server)
            .await;

        let err = fetcher().fetch(&url(&server, "/loop")).await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects { max: 5 }));
    }

    #[tokio::test]
    async fn zero_redirects_allowed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/elsewhere"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(Duration::from_secs(5), 0).unwrap();
        let err = fetcher.fetch(&url(&server, "/export")).await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects { max: 0 }));
    }

    #[tokio::test]
    async fn server_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher().fetch(&url(&server, "/export")).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn redirect_without_location_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(302))
            .mount(&server)
            .await;

        let err = fetcher().fetch(&url(&server, "/export")).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::FOUND));
    }

    #[tokio::test]
    async fn connection_failure_is_request_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dead = Url::parse(&format!("http://{}/export", addr)).unwrap();

        let err = fetcher().fetch(&dead).await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }
}
