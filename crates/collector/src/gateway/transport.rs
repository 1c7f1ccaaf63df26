//! 수집 서버 HTTP 전송

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::CollectorError;

/// 봉투 바이트를 수집 서버로 보내는 전송 계층
///
/// 성공 시 HTTP 상태 코드와 응답 본문을 반환합니다.
/// 상태 코드 해석은 게이트웨이가 담당합니다.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<(u16, Vec<u8>), CollectorError>> + Send;
}

/// reqwest 기반 전송
///
/// 연결 재사용 없이 요청마다 새 연결을 엽니다.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    url: String,
}

impl ReqwestTransport {
    pub fn new(url: &str, timeout: Duration, proxy: Option<&str>) -> Result<Self, CollectorError> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0);

        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| CollectorError::Config {
                field: "output.proxy".to_owned(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| CollectorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_owned(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for ReqwestTransport {
    async fn post(&self, body: Vec<u8>) -> Result<(u16, Vec<u8>), CollectorError> {
        debug!(url = %self.url, bytes = body.len(), "posting envelope");
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| CollectorError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| CollectorError::Transport(e.to_string()))?;
        Ok((status, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_proxy_is_config_error() {
        let err = ReqwestTransport::new(
            "http://localhost:5000/collect",
            Duration::from_secs(1),
            Some("http://[::1"),
        )
        .unwrap_err();
        assert!(matches!(err, CollectorError::Config { .. }));
    }

    #[test]
    fn empty_proxy_is_ignored() {
        let transport =
            ReqwestTransport::new("http://localhost:5000/collect", Duration::from_secs(1), Some(""))
                .unwrap();
        assert_eq!(transport.url(), "http://localhost:5000/collect");
    }

    #[tokio::test]
    async fn post_returns_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/collect")
            .match_header("content-type", "application/json")
            .with_status(503)
            .with_body("busy")
            .create_async()
            .await;

        let transport = ReqwestTransport::new(
            &format!("{}/collect", server.url()),
            Duration::from_secs(5),
            None,
        )
        .unwrap();
        let (status, body) = transport.post(b"{}".to_vec()).await.unwrap();
        assert_eq!(status, 503);
        assert_eq!(body, b"busy");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // 1번 포트에는 리스너가 없음
        let transport =
            ReqwestTransport::new("http://127.0.0.1:1/collect", Duration::from_secs(2), None)
                .unwrap();
        let err = transport.post(Vec::new()).await.unwrap_err();
        assert!(matches!(err, CollectorError::Transport(_)));
    }
}
