//! 后端接口封装

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::ClientError;
use crate::models::{BatchResultsView, BatchStatusView, ErrorResponse, SubmitResponse};

/// 客户端用到的后端接口
#[async_trait]
pub trait BatchApi: Send + Sync {
    /// POST /api/analyze/batch
    async fn submit_batch(
        &self,
        filename: &str,
        data: Vec<u8>,
        chart_type: &str,
    ) -> Result<SubmitResponse, ClientError>;

    /// GET /api/batch/status/{batch_id}
    async fn fetch_status(&self, batch_id: &str) -> Result<BatchStatusView, ClientError>;

    /// GET /api/batch/results/{batch_id}
    async fn fetch_results(&self, batch_id: &str) -> Result<BatchResultsView, ClientError>;

    /// GET /api/download/{batch_id}，返回 zip 内容
    async fn download(&self, batch_id: &str) -> Result<Vec<u8>, ClientError>;
}

/// 基于 reqwest 的实现
pub struct HttpBatchApi {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpBatchApi {
    /// `server` 为服务根地址，如 `http://127.0.0.1:8080`
    pub fn new(server: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, ClientError> {
        let mut base = Url::parse(server)
            .map_err(|e| ClientError::InvalidInput(format!("服务地址无效 {}: {}", server, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).gzip(true).build()?;
        Ok(Self {
            client,
            base,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::InvalidInput(format!("无效的请求路径 {}: {}", path, e)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.endpoint(path)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let text = check_status(response).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// 非 2xx 响应转换为错误，优先使用 `{error}` 中的信息
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);

    if status == StatusCode::NOT_FOUND {
        Err(ClientError::NotFound(message))
    } else {
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BatchApi for HttpBatchApi {
    async fn submit_batch(
        &self,
        filename: &str,
        data: Vec<u8>,
        chart_type: &str,
    ) -> Result<SubmitResponse, ClientError> {
        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("text/plain")?;
        let form = Form::new()
            .part("stock_list", part)
            .text("chart_type", chart_type.to_string());

        let url = self.endpoint("api/analyze/batch")?;
        let response = self
            .authorize(self.client.post(url))
            .multipart(form)
            .send()
            .await?;
        let text = check_status(response).await?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_status(&self, batch_id: &str) -> Result<BatchStatusView, ClientError> {
        self.get_json(&format!("api/batch/status/{}", batch_id)).await
    }

    async fn fetch_results(&self, batch_id: &str) -> Result<BatchResultsView, ClientError> {
        self.get_json(&format!("api/batch/results/{}", batch_id)).await
    }

    async fn download(&self, batch_id: &str) -> Result<Vec<u8>, ClientError> {
        let url = self.endpoint(&format!("api/download/{}", batch_id))?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
