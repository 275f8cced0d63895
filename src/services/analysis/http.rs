//! 远程图表分析服务客户端
//!
//! 请求 `POST <endpoint>`，请求体 `{stock_code, chart_type}`，
//! 返回 `{stock_name, chart_type, analysis_score, summary, detailed_analysis}` 或 `{error}`

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use super::{AnalysisError, AnalysisUnit};
use crate::config::AnalysisConfig;
use crate::models::{AnalysisPayload, AnalysisRequest};

pub struct HttpAnalysisUnit {
    client: Client,
    endpoint: Url,
}

impl HttpAnalysisUnit {
    pub fn from_config(config: &AnalysisConfig) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .gzip(true)
            .build()?;

        log::info!("图表分析服务地址: {}", endpoint);
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl AnalysisUnit for HttpAnalysisUnit {
    async fn analyze(
        &self,
        stock_code: &str,
        chart_type: &str,
    ) -> Result<AnalysisPayload, AnalysisError> {
        let request = AnalysisRequest {
            stock_code: stock_code.to_string(),
            chart_type: chart_type.to_string(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::SERVICE_UNAVAILABLE
        ) {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Unavailable(format!(
                "{} {}",
                status,
                extract_error(&text).unwrap_or(text)
            )));
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(AnalysisError::Failed(format!(
                "{} {}",
                status,
                extract_error(&text).unwrap_or(text)
            )));
        }

        parse_payload(&text)
    }
}

/// 从错误响应体里取出 `error` 字段
fn extract_error(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

/// 解析分析服务的成功响应
fn parse_payload(body: &str) -> Result<AnalysisPayload, AnalysisError> {
    if let Some(error) = extract_error(body) {
        return Err(AnalysisError::Failed(error));
    }

    let payload: AnalysisPayload = serde_json::from_str(body)
        .map_err(|e| AnalysisError::Failed(format!("分析结果格式错误: {}", e)))?;

    if !(0.0..=100.0).contains(&payload.analysis_score) {
        return Err(AnalysisError::Failed(format!(
            "分析评分超出范围: {}",
            payload.analysis_score
        )));
    }

    Ok(payload)
}
