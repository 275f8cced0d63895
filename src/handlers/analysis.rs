//! 单只股票分析接口
//!
//! - POST /api/analyze/single/chart - 按股票代码生成图表并同步分析
//! - GET /api/chart-types - 获取可选图表周期

use actix_web::{web, HttpResponse, Result};

use crate::error::BatchError;
use crate::models::{AnalysisRequest, ChartTypeOption, ErrorResponse};
use crate::services::upload::validate_stock_code;
use crate::state::AppState;

/// 同步分析单只股票
///
/// POST /api/analyze/single/chart
///
/// # 请求体
/// - stock_code: 6 位股票代码
/// - chart_type: 图表周期（默认 day）
pub async fn analyze_single_chart(
    state: web::Data<AppState>,
    body: web::Json<AnalysisRequest>,
) -> Result<HttpResponse, BatchError> {
    let request = body.into_inner();
    let stock_code = request.stock_code.trim();
    validate_stock_code(stock_code)?;

    log::info!("单只股票分析: 股票代码={}, 图表周期={}", stock_code, request.chart_type);

    let analysis = state.unit.analyze(stock_code, &request.chart_type);
    let response = match tokio::time::timeout(state.item_timeout, analysis).await {
        Ok(Ok(payload)) => HttpResponse::Ok().json(payload),
        Ok(Err(e)) if e.is_fatal() => {
            log::error!("分析服务不可用: {}", e);
            HttpResponse::ServiceUnavailable().json(ErrorResponse::new(e.to_string()))
        }
        Ok(Err(e)) => {
            log::warn!("股票 {} 分析失败: {}", stock_code, e);
            HttpResponse::BadGateway().json(ErrorResponse::new(e.to_string()))
        }
        Err(_) => HttpResponse::GatewayTimeout().json(ErrorResponse::new(format!(
            "分析超时（{:?}）",
            state.item_timeout
        ))),
    };
    Ok(response)
}

/// 获取图表周期列表
///
/// GET /api/chart-types
pub async fn get_chart_types() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ChartTypeOption::all()))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/analyze/single/chart", web::post().to(analyze_single_chart))
        .route("/chart-types", web::get().to(get_chart_types));
}
