//! 批量分析接口
//!
//! ## API 列表
//! - POST /api/analyze/batch - 上传股票列表（multipart: stock_list, chart_type），返回批次 id
//! - GET /api/batches - 获取所有批次状态
//! - GET /api/batch/status/{batch_id} - 查询批次进度
//! - GET /api/batch/results/{batch_id} - 获取批次结果（批次结束后可用）
//! - DELETE /api/batch/{batch_id} - 删除已结束的批次
//! - GET /api/download/{batch_id} - 下载结果压缩包

use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse, Result};
use futures::StreamExt;

use crate::error::BatchError;
use crate::models::{default_chart_type, SubmitResponse};
use crate::services::upload::{decode_stock_list, parse_stock_list, validate_upload};
use crate::state::AppState;

/// 上传的股票列表文件
struct StockListUpload {
    filename: Option<String>,
    data: Vec<u8>,
}

/// 读取 multipart 表单，文件超过 `max_bytes` 时立即拒绝
async fn read_batch_form(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<(Option<StockListUpload>, String), BatchError> {
    let mut upload = None;
    let mut chart_type = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| BatchError::InvalidInput(format!("上传数据格式错误: {}", e)))?;

        let field_name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };

        match field_name.as_str() {
            "stock_list" => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string);

                let mut data = Vec::new();
                while let Some(chunk) = field.next().await {
                    let bytes = chunk
                        .map_err(|e| BatchError::InvalidInput(format!("读取上传文件失败: {}", e)))?;
                    if data.len() + bytes.len() > max_bytes {
                        return Err(BatchError::InvalidInput(format!(
                            "文件大小超过限制（最大 {} 字节）",
                            max_bytes
                        )));
                    }
                    data.extend_from_slice(&bytes);
                }
                upload = Some(StockListUpload { filename, data });
            }
            "chart_type" => {
                let mut value = Vec::new();
                while let Some(chunk) = field.next().await {
                    let bytes = chunk
                        .map_err(|e| BatchError::InvalidInput(format!("读取表单字段失败: {}", e)))?;
                    value.extend_from_slice(&bytes);
                }
                let value = String::from_utf8_lossy(&value).trim().to_string();
                if !value.is_empty() {
                    chart_type = Some(value);
                }
            }
            _ => {
                // 跳过未知字段
                while field.next().await.is_some() {}
            }
        }
    }

    Ok((upload, chart_type.unwrap_or_else(default_chart_type)))
}

/// 提交批量分析
///
/// POST /api/analyze/batch
pub async fn submit_batch(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, BatchError> {
    let (upload, chart_type) = read_batch_form(payload, state.max_upload_bytes).await?;
    let upload =
        upload.ok_or_else(|| BatchError::InvalidInput("缺少股票列表文件 stock_list".to_string()))?;

    validate_upload(upload.filename.as_deref(), upload.data.len(), state.max_upload_bytes)?;
    let codes = parse_stock_list(&decode_stock_list(&upload.data))?;

    log::info!(
        "收到批量分析请求: 文件={}, 股票数={}, 图表周期={}",
        upload.filename.as_deref().unwrap_or(""),
        codes.len(),
        chart_type
    );

    let batch_id = state.runner.submit(codes, chart_type).await?;
    Ok(HttpResponse::Ok().json(SubmitResponse {
        batch_id,
        message: "批量分析已开始，请查询进度".to_string(),
    }))
}

/// 查询批次进度
///
/// GET /api/batch/status/{batch_id}
pub async fn get_batch_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BatchError> {
    let status = state.status.get_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// 获取批次结果
///
/// GET /api/batch/results/{batch_id}
pub async fn get_batch_results(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BatchError> {
    let results = state.status.get_results(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(results))
}

/// 下载结果压缩包
///
/// GET /api/download/{batch_id}
pub async fn download_results(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BatchError> {
    let artifact = state.status.get_download_artifact(&path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type(artifact.content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(artifact.filename)],
        })
        .body(artifact.bytes))
}

/// 获取所有批次
///
/// GET /api/batches
pub async fn list_batches(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.status.list().await))
}

/// 删除已结束的批次
///
/// DELETE /api/batch/{batch_id}
pub async fn delete_batch(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, BatchError> {
    let job = state.store().remove(&path.into_inner()).await?;
    log::info!("批次已删除: {}", job.id);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "batch_id": job.id,
        "message": "批次已删除",
    })))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/analyze/batch", web::post().to(submit_batch))
        .route("/batches", web::get().to(list_batches))
        .route("/batch/status/{batch_id}", web::get().to(get_batch_status))
        .route("/batch/results/{batch_id}", web::get().to(get_batch_results))
        .route("/batch/{batch_id}", web::delete().to(delete_batch))
        .route("/download/{batch_id}", web::get().to(download_results));
}
