//! 预置股票列表接口
//!
//! - GET /api/stocks - 读取服务端股票列表文件

use actix_web::{web, HttpResponse, Result};

use crate::error::BatchError;
use crate::models::StockListResponse;
use crate::services::upload::load_stock_list_file;
use crate::state::AppState;

/// 获取预置股票列表
///
/// GET /api/stocks
pub async fn get_stock_list(state: web::Data<AppState>) -> Result<HttpResponse, BatchError> {
    let stocks = load_stock_list_file(&state.stock_list_path).await?;
    Ok(HttpResponse::Ok().json(StockListResponse { stocks }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/stocks", web::get().to(get_stock_list));
}
