pub mod analysis;
pub mod batch;
pub mod health;
pub mod stocks;

use actix_web::{error, web, HttpResponse};

use crate::models::ErrorResponse;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(json_config())
            .configure(health::config)
            .configure(analysis::config)
            .configure(batch::config)
            .configure(stocks::config),
    );
}

/// JSON 解析失败时同样返回 `{error, timestamp}`
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest()
            .json(ErrorResponse::new(format!("请求数据格式错误: {}", err)));
        error::InternalError::from_response(err, response).into()
    })
}
