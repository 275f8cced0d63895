//! 股票图表批量分析后端服务
//!
//! 读取配置后启动 HTTP 服务器，并在后台定期清理过期批次

use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use std::sync::Arc;

use chart_batch::config::AppConfig;
use chart_batch::handlers;
use chart_batch::middleware::ApiKeyMiddleware;
use chart_batch::services::analysis::HttpAnalysisUnit;
use chart_batch::services::batch::spawn_retention_sweeper;
use chart_batch::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config_path = AppConfig::find_config_file();
    let loaded = AppConfig::load_from(config_path);

    // RUST_LOG 优先于配置文件中的日志级别；配置读取失败时按 info 输出错误
    let level = loaded
        .as_ref()
        .map(|config| config.log.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::init_from_env(Env::default().default_filter_or(level));

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            return Err(e);
        }
    };
    match config_path {
        Some(path) => log::info!("从 {} 加载配置成功", path),
        None => log::info!("未找到配置文件，使用默认配置"),
    }

    if config.api.api_key.is_empty() {
        log::warn!("未设置 API Key，接口不做认证");
    }

    let unit = HttpAnalysisUnit::from_config(&config.analysis)?;

    let state = web::Data::new(AppState::new(Arc::new(unit), &config.batch));
    let sweeper = spawn_retention_sweeper(
        state.store().clone(),
        config.batch.retention(),
        config.batch.sweep_interval(),
    );

    let bind_addr = config.bind_addr();
    log::info!(
        "启动批量分析服务: {}，单批次并发数 {}",
        bind_addr,
        config.batch.max_concurrency
    );

    let api_key = config.api.api_key.clone();
    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(ApiKeyMiddleware::new(api_key.clone()))
            .configure(handlers::config)
    });
    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    let result = server.bind(&bind_addr)?.run().await;
    sweeper.abort();
    result?;
    Ok(())
}
