//! API Key 认证中间件
//!
//! 通过 Header 中的 Authorization: Bearer <token> 进行认证。
//! 未配置 API Key 时不做任何校验；健康检查接口始终放行。

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::models::ErrorResponse;

/// API Key 中间件
pub struct ApiKeyMiddleware {
    api_key: Option<Rc<str>>,
}

impl ApiKeyMiddleware {
    /// `api_key` 为空时关闭认证
    pub fn new(api_key: String) -> Self {
        let api_key = api_key.trim();
        Self {
            api_key: (!api_key.is_empty()).then(|| Rc::from(api_key)),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ApiKeyMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ApiKeyMiddlewareService {
            service: Rc::new(service),
            api_key: self.api_key.clone(),
        })
    }
}

pub struct ApiKeyMiddlewareService<S> {
    service: Rc<S>,
    api_key: Option<Rc<str>>,
}

/// 请求是否携带了正确的 Bearer Token
fn is_authorized(req: &ServiceRequest, expected: &str) -> bool {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim() == expected)
        .unwrap_or(false)
}

impl<S, B> Service<ServiceRequest> for ApiKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let allowed = match &self.api_key {
            None => true,
            Some(_) if req.path().ends_with("/health") => true,
            Some(expected) => is_authorized(&req, expected),
        };

        Box::pin(async move {
            if allowed {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            log::warn!("拒绝未认证请求: {} {}", req.method(), req.path());
            let response =
                HttpResponse::Unauthorized().json(ErrorResponse::new("无效的 Bearer Token"));
            Ok(req.into_response(response).map_into_right_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App};

    async fn ping() -> HttpResponse {
        HttpResponse::Ok().body("pong")
    }

    #[actix_web::test]
    async fn test_bearer_token_required() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyMiddleware::new("secret".to_string()))
                .route("/api/batches", web::get().to(ping))
                .route("/api/health", web::get().to(ping)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/batches").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/batches")
            .insert_header(("Authorization", "Bearer wrong"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/batches")
            .insert_header(("Authorization", "Bearer secret"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_empty_key_disables_auth() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyMiddleware::new("  ".to_string()))
                .route("/api/batches", web::get().to(ping)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/batches").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
