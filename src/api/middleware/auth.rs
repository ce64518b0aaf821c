//! 调用方身份
//!
//! 登录由外部系统完成，这里只校验其签发的 Bearer token。
//! `CallerAuth` 不拒绝任何请求：token 有效时把 `Caller` 放进 extensions，
//! 由处理器通过 `Caller` 提取器决定 401，再用 `require_role` 决定 403。

use actix_service::{Service, Transform};
use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest,
    dev::{Payload, ServiceRequest, ServiceResponse},
    http::header::AUTHORIZATION,
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::api::jwt::JwtService;
use crate::errors::PrivalyticsError;

/// 已通过校验的调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Caller {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn require_role(&self, role: &str) -> Result<(), PrivalyticsError> {
        if self.has_role(role) {
            Ok(())
        } else {
            debug!("Caller {} lacks role {}", self.subject, role);
            Err(PrivalyticsError::forbidden("Forbidden"))
        }
    }
}

impl FromRequest for Caller {
    type Error = PrivalyticsError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Caller>()
                .cloned()
                .ok_or_else(|| PrivalyticsError::unauthorized("Unauthorized")),
        )
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[derive(Clone)]
pub struct CallerAuth {
    jwt: Arc<JwtService>,
}

impl CallerAuth {
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self { jwt }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CallerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = CallerAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CallerAuthMiddleware {
            service: Rc::new(service),
            jwt: self.jwt.clone(),
        }))
    }
}

pub struct CallerAuthMiddleware<S> {
    service: Rc<S>,
    jwt: Arc<JwtService>,
}

impl<S, B> Service<ServiceRequest> for CallerAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = bearer_token(&req) {
            match self.jwt.validate(token) {
                Ok(claims) => {
                    trace!("Bearer token accepted for {}", claims.sub);
                    req.extensions_mut().insert(Caller {
                        subject: claims.sub,
                        roles: claims.roles,
                    });
                }
                Err(e) => debug!("Bearer token rejected: {}", e),
            }
        }

        let srv = self.service.clone();
        Box::pin(async move { srv.call(req).await })
    }
}
