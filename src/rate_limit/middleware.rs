use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, ResponseError};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::AppError;
use crate::rate_limit::{Decision, RateLimitPolicy, RateLimiter};

/// Admission check run before the wrapped service. When disabled, requests
/// pass straight through.
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    policy: Arc<RateLimitPolicy>,
    enabled: bool,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>, policy: RateLimitPolicy, enabled: bool) -> Self {
        Self {
            limiter,
            policy: Arc::new(policy),
            enabled,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: Arc::clone(&self.limiter),
            policy: Arc::clone(&self.policy),
            enabled: self.enabled,
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    policy: Arc<RateLimitPolicy>,
    enabled: bool,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = Arc::clone(&self.limiter);
        let policy = Arc::clone(&self.policy);
        let enabled = self.enabled;

        Box::pin(async move {
            if !enabled {
                return service.call(req).await.map(ServiceResponse::map_into_left_body);
            }

            let caller = req.peer_addr().map(|addr| addr.ip());
            match limiter.check(&policy, caller).await {
                Decision::Admit => {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Decision::Reject(reason) => {
                    let response = AppError::from(reason).error_response();
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}
