//! Bearer-token admission for protected routes.
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest, ResponseError};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::auth::token::{TokenError, TokenValidator};
use crate::error::AppError;

/// Subject of a validated bearer token, attached to the request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user = req
            .extensions()
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or_else(|| AppError::from(TokenError::MissingCredential));
        ready(user)
    }
}

/// Wraps a scope so that every request must carry a valid bearer token.
pub struct RequireBearer {
    validator: Arc<TokenValidator>,
}

impl RequireBearer {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireBearer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequireBearerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireBearerMiddleware {
            service: Rc::new(service),
            validator: Arc::clone(&self.validator),
        }))
    }
}

pub struct RequireBearerMiddleware<S> {
    service: Rc<S>,
    validator: Arc<TokenValidator>,
}

impl<S, B> Service<ServiceRequest> for RequireBearerMiddleware<S>
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
        let verdict = self.validator.authorize_header(req.headers().get(AUTHORIZATION));

        match verdict {
            Ok(user_id) => {
                req.extensions_mut().insert(AuthenticatedUser { user_id });
                let service = Rc::clone(&self.service);
                Box::pin(async move {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                })
            }
            Err(reason) => {
                warn!("Rejected bearer token on {}: {}", req.path(), reason);
                let response = AppError::from(reason).error_response();
                Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
            }
        }
    }
}
