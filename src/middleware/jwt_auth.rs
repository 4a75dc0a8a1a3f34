/// JWT authentication middleware for Bearer token validation.
/// Extracts the user id from token claims and adds it to request extensions.
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, DecodingKey, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

static DECODING_KEY: Lazy<DecodingKey> = Lazy::new(|| {
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string());
    DecodingKey::from_secret(secret.as_bytes())
});

pub fn validate_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(token, &DECODING_KEY, &Validation::default()).map(|data| data.claims)
}

/// User ID extracted from a validated JWT
#[derive(Debug, Clone)]
pub struct UserId(pub Uuid);

/// Reads the bearer token if one is present. Used by endpoints that serve
/// both anonymous and authenticated callers; a bad token reads as anonymous.
pub fn optional_user(req: &HttpRequest) -> Option<Uuid> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    let claims = validate_token(token).ok()?;
    Uuid::parse_str(&claims.sub).ok()
}

pub struct JwtAuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
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
        let service = self.service.clone();

        // Unauthorized requests are answered with a 401 response rather than
        // an Err so the response is produced here, matching what the HTTP
        // dispatcher would emit for the same error.
        fn unauthorized<B>(
            req: ServiceRequest,
            msg: &'static str,
        ) -> ServiceResponse<EitherBody<B>> {
            req.into_response(HttpResponse::from_error(ErrorUnauthorized(msg)))
                .map_into_right_body()
        }

        Box::pin(async move {
            // Read headers before touching extensions_mut so no RefCell
            // borrow is live across the mutable access
            let auth_header = match req.headers().get("Authorization") {
                Some(header) => match header.to_str() {
                    Ok(h) => h.to_string(),
                    Err(_) => {
                        return Ok(unauthorized(req, "Invalid Authorization header"));
                    }
                },
                None => {
                    return Ok(unauthorized(req, "Missing Authorization header"));
                }
            };

            let token = match auth_header.strip_prefix("Bearer ") {
                Some(t) => t.to_string(),
                None => {
                    return Ok(unauthorized(
                        req,
                        "Invalid Authorization scheme, expected Bearer",
                    ));
                }
            };

            let user_id = match validate_token(&token) {
                Ok(claims) => match Uuid::parse_str(&claims.sub) {
                    Ok(id) => id,
                    Err(_) => {
                        return Ok(unauthorized(req, "Invalid user ID in token"));
                    }
                },
                Err(e) => {
                    tracing::debug!("Token validation failed: {}", e);
                    return Ok(unauthorized(req, "Invalid or expired token"));
                }
            };

            req.extensions_mut().insert(UserId(user_id));

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

impl FromRequest for UserId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<UserId>().cloned() {
            Some(user_id) => ready(Ok(user_id)),
            None => ready(Err(ErrorUnauthorized(
                "User ID missing in request extensions",
            ))),
        }
    }
}
