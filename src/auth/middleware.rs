use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web::Data,
};

use crate::{
    auth::{
        auth::{AuthUser, bearer_token},
        jwt::verify_token,
    },
    config::Config,
    error::{ApiError, ApiResult},
};

fn authenticate(req: &ServiceRequest) -> ApiResult<AuthUser> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or(ApiError::Internal)?;
    let token = bearer_token(req.request())?;
    let claims = verify_token(token, &config.jwt_secret)?;
    AuthUser::from_claims(claims)
}

/// Rejects the request unless it carries a valid access token; the caller is
/// stored in the request extensions for the `AuthUser` extractor.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    match authenticate(&req) {
        Ok(auth_user) => {
            req.extensions_mut().insert(auth_user);
            next.call(req).await
        }
        Err(e) => {
            tracing::debug!(path = %req.path(), error = %e, "Rejected unauthenticated request");
            let resp = e.error_response();
            Ok(req.into_response(resp))
        }
    }
}
