use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use crate::{
    auth::jwt::verify_token,
    config::Config,
    error::{ApiError, ApiResult},
    model::role::Role,
    models::{Claims, TokenType},
};

/// The caller of a protected route.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// Only access tokens identify a caller.
    pub fn from_claims(claims: Claims) -> ApiResult<Self> {
        if claims.token_type != TokenType::Access {
            return Err(ApiError::unauthorized("Access token required"));
        }
        let role = Role::from_id(claims.role).ok_or_else(|| ApiError::unauthorized("Invalid role"))?;
        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            role,
        })
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin only"))
        }
    }

    pub fn require_staff(&self) -> ApiResult<()> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin/Manager only"))
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Resolves an optional `user_id` filter: absent means self, anyone
    /// else requires staff.
    pub fn target_user(&self, requested: Option<u64>) -> ApiResult<u64> {
        match requested {
            None => Ok(self.user_id),
            Some(id) if id == self.user_id => Ok(id),
            Some(id) => {
                self.require_staff()?;
                Ok(id)
            }
        }
    }

    pub fn ensure_self_or_staff(&self, owner_id: u64) -> ApiResult<()> {
        self.target_user(Some(owner_id)).map(|_| ())
    }
}

/// Bearer token from the `Authorization` header.
pub fn bearer_token(req: &HttpRequest) -> ApiResult<&str> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header encoding"))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Authorization header must start with Bearer"))
}

fn extract(req: &HttpRequest) -> ApiResult<AuthUser> {
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let config = req
        .app_data::<Data<Config>>()
        .ok_or(ApiError::Internal)?;
    let claims = verify_token(bearer_token(req)?, &config.jwt_secret)?;
    AuthUser::from_claims(claims)
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 10,
            email: "u@x.io".into(),
            role,
        }
    }

    #[test]
    fn staff_checks() {
        assert!(user(Role::Admin).require_admin().is_ok());
        assert!(user(Role::Manager).require_admin().is_err());
        assert!(user(Role::Manager).require_staff().is_ok());
        assert!(user(Role::Student).require_staff().is_err());
    }

    #[test]
    fn target_user_defaults_to_self() {
        let employee = user(Role::Employee);
        assert_eq!(employee.target_user(None).unwrap(), 10);
        assert_eq!(employee.target_user(Some(10)).unwrap(), 10);
        assert!(matches!(employee.target_user(Some(11)), Err(ApiError::Forbidden(_))));
        assert_eq!(user(Role::Manager).target_user(Some(11)).unwrap(), 11);
    }

    #[test]
    fn refresh_claims_do_not_authenticate() {
        let claims = Claims {
            user_id: 1,
            sub: "a@b.c".into(),
            role: 3,
            exp: usize::MAX,
            jti: "j".into(),
            token_type: TokenType::Refresh,
        };
        assert!(AuthUser::from_claims(claims.clone()).is_err());

        let access = Claims {
            token_type: TokenType::Access,
            ..claims
        };
        assert_eq!(AuthUser::from_claims(access).unwrap().role, Role::Employee);
    }
}
