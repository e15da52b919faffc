use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};

use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::{extract_bearer_token, validate_token};

/// Rejects requests without a valid bearer token and stores the caller in
/// the request extensions for `Extension<User>` extractors.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

/// Passes when the caller holds any of `roles`.
pub fn require_any_role(user: &User, roles: &[UserRole]) -> Result<(), AppError> {
    match user.app_role() {
        Some(role) if roles.contains(&role) => Ok(()),
        _ => Err(AppError::Forbidden(format!(
            "This action requires one of the roles: {}",
            roles.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestUser;

    #[test]
    fn test_require_any_role() {
        let doctor = TestUser::doctor("doc@example.com").to_user();
        assert!(require_any_role(&doctor, &[UserRole::Doctor, UserRole::Admin]).is_ok());

        let patient = TestUser::patient("p@example.com").to_user();
        let err = require_any_role(&patient, &[UserRole::Admin]).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn test_extract_user_from_extensions() {
        let mut request = Request::new(Body::empty());
        assert!(extract_user(&request).is_err());

        let user = TestUser::default().to_user();
        request.extensions_mut().insert(user.clone());
        assert_eq!(extract_user(&request).unwrap().id, user.id);
    }
}
