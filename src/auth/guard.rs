use super::jwt::extract_bearer;
use crate::types::{AppError, Principal, Result, Role};
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};

/// A set of roles allowed through a guarded route.
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;
pub struct HodOnly;
pub struct HodOrStaff;
/// Faculty-student assignment: ADMIN everywhere, STAFF inside their department.
pub struct AdminOrStaff;
pub struct StudentOnly;
/// Every department-scoped role.
pub struct DepartmentMembers;
pub struct AnyRole;

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

impl RolePolicy for HodOnly {
    const ALLOWED: &'static [Role] = &[Role::Hod];
}

impl RolePolicy for HodOrStaff {
    const ALLOWED: &'static [Role] = &[Role::Hod, Role::Staff];
}

impl RolePolicy for AdminOrStaff {
    const ALLOWED: &'static [Role] = &[Role::Admin, Role::Staff];
}

impl RolePolicy for StudentOnly {
    const ALLOWED: &'static [Role] = &[Role::Student];
}

impl RolePolicy for DepartmentMembers {
    const ALLOWED: &'static [Role] = &[Role::Hod, Role::Staff, Role::Faculty, Role::Student];
}

impl RolePolicy for AnyRole {
    const ALLOWED: &'static [Role] = &Role::ALL;
}

pub fn require_role(principal: &Principal, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ))
    }
}

/// Confirms the resource belongs to the principal's department.
///
/// A mismatch reads as "not found"; another department's records never
/// reveal that they exist.
pub fn require_own_department(principal: &Principal, resource_department_id: i64) -> Result<()> {
    match principal.department_id {
        Some(own) if own == resource_department_id => Ok(()),
        _ => Err(AppError::NotFound("Resource not found".to_string())),
    }
}

/// The principal's department, for handlers that only make sense inside one.
pub fn own_department(principal: &Principal) -> Result<i64> {
    principal
        .department_id
        .ok_or_else(|| AppError::Forbidden("No department assigned to this account".to_string()))
}

pub fn forbid_self(principal: &Principal, target_user_id: i64) -> Result<()> {
    if principal.user_id == target_user_id {
        Err(AppError::Forbidden(
            "You cannot perform this action on your own account".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Bearer-token guard: authenticates, checks the role set, and hands the
/// [`Principal`] to the handler through request extensions.
pub async fn api_guard<P: RolePolicy>(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = extract_bearer(req.headers()).ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    let principal = state.authenticator.resolve_token(&token).await?;
    require_role(&principal, P::ALLOWED)?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Wraps a method router in the token guard for policy `P`.
pub fn guarded<P: RolePolicy>(
    state: &AppState,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        state.clone(),
        api_guard::<P>,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn principal(role: Role, department_id: Option<i64>) -> Principal {
        Principal {
            user_id: 10,
            email: "someone@uni.edu".to_string(),
            full_name: "Someone".to_string(),
            role,
            department_id,
        }
    }

    #[rstest]
    #[case(Role::Admin, AdminOnly::ALLOWED, true)]
    #[case(Role::Hod, AdminOnly::ALLOWED, false)]
    #[case(Role::Hod, HodOnly::ALLOWED, true)]
    #[case(Role::Staff, HodOnly::ALLOWED, false)]
    #[case(Role::Staff, HodOrStaff::ALLOWED, true)]
    #[case(Role::Faculty, HodOrStaff::ALLOWED, false)]
    #[case(Role::Student, DepartmentMembers::ALLOWED, true)]
    #[case(Role::Admin, DepartmentMembers::ALLOWED, false)]
    #[case(Role::Staff, AdminOrStaff::ALLOWED, true)]
    #[case(Role::Hod, AdminOrStaff::ALLOWED, false)]
    #[case(Role::Student, StudentOnly::ALLOWED, true)]
    #[case(Role::Faculty, StudentOnly::ALLOWED, false)]
    #[case(Role::Student, AnyRole::ALLOWED, true)]
    fn test_role_membership(#[case] role: Role, #[case] allowed: &[Role], #[case] ok: bool) {
        let result = require_role(&principal(role, Some(1)), allowed);
        assert_eq!(result.is_ok(), ok);
        if let Err(err) = result {
            assert!(matches!(err, AppError::Forbidden(_)));
        }
    }

    #[rstest]
    #[case(Some(1), 1, true)]
    #[case(Some(1), 2, false)]
    #[case(None, 1, false)]
    fn test_department_scope(
        #[case] own: Option<i64>,
        #[case] resource: i64,
        #[case] ok: bool,
    ) {
        let result = require_own_department(&principal(Role::Hod, own), resource);
        assert_eq!(result.is_ok(), ok);
        if let Err(err) = result {
            assert!(matches!(err, AppError::NotFound(_)));
        }
    }

    #[test]
    fn test_forbid_self() {
        let me = principal(Role::Hod, Some(1));
        assert!(matches!(forbid_self(&me, 10), Err(AppError::Forbidden(_))));
        assert!(forbid_self(&me, 11).is_ok());
    }
}
