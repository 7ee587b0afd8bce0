use crate::api::handlers::{
    associations, auth, batches, degrees, departments, programmes, students, users,
};
use crate::auth::guard::{
    guarded, AdminOnly, AdminOrStaff, AnyRole, DepartmentMembers, HodOnly, HodOrStaff,
    StudentOnly,
};
use crate::auth::rate_limit::rate_limit;
use crate::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use utoipa::OpenApi;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(super::ApiDoc::openapi())
}

/// REST API router, mounted under `/api`.
///
/// Every route sits behind the rate limiter; everything except login and the
/// OpenAPI document also sits behind a role guard.
pub fn create_router(state: &AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/openapi.json", get(openapi_json));

    let account_routes = Router::new()
        .route(
            "/auth/me",
            guarded::<AnyRole>(state, get(auth::me).put(auth::update_me)),
        )
        .route("/auth/logout", guarded::<AnyRole>(state, post(auth::logout)));

    let admin_routes = Router::new()
        .route(
            "/departments",
            guarded::<AdminOnly>(
                state,
                get(departments::list_departments).post(departments::create_department),
            ),
        )
        .route(
            "/departments/{id}",
            guarded::<AdminOnly>(
                state,
                get(departments::get_department)
                    .put(departments::update_department)
                    .delete(departments::delete_department),
            ),
        )
        .route(
            "/degrees",
            guarded::<AdminOnly>(state, get(degrees::list_degrees).post(degrees::create_degree)),
        )
        .route(
            "/degrees/{id}",
            guarded::<AdminOnly>(
                state,
                get(degrees::get_degree)
                    .put(degrees::update_degree)
                    .delete(degrees::delete_degree),
            ),
        );

    let hod_routes = Router::new()
        .route(
            "/users",
            guarded::<HodOnly>(state, get(users::list_users).post(users::create_user)),
        )
        .route(
            "/users/bulk",
            guarded::<HodOnly>(state, post(users::bulk_create_users)),
        )
        .route(
            "/users/activate",
            guarded::<HodOnly>(state, put(users::activate_users)),
        )
        .route(
            "/users/{id}",
            guarded::<HodOnly>(
                state,
                get(users::get_user)
                    .put(users::update_user)
                    .delete(users::delete_user),
            ),
        )
        .route(
            "/users/{id}/activate",
            guarded::<HodOnly>(state, put(users::activate_user)),
        )
        .route(
            "/users/{id}/deactivate",
            guarded::<HodOnly>(state, put(users::deactivate_user)),
        )
        .route(
            "/users/{id}/reset-password",
            guarded::<HodOnly>(state, put(users::reset_password)),
        );

    // Reads are open to the whole department, writes are narrower.
    let academic_routes = Router::new()
        .route(
            "/programmes",
            guarded::<DepartmentMembers>(state, get(programmes::list_programmes))
                .merge(guarded::<HodOnly>(state, post(programmes::create_programme))),
        )
        .route(
            "/programmes/{id}",
            guarded::<DepartmentMembers>(state, get(programmes::get_programme)).merge(
                guarded::<HodOnly>(
                    state,
                    put(programmes::update_programme).delete(programmes::delete_programme),
                ),
            ),
        )
        .route(
            "/batches",
            guarded::<DepartmentMembers>(state, get(batches::list_batches))
                .merge(guarded::<HodOrStaff>(state, post(batches::create_batch))),
        )
        .route(
            "/batches/{id}",
            guarded::<DepartmentMembers>(state, get(batches::get_batch))
                .merge(guarded::<HodOrStaff>(state, put(batches::update_batch)))
                .merge(guarded::<HodOnly>(
                    state,
                    axum::routing::delete(batches::delete_batch),
                )),
        );

    let association_routes = Router::new()
        .route(
            "/association-types",
            guarded::<AnyRole>(state, get(associations::list_association_types)).merge(
                guarded::<AdminOnly>(state, post(associations::create_association_type)),
            ),
        )
        .route(
            "/association-types/{id}",
            guarded::<AnyRole>(state, get(associations::get_association_type)).merge(
                guarded::<AdminOnly>(
                    state,
                    put(associations::update_association_type)
                        .delete(associations::delete_association_type),
                ),
            ),
        )
        .route(
            "/associations",
            guarded::<AdminOrStaff>(
                state,
                get(associations::list_associations).post(associations::assign_students),
            ),
        )
        .route(
            "/associations/{faculty_id}/{student_id}/{association_type_id}",
            guarded::<AdminOrStaff>(
                state,
                axum::routing::delete(associations::remove_association),
            ),
        );

    let student_routes = Router::new().route(
        "/students/me",
        guarded::<StudentOnly>(
            state,
            get(students::my_profile).put(students::update_my_profile),
        ),
    );

    public_routes
        .merge(account_routes)
        .merge(admin_routes)
        .merge(hod_routes)
        .merge(academic_routes)
        .merge(association_routes)
        .merge(student_routes)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
}
