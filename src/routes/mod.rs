mod auth;
mod home;
mod images;
mod jobs;
mod models;
mod presets;
mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::middleware::auth::auth_middleware;
use crate::middleware::role::require_admin;
use crate::state::AppState;

/// Room for multipart boundaries and headers around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        home::root,
        home::health,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::me,
        jobs::create_job,
        jobs::list_jobs,
        jobs::get_job,
        images::gallery,
        images::get_image,
        images::download_image,
        images::get_thumbnail,
        images::delete_image,
        upload::upload_image,
        presets::list_presets,
        presets::get_preset,
        presets::create_preset,
        presets::update_preset,
        presets::delete_preset,
        models::list_models,
        models::device_info,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            home::RootResponse,
            home::HealthResponse,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::MessageResponse,
            auth::UserProfile,
            auth::AuthResponse,
            crate::services::auth::TokenPair,
            jobs::CreateJobRequest,
            jobs::JobResponse,
            crate::entities::job::JobType,
            crate::entities::job::JobStatus,
            crate::utils::image_processor::MaskRegion,
            crate::utils::image_processor::Point,
            images::ImageResponse,
            upload::UploadResponse,
            presets::PresetResponse,
            presets::PresetListResponse,
            presets::CreatePresetRequest,
            presets::UpdatePresetRequest,
            crate::entities::preset::PresetCategory,
            models::ModelResponse,
            models::ModelListResponse,
            crate::models::catalog::Task,
            crate::models::catalog::ModelFamily,
            crate::services::inference::DeviceInfo,
        )
    ),
    tags(
        (name = "General", description = "Service information"),
        (name = "Authentication", description = "Registration, login, token refresh and logout"),
        (name = "Jobs", description = "Submit and track image generation jobs"),
        (name = "Images", description = "Uploads and the generated image gallery"),
        (name = "Presets", description = "Inpainting presets (writes require admin)"),
        (name = "Models", description = "Model catalog and inference backend status")
    ),
    info(
        title = "ImagePlayground API",
        version = "0.1.0",
        description = "Text-to-image, image-to-image and inpainting jobs over local or hosted Stable Diffusion backends",
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_routes(state: AppState) -> Router {
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    let upload_limit = state.config.max_image_size_bytes() + MULTIPART_OVERHEAD;

    // Any signed-in user
    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/api/jobs/{id}", get(jobs::get_job))
        .route("/api/images", get(images::gallery))
        .route(
            "/api/images/upload",
            post(upload::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/images/{id}", get(images::get_image).delete(images::delete_image))
        .route("/api/images/{id}/download", get(images::download_image))
        .route("/api/images/{id}/thumbnail", get(images::get_thumbnail))
        .route("/api/models", get(models::list_models))
        .route("/api/models/device", get(models::device_info))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/api/presets", post(presets::create_preset))
        .route(
            "/api/presets/{id}",
            patch(presets::update_preset).delete(presets::delete_preset),
        )
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let app_routes = Router::new()
        .route("/", get(home::root))
        .route("/health", get(home::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/presets", get(presets::list_presets))
        .route("/api/presets/{id}", get(presets::get_preset))
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state.clone());

    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use crate::test_support::{body_json, create_user, TestApp};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_and_root_are_public() {
        let app = TestApp::new().await;
        for uri in ["/", "/health"] {
            let response = app
                .router
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["version"], env!("CARGO_PKG_VERSION"));
        }
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = TestApp::new().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert!(doc["paths"]["/api/jobs"].is_object());
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    }

    #[tokio::test]
    async fn register_login_refresh_logout_flow() {
        let app = TestApp::new().await;
        let registration = json!({
            "email": "Ada@Example.com",
            "username": "ada",
            "password": "correct horse"
        });

        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/auth/register", None, registration.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert_eq!(body["user"]["daily_limit"], app.state.config.daily_generation_limit);

        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/auth/register", None, registration))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Email already registered");

        let response = app
            .router
            .clone()
            .oneshot(app.json(
                "POST",
                "/api/auth/login",
                None,
                json!({"email": "ada@example.com", "password": "wrong password"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .router
            .clone()
            .oneshot(app.json(
                "POST",
                "/api/auth/login",
                None,
                json!({"email": "ada@example.com", "password": "correct horse"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tokens = body_json(response).await["tokens"].clone();
        let access = tokens["access_token"].as_str().unwrap().to_string();
        let refresh = tokens["refresh_token"].as_str().unwrap().to_string();

        let response = app.router.clone().oneshot(app.get("/api/auth/me", &access)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["daily_usage"], 0);

        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/auth/refresh", None, json!({"refresh_token": refresh})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rotated = body_json(response).await["refresh_token"].as_str().unwrap().to_string();

        // The presented token was revoked by the rotation.
        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/auth/refresh", None, json!({"refresh_token": refresh})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/auth/logout", None, json!({"refresh_token": rotated})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(app.json("POST", "/api/auth/logout", None, json!({"refresh_token": "unknown"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_tokens_are_rejected() {
        let app = TestApp::new().await;
        let response = app.router.clone().oneshot(app.get("/api/auth/me", "garbage")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let user = create_user(&app.state.db, "ada", false).await;
        let response = app
            .router
            .clone()
            .oneshot(app.get("/api/auth/me", &app.token_for(&user)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
