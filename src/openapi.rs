//! OpenAPI documentation served through Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::cookie::AUTH_COOKIE_NAME;
use crate::error::ApiError;
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Feedloop API",
        version = "1.0.0",
        description = "Multi-tenant feedback collection.\n\n\
        ## Surfaces\n\
        - `/api/v1/widget`: public widget endpoints, gated by each project's domain whitelist or its API key\n\
        - `/api/dashboard`: project owners manage projects, feedback, analytics and webhooks\n\
        - `/api/user`: the signed-in user's profile\n\
        - `/api/admin`: RBAC protected backoffice\n\n\
        ## Authentication\n\
        Login and register set an `auth_token` HttpOnly cookie. The same JWT is accepted as \
        `Authorization: Bearer <token>`.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Authentication", description = "Registration, sessions and password reset"),
        (name = "User", description = "Current user profile"),
        (name = "Projects", description = "Project management for owners"),
        (name = "Feedback", description = "Feedback inbox of a project"),
        (name = "Analytics", description = "NPS and rating analytics"),
        (name = "Webhooks", description = "Outgoing webhook subscriptions"),
        (name = "Widget", description = "Public widget endpoints"),
        (name = "Admin", description = "Users, roles, permissions and resources")
    ),
    paths(
        crate::handlers::health::health_check_simple,
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,
        crate::handlers::health::live_check,

        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::forgot_password,
        crate::handlers::auth::reset_password,

        crate::handlers::user::get_profile,
        crate::handlers::user::update_profile,
        crate::handlers::user::change_password,

        crate::handlers::projects::create_project,
        crate::handlers::projects::list_projects,
        crate::handlers::projects::get_project,
        crate::handlers::projects::update_project,
        crate::handlers::projects::delete_project,
        crate::handlers::projects::update_widget,
        crate::handlers::projects::rotate_api_key,
        crate::handlers::projects::share_project,

        crate::handlers::feedback::list_feedback,
        crate::handlers::feedback::get_feedback,
        crate::handlers::feedback::bulk_update_status,

        crate::handlers::analytics::project_analytics,

        crate::handlers::webhooks::list_webhooks,
        crate::handlers::webhooks::create_webhook,
        crate::handlers::webhooks::delete_webhook,

        crate::handlers::widget::widget_config,
        crate::handlers::widget::widget_step,
        crate::handlers::widget::submit_feedback,
        crate::handlers::widget::public_page,

        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
        crate::handlers::users::set_user_roles,
        crate::handlers::roles::list_roles,
        crate::handlers::roles::create_role,
        crate::handlers::roles::get_role,
        crate::handlers::roles::update_role,
        crate::handlers::roles::delete_role,
        crate::handlers::permissions::list_permissions,
        crate::handlers::permissions::create_permission,
        crate::handlers::permissions::delete_permission,
        crate::handlers::resources::list_resources,
        crate::handlers::resources::create_resource,
        crate::handlers::resources::delete_resource,
    ),
    components(
        schemas(
            ApiError,
            PaginationMeta,

            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::AuthResponse,
            crate::handlers::auth::MessageResponse,
            crate::handlers::auth::ForgotPasswordRequest,
            crate::handlers::auth::ForgotPasswordResponse,
            crate::handlers::auth::ResetPasswordRequest,
            crate::handlers::user::UpdateProfileRequest,
            crate::handlers::user::ChangePasswordRequest,

            crate::models::Project,
            crate::models::ProjectSettings,
            crate::handlers::projects::CreateProjectRequest,
            crate::handlers::projects::UpdateProjectRequest,
            crate::handlers::projects::ProjectResponse,
            crate::handlers::projects::ApiKeyResponse,
            crate::handlers::projects::ShareResponse,
            crate::widget::WidgetConfig,
            crate::widget::WidgetTheme,
            crate::widget::LogicStep,
            crate::widget::ResolvedStep,

            crate::models::Feedback,
            crate::models::FeedbackStatus,
            crate::handlers::feedback::BulkStatusRequest,
            crate::handlers::feedback::BulkStatusResponse,

            crate::analytics::AnalyticsSummary,
            crate::analytics::RatingBucket,
            crate::analytics::StatusCount,
            crate::analytics::TagCount,
            crate::analytics::DailyPoint,
            crate::handlers::analytics::AnalyticsResponse,

            crate::models::Webhook,
            crate::events::EventType,
            crate::events::WebhookEnvelope,
            crate::handlers::webhooks::CreateWebhookRequest,
            crate::handlers::webhooks::WebhookCreatedResponse,

            crate::handlers::widget::WidgetConfigResponse,
            crate::handlers::widget::PublicPageResponse,
            crate::handlers::widget::FeedbackMeta,
            crate::handlers::widget::SubmitFeedbackRequest,
            crate::handlers::widget::SubmitFeedbackResponse,

            crate::models::Role,
            crate::models::Permission,
            crate::models::Resource,
            crate::handlers::users::AdminUserResponse,
            crate::handlers::users::AdminUpdateUserRequest,
            crate::handlers::users::SetUserRolesRequest,
            crate::handlers::roles::CreateRoleRequest,
            crate::handlers::roles::UpdateRoleRequest,
            crate::handlers::roles::RoleResponse,
            crate::handlers::permissions::CreatePermissionRequest,
            crate::handlers::resources::CreateResourceRequest,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cookie_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    AUTH_COOKIE_NAME,
                    "HttpOnly session cookie set by /api/auth/login and /api/auth/register",
                ))),
            );
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "The session JWT sent as `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
