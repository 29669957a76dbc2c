use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, HttpResponse};
use tokio::time::timeout;

use crate::auth::{create_access_token, Auth, Claims};
use crate::error::ApiError;
use crate::models::*;
use crate::pagination::{cursor_window, total_pages, CursorPage, ListParams, OffsetPage};
use crate::password::{hash_password, verify_password};
use crate::rate_limit::WriteLimiter;
use crate::repo::{Repo, RepoError};
use crate::tree;

/// Upper bound on tree assembly per topic; a store that stops answering fails
/// the request instead of pinning the worker.
const TREE_BUILD_DEADLINE: Duration = Duration::from_secs(10);

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1")
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(
                web::resource("/topics")
                    .route(web::get().to(list_topics))
                    .route(web::post().to(create_topic)),
            )
            .service(web::resource("/topics/{id}").route(web::get().to(get_topic)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(web::resource("/users/{id}").route(web::get().to(get_user))),
    );
    cfg.route("/", web::get().to(health));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub limiter: WriteLimiter,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Resolve the authenticated user from token claims. A valid token whose user
/// no longer exists is still a 401.
async fn current_user(repo: &dyn Repo, claims: &Claims) -> Result<User, ApiError> {
    repo.find_user_by_email(&claims.email)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::Unauthorized)
}

async fn comment_tree(repo: &dyn Repo, topic_id: Id) -> Result<Vec<CommentNode>, ApiError> {
    match timeout(TREE_BUILD_DEADLINE, tree::for_topic(repo, topic_id)).await {
        Ok(res) => Ok(res?),
        Err(_) => {
            log::warn!("comment tree for topic {topic_id} exceeded build deadline");
            Err(ApiError::Timeout)
        }
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User registered", body = UserPublic),
        (status = 400, description = "Email already registered or invalid input")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    require_non_empty(&req.email, "email")?;
    require_non_empty(&req.username, "username")?;
    require_non_empty(&req.password, "password")?;

    let password_hash = hash_password(&req.password).map_err(|e| {
        log::error!("password hashing failed: {e:#}");
        ApiError::Internal
    })?;
    let user = data
        .repo
        .create_user(NewUser { email: req.email, username: req.username, password_hash })
        .await?;
    metrics::counter!("agora_users_registered_total").increment(1);
    Ok(HttpResponse::Ok().json(UserPublic::from(user)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Unknown email")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    // OAuth2 password form: the `username` field carries the email.
    let user = data
        .repo
        .find_user_by_email(&form.username)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound)?;

    if !verify_password(&form.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }

    let access_token = create_access_token(&user.email).map_err(|e| {
        log::error!("token issuance failed: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Ok().json(TokenResponse { access_token, token_type: "bearer".into() }))
}

#[utoipa::path(
    post,
    path = "/v1/topics",
    request_body = TopicCreate,
    responses(
        (status = 201, description = "Topic created", body = Topic),
        (status = 401, description = "Unauthenticated"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_topic(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<TopicCreate>,
) -> Result<HttpResponse, ApiError> {
    let user = current_user(data.repo.as_ref(), &auth.0).await?;
    let req = payload.into_inner();
    require_non_empty(&req.title, "title")?;
    require_non_empty(&req.content, "content")?;
    if !data.limiter.allow_topic(user.id) {
        return Err(ApiError::RateLimited);
    }
    let topic = data
        .repo
        .create_topic(NewTopic { title: req.title, content: req.content, user_id: user.id })
        .await?;
    metrics::counter!("agora_topics_created_total").increment(1);
    Ok(HttpResponse::Created().json(topic))
}

#[utoipa::path(
    get,
    path = "/v1/topics",
    params(ListParams),
    responses(
        (status = 200, description = "Offset page (no cursor param) or cursor page (cursor present) of topics with comment trees")
    )
)]
pub async fn list_topics(
    data: web::Data<AppState>,
    query: web::Query<ListParams>,
) -> Result<HttpResponse, ApiError> {
    let params = query.into_inner();
    let repo = data.repo.as_ref();

    // Cursor present (zero included) selects cursor mode.
    if let Some(cursor) = params.cursor {
        let limit = params.limit();
        let rows = repo.list_topics_from(cursor, limit + 1).await?;
        let (page, next_cursor) = cursor_window(rows, limit as usize, |t| t.id);

        let mut items = Vec::with_capacity(page.len());
        for topic in page {
            let comments = comment_tree(repo, topic.id).await?;
            items.push(TopicWithComments::new(topic, None, comments));
        }
        return Ok(HttpResponse::Ok().json(CursorPage { items, next_cursor, limit }));
    }

    let page_size = params.page_size();
    let current_page = params.page_index();
    let offset = current_page
        .checked_mul(page_size)
        .ok_or_else(|| ApiError::Validation("page_index out of range".into()))?;
    let total_count = repo.count_topics().await?;
    let rows = repo.list_topics_page(offset, page_size).await?;

    let mut items = Vec::with_capacity(rows.len());
    for topic in rows {
        let comments = comment_tree(repo, topic.id).await?;
        items.push(TopicWithComments::new(topic, None, comments));
    }
    Ok(HttpResponse::Ok().json(OffsetPage {
        items,
        total_count,
        total_page: total_pages(total_count, page_size),
        current_page,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/topics/{id}",
    params(("id" = Id, Path, description = "Topic id")),
    responses(
        (status = 200, description = "Topic with author and full comment tree", body = TopicWithComments),
        (status = 404, description = "Topic not found")
    )
)]
pub async fn get_topic(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let repo = data.repo.as_ref();
    let topic = repo.get_topic(path.into_inner()).await?;

    let user = match repo.get_user(topic.user_id).await {
        Ok(u) => Some(UserPublic::from(u)),
        Err(RepoError::NotFound) => {
            log::warn!("topic {} references missing user {}", topic.id, topic.user_id);
            None
        }
        Err(e) => return Err(e.into()),
    };

    let comments = comment_tree(repo, topic.id).await?;
    Ok(HttpResponse::Ok().json(TopicWithComments::new(topic, user, comments)))
}

#[utoipa::path(
    post,
    path = "/v1/comments",
    request_body = CommentCreate,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Depth limit exceeded or invalid input"),
        (status = 401, description = "Unauthenticated"),
        (status = 404, description = "Topic or parent comment not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CommentCreate>,
) -> Result<HttpResponse, ApiError> {
    let user = current_user(data.repo.as_ref(), &auth.0).await?;
    let req = payload.into_inner();
    require_non_empty(&req.content, "content")?;
    if !data.limiter.allow_comment(user.id) {
        return Err(ApiError::RateLimited);
    }
    let comment = data
        .repo
        .create_comment(NewComment {
            content: req.content,
            topic_id: req.topic_id,
            user_id: user.id,
            parent_id: req.parent_id,
        })
        .await?;
    metrics::counter!("agora_comments_created_total").increment(1);
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "User record", body = UserPublic),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserPublic::from(user)))
}
