use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::auth::{self, Auth, Role};
use crate::error::ApiError;
use crate::lifecycle::PostAction;
use crate::models::*;
use crate::policy;
use crate::repo::{Repo, RepoError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(web::resource("/register").route(web::post().to(register)))
            .service(web::resource("/login").route(web::post().to(login))),
    );
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_all_posts))
                    .route(web::post().to(create_post)),
            )
            .service(web::resource("/posts/approved").route(web::get().to(list_approved_posts)))
            .service(web::resource("/user/posts").route(web::get().to(list_own_posts)))
            .service(web::resource("/posts/{id}").route(web::get().to(get_post)))
            .service(web::resource("/posts/{id}/submit").route(web::put().to(submit_post)))
            .service(web::resource("/posts/{id}/approve").route(web::put().to(approve_post)))
            .service(web::resource("/posts/{id}/reject").route(web::put().to(reject_post)))
            .service(web::resource("/posts/{id}/close").route(web::put().to(close_post)))
            .service(
                web::resource("/posts/{id}/comments")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(add_comment)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo> }

// Per-endpoint role gate; per-post decisions live in `policy`.
macro_rules! ensure_admin {
    ($auth:expr) => {
        if $auth.0.role != Role::Admin {
            return Err(ApiError::Forbidden);
        }
    };
}

fn bootstrap_role(username: &str) -> Role {
    let admins = std::env::var("BOOTSTRAP_ADMIN_USERNAMES").unwrap_or_default();
    if admins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .any(|s| s == username)
    {
        Role::Admin
    } else {
        Role::User
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserPublic),
        (status = 400, description = "Empty required field"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::InvalidInput("username must not be empty"));
    }
    if req.email.trim().is_empty() {
        return Err(ApiError::InvalidInput("email must not be empty"));
    }
    if req.password.is_empty() {
        return Err(ApiError::InvalidInput("password must not be empty"));
    }
    let role = bootstrap_role(&username);
    let password_hash = auth::hash_password(&req.password).map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;
    let user = data
        .repo
        .create_user(NewUser {
            username,
            email: req.email.trim().to_string(),
            role,
            password_hash,
        })
        .await?;
    Ok(HttpResponse::Created().json(UserPublic::from(user)))
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserPublic,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token issued", body = LoginResponse),
        (status = 401, description = "Unknown user or wrong password")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    // unknown username and wrong password are indistinguishable to the caller
    let user = match data.repo.find_user_by_username(req.username.trim()).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthenticated),
        Err(e) => return Err(e.into()),
    };
    if !auth::verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::Unauthenticated);
    }
    let token = auth::create_jwt_for(&user).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(LoginResponse { token, user: user.into() }))
}

#[derive(serde::Serialize)]
struct MeResponse {
    id: Id,
    username: String,
    role: Role,
}

pub async fn auth_me(auth: Auth) -> Result<HttpResponse, ApiError> {
    let me = MeResponse {
        id: auth.0.sub,
        username: auth.0.username.clone(),
        role: auth.0.role,
    };
    Ok(HttpResponse::Ok().json(me))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Draft created", body = Post),
        (status = 400, description = "Empty title or description"),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    let mut new = payload.into_inner();
    new.title = new.title.trim().to_string();
    new.description = new.description.trim().to_string();
    if new.title.is_empty() {
        return Err(ApiError::InvalidInput("title must not be empty"));
    }
    if new.description.is_empty() {
        return Err(ApiError::InvalidInput("description must not be empty"));
    }
    let post = data.repo.create_post(&auth.0.identity(), new).await?;
    Ok(HttpResponse::Created().json(post))
}

async fn transition(
    auth: Auth,
    data: web::Data<AppState>,
    id: Id,
    action: PostAction,
    note: Option<String>,
) -> Result<HttpResponse, ApiError> {
    let post = data
        .repo
        .transition_post(&auth.0.identity(), id, action, note)
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/submit",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Submitted for approval", body = Post),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Not a DRAFT")
    )
)]
pub async fn submit_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    transition(auth, data, path.into_inner(), PostAction::Submit, None).await
}

// approve/reject/close accept an optional review note; a missing body counts
// as no note and clears the previous one
fn note_of(payload: Option<web::Json<ReviewRequest>>) -> Option<String> {
    payload.and_then(|p| p.into_inner().update_note)
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/approve",
    request_body = ReviewRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Approved", body = Post),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Not PENDING_APPROVAL")
    )
)]
pub async fn approve_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<ReviewRequest>>,
) -> Result<HttpResponse, ApiError> {
    transition(auth, data, path.into_inner(), PostAction::Approve, note_of(payload)).await
}

pub async fn reject_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<ReviewRequest>>,
) -> Result<HttpResponse, ApiError> {
    transition(auth, data, path.into_inner(), PostAction::Reject, note_of(payload)).await
}

pub async fn close_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<ReviewRequest>>,
) -> Result<HttpResponse, ApiError> {
    transition(auth, data, path.into_inner(), PostAction::Close, note_of(payload)).await
}

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    responses(
        (status = 200, description = "All posts, any status", body = [Post]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_all_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let posts = data.repo.list_posts().await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/approved",
    responses((status = 200, description = "Approved posts", body = [Post]))
)]
pub async fn list_approved_posts(
    _auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts_by_status(PostStatus::Approved).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn list_own_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts_by_owner(auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 403, description = "Not viewable for this caller"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    if !policy::can_view(&auth.0.identity(), &post) {
        return Err(ApiError::Forbidden);
    }
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/comments",
    request_body = NewComment,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment appended", body = Comment),
        (status = 400, description = "Empty content"),
        (status = 403, description = "Not commentable for this caller"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn add_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let content = payload.into_inner().content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::InvalidInput("comment content must not be empty"));
    }
    let comment = data
        .repo
        .add_comment(&auth.0.identity(), path.into_inner(), content)
        .await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Comments, oldest first", body = [Comment]),
        (status = 403, description = "Post not viewable for this caller"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn list_comments(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let post = data.repo.get_post(post_id).await?;
    // a caller who cannot view the post cannot enumerate its comments
    if !policy::can_view(&auth.0.identity(), &post) {
        return Err(ApiError::Forbidden);
    }
    let comments = data.repo.list_comments(post_id).await?;
    Ok(HttpResponse::Ok().json(comments))
}
