use crate::models::{
    Comment, LoginRequest, NewComment, NewPost, Post, PostStatus, PostType, RegisterRequest,
    ReviewRequest, UserPublic,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::create_post,
        crate::routes::submit_post,
        crate::routes::approve_post,
        crate::routes::list_all_posts,
        crate::routes::list_approved_posts,
        crate::routes::get_post,
        crate::routes::add_comment,
        crate::routes::list_comments,
    ),
    components(schemas(
        UserPublic, RegisterRequest, LoginRequest, crate::routes::LoginResponse,
        Post, NewPost, PostType, PostStatus, ReviewRequest,
        Comment, NewComment,
        crate::auth::Role,
    )),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "posts", description = "Post lifecycle operations"),
        (name = "comments", description = "Comment operations"),
    )
)]
pub struct ApiDoc;
