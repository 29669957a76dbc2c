use crate::models::{
    Comment, CommentCreate, CommentNode, LoginForm, RegisterRequest, TokenResponse, Topic,
    TopicCreate, TopicWithComments, UserPublic,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::create_topic,
        crate::routes::list_topics,
        crate::routes::get_topic,
        crate::routes::create_comment,
        crate::routes::get_user,
    ),
    components(schemas(
        RegisterRequest, LoginForm, TokenResponse, UserPublic,
        Topic, TopicCreate, TopicWithComments,
        Comment, CommentCreate, CommentNode
    )),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "topics", description = "Topic operations and listings"),
        (name = "comments", description = "Comment operations"),
        (name = "users", description = "User lookups"),
    )
)]
pub struct ApiDoc;
