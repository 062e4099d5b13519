#![cfg(feature = "inmem-store")]

use cib::{
    auth::{Identity, Role},
    lifecycle::PostAction,
    models::{NewPost, NewUser, PostStatus, PostType},
    repo::{inmem::InMemRepo, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use cib::repo::{CommentRepo, PostRepo, UserRepo};
use serial_test::serial;

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    // isolate state: do **not** persist to the default file path
    std::env::set_var("CIB_DATA_DIR", tempfile::tempdir().unwrap().path());
    InMemRepo::new()
}

fn owner() -> Identity {
    Identity { user_id: 1, role: Role::User }
}

fn stranger() -> Identity {
    Identity { user_id: 2, role: Role::User }
}

fn admin() -> Identity {
    Identity { user_id: 9, role: Role::Admin }
}

fn new_post() -> NewPost {
    NewPost {
        title: "Leaky faucet".into(),
        description: "Block C, second floor".into(),
        post_type: PostType::Issue,
    }
}

#[tokio::test]
#[serial]
async fn user_create_and_conflict() {
    let r = repo();

    let u = r
        .create_user(NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            role: Role::User,
            password_hash: "$argon2-placeholder".into(),
        })
        .await
        .unwrap();
    assert_eq!(u.username, "alice");

    // duplicate username -> conflict
    let err = r
        .create_user(NewUser {
            username: "alice".into(),
            email: "other@example.com".into(),
            role: Role::User,
            password_hash: "$argon2-placeholder".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    let found = r.find_user_by_username("alice").await.unwrap();
    assert_eq!(found.id, u.id);
    assert!(matches!(
        r.find_user_by_username("nobody").await.unwrap_err(),
        RepoError::NotFound
    ));
}

#[tokio::test]
#[serial]
async fn lifecycle_walk_draft_to_closed() {
    let r = repo();

    let p = r.create_post(&owner(), new_post()).await.unwrap();
    assert_eq!(p.status, PostStatus::Draft);
    assert_eq!(p.owner_user_id, 1);

    let p = r
        .transition_post(&owner(), p.id, PostAction::Submit, None)
        .await
        .unwrap();
    assert_eq!(p.status, PostStatus::PendingApproval);

    let p = r
        .transition_post(&admin(), p.id, PostAction::Approve, Some("Scheduled for repair".into()))
        .await
        .unwrap();
    assert_eq!(p.status, PostStatus::Approved);
    assert_eq!(p.update_note.as_deref(), Some("Scheduled for repair"));

    let p = r
        .transition_post(&admin(), p.id, PostAction::Close, Some("Fixed".into()))
        .await
        .unwrap();
    assert_eq!(p.status, PostStatus::Closed);
    assert_eq!(p.update_note.as_deref(), Some("Fixed"));
}

#[tokio::test]
#[serial]
async fn denial_leaves_post_unchanged() {
    let r = repo();
    let p = r.create_post(&owner(), new_post()).await.unwrap();

    // no DRAFT -> reject edge, even for an admin
    let err = r
        .transition_post(&admin(), p.id, PostAction::Reject, Some("nope".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidTransition(PostStatus::Draft)));

    let after = r.get_post(p.id).await.unwrap();
    assert_eq!(after.status, PostStatus::Draft);
    assert_eq!(after.updated_at, p.updated_at);
    assert_eq!(after.update_note, None);
}

#[tokio::test]
#[serial]
async fn second_approve_observes_new_status() {
    let r = repo();
    let p = r.create_post(&owner(), new_post()).await.unwrap();
    r.transition_post(&owner(), p.id, PostAction::Submit, None)
        .await
        .unwrap();

    let first = r
        .transition_post(&admin(), p.id, PostAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(first.status, PostStatus::Approved);

    let err = r
        .transition_post(&admin(), p.id, PostAction::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidTransition(PostStatus::Approved)));
}

#[tokio::test]
#[serial]
async fn submit_is_owner_only() {
    let r = repo();
    let p = r.create_post(&owner(), new_post()).await.unwrap();

    let err = r
        .transition_post(&stranger(), p.id, PostAction::Submit, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Forbidden));
    assert_eq!(r.get_post(p.id).await.unwrap().status, PostStatus::Draft);

    // owner resubmitting a pending post hits the missing edge instead
    r.transition_post(&owner(), p.id, PostAction::Submit, None)
        .await
        .unwrap();
    let err = r
        .transition_post(&owner(), p.id, PostAction::Submit, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidTransition(PostStatus::PendingApproval)
    ));
}

#[tokio::test]
#[serial]
async fn missing_post_is_not_found() {
    let r = repo();
    assert!(matches!(r.get_post(999).await.unwrap_err(), RepoError::NotFound));
    assert!(matches!(
        r.transition_post(&admin(), 999, PostAction::Close, None)
            .await
            .unwrap_err(),
        RepoError::NotFound
    ));
    assert!(matches!(
        r.add_comment(&admin(), 999, "hello".into()).await.unwrap_err(),
        RepoError::NotFound
    ));
    assert!(matches!(
        r.list_comments(999).await.unwrap_err(),
        RepoError::NotFound
    ));
}

#[tokio::test]
#[serial]
async fn comment_gating_follows_policy() {
    let r = repo();
    let p = r.create_post(&owner(), new_post()).await.unwrap();

    // owner may comment on their own draft, a stranger may not
    r.add_comment(&owner(), p.id, "more context".into()).await.unwrap();
    let err = r
        .add_comment(&stranger(), p.id, "drive-by".into())
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Forbidden));

    // once approved, anyone authenticated may comment
    r.transition_post(&owner(), p.id, PostAction::Submit, None)
        .await
        .unwrap();
    r.transition_post(&admin(), p.id, PostAction::Approve, None)
        .await
        .unwrap();
    r.add_comment(&stranger(), p.id, "Thanks!".into()).await.unwrap();

    let comments = r.list_comments(p.id).await.unwrap();
    assert_eq!(comments.len(), 2);
    // creation order, oldest first
    assert_eq!(comments[0].content, "more context");
    assert_eq!(comments[1].content, "Thanks!");
    assert!(comments[0].created_at <= comments[1].created_at);
}

#[tokio::test]
#[serial]
async fn list_views() {
    let r = repo();
    let a = r.create_post(&owner(), new_post()).await.unwrap();
    let b = r
        .create_post(
            &stranger(),
            NewPost {
                title: "Lost keys".into(),
                description: "Near the gym".into(),
                post_type: PostType::Lost,
            },
        )
        .await
        .unwrap();

    r.transition_post(&stranger(), b.id, PostAction::Submit, None)
        .await
        .unwrap();
    r.transition_post(&admin(), b.id, PostAction::Approve, None)
        .await
        .unwrap();

    assert_eq!(r.list_posts().await.unwrap().len(), 2);

    let approved = r.list_posts_by_status(PostStatus::Approved).await.unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, b.id);

    let own = r.list_posts_by_owner(1).await.unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, a.id);
}
