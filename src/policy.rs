//! Pure access-control predicates.
//!
//! Every component that needs a role or ownership decision calls these three
//! functions; nothing else in the crate compares roles or owner ids inline.
//! They are deterministic over `(identity, post)` and have no side effects.

use crate::auth::Identity;
use crate::lifecycle::PostAction;
use crate::models::{Post, PostStatus};

/// Role/ownership gate for a lifecycle action. Whether the action is legal
/// from the post's current status is the transition table's question, not
/// this one's: an admin hitting a missing edge gets `InvalidTransition`
/// downstream, while a caller failing this gate gets `Forbidden`.
pub fn can_transition(identity: &Identity, post: &Post, action: PostAction) -> bool {
    match action {
        PostAction::Submit => identity.user_id == post.owner_user_id,
        PostAction::Approve | PostAction::Reject | PostAction::Close => identity.is_admin(),
    }
}

/// Admins see everything; everyone else sees approved posts and their own.
pub fn can_view(identity: &Identity, post: &Post) -> bool {
    identity.is_admin()
        || post.status == PostStatus::Approved
        || identity.user_id == post.owner_user_id
}

/// Same shape as `can_view`. Owners may comment on their own unapproved
/// posts, e.g. to add context while the post is still pending review.
pub fn can_comment(identity: &Identity, post: &Post) -> bool {
    identity.is_admin()
        || post.status == PostStatus::Approved
        || identity.user_id == post.owner_user_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::models::PostType;
    use chrono::Utc;

    fn post(owner: i64, status: PostStatus) -> Post {
        let now = Utc::now();
        Post {
            id: 1,
            title: "t".into(),
            description: "d".into(),
            post_type: PostType::Issue,
            status,
            owner_user_id: owner,
            created_at: now,
            updated_at: now,
            update_note: None,
        }
    }

    fn user(id: i64) -> Identity {
        Identity { user_id: id, role: Role::User }
    }

    fn admin(id: i64) -> Identity {
        Identity { user_id: id, role: Role::Admin }
    }

    #[test]
    fn submit_is_owner_only() {
        let p = post(1, PostStatus::Draft);
        assert!(can_transition(&user(1), &p, PostAction::Submit));
        assert!(!can_transition(&user(2), &p, PostAction::Submit));
        // an admin does not get to submit someone else's draft either
        assert!(!can_transition(&admin(9), &p, PostAction::Submit));
    }

    #[test]
    fn review_actions_are_admin_only() {
        let p = post(1, PostStatus::PendingApproval);
        for action in [PostAction::Approve, PostAction::Reject, PostAction::Close] {
            assert!(can_transition(&admin(9), &p, action));
            assert!(!can_transition(&user(1), &p, action)); // not even the owner
        }
    }

    #[test]
    fn view_gating() {
        let draft = post(1, PostStatus::Draft);
        assert!(can_view(&user(1), &draft)); // owner sees own draft
        assert!(!can_view(&user(2), &draft));
        assert!(can_view(&admin(9), &draft));

        let approved = post(1, PostStatus::Approved);
        assert!(can_view(&user(2), &approved));
    }

    #[test]
    fn owner_may_comment_before_approval() {
        for status in [PostStatus::Draft, PostStatus::PendingApproval, PostStatus::Rejected] {
            let p = post(1, status);
            assert!(can_comment(&user(1), &p));
            assert!(!can_comment(&user(2), &p));
        }
        assert!(can_comment(&user(2), &post(1, PostStatus::Approved)));
    }
}
