//! Post lifecycle state machine.
//!
//! The transition table is total and explicit: adding a status or an action
//! means editing `next_status`, not hunting down scattered comparisons.
//! `apply` is a pure function; the repository is responsible for running it
//! inside an atomic read-modify-write on the stored post.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::models::{NewPost, Post, PostStatus};
use crate::policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostAction {
    Submit,
    Approve,
    Reject,
    Close,
}

impl PostAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostAction::Submit => "submit",
            PostAction::Approve => "approve",
            PostAction::Reject => "reject",
            PostAction::Close => "close",
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("forbidden")]
    Forbidden,
    #[error("invalid transition from {current}")]
    InvalidTransition { current: PostStatus },
}

/// The full edge set. Anything not listed here is illegal for everyone.
pub fn next_status(from: PostStatus, action: PostAction) -> Option<PostStatus> {
    use PostAction::*;
    use PostStatus::*;
    match (from, action) {
        (Draft, Submit) => Some(PendingApproval),
        (PendingApproval, Approve) => Some(Approved),
        (PendingApproval, Reject) => Some(Rejected),
        (PendingApproval, Close) | (Approved, Close) | (Rejected, Close) => Some(Closed),
        _ => None,
    }
}

/// Build a fresh DRAFT post owned by the actor. Ids are assigned by the store.
pub fn create(identity: &Identity, new: NewPost, now: DateTime<Utc>) -> Post {
    Post {
        id: 0,
        title: new.title,
        description: new.description,
        post_type: new.post_type,
        status: PostStatus::Draft,
        owner_user_id: identity.user_id,
        created_at: now,
        updated_at: now,
        update_note: None,
    }
}

/// Apply one lifecycle action, policy check first. On denial the input post
/// is untouched; on success the returned value carries the new status, a
/// fresh `updated_at`, and (for review actions) the replacement note.
pub fn apply(
    identity: &Identity,
    post: &Post,
    action: PostAction,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<Post, TransitionError> {
    if !policy::can_transition(identity, post, action) {
        return Err(TransitionError::Forbidden);
    }
    let Some(to) = next_status(post.status, action) else {
        return Err(TransitionError::InvalidTransition { current: post.status });
    };
    let mut updated = post.clone();
    updated.status = to;
    updated.updated_at = now;
    if action != PostAction::Submit {
        // only the latest review note survives; an absent note clears it
        updated.update_note = note;
    }
    Ok(updated)
}
