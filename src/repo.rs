use crate::auth::Identity;
use crate::lifecycle::{self, PostAction, TransitionError};
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("forbidden")] Forbidden,
    #[error("invalid transition from {0}")] InvalidTransition(PostStatus),
    #[error("internal: {0}")] Internal(String),
}

impl From<TransitionError> for RepoError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Forbidden => RepoError::Forbidden,
            TransitionError::InvalidTransition { current } => RepoError::InvalidTransition(current),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, owner: &Identity, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn list_posts(&self) -> RepoResult<Vec<Post>>;
    async fn list_posts_by_status(&self, status: PostStatus) -> RepoResult<Vec<Post>>;
    async fn list_posts_by_owner(&self, owner_id: Id) -> RepoResult<Vec<Post>>;
    /// Atomic read-modify-write: the lifecycle check and the store update
    /// happen under one lock/transaction, so concurrent actions on the same
    /// post serialize and the loser observes the new status.
    async fn transition_post(
        &self,
        actor: &Identity,
        id: Id,
        action: PostAction,
        note: Option<String>,
    ) -> RepoResult<Post>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Appends a comment if the post exists and `policy::can_comment` allows
    /// the author. Never mutates the post.
    async fn add_comment(&self, author: &Identity, post_id: Id, content: String) -> RepoResult<Comment>;
    /// Comments in creation order, oldest first. Callers gate visibility via
    /// `policy::can_view` on the parent post before asking.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
}

pub trait Repo: UserRepo + PostRepo + CommentRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::policy;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("CIB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("CIB_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                email: new.email,
                role: new.role,
                password_hash: new.password_hash,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, owner: &Identity, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let mut post = lifecycle::create(owner, new, Utc::now());
            post.id = id;
            s.posts.insert(id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.posts.values().cloned().collect();
            v.sort_by_key(|p| p.id);
            Ok(v)
        }

        async fn list_posts_by_status(&self, status: PostStatus) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.posts.values().filter(|p| p.status == status).cloned().collect();
            v.sort_by_key(|p| p.id);
            Ok(v)
        }

        async fn list_posts_by_owner(&self, owner_id: Id) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.posts.values().filter(|p| p.owner_user_id == owner_id).cloned().collect();
            v.sort_by_key(|p| p.id);
            Ok(v)
        }

        async fn transition_post(
            &self,
            actor: &Identity,
            id: Id,
            action: PostAction,
            note: Option<String>,
        ) -> RepoResult<Post> {
            // write lock held across read+apply+write: concurrent actions on
            // the same post serialize here, the loser sees the new status
            let mut s = self.state.write().unwrap();
            let post = s.posts.get(&id).cloned().ok_or(RepoError::NotFound)?;
            let updated = lifecycle::apply(actor, &post, action, note, Utc::now())?;
            s.posts.insert(id, updated.clone());
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn add_comment(&self, author: &Identity, post_id: Id, content: String) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get(&post_id).ok_or(RepoError::NotFound)?;
            if !policy::can_comment(author, post) {
                return Err(RepoError::Forbidden);
            }
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                post_id,
                author_user_id: author.user_id,
                content,
                created_at: Utc::now(),
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let mut v: Vec<_> = s.comments.values().filter(|c| c.post_id == post_id).cloned().collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::policy;
    use chrono::Utc;
    use sqlx::{Pool, Postgres};

    const POST_COLS: &str =
        "id, title, description, post_type, status, owner_user_id, created_at, updated_at, update_note";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let rec = sqlx::query_as::<_, User>(
                "INSERT INTO users (username, email, role, password_hash) VALUES ($1,$2,$3,$4) \
                 RETURNING id, username, email, role, password_hash, created_at",
            )
            .bind(&new.username)
            .bind(&new.email)
            .bind(new.role)
            .bind(&new.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
                other => internal(other),
            })?;
            Ok(rec)
        }

        async fn find_user_by_username(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, email, role, password_hash, created_at FROM users WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, email, role, password_hash, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, owner: &Identity, new: NewPost) -> RepoResult<Post> {
            let post = lifecycle::create(owner, new, Utc::now());
            let rec = sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (title, description, post_type, status, owner_user_id, created_at, updated_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {POST_COLS}"
            ))
            .bind(&post.title)
            .bind(&post.description)
            .bind(post.post_type)
            .bind(post.status)
            .bind(post.owner_user_id)
            .bind(post.created_at)
            .bind(post.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(rec)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn list_posts_by_status(&self, status: PostStatus) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts WHERE status = $1 ORDER BY id"
            ))
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_posts_by_owner(&self, owner_id: Id) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts WHERE owner_user_id = $1 ORDER BY id"
            ))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn transition_post(
            &self,
            actor: &Identity,
            id: Id,
            action: PostAction,
            note: Option<String>,
        ) -> RepoResult<Post> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            // row lock serializes concurrent transitions on the same post
            let post = sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts WHERE id = $1 FOR UPDATE"
            ))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;

            let updated = lifecycle::apply(actor, &post, action, note, Utc::now())?;

            let rec = sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET status = $2, updated_at = $3, update_note = $4 WHERE id = $1 \
                 RETURNING {POST_COLS}"
            ))
            .bind(id)
            .bind(updated.status)
            .bind(updated.updated_at)
            .bind(&updated.update_note)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
            tx.commit().await.map_err(internal)?;
            Ok(rec)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn add_comment(&self, author: &Identity, post_id: Id, content: String) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let post = sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts WHERE id = $1 FOR UPDATE"
            ))
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)?;

            if !policy::can_comment(author, &post) {
                return Err(RepoError::Forbidden);
            }

            let rec = sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (post_id, author_user_id, content) VALUES ($1,$2,$3) \
                 RETURNING id, post_id, author_user_id, content, created_at",
            )
            .bind(post_id)
            .bind(author.user_id)
            .bind(&content)
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
            tx.commit().await.map_err(internal)?;
            Ok(rec)
        }

        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM posts WHERE id = $1")
                .bind(post_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?;
            if exists.is_none() {
                return Err(RepoError::NotFound);
            }
            sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, author_user_id, content, created_at FROM comments \
                 WHERE post_id = $1 ORDER BY created_at ASC, id ASC",
            )
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }
    }
}
