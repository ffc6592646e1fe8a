use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::backend;
use crate::error::{Result, WallError};
use crate::model::{Comment, NewComment, NewPost, Post, StoredObject};

/// Everything the composer and the feed need from the backend.
pub trait WallService: Send + Sync {
    fn create_post(&self, content: &str, author_name: &str, photo_url: Option<&str>)
        -> Result<Post>;
    fn list_posts(&self) -> Result<Vec<Post>>;
    fn delete_post(&self, id: &str) -> Result<()>;
    fn create_comment(&self, post_id: &str, content: &str, author_name: &str) -> Result<Comment>;
    fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>>;
    fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject>;
}

pub struct RestWallService {
    client: Arc<backend::Client>,
}

impl RestWallService {
    pub fn new(client: Arc<backend::Client>) -> Self {
        Self { client }
    }
}

impl WallService for RestWallService {
    fn create_post(
        &self,
        content: &str,
        author_name: &str,
        photo_url: Option<&str>,
    ) -> Result<Post> {
        self.client.insert_post(&NewPost {
            content: content.to_string(),
            user_id: None,
            user_name: author_name.to_string(),
            photo_url: photo_url.map(str::to_string),
        })
    }

    fn list_posts(&self) -> Result<Vec<Post>> {
        self.client.list_posts()
    }

    fn delete_post(&self, id: &str) -> Result<()> {
        self.client.delete_post(id)
    }

    fn create_comment(&self, post_id: &str, content: &str, author_name: &str) -> Result<Comment> {
        self.client.insert_comment(&NewComment {
            post_id: post_id.to_string(),
            content: content.to_string(),
            user_id: None,
            user_name: author_name.to_string(),
        })
    }

    fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.client.list_comments(post_id)
    }

    fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        self.client.upload_object(bucket, key, bytes, content_type)
    }
}

/// One recorded call against [`MemoryWallService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreatePost { content: String, photo_url: Option<String> },
    ListPosts,
    DeletePost(String),
    CreateComment { post_id: String, content: String },
    ListComments(String),
    UploadObject { bucket: String, key: String, size: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreatePost,
    ListPosts,
    DeletePost,
    CreateComment,
    ListComments,
    UploadObject,
}

#[derive(Default)]
struct MemoryState {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    objects: HashMap<(String, String), Vec<u8>>,
    calls: Vec<Call>,
    failures: HashMap<Operation, String>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn take_failure(&mut self, op: Operation) -> Result<()> {
        match self.failures.remove(&op) {
            Some(message) => Err(WallError::backend(message)),
            None => Ok(()),
        }
    }
}

/// In-process backend. Backs the offline demo mode and records every call
/// so tests can assert on request counts.
#[derive(Default)]
pub struct MemoryWallService {
    state: Mutex<MemoryState>,
}

impl MemoryWallService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wall with a few posts so the offline client has something to show.
    pub fn with_sample_posts() -> Self {
        let service = Self::new();
        let now = Utc::now();
        service.seed_post(
            "Welcome to TheWall!",
            Some("TheWall Team"),
            now - Duration::hours(3),
            4,
        );
        service.seed_post(
            "No backend configured, so this wall lives in memory. Set backend.url in the config file to connect.",
            Some("TheWall Team"),
            now - Duration::hours(2),
            1,
        );
        let mine = service.seed_post(
            "Shortcuts: j/k move, l like, c comments, r reply, n compose, m menu, v view image, q quit.",
            Some(crate::model::DEFAULT_DISPLAY_NAME),
            now - Duration::minutes(30),
            0,
        );
        service.seed_comment(
            &mine.id,
            "Handy, thanks!",
            Some("Ada Lovelace"),
            now - Duration::minutes(20),
        );
        service.clear_calls();
        service
    }

    pub fn seed_post(
        &self,
        content: &str,
        user_name: Option<&str>,
        created_at: DateTime<Utc>,
        likes_count: u64,
    ) -> Post {
        let mut state = self.state.lock();
        let post = Post {
            id: state.next_id("post"),
            content: content.to_string(),
            created_at,
            user_id: None,
            user_name: user_name.map(str::to_string),
            likes_count,
            comments_count: 0,
            photo_url: None,
            is_liked: false,
        };
        state.posts.push(post.clone());
        post
    }

    pub fn seed_comment(
        &self,
        post_id: &str,
        content: &str,
        user_name: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Comment {
        let mut state = self.state.lock();
        let comment = Comment {
            id: state.next_id("comment"),
            post_id: post_id.to_string(),
            content: content.to_string(),
            created_at,
            user_id: None,
            user_name: user_name.map(str::to_string),
        };
        state.comments.push(comment.clone());
        if let Some(post) = state.posts.iter_mut().find(|post| post.id == post_id) {
            post.comments_count += 1;
        }
        comment
    }

    /// Makes the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: Operation, message: impl Into<String>) {
        self.state.lock().failures.insert(op, message.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| matches(call)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn post_count(&self) -> usize {
        self.state.lock().posts.len()
    }
}

impl WallService for MemoryWallService {
    fn create_post(
        &self,
        content: &str,
        author_name: &str,
        photo_url: Option<&str>,
    ) -> Result<Post> {
        let mut state = self.state.lock();
        state.calls.push(Call::CreatePost {
            content: content.to_string(),
            photo_url: photo_url.map(str::to_string),
        });
        state.take_failure(Operation::CreatePost)?;
        let post = Post {
            id: state.next_id("post"),
            content: content.to_string(),
            created_at: Utc::now(),
            user_id: None,
            user_name: Some(author_name.to_string()),
            likes_count: 0,
            comments_count: 0,
            photo_url: photo_url.map(str::to_string),
            is_liked: false,
        };
        state.posts.push(post.clone());
        debug!(id = %post.id, "memory backend stored post");
        Ok(post)
    }

    fn list_posts(&self) -> Result<Vec<Post>> {
        let mut state = self.state.lock();
        state.calls.push(Call::ListPosts);
        state.take_failure(Operation::ListPosts)?;
        let mut posts = state.posts.clone();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    fn delete_post(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::DeletePost(id.to_string()));
        state.take_failure(Operation::DeletePost)?;
        state.posts.retain(|post| post.id != id);
        state.comments.retain(|comment| comment.post_id != id);
        Ok(())
    }

    fn create_comment(&self, post_id: &str, content: &str, author_name: &str) -> Result<Comment> {
        let mut state = self.state.lock();
        state.calls.push(Call::CreateComment {
            post_id: post_id.to_string(),
            content: content.to_string(),
        });
        state.take_failure(Operation::CreateComment)?;
        if !state.posts.iter().any(|post| post.id == post_id) {
            return Err(WallError::Backend {
                status: Some(409),
                message: format!("post {post_id} does not exist"),
            });
        }
        let comment = Comment {
            id: state.next_id("comment"),
            post_id: post_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            user_id: None,
            user_name: Some(author_name.to_string()),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    fn list_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let mut state = self.state.lock();
        state.calls.push(Call::ListComments(post_id.to_string()));
        state.take_failure(Operation::ListComments)?;
        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredObject> {
        let mut state = self.state.lock();
        state.calls.push(Call::UploadObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: bytes.len(),
        });
        state.take_failure(Operation::UploadObject)?;
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            public_url: format!("memory://{bucket}/{key}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_lists_posts_newest_first() {
        let service = MemoryWallService::new();
        let now = Utc::now();
        service.seed_post("old", Some("a"), now - Duration::hours(1), 0);
        service.seed_post("new", Some("b"), now, 0);
        let posts = service.list_posts().unwrap();
        assert_eq!(posts[0].content, "new");
        assert_eq!(posts[1].content, "old");
    }

    #[test]
    fn memory_lists_comments_oldest_first() {
        let service = MemoryWallService::new();
        let now = Utc::now();
        let post = service.seed_post("p", None, now, 0);
        service.seed_comment(&post.id, "second", None, now);
        service.seed_comment(&post.id, "first", None, now - Duration::minutes(5));
        let comments = service.list_comments(&post.id).unwrap();
        let contents: Vec<_> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, ["first", "second"]);
    }

    #[test]
    fn injected_failure_applies_once() {
        let service = MemoryWallService::new();
        service.fail_next(Operation::ListPosts, "offline");
        let err = service.list_posts().unwrap_err();
        assert_eq!(err.to_string(), "offline");
        assert!(service.list_posts().is_ok());
        assert_eq!(service.count_calls(|c| *c == Call::ListPosts), 2);
    }

    #[test]
    fn sample_wall_starts_without_recorded_calls() {
        let service = MemoryWallService::with_sample_posts();
        assert_eq!(service.post_count(), 3);
        assert!(service.calls().is_empty());
    }
}
