use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::data::WallService;
use crate::error::{Result, WallError};
use crate::model::{Comment, Identity, Post};

/// What a comment toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentsToggle {
    /// Thread opened; `needs_fetch` is set when nothing is cached yet.
    Expanded { needs_fetch: bool },
    Collapsed,
    UnknownPost,
}

/// A saved comment, and whether its thread could be reloaded afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentSaved {
    Refreshed,
    RefreshFailed(WallError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}

/// A validated comment waiting to be sent.
#[derive(Debug, Clone)]
pub struct CommentSubmission {
    post_id: String,
    content: String,
    author: String,
}

#[derive(Debug)]
pub struct CommentOutcome {
    post_id: String,
    inserted: Result<Comment>,
    refreshed: Option<Result<Vec<Comment>>>,
}

impl CommentSubmission {
    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    /// Inserts the comment, then refetches the thread if the insert worked.
    pub fn execute(self, service: &dyn WallService) -> CommentOutcome {
        let inserted = service.create_comment(&self.post_id, &self.content, &self.author);
        let refreshed = inserted
            .is_ok()
            .then(|| service.list_comments(&self.post_id));
        CommentOutcome {
            post_id: self.post_id,
            inserted,
            refreshed,
        }
    }
}

/// Client-side state of the post list.
#[derive(Debug, Default)]
pub struct Feed {
    identity: Identity,
    posts: Vec<Post>,
    comments: HashMap<String, Vec<Comment>>,
    expanded: HashSet<String>,
    drafts: HashMap<String, String>,
    comments_in_flight: HashSet<String>,
    open_menu: Option<String>,
    image_overlay: Option<String>,
    seen_refresh: Option<u64>,
    loaded: bool,
}

impl Feed {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            ..Self::default()
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == id)
    }

    fn post_mut(&mut self, id: &str) -> Option<&mut Post> {
        self.posts.iter_mut().find(|post| post.id == id)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    // Refresh

    /// True on first mount and whenever `refresh_key` differs from the last
    /// key this feed loaded for.
    pub fn needs_refresh(&self, refresh_key: u64) -> bool {
        self.seen_refresh != Some(refresh_key)
    }

    /// Records `refresh_key` as handled. Call before starting the fetch.
    pub fn mark_refresh(&mut self, refresh_key: u64) {
        self.seen_refresh = Some(refresh_key);
    }

    /// Fetches when the key changed. Returns whether a fetch happened.
    pub fn sync(&mut self, service: &dyn WallService, refresh_key: u64) -> Result<bool> {
        if !self.needs_refresh(refresh_key) {
            return Ok(false);
        }
        self.mark_refresh(refresh_key);
        self.load(service)?;
        Ok(true)
    }

    pub fn load(&mut self, service: &dyn WallService) -> Result<()> {
        self.apply_posts(service.list_posts())
    }

    /// Replaces the whole list. Local like flags are lost. On error the
    /// current list stays.
    pub fn apply_posts(&mut self, result: Result<Vec<Post>>) -> Result<()> {
        let mut posts = match result {
            Ok(posts) => posts,
            Err(err) => {
                warn!(%err, "failed to load posts");
                return Err(err);
            }
        };
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        debug!(count = posts.len(), "posts loaded");
        self.posts = posts;
        self.loaded = true;
        let menu_gone = self
            .open_menu
            .as_deref()
            .is_some_and(|open| self.post(open).is_none());
        if menu_gone {
            self.open_menu = None;
        }
        Ok(())
    }

    // Likes

    /// Flips the local like flag, moving the counter by one. The backend is
    /// never told.
    pub fn toggle_like(&mut self, id: &str) -> Option<&Post> {
        let post = self.post_mut(id)?;
        if post.is_liked {
            post.likes_count = post.likes_count.saturating_sub(1);
            post.is_liked = false;
        } else {
            post.likes_count += 1;
            post.is_liked = true;
        }
        Some(&*post)
    }

    // Comments

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn comments(&self, id: &str) -> Option<&[Comment]> {
        self.comments.get(id).map(Vec::as_slice)
    }

    pub fn is_comment_in_flight(&self, id: &str) -> bool {
        self.comments_in_flight.contains(id)
    }

    pub fn toggle_comments(&mut self, id: &str) -> CommentsToggle {
        if self.post(id).is_none() {
            return CommentsToggle::UnknownPost;
        }
        if self.expanded.remove(id) {
            return CommentsToggle::Collapsed;
        }
        self.expanded.insert(id.to_string());
        CommentsToggle::Expanded {
            needs_fetch: !self.comments.contains_key(id),
        }
    }

    /// Toggles and, on a first expansion, fetches the thread.
    pub fn toggle_comments_with(
        &mut self,
        service: &dyn WallService,
        id: &str,
    ) -> Result<CommentsToggle> {
        let toggle = self.toggle_comments(id);
        if let CommentsToggle::Expanded { needs_fetch: true } = toggle {
            self.load_comments(service, id)?;
        }
        Ok(toggle)
    }

    pub fn load_comments(&mut self, service: &dyn WallService, id: &str) -> Result<()> {
        let result = service.list_comments(id);
        self.apply_comments(id, result)
    }

    pub fn apply_comments(&mut self, id: &str, result: Result<Vec<Comment>>) -> Result<()> {
        match result {
            Ok(mut comments) => {
                comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                self.comments.insert(id.to_string(), comments);
                Ok(())
            }
            Err(err) => {
                warn!(post = id, %err, "failed to load comments");
                Err(err)
            }
        }
    }

    pub fn draft(&self, id: &str) -> &str {
        self.drafts.get(id).map(String::as_str).unwrap_or("")
    }

    pub fn set_draft(&mut self, id: &str, text: impl Into<String>) {
        self.drafts.insert(id.to_string(), text.into());
    }

    pub fn draft_mut(&mut self, id: &str) -> &mut String {
        self.drafts.entry(id.to_string()).or_default()
    }

    pub fn can_submit_comment(&self, id: &str) -> bool {
        !self.is_comment_in_flight(id) && !self.draft(id).trim().is_empty()
    }

    pub fn begin_comment(&mut self, id: &str) -> Result<CommentSubmission> {
        if self.post(id).is_none() {
            return Err(WallError::validation("That post is no longer on the wall."));
        }
        if self.is_comment_in_flight(id) {
            return Err(WallError::validation("A comment is already being sent."));
        }
        let content = self.draft(id).to_string();
        if content.trim().is_empty() {
            return Err(WallError::validation("Write a comment first."));
        }
        self.comments_in_flight.insert(id.to_string());
        Ok(CommentSubmission {
            post_id: id.to_string(),
            content,
            author: self.identity.display_name().to_string(),
        })
    }

    /// Applies a finished comment submission. The counter moves only when the
    /// insert succeeded; the new comment shows up through the refetch. `Err` is
    /// reserved for a failed insert.
    pub fn finish_comment(&mut self, outcome: CommentOutcome) -> Result<CommentSaved> {
        let CommentOutcome {
            post_id,
            inserted,
            refreshed,
        } = outcome;
        self.comments_in_flight.remove(&post_id);
        if let Err(err) = inserted {
            warn!(post = %post_id, %err, "failed to add comment");
            return Err(err);
        }
        info!(post = %post_id, "comment added");
        self.drafts.insert(post_id.clone(), String::new());
        if let Some(post) = self.post_mut(&post_id) {
            post.comments_count += 1;
        }
        match refreshed.map(|result| self.apply_comments(&post_id, result)) {
            Some(Err(err)) => Ok(CommentSaved::RefreshFailed(err)),
            _ => Ok(CommentSaved::Refreshed),
        }
    }

    pub fn add_comment(&mut self, service: &dyn WallService, id: &str) -> Result<CommentSaved> {
        let submission = self.begin_comment(id)?;
        self.finish_comment(submission.execute(service))
    }

    // Delete and the action menu

    pub fn can_delete(&self, id: &str) -> bool {
        self.post(id)
            .map(|post| post.is_authored_by(&self.identity))
            .unwrap_or(false)
    }

    pub fn open_menu(&self) -> Option<&str> {
        self.open_menu.as_deref()
    }

    /// Opens the action menu of one of our own posts, or closes it if it is
    /// the one already open. Returns whether a menu is open afterwards.
    pub fn toggle_menu(&mut self, id: &str) -> bool {
        if self.open_menu.as_deref() == Some(id) {
            self.open_menu = None;
            return false;
        }
        if !self.can_delete(id) {
            return self.open_menu.is_some();
        }
        self.open_menu = Some(id.to_string());
        true
    }

    pub fn close_menu(&mut self) {
        self.open_menu = None;
    }

    /// A pointer press anywhere. Presses outside the open menu close it.
    pub fn pointer_down(&mut self, inside_open_menu: bool) {
        if !inside_open_menu {
            self.open_menu = None;
        }
    }

    /// Checks ownership and asks `confirm`; returns the id to delete.
    pub fn begin_delete(
        &self,
        id: &str,
        confirm: impl FnOnce(&Post) -> bool,
    ) -> Result<Option<String>> {
        let post = self
            .post(id)
            .ok_or_else(|| WallError::validation("That post is no longer on the wall."))?;
        if !post.is_authored_by(&self.identity) {
            return Err(WallError::validation("You can only delete your own posts."));
        }
        if !confirm(post) {
            return Ok(None);
        }
        Ok(Some(post.id.clone()))
    }

    pub fn apply_delete(&mut self, id: &str, result: Result<()>) -> Result<()> {
        if let Err(err) = result {
            warn!(post = id, %err, "failed to delete post");
            return Err(err);
        }
        info!(post = id, "post deleted");
        self.posts.retain(|post| post.id != id);
        self.comments.remove(id);
        self.expanded.remove(id);
        self.drafts.remove(id);
        if self.open_menu.as_deref() == Some(id) {
            self.open_menu = None;
        }
        Ok(())
    }

    pub fn delete_post(
        &mut self,
        service: &dyn WallService,
        id: &str,
        confirm: impl FnOnce(&Post) -> bool,
    ) -> Result<DeleteOutcome> {
        let Some(id) = self.begin_delete(id, confirm)? else {
            return Ok(DeleteOutcome::Cancelled);
        };
        let result = service.delete_post(&id);
        self.apply_delete(&id, result)?;
        Ok(DeleteOutcome::Deleted)
    }

    // Image overlay

    pub fn image_overlay(&self) -> Option<&str> {
        self.image_overlay.as_deref()
    }

    /// Opens the full-size view of a post's image. Posts without one are
    /// ignored.
    pub fn open_image(&mut self, id: &str) -> bool {
        let url = self.post(id).and_then(|post| post.photo_url.clone());
        match url {
            Some(url) => {
                self.image_overlay = Some(url);
                true
            }
            None => false,
        }
    }

    pub fn close_image(&mut self) {
        self.image_overlay = None;
    }

    /// A press while the overlay is up; anything outside the image closes it.
    pub fn overlay_pointer_down(&mut self, inside_image: bool) {
        if !inside_image {
            self.image_overlay = None;
        }
    }
}
