use std::collections::VecDeque;

use crate::composer::{Composer, ComposerOptions, Submission, SubmissionOutcome};
use crate::data::WallService;
use crate::error::{Result, WallError};
use crate::feed::{CommentOutcome, CommentSaved, CommentSubmission, CommentsToggle, Feed};
use crate::model::{Comment, Identity, Post};

const MAX_NOTICES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SidebarItem {
    pub label: &'static str,
    pub icon: &'static str,
    pub active: bool,
}

pub const NAV_ITEMS: [SidebarItem; 10] = [
    SidebarItem { label: "Home", icon: "🏠", active: true },
    SidebarItem { label: "Friends", icon: "👥", active: false },
    SidebarItem { label: "Groups", icon: "👥", active: false },
    SidebarItem { label: "Marketplace", icon: "🛒", active: false },
    SidebarItem { label: "Watch", icon: "📺", active: false },
    SidebarItem { label: "Memories", icon: "📅", active: false },
    SidebarItem { label: "Saved", icon: "💾", active: false },
    SidebarItem { label: "Pages", icon: "📄", active: false },
    SidebarItem { label: "Events", icon: "📅", active: false },
    SidebarItem { label: "Gaming", icon: "🎮", active: false },
];

pub const SHORTCUTS: [SidebarItem; 2] = [
    SidebarItem { label: "Developer Community", icon: "DC", active: false },
    SidebarItem { label: "Tech News", icon: "TN", active: false },
];

pub const TRENDING_TOPICS: [&str; 4] = ["#JavaScript", "#React", "#NextJS", "#WebDevelopment"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub detail: Option<String>,
}

impl Notice {
    pub fn message(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{}: {}", self.title, detail),
            None => self.title.clone(),
        }
    }
}

/// The home page: composer above the feed, plus the toast queue.
#[derive(Debug)]
pub struct Page {
    identity: Identity,
    composer: Composer,
    feed: Feed,
    refresh_key: u64,
    notices: VecDeque<Notice>,
}

impl Page {
    pub fn new(identity: Identity, composer_options: ComposerOptions) -> Self {
        Self {
            composer: Composer::new(composer_options),
            feed: Feed::new(identity.clone()),
            identity,
            refresh_key: 0,
            notices: VecDeque::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut Feed {
        &mut self.feed
    }

    pub fn refresh_key(&self) -> u64 {
        self.refresh_key
    }

    /// Asks the feed to refetch on its next sync.
    pub fn request_refresh(&mut self) {
        self.refresh_key += 1;
    }

    // Notices

    pub fn notify(&mut self, level: NoticeLevel, title: impl Into<String>, detail: Option<String>) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            level,
            title: title.into(),
            detail,
        });
    }

    fn report(&mut self, title: &str, err: &WallError) {
        let level = if err.is_validation() {
            NoticeLevel::Warning
        } else {
            NoticeLevel::Error
        };
        self.notify(level, title, Some(err.to_string()));
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn dismiss_notices(&mut self) {
        self.notices.clear();
    }

    /// Sidebar entries other than Home are placeholders.
    pub fn select_sidebar(&mut self, label: &str) {
        if label == "Home" {
            self.request_refresh();
            return;
        }
        self.notify(
            NoticeLevel::Info,
            format!("{label} feature coming soon!"),
            Some("This feature is currently under development.".to_string()),
        );
    }

    // Feed refresh

    pub fn sync(&mut self, service: &dyn WallService) -> Result<bool> {
        let key = self.refresh_key;
        let result = self.feed.sync(service, key);
        if let Err(err) = &result {
            self.report("Error loading posts", err);
        }
        result
    }

    pub fn apply_posts(&mut self, result: Result<Vec<Post>>) {
        if let Err(err) = self.feed.apply_posts(result) {
            self.report("Error loading posts", &err);
        }
    }

    // Composer

    pub fn begin_post(&mut self) -> Option<Submission> {
        match self.composer.begin_submit(&self.identity) {
            Ok(submission) => Some(submission),
            Err(err) => {
                self.report("Cannot post yet", &err);
                None
            }
        }
    }

    /// Applies a finished submission; success bumps the refresh key once.
    pub fn finish_post(&mut self, outcome: SubmissionOutcome) -> bool {
        match self.composer.finish_submit(outcome) {
            Ok(report) => {
                self.request_refresh();
                match report.warning {
                    Some(warning) => self.notify(NoticeLevel::Warning, "Posted", Some(warning)),
                    None => self.notify(NoticeLevel::Success, "Posted", None),
                }
                true
            }
            Err(err) => {
                let title = match err {
                    WallError::ImageProcessing(_) => "Error processing image",
                    _ => "Error posting",
                };
                self.report(title, &err);
                false
            }
        }
    }

    pub fn submit_post(&mut self, service: &dyn WallService) -> bool {
        match self.begin_post() {
            Some(submission) => self.finish_post(submission.execute(service)),
            None => false,
        }
    }

    // Comments

    pub fn toggle_comments(&mut self, service: &dyn WallService, id: &str) -> CommentsToggle {
        match self.feed.toggle_comments_with(service, id) {
            Ok(toggle) => toggle,
            Err(err) => {
                self.report("Error loading comments", &err);
                CommentsToggle::Expanded { needs_fetch: true }
            }
        }
    }

    pub fn apply_comments(&mut self, id: &str, result: Result<Vec<Comment>>) {
        if let Err(err) = self.feed.apply_comments(id, result) {
            self.report("Error loading comments", &err);
        }
    }

    pub fn begin_comment(&mut self, id: &str) -> Option<CommentSubmission> {
        match self.feed.begin_comment(id) {
            Ok(submission) => Some(submission),
            Err(err) => {
                self.report("Cannot comment yet", &err);
                None
            }
        }
    }

    /// True when the comment was saved, even if its thread failed to reload.
    pub fn finish_comment(&mut self, outcome: CommentOutcome) -> bool {
        match self.feed.finish_comment(outcome) {
            Ok(CommentSaved::Refreshed) => true,
            Ok(CommentSaved::RefreshFailed(err)) => {
                self.report("Error loading comments", &err);
                true
            }
            Err(err) => {
                self.report("Error adding comment", &err);
                false
            }
        }
    }

    pub fn add_comment(&mut self, service: &dyn WallService, id: &str) -> bool {
        match self.begin_comment(id) {
            Some(submission) => self.finish_comment(submission.execute(service)),
            None => false,
        }
    }

    // Delete

    pub fn apply_delete(&mut self, id: &str, result: Result<()>) -> bool {
        match self.feed.apply_delete(id, result) {
            Ok(()) => {
                self.notify(NoticeLevel::Success, "Post deleted", None);
                true
            }
            Err(err) => {
                self.report("Error deleting post", &err);
                false
            }
        }
    }

    /// Returns true when the post was removed.
    pub fn delete_post(
        &mut self,
        service: &dyn WallService,
        id: &str,
        confirm: impl FnOnce(&Post) -> bool,
    ) -> bool {
        match self.feed.begin_delete(id, confirm) {
            Ok(Some(id)) => {
                let result = service.delete_post(&id);
                self.apply_delete(&id, result)
            }
            Ok(None) => false,
            Err(err) => {
                self.report("Error deleting post", &err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Call, MemoryWallService, Operation};

    fn page() -> Page {
        Page::new(Identity::default(), ComposerOptions::default())
    }

    #[test]
    fn successful_post_triggers_one_refetch() {
        let service = MemoryWallService::new();
        let mut page = page();
        page.sync(&service).unwrap();
        page.composer_mut().set_text("hello wall");
        assert!(page.submit_post(&service));
        assert_eq!(page.refresh_key(), 1);
        assert!(page.sync(&service).unwrap());
        assert!(!page.sync(&service).unwrap());
        assert_eq!(page.feed().posts().len(), 1);
        assert_eq!(service.count_calls(|c| *c == Call::ListPosts), 2);
        assert_eq!(page.latest_notice().unwrap().level, NoticeLevel::Success);
    }

    #[test]
    fn failed_post_reports_backend_message() {
        let service = MemoryWallService::new();
        service.fail_next(Operation::CreatePost, "new row violates policy");
        let mut page = page();
        page.composer_mut().set_text("hello");
        assert!(!page.submit_post(&service));
        assert_eq!(page.refresh_key(), 0);
        assert_eq!(
            page.latest_notice().unwrap().message(),
            "Error posting: new row violates policy"
        );
    }

    #[test]
    fn saved_comment_with_failed_reload_reports_loading_error() {
        let service = MemoryWallService::new();
        let mut page = page();
        page.sync(&service).unwrap();
        page.composer_mut().set_text("hello");
        assert!(page.submit_post(&service));
        page.sync(&service).unwrap();
        let id = page.feed().posts()[0].id.clone();

        page.feed_mut().set_draft(&id, "nice");
        service.fail_next(Operation::ListComments, "timeout");
        assert!(page.add_comment(&service, &id));
        assert_eq!(
            page.latest_notice().unwrap().message(),
            "Error loading comments: timeout"
        );
        assert_eq!(page.feed().post(&id).unwrap().comments_count, 1);
    }

    #[test]
    fn sidebar_placeholders_raise_coming_soon() {
        let mut page = page();
        page.select_sidebar("Marketplace");
        let notice = page.latest_notice().unwrap();
        assert_eq!(notice.title, "Marketplace feature coming soon!");
        assert_eq!(notice.level, NoticeLevel::Info);
        page.select_sidebar("Home");
        assert_eq!(page.refresh_key(), 1);
    }

    #[test]
    fn notice_queue_is_bounded() {
        let mut page = page();
        for i in 0..20 {
            page.notify(NoticeLevel::Info, format!("n{i}"), None);
        }
        assert_eq!(page.notices().count(), MAX_NOTICES);
        assert_eq!(page.latest_notice().unwrap().title, "n19");
    }
}
