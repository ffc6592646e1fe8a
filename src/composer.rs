use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use crate::data::WallService;
use crate::error::{Result, WallError};
use crate::media::{self, CompressOptions, SelectedImage};
use crate::model::{Identity, Post};

pub const MAX_POST_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ComposerOptions {
    pub bucket: String,
    pub compress: CompressOptions,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        Self {
            bucket: crate::config::DEFAULT_BUCKET.to_string(),
            compress: CompressOptions::default(),
        }
    }
}

/// Which step of a submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    Compress,
    Upload,
    Create,
}

#[derive(Debug, Clone)]
pub struct SubmitReport {
    pub post: Post,
    /// Set when the uploaded image is still above the soft size ceiling.
    pub warning: Option<String>,
}

#[derive(Debug)]
pub struct SubmitFailure {
    pub stage: SubmitStage,
    pub error: WallError,
}

/// A snapshot of the composer taken when a submission starts. It can run on
/// another thread while the composer stays locked.
#[derive(Debug, Clone)]
pub struct Submission {
    content: String,
    author: String,
    image: Option<SelectedImage>,
    options: ComposerOptions,
}

pub type SubmissionOutcome = std::result::Result<SubmitReport, SubmitFailure>;

impl Submission {
    pub fn execute(self, service: &dyn WallService) -> SubmissionOutcome {
        let mut warning = None;
        let photo_url = match &self.image {
            Some(image) => {
                let compressed =
                    media::compress(image, &self.options.compress).map_err(|error| {
                        SubmitFailure {
                            stage: SubmitStage::Compress,
                            error,
                        }
                    })?;
                if compressed.over_soft_limit {
                    warning = Some(format!(
                        "Image is still {} after compression and may not display everywhere.",
                        human_size(compressed.bytes.len() as u64)
                    ));
                }
                let key = media::object_key(&compressed.extension, Utc::now());
                let stored = service
                    .upload_object(
                        &self.options.bucket,
                        &key,
                        compressed.bytes,
                        &compressed.content_type,
                    )
                    .map_err(|error| SubmitFailure {
                        stage: SubmitStage::Upload,
                        error,
                    })?;
                Some(stored.public_url)
            }
            None => None,
        };

        let post = service
            .create_post(&self.content, &self.author, photo_url.as_deref())
            .map_err(|error| SubmitFailure {
                stage: SubmitStage::Create,
                error,
            })?;
        Ok(SubmitReport { post, warning })
    }
}

#[derive(Debug, Default)]
pub struct Composer {
    text: String,
    image: Option<SelectedImage>,
    in_flight: bool,
    options: ComposerOptions,
}

impl Composer {
    pub fn new(options: ComposerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// `n/500`, shown next to the submit control.
    pub fn counter_label(&self) -> String {
        format!("{}/{}", self.char_count(), MAX_POST_CHARS)
    }

    /// Replaces the text, dropping anything past the character cap.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.chars().take(MAX_POST_CHARS).collect();
    }

    /// Returns false when the cap is reached and `ch` was dropped.
    pub fn push_char(&mut self, ch: char) -> bool {
        if self.char_count() >= MAX_POST_CHARS {
            return false;
        }
        self.text.push(ch);
        true
    }

    pub fn pop_char(&mut self) -> Option<char> {
        self.text.pop()
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.image.as_ref()
    }

    pub fn attach_image(&mut self, image: SelectedImage) {
        self.image = Some(image);
    }

    pub fn attach_image_file(&mut self, path: &Path) -> Result<()> {
        let image = SelectedImage::from_path(path)?;
        self.attach_image(image);
        Ok(())
    }

    pub fn clear_image(&mut self) -> Option<SelectedImage> {
        self.image.take()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty() || self.image.is_some()
    }

    pub fn can_submit(&self) -> bool {
        !self.in_flight && self.has_content()
    }

    pub fn begin_submit(&mut self, identity: &Identity) -> Result<Submission> {
        if self.in_flight {
            return Err(WallError::validation("A post is already being submitted."));
        }
        if !self.has_content() {
            return Err(WallError::validation("Write something or add a photo first."));
        }
        self.in_flight = true;
        Ok(Submission {
            content: self.text.clone(),
            author: identity.display_name().to_string(),
            image: self.image.clone(),
            options: self.options.clone(),
        })
    }

    pub fn finish_submit(&mut self, outcome: SubmissionOutcome) -> Result<SubmitReport> {
        self.in_flight = false;
        match outcome {
            Ok(report) => {
                info!(id = %report.post.id, "post created");
                self.text.clear();
                self.image = None;
                Ok(report)
            }
            Err(SubmitFailure { stage, error }) => {
                warn!(?stage, %error, "post submission failed");
                if stage == SubmitStage::Compress {
                    self.image = None;
                }
                Err(error)
            }
        }
    }

    /// Runs a whole submission in place. `on_posted` is invoked once, only on
    /// success.
    pub fn submit(
        &mut self,
        service: &dyn WallService,
        identity: &Identity,
        on_posted: impl FnOnce(),
    ) -> Result<SubmitReport> {
        let submission = self.begin_submit(identity)?;
        let report = self.finish_submit(submission.execute(service))?;
        on_posted();
        Ok(report)
    }
}

fn human_size(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MB {
        format!("{:.1} MB", bytes as f64 / MB)
    } else {
        format!("{:.0} KB", (bytes as f64 / 1024.0).ceil())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Call, MemoryWallService, Operation};

    #[test]
    fn text_is_capped_at_limit() {
        let mut composer = Composer::default();
        composer.set_text(&"x".repeat(MAX_POST_CHARS + 20));
        assert_eq!(composer.char_count(), MAX_POST_CHARS);
        assert!(!composer.push_char('y'));
        composer.pop_char();
        assert!(composer.push_char('é'));
        assert_eq!(composer.counter_label(), "500/500");
    }

    #[test]
    fn whitespace_only_cannot_submit() {
        let service = MemoryWallService::new();
        let mut composer = Composer::default();
        composer.set_text("   \n ");
        assert!(!composer.can_submit());
        let err = composer
            .submit(&service, &Identity::default(), || panic!("no refresh"))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(service.calls().is_empty());
    }

    #[test]
    fn create_failure_keeps_text() {
        let service = MemoryWallService::new();
        service.fail_next(Operation::CreatePost, "insert denied");
        let mut composer = Composer::default();
        composer.set_text("hello");
        let err = composer
            .submit(&service, &Identity::default(), || {})
            .unwrap_err();
        assert_eq!(err.to_string(), "insert denied");
        assert_eq!(composer.text(), "hello");
        assert!(composer.can_submit());
    }

    #[test]
    fn compression_failure_drops_image_and_keeps_text() {
        let service = MemoryWallService::new();
        let mut composer = Composer::default();
        composer.set_text("look at this");
        composer.attach_image(SelectedImage::new("cat.png", b"not an image".to_vec()));
        let err = composer
            .submit(&service, &Identity::default(), || {})
            .unwrap_err();
        assert!(matches!(err, WallError::ImageProcessing(_)));
        assert!(composer.image().is_none());
        assert_eq!(composer.text(), "look at this");
        assert!(service.calls().is_empty());
    }

    #[test]
    fn in_flight_blocks_second_submission() {
        let mut composer = Composer::default();
        composer.set_text("once");
        let _pending = composer.begin_submit(&Identity::default()).unwrap();
        assert!(!composer.can_submit());
        assert!(composer.begin_submit(&Identity::default()).is_err());
    }

    #[test]
    fn post_is_attributed_to_identity() {
        let service = MemoryWallService::new();
        let mut composer = Composer::default();
        composer.set_text("signed");
        let report = composer
            .submit(&service, &Identity::new("Grace Hopper"), || {})
            .unwrap();
        assert_eq!(report.post.user_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(
            service.calls(),
            vec![Call::CreatePost {
                content: "signed".into(),
                photo_url: None
            }]
        );
    }

    #[test]
    fn human_size_rounds() {
        assert_eq!(human_size(11 * 1024 * 1024), "11.0 MB");
        assert_eq!(human_size(1500), "2 KB");
    }
}
