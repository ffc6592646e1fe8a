use std::cell::Cell;
use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use wall_tui::composer::{Composer, ComposerOptions, MAX_POST_CHARS};
use wall_tui::data::{Call, MemoryWallService, Operation, WallService};
use wall_tui::media::{CompressOptions, SelectedImage};
use wall_tui::model::Identity;
use wall_tui::page::{NoticeLevel, Page};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

#[test]
fn empty_composer_cannot_submit() {
    let service = MemoryWallService::new();
    let mut composer = Composer::new(ComposerOptions::default());
    composer.set_text("   ");
    assert!(!composer.can_submit());

    let posted = Cell::new(0);
    let err = composer
        .submit(&service, &Identity::default(), || posted.set(posted.get() + 1))
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(posted.get(), 0);
    assert!(service.calls().is_empty());
}

#[test]
fn text_post_clears_composer_and_notifies_once() {
    let service = MemoryWallService::new();
    let mut composer = Composer::new(ComposerOptions::default());
    composer.set_text("hello wall");

    let posted = Cell::new(0);
    let report = composer
        .submit(&service, &Identity::default(), || posted.set(posted.get() + 1))
        .unwrap();
    assert_eq!(posted.get(), 1);
    assert_eq!(report.post.content, "hello wall");
    assert_eq!(report.post.author(), "John Doe");
    assert_eq!(composer.text(), "");
    assert!(!composer.is_in_flight());
    assert_eq!(
        service.calls(),
        vec![Call::CreatePost {
            content: "hello wall".into(),
            photo_url: None
        }]
    );
}

#[test]
fn photo_post_uploads_then_creates() {
    let service = MemoryWallService::new();
    let mut composer = Composer::new(ComposerOptions::default());
    composer.attach_image(SelectedImage::new("cat.png", png_bytes(8, 8)));
    assert!(composer.can_submit());

    composer
        .submit(&service, &Identity::new("Grace Hopper"), || {})
        .unwrap();

    let calls = service.calls();
    assert_eq!(calls.len(), 2);
    let Call::UploadObject { bucket, key, .. } = &calls[0] else {
        panic!("expected upload first, got {:?}", calls[0]);
    };
    assert_eq!(bucket, "post-images");
    assert!(key.ends_with(".png"), "key was {key}");
    assert!(service.object(bucket, key).is_some());

    let posts = service.list_posts().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].user_name.as_deref(), Some("Grace Hopper"));
    let url = posts[0].photo_url.as_deref().unwrap();
    assert_eq!(url, format!("memory://{bucket}/{key}"));
    assert!(composer.image().is_none());
}

fn tight_limit() -> ComposerOptions {
    ComposerOptions {
        compress: CompressOptions {
            soft_limit_bytes: 16,
            ..CompressOptions::default()
        },
        ..ComposerOptions::default()
    }
}

#[test]
fn oversized_photo_still_posts_with_warning() {
    let service = MemoryWallService::new();
    let mut composer = Composer::new(tight_limit());
    composer.set_text("big one");
    composer.attach_image(SelectedImage::new("cat.png", png_bytes(16, 16)));

    let report = composer
        .submit(&service, &Identity::default(), || {})
        .unwrap();
    assert!(report.warning.is_some());
    assert!(report.post.photo_url.is_some());
    assert_eq!(
        service.count_calls(|c| matches!(c, Call::UploadObject { .. })),
        1
    );
    assert_eq!(
        service.count_calls(|c| matches!(c, Call::CreatePost { .. })),
        1
    );
}

#[test]
fn oversized_photo_raises_warning_notice() {
    let service = MemoryWallService::new();
    let mut page = Page::new(Identity::default(), tight_limit());
    page.composer_mut().set_text("big one");
    page.composer_mut()
        .attach_image(SelectedImage::new("cat.png", png_bytes(16, 16)));

    assert!(page.submit_post(&service));
    let notice = page.latest_notice().unwrap();
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(notice.title, "Posted");
    assert!(notice.detail.as_deref().unwrap().contains("after compression"));
    assert_eq!(page.refresh_key(), 1);
}

#[test]
fn unreadable_image_is_dropped_before_any_request() {
    let service = MemoryWallService::new();
    let mut composer = Composer::new(ComposerOptions::default());
    composer.set_text("look at this");
    composer.attach_image(SelectedImage::new("broken.jpg", vec![0u8; 64]));

    let err = composer
        .submit(&service, &Identity::default(), || {})
        .unwrap_err();
    assert!(err.to_string().starts_with("image processing failed"));
    assert!(composer.image().is_none());
    assert_eq!(composer.text(), "look at this");
    assert!(service.calls().is_empty());
}

#[test]
fn upload_failure_keeps_draft() {
    let service = MemoryWallService::new();
    service.fail_next(Operation::UploadObject, "bucket not found");
    let mut composer = Composer::new(ComposerOptions::default());
    composer.set_text("with photo");
    composer.attach_image(SelectedImage::new("cat.png", png_bytes(4, 4)));

    let err = composer
        .submit(&service, &Identity::default(), || {})
        .unwrap_err();
    assert_eq!(err.to_string(), "bucket not found");
    assert_eq!(composer.text(), "with photo");
    assert!(composer.image().is_some());
    assert_eq!(service.post_count(), 0);
}

#[test]
fn text_is_capped() {
    let mut composer = Composer::new(ComposerOptions::default());
    composer.set_text(&"x".repeat(MAX_POST_CHARS + 20));
    assert_eq!(composer.char_count(), MAX_POST_CHARS);
    assert!(!composer.push_char('y'));
    assert_eq!(composer.counter_label(), format!("{MAX_POST_CHARS}/{MAX_POST_CHARS}"));
}
