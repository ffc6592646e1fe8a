use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::backend;
use crate::config::{self, Config};
use crate::data::{MemoryWallService, RestWallService, WallService};
use crate::format;
use crate::logging;
use crate::page::Page;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let display_path = friendly_path(config::default_path().as_ref());

    let log_note = match logging::init(&cfg.logging) {
        Ok(path) => {
            info!(log = %path.display(), "wall-tui {} starting", crate::VERSION);
            None
        }
        Err(err) => Some(format!("Logging disabled ({err})")),
    };

    let (service, backend_label) = build_service(&cfg)?;
    let page = Page::new(cfg.identity(), cfg.composer_options());

    let mut status = if cfg.uses_backend() {
        format!(
            "Signed in as {}. Press n to post, q to quit.",
            cfg.identity().display_name()
        )
    } else {
        format!("Offline demo wall. Set backend.url in {display_path} to share posts.")
    };
    if let Some(note) = log_note {
        status = format!("{status} {note}");
    }

    let options = ui::Options {
        page,
        service,
        status_message: status,
        backend_label,
    };

    let mut model = ui::Model::new(options);
    model.run()?;
    info!("wall-tui exiting");

    Ok(())
}

/// Prints the current wall to stdout without starting the terminal UI.
pub fn print_feed() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let (service, backend_label) = build_service(&cfg)?;
    let mut posts = service.list_posts().context("list posts")?;
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "TheWall ({backend_label})")?;
    if posts.is_empty() {
        writeln!(out, "\nNo posts yet.")?;
    }
    for post in &posts {
        writeln!(
            out,
            "\n[{}] {}  {}",
            format::initials(post.user_name.as_deref()),
            post.author(),
            format::format_timestamp(&post.created_at)
        )?;
        for line in post.content.lines() {
            writeln!(out, "  {line}")?;
        }
        if let Some(url) = &post.photo_url {
            writeln!(out, "  photo: {url}")?;
        }
        writeln!(
            out,
            "  {} likes · {} comments",
            post.likes_count, post.comments_count
        )?;
    }
    Ok(())
}

/// Stores backend credentials in the default config file.
pub fn set_backend(url: &str, api_key: &str) -> Result<PathBuf> {
    config::save_backend(None, url, api_key)
}

fn build_service(cfg: &Config) -> Result<(Arc<dyn WallService>, String)> {
    if !cfg.uses_backend() {
        warn!("backend.url is empty; using the in-memory wall");
        let service: Arc<dyn WallService> = Arc::new(MemoryWallService::with_sample_posts());
        return Ok((service, "offline".to_string()));
    }

    let client = backend::Client::new(cfg.backend_client_config()).context("create backend client")?;
    let label = url::Url::parse(&cfg.backend.url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| cfg.backend.url.clone());
    let service: Arc<dyn WallService> = Arc::new(RestWallService::new(Arc::new(client)));
    Ok((service, label))
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/wall-tui/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_path_falls_back_to_default_location() {
        assert_eq!(friendly_path(None), "~/.config/wall-tui/config.yaml");
    }

    #[test]
    fn friendly_path_keeps_paths_outside_home() {
        let path = PathBuf::from("/etc/wall-tui/config.yaml");
        assert_eq!(friendly_path(Some(&path)), "/etc/wall-tui/config.yaml");
    }

    #[test]
    fn offline_config_selects_memory_wall() {
        let cfg = Config::default();
        let (service, label) = build_service(&cfg).unwrap();
        assert_eq!(label, "offline");
        assert!(!service.list_posts().unwrap().is_empty());
    }
}
