//! Plain-text renderings of the post collection for the terminal.

use std::fmt::Write;

use crate::application::store::StoreSnapshot;
use crate::domain::entities::Post;
use crate::domain::posts::{self, FilterCriteria};
use crate::domain::session::Identity;

pub const EMPTY_MESSAGE: &str = "No posts yet.";
pub const LOADING_MESSAGE: &str = "Loading posts...";
pub const NO_MATCH_MESSAGE: &str = "No posts match the current filters.";

const RULE: &str = "────────────────────────────────────────";

/// One post as a summary card.
pub fn render_card(post: &Post) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[{}] {}  #{}",
        post.category,
        posts::format_display_date(post),
        post.id
    );
    let _ = writeln!(out, "{}", post.title);
    let _ = writeln!(out, "{}", post.summary);
    if !post.tags.is_empty() {
        let tags: Vec<String> = post.tags.iter().map(|tag| format!("#{tag}")).collect();
        let _ = writeln!(out, "{}", tags.join(" "));
    }
    out
}

/// The filtered list, or the loading/empty placeholder that applies.
///
/// A reload in flight is announced above whatever is cached. The empty
/// message reflects the whole cache, not the filtered view: an empty result
/// over a non-empty cache reads as "nothing matches".
pub fn render_list(snapshot: &StoreSnapshot, criteria: &FilterCriteria) -> String {
    let mut out = String::new();
    if snapshot.loading {
        let _ = writeln!(out, "{LOADING_MESSAGE}");
        if snapshot.posts.is_empty() {
            return out;
        }
    }

    if let Some(error) = snapshot.last_error.as_deref() {
        let _ = writeln!(out, "! {error}");
    }

    if snapshot.posts.is_empty() {
        let _ = writeln!(out, "{EMPTY_MESSAGE}");
        return out;
    }

    let visible = posts::derive(&snapshot.posts, criteria);
    if visible.is_empty() {
        let _ = writeln!(out, "{NO_MATCH_MESSAGE}");
        return out;
    }

    for (index, post) in visible.iter().enumerate() {
        if index > 0 {
            let _ = writeln!(out, "{RULE}");
        }
        out.push_str(&render_card(post));
    }
    out
}

/// Active filters plus the tags available for selection.
pub fn render_filters(criteria: &FilterCriteria, available: &[String]) -> String {
    let category = criteria
        .category
        .map_or_else(|| "all".to_string(), |category| category.to_string());
    let mut out = format!(
        "category: {category} | order: {}",
        criteria.sort_order.as_str()
    );

    if !available.is_empty() {
        let tags: Vec<String> = available
            .iter()
            .map(|tag| {
                if criteria.is_tag_selected(tag) {
                    format!("[{tag}]")
                } else {
                    tag.clone()
                }
            })
            .collect();
        let _ = write!(out, " | tags: {}", tags.join(" "));
    }
    out.push('\n');
    out
}

/// Full post with its content broken into lines.
pub fn render_detail(post: &Post) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", post.title);
    let _ = writeln!(
        out,
        "{} · {}",
        post.category,
        posts::format_display_date(post)
    );
    if !post.tags.is_empty() {
        let _ = writeln!(out, "tags: {}", post.tags.join(", "));
    }
    let _ = writeln!(out, "cover: {}", post.cover_image);
    let _ = writeln!(out, "{RULE}");
    for line in post.content_lines() {
        let _ = writeln!(out, "{line}");
    }
    out
}

pub fn render_identity(identity: Option<&Identity>) -> String {
    match identity {
        Some(identity) => format!("Signed in as {}\n", identity.display_name()),
        None => "Not signed in.\n".to_string(),
    }
}
