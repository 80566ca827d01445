//! Text rendering rules shared by all adapters
//!
//! Truncation never cuts inside a word. Cut points are whitespace boundaries,
//! plus any boundary next to a CJK character, since Chinese and Japanese text
//! carries no spaces between words.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::PlatformSpec;
use crate::error::ConstraintViolation;
use crate::types::{ContentBundle, PlatformPayload};

use super::media;

/// Appended to text that was shortened to fit a character limit
pub const TRUNCATION_MARKER: &str = "...";

/// Shortest truncated text worth publishing, marker excluded
pub const MIN_MEANINGFUL_CHARS: usize = 10;

/// Text after rendering for a platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    pub text: String,
    pub truncated: bool,
    pub tags_appended: usize,
}

/// Adapter for character-limited text platforms
pub(crate) fn adapt(
    bundle: &ContentBundle,
    spec: &PlatformSpec,
) -> Result<PlatformPayload, ConstraintViolation> {
    let rendered = render(&spec.name, spec.char_limit, None, &bundle.body, &bundle.tags)?;
    let selection = media::select(&bundle.media, spec);
    media::ensure_minimum(&spec.name, &selection, spec.min_media)?;
    Ok(build_payload(bundle, spec, rendered, selection))
}

/// Assemble a payload and its bookkeeping metadata
pub(crate) fn build_payload(
    bundle: &ContentBundle,
    spec: &PlatformSpec,
    rendered: RenderedText,
    selection: media::MediaSelection,
) -> PlatformPayload {
    let (title, title_truncated) = fit_title(bundle.title.trim(), spec.title_limit);
    let mut metadata = BTreeMap::new();
    metadata.insert("title".to_string(), title.clone());
    if title_truncated {
        metadata.insert("title_truncated".to_string(), "true".to_string());
    }
    metadata.insert("truncated".to_string(), rendered.truncated.to_string());
    metadata.insert("tags_appended".to_string(), rendered.tags_appended.to_string());
    if selection.dropped() > 0 {
        metadata.insert("media_dropped".to_string(), selection.dropped().to_string());
    }
    if selection.resized > 0 {
        metadata.insert("media_resized".to_string(), selection.resized.to_string());
    }

    PlatformPayload {
        platform: spec.name.clone(),
        title,
        rendered_text: rendered.text,
        media: selection.media,
        metadata,
        requires_manual_action: false,
    }
}

/// Shorten a title to `limit` characters; a title too short to cut at a word
/// boundary is cut at the limit instead
fn fit_title(title: &str, limit: Option<usize>) -> (String, bool) {
    match limit {
        Some(limit) if char_len(title) > limit => {
            let fitted = truncate_words(title, limit)
                .unwrap_or_else(|| title.chars().take(limit).collect());
            (fitted, true)
        }
        _ => (title.to_string(), false),
    }
}

/// Render `lead` (an optional heading line) and `body` within `char_limit`.
///
/// Tags are appended as `#tag` only when the untruncated text leaves room for
/// them, one at a time in sorted order; tags already present in the text are
/// not repeated.
pub fn render(
    platform: &str,
    char_limit: Option<usize>,
    lead: Option<&str>,
    body: &str,
    tags: &BTreeSet<String>,
) -> Result<RenderedText, ConstraintViolation> {
    let body = body.trim();
    let text = match lead.map(str::trim).filter(|lead| !lead.is_empty()) {
        Some(lead) if !body.is_empty() => format!("{}\n\n{}", lead, body),
        Some(lead) => lead.to_string(),
        None => body.to_string(),
    };

    if text.is_empty() {
        return Err(ConstraintViolation::new(platform, "nothing to publish: body is empty"));
    }

    let limit = char_limit.unwrap_or(usize::MAX);
    if char_len(&text) > limit {
        let truncated = truncate_words(&text, limit).ok_or_else(|| {
            ConstraintViolation::new(
                platform,
                format!(
                    "text cannot be shortened to {} characters without dropping below {} meaningful characters",
                    limit, MIN_MEANINGFUL_CHARS
                ),
            )
        })?;
        return Ok(RenderedText {
            text: truncated,
            truncated: true,
            tags_appended: 0,
        });
    }

    let (text, tags_appended) = append_tags(text, tags, limit);
    Ok(RenderedText {
        text,
        truncated: false,
        tags_appended,
    })
}

fn append_tags(mut text: String, tags: &BTreeSet<String>, limit: usize) -> (String, usize) {
    let mut used = char_len(&text);
    let mut appended = 0;

    for tag in tags {
        let hashtag = format!("#{}", tag);
        if text.contains(&hashtag) {
            continue;
        }
        let separator = if appended == 0 { "\n\n" } else { " " };
        let cost = separator.len() + char_len(&hashtag);
        if used + cost > limit {
            continue;
        }
        text.push_str(separator);
        text.push_str(&hashtag);
        used += cost;
        appended += 1;
    }

    (text, appended)
}

/// Shorten `text` to at most `limit` characters, marker included.
///
/// Returns `None` when the longest word-preserving prefix would be shorter
/// than [`MIN_MEANINGFUL_CHARS`].
pub fn truncate_words(text: &str, limit: usize) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= limit {
        return Some(text.to_string());
    }

    let budget = limit.checked_sub(char_len(TRUNCATION_MARKER))?;
    let cut = (1..=budget).rev().find(|&i| is_cut_point(&chars, i))?;

    let prefix: String = chars[..cut].iter().collect();
    let prefix = prefix.trim_end();
    if char_len(prefix) < MIN_MEANINGFUL_CHARS {
        return None;
    }

    Some(format!("{}{}", prefix, TRUNCATION_MARKER))
}

/// Whether the text may be cut before `chars[i]` (0 < i < len)
fn is_cut_point(chars: &[char], i: usize) -> bool {
    let before = chars[i - 1];
    let after = chars[i];
    after.is_whitespace() || before.is_whitespace() || is_cjk(before) || is_cjk(after)
}

/// CJK ideographs, kana, Hangul syllables and CJK/full-width punctuation
fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3000..=0x303F
            | 0x3040..=0x30FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xAC00..=0xD7AF
            | 0xF900..=0xFAFF
            | 0xFF00..=0xFFEF
            | 0x20000..=0x2A6DF
    )
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}
