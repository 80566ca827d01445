//! Media selection rules and the media-first adapter

use crate::config::PlatformSpec;
use crate::error::ConstraintViolation;
use crate::types::{ContentBundle, MediaRef, PlatformPayload};

use super::text;

/// Media that survived a platform's constraints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSelection {
    pub media: Vec<MediaRef>,
    /// Dropped because the platform does not accept their kind
    pub dropped_kind: usize,
    /// Dropped because the platform caps the number of items
    pub dropped_over_cap: usize,
    /// Kept, with dimensions scaled down to `max_dimension`
    pub resized: usize,
}

impl MediaSelection {
    pub fn dropped(&self) -> usize {
        self.dropped_kind + self.dropped_over_cap
    }
}

/// Filter, cap and resize media for a platform, preserving order
pub fn select(media: &[MediaRef], spec: &PlatformSpec) -> MediaSelection {
    let mut selection = MediaSelection::default();

    for item in media {
        if !spec.media_kinds.contains(&item.kind) {
            selection.dropped_kind += 1;
            continue;
        }
        if spec
            .max_media
            .is_some_and(|max| selection.media.len() >= max)
        {
            selection.dropped_over_cap += 1;
            continue;
        }

        let mut item = item.clone();
        if let (Some(max), Some(dims)) = (spec.max_dimension, item.dimensions) {
            if let Some(scaled) = dims.fit_within(max) {
                item.dimensions = Some(scaled);
                selection.resized += 1;
            }
        }
        selection.media.push(item);
    }

    selection
}

/// Fail when fewer than `required` media items remain
pub fn ensure_minimum(
    platform: &str,
    selection: &MediaSelection,
    required: usize,
) -> Result<(), ConstraintViolation> {
    if selection.media.len() >= required {
        return Ok(());
    }
    Err(ConstraintViolation::new(
        platform,
        format!(
            "requires at least {} media item(s) of an accepted kind, {} remain after filtering ({} dropped)",
            required,
            selection.media.len(),
            selection.dropped()
        ),
    ))
}

/// Adapter for media-first platforms
///
/// The title becomes the caption's first line. At least one media item is
/// required even when the platform sets no minimum.
pub(crate) fn adapt(
    bundle: &ContentBundle,
    spec: &PlatformSpec,
) -> Result<PlatformPayload, ConstraintViolation> {
    let selection = select(&bundle.media, spec);
    ensure_minimum(&spec.name, &selection, spec.min_media.max(1))?;

    let rendered = text::render(
        &spec.name,
        spec.char_limit,
        Some(&bundle.title),
        &bundle.body,
        &bundle.tags,
    )?;
    Ok(text::build_payload(bundle, spec, rendered, selection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterKind;
    use crate::types::{Dimensions, MediaKind};

    fn mixed_media() -> Vec<MediaRef> {
        vec![
            MediaRef::image("a.png").with_dimensions(4000, 3000),
            MediaRef::video("b.mp4"),
            MediaRef::image("c.jpg").with_dimensions(800, 600),
            MediaRef::image("d.jpg"),
        ]
    }

    #[test]
    fn test_select_drops_disallowed_kinds() {
        let spec = PlatformSpec::new("reddit", AdapterKind::Text).with_media_kinds([MediaKind::Image]);
        let selection = select(&mixed_media(), &spec);

        assert_eq!(selection.media.len(), 3);
        assert!(selection.media.iter().all(|m| m.kind == MediaKind::Image));
        assert_eq!(selection.dropped_kind, 1);
    }

    #[test]
    fn test_select_caps_count_in_order() {
        let spec = PlatformSpec::new("x", AdapterKind::Text).with_max_media(2);
        let selection = select(&mixed_media(), &spec);

        let uris: Vec<&str> = selection.media.iter().map(|m| m.uri.as_str()).collect();
        assert_eq!(uris, vec!["a.png", "b.mp4"]);
        assert_eq!(selection.dropped_over_cap, 2);
        assert_eq!(selection.dropped(), 2);
    }

    #[test]
    fn test_select_scales_oversized_media() {
        let spec = PlatformSpec::new("xiaohongshu", AdapterKind::Manual).with_max_dimension(2000);
        let selection = select(&mixed_media(), &spec);

        assert_eq!(selection.resized, 1);
        assert_eq!(selection.media[0].dimensions, Some(Dimensions::new(2000, 1500)));
        assert_eq!(selection.media[2].dimensions, Some(Dimensions::new(800, 600)));
        assert_eq!(selection.media[3].dimensions, None);
    }

    #[test]
    fn test_media_adapter_requires_one_item() {
        let spec = PlatformSpec::new("tiktok", AdapterKind::Media).with_media_kinds([MediaKind::Video]);
        let bundle = ContentBundle::new("Demo", "Watch this").with_media(MediaRef::image("only.png"));

        let err = adapt(&bundle, &spec).unwrap_err();
        assert_eq!(err.platform, "tiktok");
        assert!(err.reason.contains("at least 1"));
        assert!(err.reason.contains("1 dropped"));
    }

    #[test]
    fn test_media_adapter_honors_configured_minimum() {
        let spec = PlatformSpec::new("bilibili", AdapterKind::Media).with_min_media(2);
        let bundle = ContentBundle::new("Demo", "Watch this").with_media(MediaRef::video("v.mp4"));

        let err = adapt(&bundle, &spec).unwrap_err();
        assert!(err.reason.contains("at least 2"));
    }

    #[test]
    fn test_media_adapter_builds_caption_from_title() {
        let spec = PlatformSpec::new("tiktok", AdapterKind::Media)
            .with_char_limit(150)
            .with_media_kinds([MediaKind::Video]);
        let bundle = ContentBundle::new("Promocast", "One post, every platform.")
            .with_media(MediaRef::image("cover.png"))
            .with_media(MediaRef::video("demo.mp4"))
            .with_tag("fyp");

        let payload = adapt(&bundle, &spec).unwrap();
        assert_eq!(
            payload.rendered_text,
            "Promocast\n\nOne post, every platform.\n\n#fyp"
        );
        assert_eq!(payload.media, vec![MediaRef::video("demo.mp4")]);
        assert_eq!(payload.metadata.get("media_dropped").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_text_adapter_does_not_require_media() {
        let spec = PlatformSpec::new("x", AdapterKind::Text).with_media_kinds([MediaKind::Image]);
        let bundle = ContentBundle::new("T", "Text only post").with_media(MediaRef::video("v.mp4"));

        let payload = AdapterKind::Text.adapt(&bundle, &spec).unwrap();
        assert!(payload.media.is_empty());
    }
}
