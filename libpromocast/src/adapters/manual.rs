//! Adapter for semi-automatic platforms
//!
//! Some platforms offer no usable publishing API. Their payload is prepared
//! exactly like a text post, headed by the title, and flagged for a person to
//! copy into the platform's app. Dispatch reports it as succeeded without
//! calling any publisher.

use crate::config::PlatformSpec;
use crate::error::ConstraintViolation;
use crate::types::{ContentBundle, PlatformPayload, MANUAL_ACTION_KEY};

use super::{media, text};

pub(crate) fn adapt(
    bundle: &ContentBundle,
    spec: &PlatformSpec,
) -> Result<PlatformPayload, ConstraintViolation> {
    let rendered = text::render(
        &spec.name,
        spec.char_limit,
        Some(&bundle.title),
        &bundle.body,
        &bundle.tags,
    )?;
    let selection = media::select(&bundle.media, spec);
    media::ensure_minimum(&spec.name, &selection, spec.min_media)?;

    let mut payload = text::build_payload(bundle, spec, rendered, selection);
    payload.requires_manual_action = true;
    payload
        .metadata
        .insert(MANUAL_ACTION_KEY.to_string(), "true".to_string());
    payload.metadata.insert(
        "manual_instructions".to_string(),
        instructions(&spec.name, payload.media.len()),
    );
    Ok(payload)
}

fn instructions(platform: &str, media_count: usize) -> String {
    if media_count == 0 {
        format!("Copy the prepared text into the {} app and publish it manually.", platform)
    } else {
        format!(
            "Copy the prepared text into the {} app, attach the {} listed media file(s) in order, and publish it manually.",
            platform, media_count
        )
    }
}
