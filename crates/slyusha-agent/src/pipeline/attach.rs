//! Attachment resolution: which media of a message are shown to the model.
//!
//! Resolution is pure and ordered by fixed priority: photo, sticker, video,
//! animation, video note. Downloading happens afterwards through a
//! `MediaFetcher`; a failed download only drops that one attachment.

use futures_util::future::join_all;
use tracing::warn;

use slyusha_core::config::ContextConfig;
use slyusha_core::types::{FileRef, MediaFields};

use super::context::MediaFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Sticker,
    StickerThumbnail,
    Video,
    VideoThumbnail,
    AnimationThumbnail,
    VideoNoteThumbnail,
}

/// A resolvable media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub file_id: String,
    pub mime_type: String,
    pub kind: MediaKind,
}

/// Downloaded media, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMedia {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy)]
pub struct AttachmentPolicy {
    pub byte_limit: u64,
    /// Send videos as full media when they fit `video_max_bytes`.
    pub video_attachments: bool,
    pub video_max_bytes: u64,
}

impl From<&ContextConfig> for AttachmentPolicy {
    fn from(cfg: &ContextConfig) -> Self {
        Self {
            byte_limit: cfg.attachment_byte_limit,
            video_attachments: cfg.video_attachments,
            video_max_bytes: cfg.video_max_bytes,
        }
    }
}

impl AttachmentPolicy {
    /// Download cap for one reference. Full videos are bounded by their own
    /// ceiling, everything else by `byte_limit`.
    pub fn fetch_limit(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Video => self.video_max_bytes,
            _ => self.byte_limit,
        }
    }
}

const JPEG: &str = "image/jpeg";
const WEBP: &str = "image/webp";
const MP4: &str = "video/mp4";

/// Resolve the media of one message into an ordered list of references.
pub fn resolve(media: &MediaFields, policy: &AttachmentPolicy) -> Vec<MediaRef> {
    let mut out = Vec::new();

    if let Some(photo) = pick_photo_size(&media.photo, policy.byte_limit) {
        push_ref(&mut out, photo, JPEG, MediaKind::Photo);
    }

    if let Some(ref sticker) = media.sticker {
        if sticker.animated {
            push_thumbnail(
                &mut out,
                sticker.thumbnail.as_ref(),
                MediaKind::StickerThumbnail,
            );
        } else {
            push_ref(&mut out, &sticker.file, WEBP, MediaKind::Sticker);
        }
    }

    if let Some(ref video) = media.video {
        let fits = video
            .file
            .size
            .is_some_and(|size| size < policy.video_max_bytes);
        if policy.video_attachments && fits {
            let mime = video.mime_type.as_deref().unwrap_or(MP4);
            push_ref(&mut out, &video.file, mime, MediaKind::Video);
        } else {
            push_thumbnail(&mut out, video.thumbnail.as_ref(), MediaKind::VideoThumbnail);
        }
    }

    if let Some(ref animation) = media.animation {
        push_thumbnail(
            &mut out,
            animation.thumbnail.as_ref(),
            MediaKind::AnimationThumbnail,
        );
    }

    if let Some(ref note) = media.video_note {
        push_thumbnail(&mut out, note.thumbnail.as_ref(), MediaKind::VideoNoteThumbnail);
    }

    out
}

/// Largest photo size that fits `byte_limit`; the smallest one when none fits.
/// Sizes without a known byte count are assumed to fit.
fn pick_photo_size(sizes: &[FileRef], byte_limit: u64) -> Option<&FileRef> {
    sizes
        .iter()
        .rev()
        .find(|s| s.size.map_or(true, |size| size <= byte_limit))
        .or_else(|| sizes.first())
}

fn push_thumbnail(out: &mut Vec<MediaRef>, thumb: Option<&FileRef>, kind: MediaKind) {
    if let Some(thumb) = thumb {
        push_ref(out, thumb, JPEG, kind);
    }
}

fn push_ref(out: &mut Vec<MediaRef>, file: &FileRef, mime: &str, kind: MediaKind) {
    if file.file_id.trim().is_empty() {
        warn!(?kind, "attachment has no file id, skipping");
        return;
    }
    out.push(MediaRef {
        file_id: file.file_id.clone(),
        mime_type: mime.to_string(),
        kind,
    });
}

/// Download every reference, keeping the input order. Failures are logged
/// and dropped.
pub async fn fetch_all(
    fetcher: &dyn MediaFetcher,
    refs: &[MediaRef],
    policy: &AttachmentPolicy,
) -> Vec<InlineMedia> {
    let results = join_all(
        refs.iter()
            .map(|r| fetcher.fetch(r, policy.fetch_limit(r.kind))),
    )
    .await;
    results
        .into_iter()
        .zip(refs)
        .filter_map(|(result, media)| match result {
            Ok(inline) => Some(inline),
            Err(e) => {
                warn!(file_id = %media.file_id, kind = ?media.kind, error = %e, "attachment fetch failed, omitting");
                None
            }
        })
        .collect()
}
