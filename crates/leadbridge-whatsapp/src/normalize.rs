// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flattening of protocol message envelopes into text plus optional media.

use leadbridge_core::envelope::{MediaPayload, MessageContent};
use leadbridge_core::types::MediaKind;

/// Wrapper layers can only nest a handful of times in practice; the bound
/// keeps hostile input from looping.
const MAX_WRAPPER_DEPTH: usize = 8;

/// Placeholder stored when content carries no text.
pub fn placeholder(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "[imagem]",
        MediaKind::Video => "[video]",
        MediaKind::Audio => "[audio]",
        MediaKind::Document => "[documento]",
        MediaKind::Sticker => "[figurinha]",
    }
}

/// Placeholder for content kinds the bridge does not understand.
pub const UNKNOWN_PLACEHOLDER: &str = "[mensagem]";

fn wrapped_inner(content: &MessageContent) -> Option<&MessageContent> {
    [
        &content.ephemeral_message,
        &content.view_once_message,
        &content.view_once_message_v2,
        &content.view_once_message_v2_extension,
    ]
    .into_iter()
    .find_map(|w| w.as_deref().and_then(|w| w.message.as_ref()))
}

/// Strip ephemeral and view-once wrappers down to the innermost content.
pub fn unwrap(content: &MessageContent) -> &MessageContent {
    let mut current = content;
    for _ in 0..MAX_WRAPPER_DEPTH {
        match wrapped_inner(current) {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// Media attached to a message, with the payload used to download it.
#[derive(Debug, Clone, Copy)]
pub struct MediaInfo<'a> {
    pub kind: MediaKind,
    pub payload: &'a MediaPayload,
}

impl MediaInfo<'_> {
    pub fn mimetype(&self) -> Option<&str> {
        self.payload.mimetype.as_deref().filter(|m| !m.trim().is_empty())
    }
}

/// Detect an image, video, audio, document or sticker payload.
pub fn classify_media(content: &MessageContent) -> Option<MediaInfo<'_>> {
    [
        (MediaKind::Image, &content.image_message),
        (MediaKind::Video, &content.video_message),
        (MediaKind::Audio, &content.audio_message),
        (MediaKind::Document, &content.document_message),
        (MediaKind::Sticker, &content.sticker_message),
    ]
    .into_iter()
    .find_map(|(kind, payload)| payload.as_ref().map(|payload| MediaInfo { kind, payload }))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Human-readable text for content, or `None` for protocol noise.
///
/// Priority: plain text, extended text, media caption, interactive reply,
/// media placeholder, then the unknown-kind placeholder.
pub fn extract_text(content: &MessageContent) -> Option<String> {
    let caption = [
        &content.image_message,
        &content.video_message,
        &content.document_message,
    ]
    .into_iter()
    .find_map(|p| non_empty(p.as_ref().and_then(|p| p.caption.as_deref())));

    let interactive = || {
        let buttons = content.buttons_response_message.as_ref().and_then(|b| {
            non_empty(b.selected_display_text.as_deref())
                .or_else(|| non_empty(b.selected_button_id.as_deref()))
        });
        let list = content.list_response_message.as_ref().and_then(|l| {
            non_empty(l.title.as_deref()).or_else(|| {
                non_empty(
                    l.single_select_reply
                        .as_ref()
                        .and_then(|r| r.selected_row_id.as_deref()),
                )
            })
        });
        let template = content.template_button_reply_message.as_ref().and_then(|t| {
            non_empty(t.selected_display_text.as_deref())
                .or_else(|| non_empty(t.selected_id.as_deref()))
        });
        buttons.or(list).or(template)
    };

    non_empty(content.conversation.as_deref())
        .or_else(|| {
            non_empty(
                content
                    .extended_text_message
                    .as_ref()
                    .and_then(|t| t.text.as_deref()),
            )
        })
        .or(caption)
        .or_else(interactive)
        .or_else(|| classify_media(content).map(|m| placeholder(m.kind).to_string()))
        .or_else(|| has_unknown_kind(content).then(|| UNKNOWN_PLACEHOLDER.to_string()))
}

/// Whether content carries a kind the bridge does not model.
///
/// Receipts, reactions, key distribution and other protocol bookkeeping are
/// modelled explicitly and therefore never count as unknown.
fn has_unknown_kind(content: &MessageContent) -> bool {
    content.protocol_message.is_none()
        && content.reaction_message.is_none()
        && !content.other.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadbridge_core::envelope::{
        ButtonsResponse, ListResponse, SingleSelectReply, TextPayload, Wrapped,
    };
    use serde_json::json;

    fn parse(value: serde_json::Value) -> MessageContent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn plain_and_extended_text() {
        let c = MessageContent {
            conversation: Some("oi".into()),
            ..Default::default()
        };
        assert_eq!(extract_text(&c).as_deref(), Some("oi"));

        let c = MessageContent {
            extended_text_message: Some(TextPayload {
                text: Some("veja https://x".into()),
            }),
            ..Default::default()
        };
        assert_eq!(extract_text(&c).as_deref(), Some("veja https://x"));
    }

    #[test]
    fn unwraps_nested_wrappers() {
        let c = parse(json!({
            "ephemeralMessage": {"message": {
                "viewOnceMessageV2": {"message": {
                    "imageMessage": {"mimetype": "image/jpeg", "caption": "foto"}
                }}
            }}
        }));
        let inner = unwrap(&c);
        assert!(inner.image_message.is_some());
        assert_eq!(extract_text(inner).as_deref(), Some("foto"));
        let media = classify_media(inner).unwrap();
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.mimetype(), Some("image/jpeg"));
    }

    #[test]
    fn unwrap_is_bounded() {
        let mut c = MessageContent {
            conversation: Some("deep".into()),
            ..Default::default()
        };
        for _ in 0..20 {
            c = MessageContent {
                ephemeral_message: Some(Box::new(Wrapped { message: Some(c) })),
                ..Default::default()
            };
        }
        // Stops after the bound instead of reaching the text.
        assert!(unwrap(&c).conversation.is_none());
    }

    #[test]
    fn media_without_caption_gets_placeholder() {
        for (key, expected) in [
            ("imageMessage", "[imagem]"),
            ("videoMessage", "[video]"),
            ("audioMessage", "[audio]"),
            ("documentMessage", "[documento]"),
            ("stickerMessage", "[figurinha]"),
        ] {
            let c = parse(json!({ key: {"mimetype": "x/y"} }));
            assert_eq!(extract_text(&c).as_deref(), Some(expected), "{key}");
        }
    }

    #[test]
    fn interactive_replies() {
        let c = MessageContent {
            buttons_response_message: Some(ButtonsResponse {
                selected_display_text: Some("Sim".into()),
                selected_button_id: Some("yes".into()),
            }),
            ..Default::default()
        };
        assert_eq!(extract_text(&c).as_deref(), Some("Sim"));

        let c = MessageContent {
            list_response_message: Some(ListResponse {
                title: None,
                single_select_reply: Some(SingleSelectReply {
                    selected_row_id: Some("row-2".into()),
                }),
            }),
            ..Default::default()
        };
        assert_eq!(extract_text(&c).as_deref(), Some("row-2"));

        let c = parse(json!({"templateButtonReplyMessage": {"selectedId": "opt-1"}}));
        assert_eq!(extract_text(&c).as_deref(), Some("opt-1"));
    }

    #[test]
    fn unknown_kind_and_noise() {
        let c = parse(json!({"pollCreationMessage": {"name": "?"}}));
        assert_eq!(extract_text(&c).as_deref(), Some(UNKNOWN_PLACEHOLDER));

        let c = parse(json!({"protocolMessage": {"type": 0}}));
        assert_eq!(extract_text(&c), None);

        let c = parse(json!({"reactionMessage": {"text": "👍"}}));
        assert_eq!(extract_text(&c), None);

        let c = parse(json!({"senderKeyDistributionMessage": {}, "messageContextInfo": {}}));
        assert_eq!(extract_text(&c), None);

        assert_eq!(extract_text(&MessageContent::default()), None);
    }

    #[test]
    fn empty_mimetype_is_absent() {
        let c = parse(json!({"documentMessage": {"mimetype": " "}}));
        assert_eq!(classify_media(&c).unwrap().mimetype(), None);
    }
}
