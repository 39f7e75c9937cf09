//! Neutral chat message representation shared across every provider adapter.

use serde::{Deserialize, Serialize};

/// Speaker role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Image media types accepted by vision-capable providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMediaType {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageMediaType {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageMediaType::Png => "image/png",
            ImageMediaType::Jpeg => "image/jpeg",
            ImageMediaType::Gif => "image/gif",
            ImageMediaType::Webp => "image/webp",
        }
    }
}

/// A base64-encoded image payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePart {
    pub media_type: ImageMediaType,
    /// Base64-encoded image bytes (no data URL prefix).
    pub data: String,
}

/// One element of a multi-part message. Ordering within the sequence is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { image: ImagePart },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(media_type: ImageMediaType, data: impl Into<String>) -> Self {
        ContentPart::Image {
            image: ImagePart {
                media_type,
                data: data.into(),
            },
        }
    }
}

/// Message content: either a plain string or an ordered sequence of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text across every text part (images contribute nothing).
    pub fn text_len(&self) -> usize {
        match self {
            MessageContent::Text(s) => s.len(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::Image { .. } => 0,
                })
                .sum(),
        }
    }

    /// All text fragments joined with a single space, used by the complexity heuristic
    /// and by adapters that must flatten parts into a plain string for a text-only wire call.
    pub fn as_flat_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn images(&self) -> Vec<&ImagePart> {
        match self {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Image { image } => Some(image),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_text_skips_images() {
        let msg = Message::user_with_parts(vec![
            ContentPart::text("describe this"),
            ContentPart::image(ImageMediaType::Png, "Zm9v"),
        ]);
        assert_eq!(msg.content.as_flat_text(), "describe this");
        assert_eq!(msg.content.images().len(), 1);
    }

    #[test]
    fn text_len_counts_only_text_parts() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("hi"),
            ContentPart::image(ImageMediaType::Jpeg, "data"),
        ]);
        assert_eq!(content.text_len(), 2);
    }
}
