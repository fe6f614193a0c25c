//! Prompt templates and input shaping.

/// Which kind of content is being summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Speech transcript of a video or audio track.
    Video,
    /// Body text of an image-text post.
    ImageText,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::ImageText => "image_text",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Video => "Video transcript",
            Self::ImageText => "Post content",
        }
    }
}

const OUTPUT_SHAPE: &str = r#"Respond with a single JSON object and nothing else:
{
  "summary": "detailed summary, 100-500 words",
  "key_points": ["point 1", "point 2", "point 3", "point 4", "point 5"],
  "tags": ["tag 1", "tag 2", "tag 3"],
  "category": "short category name",
  "sentiment": "positive | negative | neutral",
  "language": "zh | en | mixed"
}"#;

const VIDEO_SYSTEM: &str = "You are a professional video content analyst. \
You receive the transcript of a video and summarize it.";

const VIDEO_RULES: &str = "Rules:
- summary covers the core content and the conclusions of the video
- key_points lists the 5 most important points
- tags are derived from the content
- category is a short label in the content's language
- write in the same language as the transcript";

const IMAGE_TEXT_SYSTEM: &str = "You are a professional social media content analyst. \
You receive the text of an image-text post and summarize it.";

const IMAGE_TEXT_RULES: &str = "Rules:
- summary covers the core content and the author's opinion
- key_points lists the 5 most important points
- tags are derived from the content
- category is a short label in the content's language
- write in the same language as the post";

/// System prompt for a content kind.
pub fn system_prompt(kind: ContentKind) -> String {
    let (intro, rules) = match kind {
        ContentKind::Video => (VIDEO_SYSTEM, VIDEO_RULES),
        ContentKind::ImageText => (IMAGE_TEXT_SYSTEM, IMAGE_TEXT_RULES),
    };
    format!("{intro}\n\n{OUTPUT_SHAPE}\n\n{rules}")
}

/// User prompt wrapping the (already truncated) text.
pub fn user_prompt(kind: ContentKind, title: &str, text: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        format!("{}:\n\n{text}", kind.label())
    } else {
        format!("Title: {title}\n\n{}:\n\n{text}", kind.label())
    }
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
/// Counts chars, never splits a UTF-8 sequence.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
    }
}
