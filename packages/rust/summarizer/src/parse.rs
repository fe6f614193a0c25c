//! Lenient parsing of model output into a [`SummaryPayload`].

use serde_json::Value;
use vidkb_shared::{Result, Sentiment, SummaryPayload, VidkbError};

/// Separators accepted when a list field arrives as one string.
const LIST_SEPARATORS: &[char] = &[',', '，', '、', ';', '；', '\n'];

/// Return the outermost `{...}` span, tolerating code fences and prose around it.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn list_field(obj: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    let items: Vec<String> = match obj.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => s.split(LIST_SEPARATORS).map(String::from).collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|s| s.trim().trim_start_matches(['-', '•', '*']).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse the `response` text of a generate call.
///
/// Fails with a summarization error carrying `raw` when no JSON object can be
/// found, when it is not an object, or when `summary` is missing or empty.
pub fn parse_summary(raw: &str, model: &str) -> Result<SummaryPayload> {
    let json = extract_json_object(raw)
        .ok_or_else(|| VidkbError::malformed_summary("model output contains no JSON object", raw))?;

    let value: Value = serde_json::from_str(json)
        .map_err(|e| VidkbError::malformed_summary(format!("model output is not valid JSON: {e}"), raw))?;
    let Value::Object(obj) = value else {
        return Err(VidkbError::malformed_summary("model output is not a JSON object", raw));
    };

    let summary = string_field(&obj, "summary")
        .ok_or_else(|| VidkbError::malformed_summary("model output has an empty summary", raw))?;

    Ok(SummaryPayload {
        summary,
        key_points: list_field(&obj, "key_points"),
        tags: list_field(&obj, "tags"),
        category: string_field(&obj, "category").unwrap_or_default(),
        sentiment: string_field(&obj, "sentiment")
            .map(|s| Sentiment::parse_lenient(&s))
            .unwrap_or_default(),
        language: string_field(&obj, "language"),
        model: model.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "qwen2.5:7b-instruct-q4_K_M";

    #[test]
    fn parses_clean_object() {
        let raw = r#"{"summary":"讲解机器学习入门路线","key_points":["监督学习","无监督学习"],
            "tags":["机器学习","Python"],"category":"教育","sentiment":"positive","language":"zh"}"#;
        let s = parse_summary(raw, MODEL).unwrap();
        assert_eq!(s.summary, "讲解机器学习入门路线");
        assert_eq!(s.key_points.len(), 2);
        assert_eq!(s.tags, vec!["机器学习", "Python"]);
        assert_eq!(s.category, "教育");
        assert_eq!(s.sentiment, Sentiment::Positive);
        assert_eq!(s.language.as_deref(), Some("zh"));
        assert_eq!(s.model, MODEL);
    }

    #[test]
    fn tolerates_fences_and_prose() {
        let raw = "Sure! Here you go:\n```json\n{\"summary\": \"ok\"}\n```\nHope it helps.";
        let s = parse_summary(raw, MODEL).unwrap();
        assert_eq!(s.summary, "ok");
        assert!(s.tags.is_empty());
        assert_eq!(s.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn splits_string_lists() {
        let raw = r#"{"summary":"x","tags":"rust, 系统编程，cli","key_points":"- one\n- two"}"#;
        let s = parse_summary(raw, MODEL).unwrap();
        assert_eq!(s.tags, vec!["rust", "系统编程", "cli"]);
        assert_eq!(s.key_points, vec!["one", "two"]);
    }

    #[test]
    fn rejects_non_json_with_raw() {
        let raw = "I'm sorry, I can't summarize this.";
        match parse_summary(raw, MODEL).unwrap_err() {
            VidkbError::Summarization { raw_response, .. } => {
                assert_eq!(raw_response.as_deref(), Some(raw));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_summary() {
        let err = parse_summary(r#"{"summary": "  ", "tags": ["a"]}"#, MODEL).unwrap_err();
        assert!(err.to_string().contains("empty summary"));
    }

    #[test]
    fn rejects_broken_json() {
        assert!(parse_summary(r#"{"summary": "unterminated}"#, MODEL).is_err());
    }
}
