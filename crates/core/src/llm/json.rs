use crate::domain::contract::LlmRecommendation;
use anyhow::Context;

/// Locates the first balanced `{ … }` span in model output.
///
/// Braces inside JSON strings are ignored, so prose after the object (which may itself
/// contain braces) does not extend the span.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_object(text: &str) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    let span = extract_json(text).context("no JSON object found in LLM output")?;
    match serde_json::from_str::<serde_json::Value>(span)
        .with_context(|| format!("LLM output is not valid JSON: {span}"))?
    {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("LLM output JSON is not an object: {other}"),
    }
}

pub fn parse_recommendation(text: &str) -> anyhow::Result<LlmRecommendation> {
    let map = parse_object(text)?;
    serde_json::from_value::<LlmRecommendation>(serde_json::Value::Object(map))
        .context("LLM output does not match the recommendation schema")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let fenced = "```json\n{\"a\":1}\n```\n";
        assert_eq!(extract_json(fenced), Some("{\"a\":1}"));
    }

    #[test]
    fn extract_json_stops_at_first_balanced_object() {
        let s = "结论如下 {\"a\":{\"b\":2}} 另附 {\"c\":3}";
        assert_eq!(extract_json(s), Some("{\"a\":{\"b\":2}}"));
    }

    #[test]
    fn extract_json_ignores_braces_in_strings() {
        let s = r#"{"reasoning":"突破{箱体}上沿","confidence":70}"#;
        assert_eq!(extract_json(s), Some(s));
    }

    #[test]
    fn extract_json_rejects_unbalanced() {
        assert_eq!(extract_json("prefix {\"a\":1"), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn parse_recommendation_accepts_prose_wrapped_object() {
        let body = json!({
            "code": "600519",
            "category": "quantitative",
            "confidence": 81,
            "target_price": 1800.0,
            "holding_period": "medium",
            "reasoning": "ROE 稳定在 30% 以上",
            "quant_signal": {"score": 77, "factors": ["roe", "cashflow"]}
        });
        let text = format!("好的，以下是分析结果：\n{body}\n仅供参考。");
        let parsed = parse_recommendation(&text).unwrap();
        assert_eq!(parsed.confidence, 81.0);
        assert_eq!(parsed.quant_signal.unwrap().factors.len(), 2);
    }

    #[test]
    fn parse_recommendation_rejects_schema_violations() {
        assert!(parse_recommendation("{\"code\": \"600519\"}").is_err());
        assert!(parse_recommendation("{not json}").is_err());
        assert!(parse_recommendation("抱歉，我无法给出建议。").is_err());
    }
}
