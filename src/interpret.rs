//! Reshaping the upstream reply into the interpretation returned to callers

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An ECG interpretation. Whatever JSON the model produced is passed through
/// verbatim; free text is wrapped into a `Report` with only a summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Interpretation {
    Model(Value),
    Text(Report),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub structured: Structured,
    #[serde(default)]
    pub red_flags: Vec<String>,
}

/// The clinical fields the model is asked to fill in. Values are kept as
/// raw JSON since models disagree on whether `rate_bpm` is `72` or `"72"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structured {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_bpm: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervals: Option<Intervals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub st_changes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_wave: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypertrophy: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct Intervals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub PR_ms: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub QRS_ms: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub QTc_ms: Option<Value>,
}

impl Report {
    /// A report carrying nothing but `text` as its summary
    pub fn summary_only(text: &str) -> Self {
        Report {
            summary: text.to_string(),
            ..Default::default()
        }
    }
}

impl Interpretation {
    /// Typed view of the interpretation, if it has the shape the model was
    /// asked for. Nothing is validated against it.
    pub fn report(&self) -> Option<Report> {
        match self {
            Interpretation::Text(report) => Some(report.clone()),
            Interpretation::Model(value @ Value::Object(_)) => {
                serde_json::from_value(value.clone()).ok()
            }
            Interpretation::Model(_) => None,
        }
    }
}

/// JavaScript truthiness, which decides what counts as a usable reply
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// The model's text output, or the whole reply serialized when the reply
/// carries no truthy `output_text`. Non-string outputs are rendered as JSON.
pub fn output_text(reply: &Value) -> String {
    match reply.get("output_text") {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(other) if truthy(other) => other.to_string(),
        _ => reply.to_string(),
    }
}

/// Pick the interpretation out of the model's text. In order: the
/// `interpretation` field of the parsed JSON, the parsed JSON itself, or the
/// raw text as a summary. Falsy values at either step are skipped.
pub fn normalize(text: &str) -> Interpretation {
    let parsed = match serde_json::from_str::<Value>(text) {
        Ok(parsed) if truthy(&parsed) => parsed,
        _ => return Interpretation::Text(Report::summary_only(text)),
    };

    match parsed.get("interpretation") {
        Some(inner) if truthy(inner) => Interpretation::Model(inner.clone()),
        _ => Interpretation::Model(parsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_interpretation_passes_through_exactly() {
        let inner = json!({
            "summary": "Sinus rhythm",
            "structured": { "rate_bpm": 72, "extra": "kept" },
            "red_flags": []
        });
        let text = json!({ "interpretation": inner }).to_string();
        assert_eq!(normalize(&text), Interpretation::Model(inner));
    }

    #[test]
    fn json_without_interpretation_is_used_whole() {
        let value = json!({ "summary": "Atrial fibrillation", "red_flags": ["AF"] });
        assert_eq!(normalize(&value.to_string()), Interpretation::Model(value));
    }

    #[test]
    fn plain_text_becomes_a_summary() {
        let interpretation = normalize("abnormal Q waves");
        assert_eq!(
            serde_json::to_value(&interpretation).unwrap(),
            json!({ "summary": "abnormal Q waves", "structured": {}, "red_flags": [] })
        );
    }

    #[test]
    fn falsy_interpretation_falls_back_to_whole_object() {
        for falsy in [json!(0), json!(false), json!(null), json!("")] {
            let value = json!({ "interpretation": falsy, "summary": "s" });
            assert_eq!(normalize(&value.to_string()), Interpretation::Model(value));
        }
    }

    #[test]
    fn falsy_json_falls_back_to_text() {
        for text in ["null", "0", "false", "\"\""] {
            assert_eq!(
                normalize(text),
                Interpretation::Text(Report::summary_only(text))
            );
        }
    }

    #[test]
    fn truthy_scalars_pass_through() {
        assert_eq!(normalize("\"normal ECG\""), Interpretation::Model(json!("normal ECG")));
        assert_eq!(normalize("[1]"), Interpretation::Model(json!([1])));
    }

    #[test]
    fn output_text_prefers_the_text_field() {
        let reply = json!({ "id": "resp_1", "output_text": "{\"summary\":\"ok\"}" });
        assert_eq!(output_text(&reply), "{\"summary\":\"ok\"}");
    }

    #[test]
    fn output_text_falls_back_to_whole_reply() {
        let reply = json!({ "id": "resp_1", "output": [] });
        assert_eq!(output_text(&reply), reply.to_string());

        let empty = json!({ "output_text": "" });
        assert_eq!(output_text(&empty), empty.to_string());

        let zero = json!({ "output_text": 0 });
        assert_eq!(output_text(&zero), zero.to_string());
    }

    #[test]
    fn truthy_non_string_output_text_wins() {
        let reply = json!({ "id": "r", "output_text": 5 });
        assert_eq!(output_text(&reply), "5");
        assert_eq!(normalize(&output_text(&reply)), Interpretation::Model(json!(5)));
    }

    #[test]
    fn report_view_reads_structured_fields() {
        let interpretation = normalize(
            &json!({
                "interpretation": {
                    "summary": "Anterior STEMI",
                    "structured": { "rhythm": "sinus", "intervals": { "QTc_ms": 460 } },
                    "red_flags": ["STE V1-V4"]
                }
            })
            .to_string(),
        );

        let report = interpretation.report().unwrap();
        assert_eq!(report.summary, "Anterior STEMI");
        assert_eq!(report.structured.rhythm, Some(json!("sinus")));
        assert_eq!(report.structured.intervals.unwrap().QTc_ms, Some(json!(460)));
        assert_eq!(report.red_flags, vec!["STE V1-V4".to_string()]);
    }

    #[test]
    fn report_view_is_absent_for_scalars() {
        assert!(Interpretation::Model(json!("text")).report().is_none());
    }
}
