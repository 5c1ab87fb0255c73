//! Parsing of the agent's structured output stream.
//!
//! The agent may emit its events either as one JSON array or as one JSON
//! object per line. Both shapes reduce to a finite sequence of records in
//! which the terminal `result` record comes last.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const RESULT_TYPE: &str = "result";

/// The terminal record of an agent run.
///
/// Fields missing from the record take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalResult {
    #[serde(rename = "type")]
    pub record_type: String,
    pub subtype: Option<String>,
    pub is_error: bool,
    pub result: Option<String>,
    pub total_cost_usd: Option<f64>,
    pub num_turns: Option<u32>,
    pub session_id: Option<String>,
    pub duration_ms: Option<u64>,
}

/// A classified event from the agent's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A line that is not a recognized event.
    Text(String),
    /// A tool invocation other than a file read or write.
    ToolCall { tool: String, args: String },
    /// A file was read.
    FileRead(PathBuf),
    /// A file was created or modified.
    FileWrite(PathBuf),
    /// The terminal result record.
    Result(TerminalResult),
}

/// Recovers the terminal result from captured agent output.
///
/// Returns `None` when no record with `"type": "result"` is present; the
/// process exit code then stands as the only outcome signal.
pub fn parse_terminal_result(output: &str) -> Option<TerminalResult> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('[') {
        if let Ok(Value::Array(records)) = serde_json::from_str::<Value>(trimmed) {
            return last_result(records);
        }
    }

    for line in trimmed.lines().rev() {
        let line = line.trim();
        if line.is_empty() || !line.contains("\"type\"") {
            continue;
        }

        let found = match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(records)) => last_result(records),
            Ok(record) if is_result(&record) => to_terminal(record),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }

    None
}

/// Scans records from the end for the terminal result.
fn last_result(records: Vec<Value>) -> Option<TerminalResult> {
    records
        .into_iter()
        .rev()
        .find(is_result)
        .and_then(to_terminal)
}

fn is_result(record: &Value) -> bool {
    record.get("type").and_then(Value::as_str) == Some(RESULT_TYPE)
}

fn to_terminal(record: Value) -> Option<TerminalResult> {
    match serde_json::from_value(record) {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::debug!(error = %e, "result record has unexpected field types");
            None
        }
    }
}

/// Classifies one line of stream output for progress logging.
pub fn classify_line(line: &str) -> AgentEvent {
    let json = match serde_json::from_str::<Value>(line) {
        Ok(json) => json,
        Err(_) => return AgentEvent::Text(line.to_string()),
    };

    match json.get("type").and_then(Value::as_str) {
        Some("assistant") => {
            let content = json
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array);

            if let Some(tool_use) = content.and_then(|items| {
                items
                    .iter()
                    .find(|i| i.get("type").and_then(Value::as_str) == Some("tool_use"))
            }) {
                return classify_tool_use(tool_use);
            }
        }
        Some("user") => {
            if let Some(result) = json.get("tool_use_result") {
                let kind = result.get("type").and_then(Value::as_str).unwrap_or("");
                if let Some(path) = result.get("filePath").and_then(Value::as_str) {
                    match kind {
                        "create" | "update" => return AgentEvent::FileWrite(path.into()),
                        "read" => return AgentEvent::FileRead(path.into()),
                        _ => {}
                    }
                }
            }
        }
        Some(RESULT_TYPE) => {
            if let Some(result) = to_terminal(json) {
                return AgentEvent::Result(result);
            }
            return AgentEvent::Text(line.to_string());
        }
        _ => {}
    }

    AgentEvent::Text(line.to_string())
}

fn classify_tool_use(item: &Value) -> AgentEvent {
    let tool = item
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let Some(input) = item.get("input") else {
        return AgentEvent::ToolCall {
            tool,
            args: String::new(),
        };
    };

    let file_path = input.get("file_path").and_then(Value::as_str);
    match (tool.as_str(), file_path) {
        ("Read", Some(path)) => AgentEvent::FileRead(path.into()),
        ("Write" | "Edit" | "NotebookEdit", Some(path)) => AgentEvent::FileWrite(path.into()),
        _ => AgentEvent::ToolCall {
            tool,
            args: input.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT: &str = r#"{"type":"result","subtype":"success","is_error":false,"result":"Done","total_cost_usd":1.25,"num_turns":42,"session_id":"sess-1","duration_ms":90000}"#;

    fn expected() -> TerminalResult {
        TerminalResult {
            record_type: "result".to_string(),
            subtype: Some("success".to_string()),
            is_error: false,
            result: Some("Done".to_string()),
            total_cost_usd: Some(1.25),
            num_turns: Some(42),
            session_id: Some("sess-1".to_string()),
            duration_ms: Some(90000),
        }
    }

    #[test]
    fn parses_array_shape() {
        let output = format!(
            r#"[{{"type":"system","subtype":"init"}},{{"type":"assistant","message":{{}}}},{}]"#,
            RESULT
        );
        assert_eq!(parse_terminal_result(&output), Some(expected()));
    }

    #[test]
    fn parses_line_delimited_shape_identically() {
        let output = format!(
            "{{\"type\":\"system\",\"subtype\":\"init\"}}\n{{\"type\":\"assistant\"}}\n{}\n\n",
            RESULT
        );
        assert_eq!(parse_terminal_result(&output), Some(expected()));
    }

    #[test]
    fn array_scan_takes_last_result() {
        let output = r#"[{"type":"result","result":"first"},{"type":"result","result":"second"}]"#;
        assert_eq!(
            parse_terminal_result(output).unwrap().result.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn line_scan_skips_noise_and_broken_lines() {
        let output = format!(
            "{}\nnot json at all\n{{\"type\": \"result\" broken\n   \n",
            RESULT
        );
        assert_eq!(parse_terminal_result(&output), Some(expected()));
    }

    #[test]
    fn single_line_array_is_scanned() {
        let output = format!(
            "{{\"type\":\"system\"}}\n[{{\"type\":\"assistant\"}},{}]\n",
            RESULT
        );
        assert_eq!(parse_terminal_result(&output), Some(expected()));
    }

    #[test]
    fn malformed_array_falls_back_to_lines() {
        let output = format!("[{{\"type\":\"system\"}}\n{}\n", RESULT);
        assert_eq!(parse_terminal_result(&output), Some(expected()));
    }

    #[test]
    fn missing_result_is_none() {
        assert_eq!(parse_terminal_result(""), None);
        assert_eq!(parse_terminal_result("plain text\nmore"), None);
        assert_eq!(
            parse_terminal_result(r#"[{"type":"system"},{"type":"assistant"}]"#),
            None
        );
        assert_eq!(parse_terminal_result("{\"type\":\"assistant\"}\n"), None);
    }

    #[test]
    fn missing_fields_default() {
        let parsed = parse_terminal_result(r#"{"type":"result"}"#).unwrap();
        assert!(!parsed.is_error);
        assert_eq!(parsed.result, None);
        assert_eq!(parsed.num_turns, None);
    }

    #[test]
    fn error_result_is_reported() {
        let parsed =
            parse_terminal_result(r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#)
                .unwrap();
        assert!(parsed.is_error);
        assert_eq!(parsed.subtype.as_deref(), Some("error_max_turns"));
    }

    #[test]
    fn classifies_non_json_as_text() {
        assert!(matches!(classify_line("hello"), AgentEvent::Text(_)));
    }

    #[test]
    fn classifies_file_tools() {
        let read = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read","input":{"file_path":"/src/index.ts"}}]}}"#;
        assert_eq!(classify_line(read), AgentEvent::FileRead("/src/index.ts".into()));

        let edit = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"ok"},{"type":"tool_use","name":"Edit","input":{"file_path":"/src/app.ts"}}]}}"#;
        assert_eq!(classify_line(edit), AgentEvent::FileWrite("/src/app.ts".into()));

        let created = r#"{"type":"user","tool_use_result":{"type":"create","filePath":"/src/health.ts"}}"#;
        assert_eq!(
            classify_line(created),
            AgentEvent::FileWrite("/src/health.ts".into())
        );
    }

    #[test]
    fn classifies_other_tools_as_calls() {
        let bash = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Skill","input":{"skill":"resolve-linear-issue"}}]}}"#;
        match classify_line(bash) {
            AgentEvent::ToolCall { tool, args } => {
                assert_eq!(tool, "Skill");
                assert!(args.contains("resolve-linear-issue"));
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn classifies_result_record() {
        assert_eq!(classify_line(RESULT), AgentEvent::Result(expected()));
    }
}
