//! Decision parsing — structured intent from unstructured model text.
//!
//! Three independent extractors are tried in a fixed order against the whole
//! reply; the first that produces a complete [`Decision`] wins and partial
//! matches are never merged:
//!
//! 1. **Tagged block** — `ACTION:` / `INPUT:` / `REASONING:` / `STATUS:`
//!    line markers with a JSON object after `INPUT:`
//! 2. **Structured payload** — the whole decision as one JSON object, bare,
//!    fenced, or embedded in prose
//! 3. **Loose block** — the same markers with `INPUT:` followed by
//!    `key: value` lines
//!
//! If none match, inference looks for a known capability name as a whole
//! word. If there is none either, the reply becomes the final answer, so an
//! unparsable reply always ends the loop instead of repeating it.

use regex_lite::Regex;
use std::sync::LazyLock;
use toolwright_core::capability::Input;
use toolwright_core::decision::{Decision, DecisionStatus};
use toolwright_core::error::ParseError;
use tracing::debug;

/// Default upper bound on reply length.
pub const DEFAULT_MAX_RESPONSE_CHARS: usize = 200_000;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*[*_#>\s]*(action|input|reasoning|thought|status|answer)[*_]*\s*:[*_]*\s?(.*)$")
        .expect("marker regex is valid")
});

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*]?\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*[:=]\s*(.*?)\s*$")
        .expect("key/value regex is valid")
});

/// Which encoding a decision was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionFormat {
    TaggedBlock,
    StructuredPayload,
    LooseBlock,
    Inferred,
    RawAnswer,
}

type Extractor = fn(&str) -> Option<Decision>;

const EXTRACTORS: [(DecisionFormat, Extractor); 3] = [
    (DecisionFormat::TaggedBlock, extract_tagged_block),
    (DecisionFormat::StructuredPayload, extract_structured_payload),
    (DecisionFormat::LooseBlock, extract_loose_block),
];

/// Turns raw model replies into decisions.
#[derive(Debug, Clone)]
pub struct DecisionParser {
    max_response_chars: usize,
}

impl DecisionParser {
    pub fn new(max_response_chars: usize) -> Self {
        Self { max_response_chars }
    }

    /// Parse a reply. Only an empty or oversized reply is an error; every
    /// other input yields a decision.
    pub fn parse(&self, raw: &str, known_actions: &[String]) -> Result<Decision, ParseError> {
        self.parse_with_format(raw, known_actions).map(|(d, _)| d)
    }

    /// Like [`parse`](Self::parse), also reporting which encoding matched.
    pub fn parse_with_format(
        &self,
        raw: &str,
        known_actions: &[String],
    ) -> Result<(Decision, DecisionFormat), ParseError> {
        if raw.trim().is_empty() {
            return Err(ParseError::EmptyResponse);
        }
        let length = raw.chars().count();
        if length > self.max_response_chars {
            return Err(ParseError::ResponseTooLarge {
                length,
                limit: self.max_response_chars,
            });
        }

        for (format, extract) in EXTRACTORS {
            if let Some(decision) = extract(raw) {
                debug!(?format, action = %decision.action, "Decision extracted");
                return Ok((decision, format));
            }
        }

        let (decision, format) = infer(raw, known_actions);
        debug!(?format, action = %decision.action, "Decision inferred");
        Ok((decision, format))
    }
}

impl Default for DecisionParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESPONSE_CHARS)
    }
}

// ── Marker blocks ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MarkedFields {
    action: Option<String>,
    input: Option<String>,
    reasoning: Option<String>,
    status: Option<String>,
    answer: Option<String>,
}

/// Split text into marker fields. A field runs until the next marker line;
/// the first occurrence of each marker wins.
fn marked_fields(text: &str) -> Option<MarkedFields> {
    let mut fields = MarkedFields::default();
    let mut current: Option<(String, String)> = None;
    let mut seen_any = false;

    for line in text.lines() {
        if let Some(caps) = MARKER.captures(line) {
            seen_any = true;
            if let Some((name, body)) = current.take() {
                fields.store(&name, body);
            }
            let name = caps[1].to_ascii_lowercase();
            let rest = caps.get(2).map_or("", |m| m.as_str()).to_string();
            current = Some((name, rest));
        } else if let Some((_, body)) = current.as_mut() {
            body.push('\n');
            body.push_str(line);
        }
    }
    if let Some((name, body)) = current {
        fields.store(&name, body);
    }

    seen_any.then_some(fields)
}

impl MarkedFields {
    fn store(&mut self, name: &str, body: String) {
        let slot = match name {
            "action" => &mut self.action,
            "input" => &mut self.input,
            "reasoning" | "thought" => &mut self.reasoning,
            "status" => &mut self.status,
            _ => &mut self.answer,
        };
        if slot.is_none() {
            *slot = Some(body.trim().to_string());
        }
    }
}

fn clean_action(raw: &str) -> String {
    raw.lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string()
}

/// Assemble a decision from marker fields and a decoded input map.
fn decision_from_fields(fields: &MarkedFields, mut input: Input) -> Option<Decision> {
    let action = fields.action.as_deref().map(clean_action).unwrap_or_default();
    let status = match fields.status.as_deref() {
        Some(word) => DecisionStatus::from_word(word.lines().next().unwrap_or("")),
        None if action.is_empty() => DecisionStatus::Final,
        None => DecisionStatus::Continue,
    };
    if action.is_empty() && status == DecisionStatus::Continue {
        return None;
    }
    if let Some(answer) = fields.answer.as_ref()
        && !input.contains_key("answer")
    {
        input.insert("answer".into(), serde_json::Value::String(answer.clone()));
    }
    if action.is_empty() && fields.answer.is_none() && fields.reasoning.is_none() {
        return None;
    }
    Some(Decision {
        action,
        input,
        reasoning: fields.reasoning.clone().unwrap_or_default(),
        status,
    })
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn extract_tagged_block(text: &str) -> Option<Decision> {
    let fields = marked_fields(text)?;
    let input = match fields.input.as_deref() {
        None => Input::new(),
        Some(body) if body.trim().is_empty() => Input::new(),
        Some(body) => match leading_json(strip_fences(body)) {
            Some(serde_json::Value::Object(map)) => map,
            _ => return None,
        },
    };
    decision_from_fields(&fields, input)
}

/// The JSON value at the start of `body`; anything after it is ignored.
fn leading_json(body: &str) -> Option<serde_json::Value> {
    serde_json::Deserializer::from_str(body)
        .into_iter::<serde_json::Value>()
        .next()?
        .ok()
}

fn extract_loose_block(text: &str) -> Option<Decision> {
    let fields = marked_fields(text)?;
    let input = fields
        .input
        .as_deref()
        .map(key_value_lines)
        .unwrap_or_default();
    decision_from_fields(&fields, input)
}

/// Decode `key: value` lines. Values that parse as JSON keep their JSON
/// type; everything else is a string.
fn key_value_lines(body: &str) -> Input {
    let mut input = Input::new();
    for line in body.lines() {
        let Some(caps) = KEY_VALUE.captures(line) else {
            continue;
        };
        let key = caps[1].to_string();
        if is_marker_word(&key) {
            continue;
        }
        let raw = caps.get(2).map_or("", |m| m.as_str());
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        input.entry(key).or_insert(value);
    }
    input
}

fn is_marker_word(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "action" | "input" | "reasoning" | "thought" | "status" | "answer"
    )
}

// ── Structured payload ────────────────────────────────────────────────────

/// Upper bound on the brace spans tried as JSON per reply.
const MAX_JSON_CANDIDATES: usize = 32;

/// Balanced `{ ... }` spans in `text`, outermost first, found in one pass.
/// Quotes are only tracked inside braces so stray prose quotes do not hide
/// later objects.
fn json_object_spans(text: &str) -> impl Iterator<Item = &str> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
        .into_iter()
        .take(MAX_JSON_CANDIDATES)
        .map(move |(start, end)| &text[start..=end])
}

fn decision_from_object(obj: &serde_json::Map<String, serde_json::Value>) -> Option<Decision> {
    if !obj.contains_key("action") && !obj.contains_key("status") {
        return None;
    }
    let action = match obj.get("action") {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(_) => return None,
    };
    let mut input = match obj.get("input") {
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(serde_json::Value::Null) | None => Input::new(),
        Some(_) => return None,
    };
    let reasoning = obj
        .get("reasoning")
        .or_else(|| obj.get("thought"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let status = match obj.get("status").and_then(|v| v.as_str()) {
        Some(word) => DecisionStatus::from_word(word),
        None if action.is_empty() => DecisionStatus::Final,
        None => DecisionStatus::Continue,
    };
    if action.is_empty() && status == DecisionStatus::Continue {
        return None;
    }
    if let Some(answer) = obj.get("answer").and_then(|v| v.as_str())
        && !input.contains_key("answer")
    {
        input.insert("answer".into(), serde_json::Value::String(answer.to_string()));
    }
    Some(Decision {
        action,
        input,
        reasoning,
        status,
    })
}

fn extract_structured_payload(text: &str) -> Option<Decision> {
    let whole = strip_fences(text);
    if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(whole)
        && let Some(decision) = decision_from_object(&obj)
    {
        return Some(decision);
    }
    json_object_spans(text).find_map(|span| match serde_json::from_str(span) {
        Ok(serde_json::Value::Object(obj)) => decision_from_object(&obj),
        _ => None,
    })
}

// ── Inference fallback ────────────────────────────────────────────────────

/// Byte offset of the first whole-word occurrence of `word` in `text`.
fn find_whole_word(text: &str, word: &str) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    let is_word_char = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before = text[..i].chars().next_back();
        let after = text[i + word.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

fn infer(raw: &str, known_actions: &[String]) -> (Decision, DecisionFormat) {
    let found = known_actions
        .iter()
        .filter_map(|name| find_whole_word(raw, name).map(|at| (at, name)))
        // earliest mention wins; longer name breaks ties
        .min_by(|a, b| a.0.cmp(&b.0).then(b.1.len().cmp(&a.1.len())));

    match found {
        Some((_, name)) => {
            let input = json_object_spans(raw)
                .find_map(|span| match serde_json::from_str(span) {
                    Ok(serde_json::Value::Object(map)) => Some(map),
                    _ => None,
                })
                .unwrap_or_else(|| key_value_lines(raw));
            (
                Decision {
                    action: name.clone(),
                    input,
                    reasoning: raw.trim().to_string(),
                    status: DecisionStatus::Continue,
                },
                DecisionFormat::Inferred,
            )
        }
        None => (
            Decision::final_answer(raw.trim()),
            DecisionFormat::RawAnswer,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn known() -> Vec<String> {
        vec!["list_files".into(), "read_file".into(), "write_file".into()]
    }

    fn parse(text: &str) -> (Decision, DecisionFormat) {
        DecisionParser::default()
            .parse_with_format(text, &known())
            .unwrap()
    }

    #[test]
    fn tagged_block_with_json_input() {
        let (d, format) = parse(
            "ACTION: list_files\nINPUT: {\"directory\": \".\"}\nREASONING: need a listing\nSTATUS: continue",
        );
        assert_eq!(format, DecisionFormat::TaggedBlock);
        assert_eq!(d.action, "list_files");
        assert_eq!(d.input["directory"], json!("."));
        assert_eq!(d.reasoning, "need a listing");
        assert_eq!(d.status, DecisionStatus::Continue);
    }

    #[test]
    fn tagged_block_multiline_fenced_input() {
        let text = "Thought: write it\nAction: write_file\nInput:\n```json\n{\n  \"path\": \"a.txt\",\n  \"content\": \"hi\"\n}\n```\nStatus: continue";
        let (d, format) = parse(text);
        assert_eq!(format, DecisionFormat::TaggedBlock);
        assert_eq!(d.action, "write_file");
        assert_eq!(d.input["path"], "a.txt");
        assert_eq!(d.reasoning, "write it");
    }

    #[test]
    fn structured_payload_bare_and_embedded() {
        let (d, format) = parse(
            r#"{"action": "read_file", "input": {"path": "x"}, "reasoning": "look", "status": "continue"}"#,
        );
        assert_eq!(format, DecisionFormat::StructuredPayload);
        assert_eq!(d.action, "read_file");

        let (d, format) = parse(
            "Sure, here is my decision:\n```json\n{\"action\": \"read_file\", \"input\": {\"path\": \"{not a brace}\"}}\n```\nThanks!",
        );
        assert_eq!(format, DecisionFormat::StructuredPayload);
        assert_eq!(d.input["path"], "{not a brace}");
        assert_eq!(d.status, DecisionStatus::Continue);
    }

    #[test]
    fn loose_block_key_value_input() {
        let (d, format) = parse(
            "ACTION: write_file\nINPUT:\n  path: notes.txt\n  content: hello there\n  count: 3\nSTATUS: continue",
        );
        assert_eq!(format, DecisionFormat::LooseBlock);
        assert_eq!(d.input["path"], "notes.txt");
        assert_eq!(d.input["content"], "hello there");
        assert_eq!(d.input["count"], json!(3));
    }

    #[test]
    fn three_encodings_parse_identically() {
        let tagged = "ACTION: list_files\nINPUT: {\"directory\": \"src\"}\nREASONING: inspect sources\nSTATUS: continue";
        let payload = r#"{"action": "list_files", "input": {"directory": "src"}, "reasoning": "inspect sources", "status": "continue"}"#;
        let loose = "ACTION: list_files\nINPUT:\n  directory: src\nREASONING: inspect sources\nSTATUS: continue";

        let (a, fa) = parse(tagged);
        let (b, fb) = parse(payload);
        let (c, fc) = parse(loose);
        assert_eq!(fa, DecisionFormat::TaggedBlock);
        assert_eq!(fb, DecisionFormat::StructuredPayload);
        assert_eq!(fc, DecisionFormat::LooseBlock);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn final_status_with_answer() {
        let (d, _) = parse("STATUS: final\nANSWER: There are 3 files.\nREASONING: listed them");
        assert!(d.is_final());
        assert_eq!(d.answer(), "There are 3 files.");

        let (d, _) = parse(r#"{"status": "done", "reasoning": "All finished."}"#);
        assert!(d.is_final());
        assert_eq!(d.answer(), "All finished.");
    }

    #[test]
    fn inference_finds_known_action_as_whole_word() {
        let (d, format) = parse("I think I should call read_file on {\"path\": \"Cargo.toml\"} next.");
        assert_eq!(format, DecisionFormat::Inferred);
        assert_eq!(d.action, "read_file");
        assert_eq!(d.input["path"], "Cargo.toml");
        assert_eq!(d.status, DecisionStatus::Continue);
    }

    #[test]
    fn inference_ignores_partial_words() {
        let (d, format) = parse("The unread_files counter is zero, so nothing to do.");
        assert_eq!(format, DecisionFormat::RawAnswer);
        assert!(d.is_final());
    }

    #[test]
    fn unrecognized_text_becomes_final_answer() {
        let text = "  The capital of France is Paris.  ";
        let (d, format) = parse(text);
        assert_eq!(format, DecisionFormat::RawAnswer);
        assert!(d.is_final());
        assert_eq!(d.answer(), "The capital of France is Paris.");
    }

    #[test]
    fn marker_without_action_or_final_falls_through() {
        let (d, format) = parse("STATUS: continue\nnothing else here");
        assert_eq!(format, DecisionFormat::RawAnswer);
        assert!(d.is_final());
    }

    #[test]
    fn empty_reply_is_fatal() {
        let err = DecisionParser::default().parse("   \n", &known()).unwrap_err();
        assert_eq!(err, ParseError::EmptyResponse);
    }

    #[test]
    fn oversized_reply_is_fatal() {
        let err = DecisionParser::new(10)
            .parse("this reply is far too long", &known())
            .unwrap_err();
        assert!(matches!(err, ParseError::ResponseTooLarge { limit: 10, .. }));
    }

    #[test]
    fn tagged_input_followed_by_prose_keeps_its_parameters() {
        let (d, format) = parse(
            "ACTION: write_file\nINPUT: {\"path\": \"a.txt\", \"content\": \"hi\"}\nI will write the file now.",
        );
        assert_eq!(format, DecisionFormat::TaggedBlock);
        assert_eq!(d.action, "write_file");
        assert_eq!(d.input["path"], "a.txt");
        assert_eq!(d.input["content"], "hi");
    }

    #[test]
    fn brace_scan_skips_unclosed_and_stray_braces() {
        let text = "Note: a } stray and { unclosed. {\"action\": \"read_file\", \"input\": {\"path\": \"}\"}} done";
        let spans: Vec<&str> = json_object_spans(text).collect();
        assert_eq!(
            spans,
            [
                "{\"action\": \"read_file\", \"input\": {\"path\": \"}\"}}",
                "{\"path\": \"}\"}",
            ]
        );
        let (d, format) = parse(text);
        assert_eq!(format, DecisionFormat::StructuredPayload);
        assert_eq!(d.input["path"], "}");
    }

    #[test]
    fn pathological_braces_parse_quickly() {
        let started = std::time::Instant::now();
        let open_only = "{".repeat(DEFAULT_MAX_RESPONSE_CHARS);
        let (_, format) = parse(&open_only);
        assert_eq!(format, DecisionFormat::RawAnswer);

        let half = DEFAULT_MAX_RESPONSE_CHARS / 2;
        let nested = format!("{}{}", "{".repeat(half), "}".repeat(half));
        assert_eq!(json_object_spans(&nested).count(), MAX_JSON_CANDIDATES);
        let (_, format) = parse(&nested);
        assert_eq!(format, DecisionFormat::RawAnswer);

        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[test]
    fn whole_word_search_respects_boundaries() {
        assert_eq!(find_whole_word("call list_files now", "list_files"), Some(5));
        assert_eq!(find_whole_word("mylist_files", "list_files"), None);
        assert_eq!(find_whole_word("list_files_v2", "list_files"), None);
        assert_eq!(find_whole_word("(list_files)", "list_files"), Some(1));
    }
}
