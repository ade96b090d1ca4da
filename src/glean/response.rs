//! Extraction of answer text and source URLs from a chat response body.
//!
//! Each extractor is independent and tolerant: a missing key, or a value of
//! the wrong type, at any depth is treated as absent.

use serde_json::Value;
use tracing::{debug, error};

/// Marker the chat API puts in the fragment that introduces documents it read.
pub const READING_MARKER: &str = "**Reading:**";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerResponse {
    pub answer: Option<String>,
    pub research: Vec<String>,
    pub citations: Vec<String>,
}

impl AnswerResponse {
    pub fn from_body(body: &str) -> Self {
        Self {
            answer: parse_answer(body),
            research: parse_research(body),
            citations: parse_citations(body),
        }
    }
}

fn parse_body(body: &str, what: &str) -> Option<Value> {
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Failed to parse response body for {}: {}", what, e);
            None
        }
    }
}

fn messages(response: &Value) -> impl Iterator<Item = &Value> {
    array_at(response, "messages")
}

fn array_at<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn fragment_text(fragment: &Value) -> Option<&str> {
    fragment.get("text").and_then(Value::as_str)
}

fn nested_url<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.get("url")?.as_str()
}

pub fn parse_answer(body: &str) -> Option<String> {
    extract_answer(&parse_body(body, "answer")?)
}

pub fn parse_citations(body: &str) -> Vec<String> {
    parse_body(body, "citations")
        .map(|value| extract_citations(&value))
        .unwrap_or_default()
}

pub fn parse_research(body: &str) -> Vec<String> {
    parse_body(body, "research")
        .map(|value| extract_research(&value))
        .unwrap_or_default()
}

/// Text of the last fragment carrying one. The API sends partial fragments
/// before the final one, so later text replaces earlier text.
pub fn extract_answer(response: &Value) -> Option<String> {
    let mut answer = None;
    for message in messages(response) {
        for fragment in array_at(message, "fragments") {
            if let Some(text) = fragment_text(fragment) {
                debug!("Found answer fragment: {}", text);
                answer = Some(text.to_string());
            }
        }
    }
    answer
}

/// `sourceDocument.url` of every citation, in encounter order, duplicates kept.
pub fn extract_citations(response: &Value) -> Vec<String> {
    messages(response)
        .flat_map(|message| array_at(message, "citations"))
        .filter_map(|citation| nested_url(citation, "sourceDocument"))
        .map(str::to_string)
        .collect()
}

/// Document URLs from `structuredResults` of fragments at or after the
/// reading marker. Once the marker is seen it stays in effect for the rest
/// of that message.
pub fn extract_research(response: &Value) -> Vec<String> {
    let mut urls = Vec::new();
    for message in messages(response) {
        let mut reading = false;
        for fragment in array_at(message, "fragments") {
            if fragment_text(fragment).is_some_and(|text| text.contains(READING_MARKER)) {
                reading = true;
            }
            if !reading {
                continue;
            }
            urls.extend(
                array_at(fragment, "structuredResults")
                    .filter_map(|result| nested_url(result, "document"))
                    .map(str::to_string),
            );
        }
    }
    urls
}
