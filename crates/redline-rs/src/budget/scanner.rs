//! Extracts new tool results from a transcript.
//!
//! Collection walks the transcript newest to oldest and stops considering
//! any call id in the `seen` set; the collected results are then returned in
//! chronological order. When the same call id occurs more than once in one
//! transcript, the earliest occurrence wins.

use super::ledger::{FindingClassifier, ToolCallRecord};
use crate::{Message, MessageRole, ToolCall};
use std::collections::HashSet;
use tracing::{trace, warn};

/// Name recorded when neither the request nor the result names the tool.
pub const UNKNOWN_TOOL: &str = "unknown";

/// Content prefix marking a failed tool result.
const ERROR_PREFIX: &str = "Error";

#[derive(Default, Clone, Copy)]
pub struct TranscriptScanner<'c> {
    classifier: Option<&'c dyn FindingClassifier>,
}

impl<'c> TranscriptScanner<'c> {
    pub fn new() -> Self {
        Self { classifier: None }
    }

    pub fn with_classifier(mut self, classifier: &'c dyn FindingClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Records for every tool-result turn whose call id is not in `seen`.
    ///
    /// Pure: the transcript and `seen` are only read, so repeated calls with
    /// the same inputs return the same records.
    pub fn scan(&self, transcript: &[Message], seen: &HashSet<String>) -> Vec<ToolCallRecord> {
        let mut fresh: Vec<(usize, &str)> = transcript
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, m)| m.role == MessageRole::Tool)
            .filter_map(|(i, m)| match m.tool_call_id.as_deref() {
                Some(id) if !seen.contains(id) => Some((i, id)),
                Some(_) => None,
                None => {
                    warn!(turn = i, "Tool result without a call id; ignored");
                    None
                }
            })
            .collect();
        fresh.reverse();

        let mut emitted = HashSet::new();
        fresh
            .into_iter()
            .filter(|(_, id)| emitted.insert(*id))
            .map(|(i, id)| self.record_for(transcript, i, id))
            .collect()
    }

    fn record_for(&self, transcript: &[Message], index: usize, call_id: &str) -> ToolCallRecord {
        let result = &transcript[index];
        let raw_result = result.content.clone().unwrap_or_default();
        let request = originating_request(&transcript[..index], call_id);

        let (tool_name, arguments) = match request {
            Some(call) => (call.function.name.clone(), call.parsed_arguments()),
            None => {
                warn!(
                    call_id,
                    turn = index,
                    "No earlier request for tool result; recording without arguments"
                );
                let name = result
                    .name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_TOOL.to_string());
                (name, None)
            }
        };

        let success = !raw_result.trim_start().starts_with(ERROR_PREFIX);
        let derived_summary = self
            .classifier
            .and_then(|c| c.classify(&tool_name, arguments.as_ref(), &raw_result, success));

        trace!(call_id, tool = %tool_name, success, "Scanned tool result");

        ToolCallRecord {
            call_id: call_id.to_string(),
            tool_name,
            arguments,
            raw_result,
            success,
            derived_summary,
        }
    }
}

/// The request for `call_id` in the nearest assistant turn of `earlier`.
fn originating_request<'t>(earlier: &'t [Message], call_id: &str) -> Option<&'t ToolCall> {
    earlier
        .iter()
        .rev()
        .flat_map(|m| m.requested_calls().iter())
        .find(|call| call.id == call_id)
}
