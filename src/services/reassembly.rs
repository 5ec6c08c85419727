//! Fragment Reassembly
//!
//! Tool-call arguments arrive as partial text fragments keyed by task. Each
//! fragment is appended to the task's buffer and the whole buffer is parsed;
//! a successful parse emits the completed call exactly once and clears the
//! buffer, an unparseable buffer is retained for the next fragment. Buffers
//! have no time-based eviction; they are cleared on terminal transitions.

use std::collections::HashMap;

/// Per-task accumulation state for one in-flight tool call
#[derive(Debug, Default)]
struct PartialCall {
    function_name: String,
    buffer: String,
}

/// Accumulates partial tool-call argument fragments until a complete
/// payload parses
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    buffers: HashMap<String, PartialCall>,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and attempt reassembly.
    ///
    /// Returns the completed `(function_name, args)` pair when the whole
    /// buffer parses as a JSON object. A parse that would consume only a
    /// prefix is not attempted: the buffer parses entirely or not at all.
    pub fn push(
        &mut self,
        task_id: &str,
        function_name: &str,
        fragment: &str,
    ) -> Option<(String, serde_json::Value)> {
        let entry = self
            .buffers
            .entry(task_id.to_string())
            .or_insert_with(|| PartialCall {
                function_name: function_name.to_string(),
                buffer: String::new(),
            });

        // A new function name supersedes a stale partial from an earlier call
        if entry.function_name != function_name {
            entry.function_name = function_name.to_string();
            entry.buffer.clear();
        }

        entry.buffer.push_str(fragment);

        match serde_json::from_str::<serde_json::Value>(&entry.buffer) {
            Ok(args) if args.is_object() => {
                let call = self
                    .buffers
                    .remove(task_id)
                    .expect("buffer present after insert");
                Some((call.function_name, args))
            }
            _ => None,
        }
    }

    /// Drop the buffer for a task (terminal transition or cancellation)
    pub fn clear(&mut self, task_id: &str) {
        self.buffers.remove(task_id);
    }

    /// Whether a task has unconsumed fragments
    pub fn has_pending(&self, task_id: &str) -> bool {
        self.buffers.contains_key(task_id)
    }
}
