// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Input token estimation.
//!
//! The transcript is rendered into a simulated wire payload (headers, json
//! envelopes for tool traffic) and counted with the tokenizer matching the
//! model family.  The rendering only ever appends text for appended
//! messages, so the estimate is monotonic in message length.

use std::sync::OnceLock;

use serde_json::json;
use tiktoken_rs::CoreBPE;

use crate::types::{Message, Role, ToolCall};

pub(crate) fn estimate_input_tokens(model: &str, messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }
    let payload = simulate_payload(messages);
    encoder_for_model(model)
        .encode_with_special_tokens(&payload)
        .len()
}

fn simulate_payload(messages: &[Message]) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<|begin_of_text|>\n");

    for msg in messages {
        out.push_str("<|start_header_id|>");
        out.push_str(role_tag(msg.role));
        out.push_str("<|end_header_id|>\n");

        match msg.role {
            Role::System | Role::User | Role::Assistant => {
                if let Some(call) = &msg.tool_call {
                    write_simulated_function_call(&mut out, call);
                } else {
                    out.push_str(&msg.content);
                    if !msg.content.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
            Role::Tool => {
                write_simulated_tool_output(
                    &mut out,
                    msg.tool_call_id.as_deref().unwrap_or_default(),
                    &msg.content,
                );
            }
        }

        out.push_str("<|eot_id|>\n");
    }

    out
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn write_simulated_function_call(out: &mut String, call: &ToolCall) {
    let arguments = if call.arguments.is_empty() {
        "{}"
    } else {
        &call.arguments
    };
    let payload = json!({
        "type": "function_call",
        "call_id": call.call_id,
        "name": call.name,
        "arguments": arguments,
    });
    write_simulated_json(out, &payload);
}

fn write_simulated_tool_output(out: &mut String, call_id: &str, content: &str) {
    let payload = json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": content,
    });
    write_simulated_json(out, &payload);
}

fn write_simulated_json(out: &mut String, payload: &serde_json::Value) {
    out.push_str("<|json.start|>");
    out.push_str(&payload.to_string());
    out.push_str("<|json.end|>\n");
}

fn encoder_for_model(model: &str) -> &'static CoreBPE {
    let m = model.to_lowercase();
    let modern = m.starts_with("gpt-5")
        || m.starts_with("gpt-4o")
        || m.starts_with("gpt-4.1")
        || m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
        || m.contains("mini")
        || m.contains("small")
        || m.contains("large");
    if modern {
        o200k()
    } else {
        cl100k()
    }
}

fn o200k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::o200k_base().expect("bundled o200k_base must load"))
}

fn cl100k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::cl100k_base().expect("bundled cl100k_base must load"))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
