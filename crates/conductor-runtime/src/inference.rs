// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The inference loop: drives the assistant ↔ tool turn cycle for one
//! conversation job, with context-window checks, auto-compaction, the
//! anti-loop guard, and hook dispatch around every step.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conductor_model::{ChatRequest, Error, ErrorKind, Result, Role, TokenUsage, ToolCall};
use conductor_store::{ConversationStatus, HookEvent};

use crate::hooks::{run_hook, HookPayload};
use crate::instance::ConversationInstance;
use crate::runtime::Runtime;

const MAX_STEPS: usize = 300;

/// Protocol filler appended in place of a suppressed duplicate tool call, so
/// the provider still receives a result for the call id it issued.
const ANTI_LOOP_SYNTHETIC: &str = r#"{"error":"duplicate_tool_call","policy":"anti-loop","message":"Duplicate tool call with identical arguments within one step; tool execution skipped."}"#;

#[derive(Hash, PartialEq, Eq)]
struct ToolCallKey {
    name: String,
    args: String,
}

impl ToolCallKey {
    fn of(call: &ToolCall) -> Self {
        Self {
            name: call.name.clone(),
            args: call.arguments.clone(),
        }
    }
}

impl Runtime {
    /// Run one scheduled inference job to a terminal status.
    ///
    /// The cancellation race wraps only the loop itself; the terminal
    /// persist below it always runs, so a canceled job still records
    /// `canceled` durably before unwinding.
    pub(crate) async fn run_instance_job(
        self: &Arc<Self>,
        token: CancellationToken,
        instance: &mut ConversationInstance,
        prompt: &str,
    ) -> Result<()> {
        const OP: &str = "runtime.run_instance_job";

        // Step 1: append the user prompt and mark the conversation running.
        instance.conversation.add_message(Role::User, prompt);
        instance.conversation.status = ConversationStatus::Running;
        self.store
            .update_conversation(&instance.conversation)
            .await
            .map_err(|e| Error::wrap(OP, e))?;

        // Step 2: conversation_started hooks.
        self.dispatch_hooks(&token, instance, HookEvent::ConversationStarted, None, "", None)
            .await;

        // Step 3: the loop, raced against the job token.
        let outcome = {
            let inference = self.run_inference(&token, instance);
            tokio::pin!(inference);
            tokio::select! {
                _ = token.cancelled() => None,
                result = &mut inference => Some(result),
            }
        };

        let inference_err = match outcome {
            None => {
                instance.conversation.status = ConversationStatus::Canceled;
                Some(Error::new(OP, ErrorKind::Unavailable, "context canceled"))
            }
            Some(Ok(())) => None,
            Some(Err(err)) => {
                instance.conversation.status = if token.is_cancelled() {
                    ConversationStatus::Canceled
                } else {
                    ConversationStatus::Failed
                };
                Some(err)
            }
        };

        // Step 4: terminal persist, outside the cancellation race.
        self.store
            .update_conversation(&instance.conversation)
            .await
            .map_err(|e| Error::wrap(OP, e))?;

        if let Some(err) = inference_err {
            return Err(Error::wrap(OP, err));
        }

        info!(conversation_id = %instance.id(), "finished running inference");
        Ok(())
    }

    async fn run_inference(
        self: &Arc<Self>,
        token: &CancellationToken,
        instance: &mut ConversationInstance,
    ) -> Result<()> {
        const OP: &str = "runtime.run_inference";

        let provider = Arc::clone(&instance.provider);
        let model = instance.conversation.model.clone();
        let mut tool_call_steps: HashMap<ToolCallKey, usize> = HashMap::new();
        let mut previous_response_id: Option<String> = None;

        for step in 0..MAX_STEPS {
            debug!(step, agent = %instance.agent_name(), "conversation inference");

            // Step 1: token budget.
            let input_tokens = provider
                .estimate_input_tokens(&model, &instance.conversation.messages)
                .map_err(|e| Error::wrap(OP, e))?;
            let threshold = if instance.conversation.auto_compact {
                instance.conversation.compact_at_percent
            } else {
                100
            };
            if let Err(err) = provider.check_context_window(&model, input_tokens, threshold) {
                if !instance.conversation.auto_compact {
                    return Err(Error::wrap(OP, err));
                }
                // Auto-compaction ends this job and continues in a clone.
                return self.compact_into_new_conversation(token, instance).await;
            }

            // Step 2: the chat call.
            let request = ChatRequest {
                messages: instance.conversation.messages.clone(),
                tools: instance.conversation.tools.clone(),
                reasoning_effort: instance.conversation.reasoning_effort,
                previous_response_id: previous_response_id.clone(),
                web_search: instance.conversation.web_search,
                structured_output_schema: if instance.conversation.structured_output {
                    instance.conversation.structured_output_schema.clone()
                } else {
                    None
                },
            };
            let response = provider
                .chat(&model, &request)
                .await
                .map_err(|e| Error::wrap(OP, e))?;
            previous_response_id = Some(response.id.clone());
            accumulate_usage(instance, &response.usage);

            // Step 3: dispatch tool calls in order.
            for call in &response.tool_calls {
                info!(tool = %call.name, args = %call.arguments, "agent calling tool");

                // 3.1 Anti-loop: an identical (name, args) pair dispatched on
                // the previous step is not executed again, but the protocol
                // still gets a tool message for this call id.
                let key = ToolCallKey::of(call);
                if let Some(&last_step) = tool_call_steps.get(&key) {
                    if step - last_step <= 1 {
                        tool_call_steps.insert(key, step);
                        warn!(tool = %call.name, args = %call.arguments, "skipping tool call due to anti-loop policy");
                        instance.conversation.add_tool_message(
                            &call.name,
                            &call.call_id,
                            ANTI_LOOP_SYNTHETIC,
                        );
                        continue;
                    }
                }

                // 3.2 Record the assistant-issued call so resume-from-store
                // replays correctly.
                instance.conversation.add_assistant_tool_call(call.clone());

                // 3.3 Pre-tool hooks; a veto suppresses execution.
                let vetoed = self
                    .dispatch_hooks(token, instance, HookEvent::PreToolUse, Some(call), "", None)
                    .await;
                if vetoed {
                    continue;
                }

                // 3.4 Dispatch through the mux.  Dispatch errors are fatal.
                let tool_response = {
                    let mux = instance.mux.as_ref().ok_or_else(|| {
                        Error::new(OP, ErrorKind::Internal, "no tool mux configured")
                    })?;
                    mux.call_tool(call)
                        .await
                        .map_err(|e| Error::wrap("runtime.execute_tool", e))?
                };

                debug!(tool = %call.name, response = %tool_response, "tool call response");

                // 3.5 Post-tool hooks; a veto replaces the natural result.
                let vetoed = self
                    .dispatch_hooks(
                        token,
                        instance,
                        HookEvent::PostToolUse,
                        Some(call),
                        &tool_response,
                        None,
                    )
                    .await;

                // 3.6 Record the step and the real result.
                tool_call_steps.insert(key, step);
                if !vetoed {
                    instance
                        .conversation
                        .add_tool_message(&call.name, &call.call_id, &tool_response);
                }
            }

            // Step 4: termination check.
            if response.tool_calls.is_empty() {
                instance.conversation.add_message(Role::Assistant, &response.text);

                // Flip to succeeded before the ended hooks run, so they never
                // observe a stale `running`.
                instance.conversation.status = ConversationStatus::Succeeded;
                self.store
                    .update_conversation(&instance.conversation)
                    .await
                    .map_err(|e| Error::wrap(OP, e))?;

                let vetoed = self
                    .dispatch_hooks(token, instance, HookEvent::ConversationEnded, None, "", None)
                    .await;
                if vetoed {
                    // A hook requested more work.  Re-entry is uncapped; log
                    // loudly so runaway hook loops are visible.
                    warn!(
                        conversation_id = %instance.id(),
                        step,
                        "conversation_ended hook vetoed the stop, continuing the loop"
                    );
                    instance.conversation.status = ConversationStatus::Running;
                    self.store
                        .update_conversation(&instance.conversation)
                        .await
                        .map_err(|e| Error::wrap(OP, e))?;
                } else {
                    instance.conversation.cost = provider.calculate_cost(
                        &model,
                        instance.conversation.input_tokens,
                        instance.conversation.output_tokens,
                        instance.conversation.cached_tokens,
                    );
                    self.store
                        .update_conversation(&instance.conversation)
                        .await
                        .map_err(|e| Error::wrap(OP, e))?;
                    info!(text = %response.text, "final assistant response received");
                    return Ok(());
                }
            }

            // Step 5: persist the step before iterating.
            self.store
                .update_conversation(&instance.conversation)
                .await
                .map_err(|e| Error::wrap(OP, e))?;
        }

        Err(Error::new(OP, ErrorKind::ResourceExhausted, "exceeded maximum inference steps"))
    }

    /// Migrate an over-budget dialog into a fresh conversation seeded with a
    /// model-written summary, then end the current job.
    ///
    /// Returns the distinguishing `invalid` error in every success path so
    /// the caller's loop terminates; the clone continues independently under
    /// its own job.
    async fn compact_into_new_conversation(
        self: &Arc<Self>,
        token: &CancellationToken,
        instance: &mut ConversationInstance,
    ) -> Result<()> {
        const OP: &str = "runtime.compact_conversation";

        info!(
            conversation_id = %instance.id(),
            compact_count = instance.conversation.compact_count,
            "context window threshold reached, compacting"
        );

        self.dispatch_hooks(token, instance, HookEvent::PreContextCompaction, None, "", None)
            .await;

        // Ask the model for the summary with the configured prompt; no tools
        // so it cannot wander off.
        let compaction_prompt = instance.conversation.compaction_prompt.clone();
        instance.conversation.add_message(Role::User, &compaction_prompt);
        let request = ChatRequest {
            messages: instance.conversation.messages.clone(),
            tools: Vec::new(),
            reasoning_effort: instance.conversation.reasoning_effort,
            previous_response_id: None,
            web_search: false,
            structured_output_schema: None,
        };
        let provider = Arc::clone(&instance.provider);
        let response = provider
            .chat(&instance.conversation.model, &request)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        accumulate_usage(instance, &response.usage);

        // Seed the clone: transcript reduced to the system message; the
        // summary arrives as the clone job's starting prompt.
        let mut clone = instance
            .conversation
            .clone_conversation(true)
            .map_err(|e| Error::wrap(OP, e))?;
        clone.compact_count += 1;
        self.store
            .insert_conversation(&clone)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        let clone_id = clone.id;

        let clone_instance = self
            .new_instance(clone, false)
            .await
            .map_err(|e| Error::wrap(OP, e))?;
        self.run_conversation_instance(clone_instance, &response.text)
            .map_err(|e| Error::wrap(OP, e))?;

        self.dispatch_hooks(
            token,
            instance,
            HookEvent::PostContextCompaction,
            None,
            "",
            Some(clone_id),
        )
        .await;

        Err(Error::new(
            OP,
            ErrorKind::Invalid,
            "Context window exceeded, compacted in new conversation",
        ))
    }

    /// Run every hook registered for `event` sequentially, in load order.
    ///
    /// Returns `true` when a hook vetoed (exit code 2); dispatch stops at
    /// the first veto and the veto's transcript side effect has already been
    /// applied.  Hook failures are logged and ignored — they never abort the
    /// loop.
    pub(crate) async fn dispatch_hooks(
        &self,
        token: &CancellationToken,
        instance: &mut ConversationInstance,
        event: HookEvent,
        tool_call: Option<&ToolCall>,
        tool_response: &str,
        compacted_conversation_id: Option<Uuid>,
    ) -> bool {
        for hook in instance.hooks_for(event) {
            let payload = HookPayload {
                hook_id: hook.id,
                conversation_id: instance.id(),
                event_type: event,
                agent_name: instance.conversation.agent_name.clone(),
                last_assistant_message: instance
                    .conversation
                    .latest_assistant_message()
                    .map(|m| m.content.clone()),
                tool_name: tool_call.map(|c| c.name.clone()),
                tool_args: tool_call.map(|c| c.arguments.clone()),
                tool_response: tool_call.map(|_| tool_response.to_string()),
                compacted_conversation_id,
            };

            let outcome = match run_hook(token, &hook, &payload).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(event = %event, command = %hook.command, error = %err, "hook execution failed");
                    continue;
                }
            };

            if outcome.vetoed() {
                let stderr_text = outcome.stderr_text();
                match tool_call {
                    // Tool events: answer the pending call id with a
                    // well-formed shell-like error so the model still gets a
                    // result for the call it just made.
                    Some(call) => {
                        let envelope = json!({
                            "exit_code": 1,
                            "stderr": stderr_text,
                            "command": call.command_string(),
                        });
                        instance.conversation.add_tool_message(
                            &call.name,
                            &call.call_id,
                            &envelope.to_string(),
                        );
                    }
                    // Conversation and compaction events: steer the model
                    // with a user message.
                    None => instance.conversation.add_message(Role::User, &stderr_text),
                }
                return true;
            }

            if outcome.exit_code != 0 {
                warn!(
                    event = %event,
                    command = %hook.command,
                    exit_code = outcome.exit_code,
                    "hook exited non-zero, ignoring"
                );
            }
        }
        false
    }
}

fn accumulate_usage(instance: &mut ConversationInstance, usage: &TokenUsage) {
    // Input counts only the non-cached delta; cache reads accumulate apart.
    let uncached = (usage.input_tokens - usage.cache_read_tokens).max(0);
    instance.conversation.input_tokens += uncached;
    instance.conversation.output_tokens += usage.output_tokens;
    instance.conversation.cached_tokens += usage.cache_read_tokens;
}
