// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for wordlink-sdk integration tests.
//!
//! Provides a simulated controller that plays both the console bridge and the
//! robot: it types nothing, but it reads `ID_COM` out of every dispatched
//! script, bumps its correlation register after each reply it writes, and
//! answers memory searches from an in-process shared memory string.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use wordlink_protocol::{CORRELATION_ID_SPACE, CommandEnvelope, CommandKind, Reply, Transport, TransportError};
use wordlink_sdk::{LinkConfig, RobotLink, VariableIndex};

/// Console text typed before the `ID_COM` value.
const ID_COM_ASSIGNMENT: &str = "$WORD[1]:=";
const SEARCH_POLL: Duration = Duration::from_millis(20);

/// What the bridge does with an execute command.
#[derive(Debug, Clone)]
pub enum DispatchMode {
    Acknowledge,
    Reject { code: String, message: String },
    /// Waits out the transport timeout, then reports no reply.
    Silent,
    /// Never returns.
    Hang,
    /// Panics inside the transport.
    Crash,
}

/// Text the robot writes after one dispatch.
#[derive(Debug, Clone)]
enum Write {
    Reply(String),
    Unterminated(String),
}

#[derive(Debug, Clone)]
struct Script {
    after: Duration,
    writes: Vec<Write>,
}

#[derive(Debug)]
struct State {
    memory: String,
    register: Option<u16>,
    scripts: VecDeque<Script>,
    console_ready: bool,
    dispatch_mode: DispatchMode,
    search_failure: Option<String>,
    garbled_context: Option<String>,
    sent: Vec<CommandEnvelope>,
}

#[derive(Debug)]
pub struct SimulatedController {
    connected: AtomicBool,
    state: Arc<Mutex<State>>,
}

impl SimulatedController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            state: Arc::new(Mutex::new(State {
                memory: String::new(),
                register: None,
                scripts: VecDeque::new(),
                console_ready: true,
                dispatch_mode: DispatchMode::Acknowledge,
                search_failure: None,
                garbled_context: None,
                sent: Vec::new(),
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_console_ready(&self, ready: bool) {
        self.lock().console_ready = ready;
    }

    pub fn set_dispatch_mode(&self, mode: DispatchMode) {
        self.lock().dispatch_mode = mode;
    }

    pub fn set_search_failure(&self, message: &str) {
        self.lock().search_failure = Some(message.to_string());
    }

    /// Every search reports `context` as the occurrence, whatever memory holds.
    pub fn set_garbled_context(&self, context: &str) {
        self.lock().garbled_context = Some(context.to_string());
    }

    /// Replies the robot writes, one per id, after the next dispatch.
    pub fn script(&self, replies: &[&str]) {
        self.script_after(Duration::ZERO, replies);
    }

    /// Like [`script`](Self::script), but the robot takes `after` to respond.
    pub fn script_after(&self, after: Duration, replies: &[&str]) {
        let writes = replies.iter().map(|r| Write::Reply(r.to_string())).collect();
        self.lock().scripts.push_back(Script { after, writes });
    }

    /// The robot starts a reply for the next dispatch but never finishes it.
    pub fn script_unterminated(&self, partial: &str) {
        self.lock().scripts.push_back(Script {
            after: Duration::ZERO,
            writes: vec![Write::Unterminated(partial.to_string())],
        });
    }

    /// A dispatch the robot does not answer.
    pub fn script_nothing(&self) {
        self.lock().scripts.push_back(Script {
            after: Duration::ZERO,
            writes: Vec::new(),
        });
    }

    pub fn write_memory(&self, text: &str) {
        self.lock().memory.push_str(text);
    }

    pub fn memory(&self) -> String {
        self.lock().memory.clone()
    }

    pub fn sent(&self) -> Vec<CommandEnvelope> {
        self.lock().sent.clone()
    }

    /// Transcripts of every execute command, in order.
    pub fn dispatched(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|e| e.sequence().map(|s| s.transcript()))
            .collect()
    }

    /// Search strings of every find command, in order.
    pub fn searches(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|e| e.search_string().map(str::to_string))
            .collect()
    }

    async fn execute(&self, envelope: &CommandEnvelope, timeout: Duration) -> Option<Reply> {
        let request_id = envelope.request_id().to_string();
        let mode = self.lock().dispatch_mode.clone();
        match mode {
            DispatchMode::Acknowledge => {}
            DispatchMode::Reject { code, message } => {
                return Some(Reply::error(request_id, code, message));
            }
            DispatchMode::Silent => {
                tokio::time::sleep(timeout).await;
                return None;
            }
            DispatchMode::Hang => return std::future::pending().await,
            DispatchMode::Crash => panic!("bridge crashed"),
        }

        let checked = envelope.precondition().is_some();
        if checked && !self.lock().console_ready {
            let mut reply = Reply::success(request_id).with_instr_check(false);
            reply.message = Some("Instr: not found in block".to_string());
            return Some(reply);
        }

        let transcript = envelope
            .sequence()
            .map(|s| s.transcript())
            .unwrap_or_default();
        let script = {
            let mut state = self.lock();
            if let Some(id) = parse_id_com(&transcript) {
                state.register = Some(id);
            }
            state.scripts.pop_front()
        };
        if let Some(script) = script {
            let state = self.state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(script.after).await;
                let mut state = state.lock().unwrap();
                for write in script.writes {
                    let id = state.register.unwrap_or(0);
                    match write {
                        Write::Reply(text) => {
                            state.memory.push_str(&format!("[ {}]: {}#", id, text));
                            state.register = Some((id + 1) % CORRELATION_ID_SPACE);
                        }
                        Write::Unterminated(text) => {
                            state.memory.push_str(&format!("[ {}]: {}", id, text));
                        }
                    }
                }
            });
        }

        let reply = Reply::success(request_id);
        Some(if checked {
            reply.with_instr_check(true)
        } else {
            reply
        })
    }

    async fn find(&self, envelope: &CommandEnvelope) -> Option<Reply> {
        let request_id = envelope.request_id().to_string();
        if let Some(message) = self.lock().search_failure.clone() {
            return Some(Reply::error(request_id, "SEARCH_FAILED", message));
        }
        if let Some(context) = self.lock().garbled_context.clone() {
            return Some(Reply::success(request_id).with_occurrence(context));
        }

        let search = envelope.search_string().unwrap_or_default().to_string();
        let length = envelope.context_length().unwrap_or(70);
        let deadline =
            Instant::now() + Duration::from_millis(envelope.search_timeout_ms().unwrap_or(0));
        loop {
            let context = {
                let state = self.lock();
                state
                    .memory
                    .find(&search)
                    .map(|at| state.memory[at..].chars().take(length).collect::<String>())
            };
            if let Some(context) = context {
                return Some(Reply::success(request_id).with_occurrence(context));
            }
            if Instant::now() >= deadline {
                return Some(Reply::success(request_id));
            }
            tokio::time::sleep(SEARCH_POLL).await;
        }
    }
}

#[async_trait]
impl Transport for SimulatedController {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_and_wait(
        &self,
        envelope: &CommandEnvelope,
        timeout: Duration,
    ) -> Result<Option<Reply>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.lock().sent.push(envelope.clone());
        Ok(match envelope.kind() {
            CommandKind::ExecuteKeySequenceWithInstrCheck => self.execute(envelope, timeout).await,
            CommandKind::FindStringLenInBlock => self.find(envelope).await,
        })
    }
}

/// The value typed into `ID_COM`, if the script sets it.
pub fn parse_id_com(transcript: &str) -> Option<u16> {
    let start = transcript.find(ID_COM_ASSIGNMENT)? + ID_COM_ASSIGNMENT.len();
    let digits: String = transcript[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Default configuration with short timeouts.
pub fn test_config() -> LinkConfig {
    LinkConfig::new()
        .with_wait_timeout_ms(2_000)
        .with_wait_grace_ms(500)
        .with_dispatch_timeout_ms(1_000)
}

pub fn link_for(controller: &Arc<SimulatedController>) -> RobotLink {
    let transport: Arc<dyn Transport> = controller.clone();
    RobotLink::new(test_config(), transport, Arc::new(VariableIndex::builtin()))
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
