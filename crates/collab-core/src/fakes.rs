//! In-memory fakes for the invoker boundary (testing only)
//!
//! `ScriptedInvoker` satisfies [`AgentInvoker`] by replaying a fixed
//! per-agent [`Script`] and recording every request it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::invoker::{AgentInvoker, AgentRequest, AgentResponse, InvokeError};

/// What a scripted agent does when called.
#[derive(Debug, Clone)]
pub enum Script {
    Respond(AgentResponse),
    /// Answer with no response and no error.
    Silent,
    Fail(InvokeError),
    /// Wait, then behave as the inner script.
    Delay(Duration, Box<Script>),
    /// Never answer.
    Hang,
    /// Panic inside the call.
    Panic,
}

/// Invoker replaying [`Script`]s. Agents without a script are `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<(String, AgentRequest)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, agent_id: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(agent_id.into(), script);
        self
    }

    /// Every `(agent_id, request)` received so far, in arrival order.
    pub fn calls(&self) -> Vec<(String, AgentRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn send(
        &self,
        agent_id: &str,
        request: AgentRequest,
    ) -> Result<Option<AgentResponse>, InvokeError> {
        self.calls
            .lock()
            .unwrap()
            .push((agent_id.to_string(), request));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut script = match self.scripts.get(agent_id) {
            Some(script) => script.clone(),
            None => return Err(InvokeError::Unavailable(agent_id.to_string())),
        };
        let script = loop {
            match script {
                Script::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    script = *inner;
                }
                other => break other,
            }
        };

        match script {
            Script::Respond(response) => Ok(Some(response)),
            Script::Silent => Ok(None),
            Script::Fail(error) => Err(error),
            Script::Hang => std::future::pending().await,
            Script::Panic => panic!("scripted panic in agent {agent_id}"),
            Script::Delay(..) => unreachable!("delays unwrapped above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> AgentRequest {
        AgentRequest {
            task_id: "t-1".into(),
            content: "hello".into(),
            role_name: "sales".into(),
            responsibilities: Vec::new(),
            task_input_data: Default::default(),
            shared_context: Default::default(),
            correlation_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_scripts_replay_and_calls_recorded() {
        let invoker = ScriptedInvoker::new()
            .with("a", Script::Respond(AgentResponse::new("hi", 0.5)))
            .with("b", Script::Silent);

        assert_eq!(
            invoker.send("a", request()).await.unwrap().unwrap().content,
            "hi"
        );
        assert!(invoker.send("b", request()).await.unwrap().is_none());
        assert_eq!(
            invoker.send("ghost", request()).await,
            Err(InvokeError::Unavailable("ghost".into()))
        );

        let calls = invoker.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2].0, "ghost");
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_delay_unwraps_to_inner_script() {
        let invoker = ScriptedInvoker::new().with(
            "slow",
            Script::Delay(
                Duration::from_secs(1),
                Box::new(Script::Delay(
                    Duration::from_secs(1),
                    Box::new(Script::Fail(InvokeError::Unavailable("slow".into()))),
                )),
            ),
        );
        let started = tokio::time::Instant::now();
        let result = invoker.send("slow", request()).await;
        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(invoker.max_in_flight(), 1);
    }
}
