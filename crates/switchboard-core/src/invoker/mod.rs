//! Capability invocation.
//!
//! Invocation failures are data at this layer: every call returns a
//! [`CapabilityResult`], with timeouts, refused connections, bad statuses
//! and unparseable bodies recorded as typed error results.

pub mod envelope;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::config::InvocationConfig;
use crate::models::{
    CapabilityDescriptor, CapabilityResult, InvocationErrorKind, Protocol, ToolCall,
};
use envelope::{decode_response, RequestEnvelope};

type CallError = (InvocationErrorKind, String);

#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    /// Send one action to one capability.
    async fn invoke(
        &self,
        capability: &CapabilityDescriptor,
        action: &str,
        parameters: &Map<String, Value>,
        timeout: Duration,
    ) -> CapabilityResult;

    /// Per-call timeout used by [`invoke_call`](Self::invoke_call).
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Resolve the call's target among `capabilities` and invoke it.
    async fn invoke_call(
        &self,
        call: &ToolCall,
        capabilities: &[CapabilityDescriptor],
    ) -> CapabilityResult {
        match capabilities.iter().find(|c| c.id == call.target_capability_id) {
            Some(capability) => {
                self.invoke(capability, &call.action, &call.parameters, self.default_timeout())
                    .await
            }
            None => {
                tracing::warn!(
                    "[Invoker] no discovered capability with id '{}'",
                    call.target_capability_id
                );
                CapabilityResult::failure(
                    call,
                    InvocationErrorKind::UnknownCapability,
                    format!("capability '{}' was not discovered", call.target_capability_id),
                )
            }
        }
    }

    /// Invoke each call in order. A failing call never stops the batch.
    async fn invoke_batch(
        &self,
        tool_calls: &[ToolCall],
        capabilities: &[CapabilityDescriptor],
    ) -> Vec<CapabilityResult> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            results.push(self.invoke_call(call, capabilities).await);
        }
        results
    }
}

/// Invoker that reaches capabilities over HTTP or raw TCP.
pub struct NetworkInvoker {
    client: reqwest::Client,
    config: InvocationConfig,
}

impl NetworkInvoker {
    pub fn new(config: InvocationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// POST the envelope to `http://host:port/<action>`.
    async fn call_http(
        &self,
        capability: &CapabilityDescriptor,
        action: &str,
        parameters: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let url = capability.endpoint(action);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&RequestEnvelope::new(action, parameters))
            .send()
            .await
            .map_err(|e| classify_reqwest(&e, timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest(&e, timeout))?;

        if status != reqwest::StatusCode::OK {
            let preview: String = text.chars().take(200).collect();
            return Err((
                InvocationErrorKind::HttpStatus,
                format!("HTTP {} from {}: {}", status.as_u16(), url, preview),
            ));
        }
        decode_response(&text)
    }

    /// One newline-terminated JSON envelope out, one JSON line back.
    async fn call_tcp(
        &self,
        capability: &CapabilityDescriptor,
        action: &str,
        parameters: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        let addr = format!("{}:{}", capability.host, capability.port);
        let exchange = async {
            let mut stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| (InvocationErrorKind::Connection, format!("{}: {}", addr, e)))?;

            let mut line = serde_json::to_string(&RequestEnvelope::new(action, parameters))
                .map_err(|e| (InvocationErrorKind::MalformedResponse, e.to_string()))?;
            line.push('\n');
            stream
                .write_all(line.as_bytes())
                .await
                .map_err(|e| (InvocationErrorKind::Connection, format!("write failed: {}", e)))?;

            let limit = self.config.max_response_bytes;
            let mut reader = BufReader::new(stream).take(limit);
            let mut reply = String::new();
            let read = reader
                .read_line(&mut reply)
                .await
                .map_err(|e| (InvocationErrorKind::Connection, format!("read failed: {}", e)))?;
            if read == 0 {
                return Err((
                    InvocationErrorKind::MalformedResponse,
                    "connection closed before a response line".to_string(),
                ));
            }
            if read as u64 >= limit && !reply.ends_with('\n') {
                return Err((
                    InvocationErrorKind::MalformedResponse,
                    format!("response line exceeds {} bytes", limit),
                ));
            }
            decode_response(&reply)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err((
                InvocationErrorKind::Timeout,
                format!("no response from {} within {:?}", addr, timeout),
            )),
        }
    }
}

fn classify_reqwest(e: &reqwest::Error, timeout: Duration) -> CallError {
    if e.is_timeout() {
        (
            InvocationErrorKind::Timeout,
            format!("no response within {:?}", timeout),
        )
    } else if e.is_decode() || e.is_body() {
        (InvocationErrorKind::MalformedResponse, e.to_string())
    } else {
        (InvocationErrorKind::Connection, e.to_string())
    }
}

#[async_trait]
impl CapabilityInvoker for NetworkInvoker {
    async fn invoke(
        &self,
        capability: &CapabilityDescriptor,
        action: &str,
        parameters: &Map<String, Value>,
        timeout: Duration,
    ) -> CapabilityResult {
        let call = ToolCall {
            target_capability_id: capability.id.clone(),
            action: action.to_string(),
            parameters: parameters.clone(),
        };
        tracing::info!(
            "[Invoker] {} {} via {}",
            capability.id,
            action,
            capability.protocol
        );

        let outcome = match capability.protocol {
            Protocol::Http => self.call_http(capability, action, parameters, timeout).await,
            Protocol::Tcp => self.call_tcp(capability, action, parameters, timeout).await,
        };

        match outcome {
            Ok(payload) => CapabilityResult::success(&call, payload),
            Err((kind, message)) => {
                tracing::warn!("[Invoker] {} {} failed: {}: {}", capability.id, action, kind, message);
                CapabilityResult::failure(&call, kind, message)
            }
        }
    }

    fn default_timeout(&self) -> Duration {
        self.config.timeout()
    }
}
