//! Blocking HTTP client for the device gateway.
//!
//! The gateway holds one controller session at a time: `connect` selects the
//! controller, subsequent reads go to it, `disconnect` releases it.

use std::time::Duration;

use serde_json::Value;

use compwatch_core::Axis;

use crate::error::GatewayError;
use crate::wire::{axis_range_length, ConnectRequest, Envelope};

/// Per-call timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTimeouts {
    pub connect: Duration,
    pub single: Duration,
    pub ranged: Duration,
    pub disconnect: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            single: Duration::from_secs(10),
            ranged: Duration::from_secs(30),
            disconnect: Duration::from_secs(2),
        }
    }
}

pub struct GatewayClient {
    agent: ureq::Agent,
    base_url: String,
    timeouts: GatewayTimeouts,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeouts(base_url, GatewayTimeouts::default())
    }

    pub fn with_timeouts(base_url: &str, timeouts: GatewayTimeouts) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeouts.connect)
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeouts,
        }
    }

    /// Open a controller session.
    pub fn connect(&self, address: &str, port: u16) -> Result<(), GatewayError> {
        let body = ConnectRequest {
            ip_address: address.to_string(),
            port,
        };
        let body = serde_json::to_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let request = self
            .agent
            .post(&self.url("connect"))
            .timeout(self.timeouts.connect);
        self.call(request, Some(body)).map(|_| ())
    }

    /// Release the controller session.
    pub fn disconnect(&self) -> Result<(), GatewayError> {
        let request = self
            .agent
            .post(&self.url("disconnect"))
            .timeout(self.timeouts.disconnect);
        self.call(request, None).map(|_| ())
    }

    /// `readItem`: offsets of one tool. Returns the raw `data` payload.
    pub fn read_item(&self, tool: u16) -> Result<Value, GatewayError> {
        let request = self
            .agent
            .get(&self.url(&format!("tool-offsets/{tool}")))
            .timeout(self.timeouts.single);
        self.call_for_data(request)
    }

    /// `readRange`: offsets of tools `start..=end` in one round trip.
    pub fn read_range(&self, start: u16, end: u16) -> Result<Value, GatewayError> {
        let request = self
            .agent
            .get(&self.url(&format!("tool-offsets-range/{start}/{end}")))
            .timeout(self.timeouts.ranged);
        self.call_for_data(request)
    }

    /// `readAxisRange`: one axis across device offsets `start..=end`.
    pub fn read_axis_range(
        &self,
        axis: Axis,
        start_offset: u16,
        end_offset: u16,
    ) -> Result<Value, GatewayError> {
        let length = axis_range_length(start_offset, end_offset);
        let path = format!(
            "work-zero-offsets-range/{}/{start_offset}/{end_offset}/{length}",
            axis.device_number()
        );
        let request = self.agent.get(&self.url(&path)).timeout(self.timeouts.ranged);
        self.call_for_data(request)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/focas/{endpoint}", self.base_url)
    }

    fn call_for_data(&self, request: ureq::Request) -> Result<Value, GatewayError> {
        self.call(request, None)?
            .ok_or_else(|| GatewayError::Decode("success response without data".to_string()))
    }

    fn call(
        &self,
        request: ureq::Request,
        body: Option<Value>,
    ) -> Result<Option<Value>, GatewayError> {
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                // Non-2xx: the gateway usually still sends its envelope.
                let envelope = response.into_json::<Envelope>().ok();
                let message = envelope
                    .as_ref()
                    .and_then(|e| e.error.clone())
                    .unwrap_or_else(|| format!("HTTP {status}"));
                let code = envelope
                    .map(|e| e.error_code)
                    .filter(|code| *code != 0)
                    .unwrap_or_else(|| i64::from(status));
                return Err(GatewayError::Protocol { message, code });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(GatewayError::Connectivity(transport.to_string()));
            }
        };

        let envelope: Envelope = response.into_json().map_err(body_error)?;
        if !envelope.success {
            return Err(GatewayError::Protocol {
                message: envelope
                    .error
                    .unwrap_or_else(|| "unknown gateway error".to_string()),
                code: envelope.error_code,
            });
        }
        Ok(envelope.data)
    }
}

fn body_error(err: std::io::Error) -> GatewayError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::ConnectionReset => {
            GatewayError::Connectivity(err.to_string())
        }
        _ => GatewayError::Decode(err.to_string()),
    }
}
