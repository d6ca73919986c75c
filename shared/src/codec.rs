//! JSON codec for bridge messages
//!
//! Inbound requests from the control application:
//! ```text
//! {"type": "cmd" | "query", "cmd": "<command>", "data": "lat,lon;lat,lon"}
//! ```
//! Outbound requests to the navigation peer:
//! ```text
//! {"type": "cmd" | "query", "cmd": "<command>", "waypoints": [{"latitude": .., "longitude": ..}] | null}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{Command, NavCommand, RequestType};
use crate::waypoint::{parse_waypoints, FieldFailurePolicy};
use crate::Waypoint;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Request decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Navigation request encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Wire shape of an inbound request
#[derive(Debug, Deserialize)]
struct RequestMessage {
    #[serde(rename = "type")]
    request_type: String,
    #[serde(default)]
    cmd: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

/// A decoded inbound request
#[derive(Debug, Clone)]
pub struct Request {
    request_type: String,
    cmd: String,
    data: String,
    raw_data: Bytes,
    waypoints: Vec<Waypoint>,
}

impl Request {
    /// Decode a request and derive its waypoints from `data`
    pub fn decode(raw: Bytes, policy: FieldFailurePolicy) -> Result<Self, CodecError> {
        let msg: RequestMessage = serde_json::from_slice(&raw).map_err(CodecError::Decode)?;

        let mut request = Self {
            request_type: msg.request_type,
            cmd: msg.cmd.unwrap_or_default(),
            data: msg.data.unwrap_or_default(),
            raw_data: raw,
            waypoints: Vec::new(),
        };

        if request.command().is_some_and(|cmd| cmd.needs_waypoints()) {
            request.waypoints = parse_waypoints(&request.data, policy);
        }

        Ok(request)
    }

    /// The request type, `None` if the sender used an unknown one
    pub fn request_type(&self) -> Option<RequestType> {
        RequestType::from_name(&self.request_type)
    }

    /// The raw `type` field as sent
    pub fn type_name(&self) -> &str {
        &self.request_type
    }

    /// The command, only for `cmd` requests with a known identifier
    pub fn command(&self) -> Option<Command> {
        match self.request_type() {
            Some(RequestType::Cmd) => Command::from_id(&self.cmd),
            _ => None,
        }
    }

    /// The raw `cmd` field as sent
    pub fn cmd_name(&self) -> &str {
        &self.cmd
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// The undecoded message bytes
    pub fn raw_data(&self) -> &Bytes {
        &self.raw_data
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn into_waypoints(self) -> Vec<Waypoint> {
        self.waypoints
    }
}

/// A request written to the navigation peer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub cmd: &'static str,
    pub waypoints: Option<Vec<Waypoint>>,
}

impl NavRequest {
    /// Create a state query
    pub fn query() -> Self {
        Self {
            request_type: RequestType::Query,
            cmd: "",
            waypoints: None,
        }
    }

    /// Create a command without waypoints
    pub fn command(cmd: NavCommand) -> Self {
        Self {
            request_type: RequestType::Cmd,
            cmd: cmd.as_str(),
            waypoints: None,
        }
    }

    /// Create a command carrying waypoints
    pub fn with_waypoints(cmd: NavCommand, waypoints: Vec<Waypoint>) -> Self {
        Self {
            request_type: RequestType::Cmd,
            cmd: cmd.as_str(),
            waypoints: Some(waypoints),
        }
    }

    /// Encode into the bytes written to the socket
    ///
    /// Fails on a non-finite coordinate, which JSON cannot carry.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let waypoints = self.waypoints.as_deref().unwrap_or_default();
        if let Some(wp) = waypoints
            .iter()
            .find(|wp| !wp.latitude.is_finite() || !wp.longitude.is_finite())
        {
            return Err(CodecError::Encode(serde::ser::Error::custom(format!(
                "non-finite waypoint {}",
                wp
            ))));
        }

        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }
}
