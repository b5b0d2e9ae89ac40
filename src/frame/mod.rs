//! Frames
//!
//! Bounded, hierarchical units of work (a task, a run, a sub-step). Frames form
//! a tree through parent back-references; the children index is derived on
//! demand by scanning the frames table.

pub mod digest;
pub mod manager;

pub use digest::FrameDigest;
pub use manager::{FrameManager, OrphanReport};

use crate::error::ApiError;
use crate::types::{FrameId, Millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state. `Closed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameState {
    Active,
    Closed,
    Aborted,
}

impl FrameState {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameState::Active => "ACTIVE",
            FrameState::Closed => "CLOSED",
            FrameState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, FrameState::Active)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameState {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(FrameState::Active),
            "closed" => Ok(FrameState::Closed),
            "aborted" => Ok(FrameState::Aborted),
            other => Err(ApiError::validation(format!("unknown frame state '{}'", other))),
        }
    }
}

/// Stored frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub parent_frame_id: Option<FrameId>,
    pub depth: u32,
    #[serde(rename = "type")]
    pub frame_type: String,
    pub name: String,
    pub state: FrameState,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub digest_text: Option<String>,
    pub digest_json: Option<Value>,
    pub created_at: Millis,
    pub closed_at: Option<Millis>,
    pub abort_reason: Option<String>,
}

impl Frame {
    pub fn is_active(&self) -> bool {
        self.state == FrameState::Active
    }

    pub fn is_root(&self) -> bool {
        self.parent_frame_id.is_none()
    }
}
