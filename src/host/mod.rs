//! Line delimited JSON protocol spoken with the editor that spawned `codeclock serve`.
//! The editor reports activity and forwards commands on stdin, the tracker answers on stdout.

pub mod reader;
pub mod writer;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything the host can tell the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    TextChanged,
    /// The focused editor changed. `file` is absent when no editor is focused.
    EditorChanged {
        #[serde(default)]
        file: Option<PathBuf>,
    },
    WindowFocused,
    WorkspaceChanged {
        #[serde(default)]
        name: Option<String>,
    },
    Start,
    Stop,
    ShowSession,
    ShowStats,
}

impl HostEvent {
    /// Signals that prove the user is at the keyboard.
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            HostEvent::TextChanged | HostEvent::EditorChanged { .. } | HostEvent::WindowFocused
        )
    }
}

/// Everything the tracker can ask the host to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Replaces the status bar text.
    Status { text: String },
    Info { text: String },
    Warning { text: String },
    Report { text: String },
    Heartbeat { text: String },
}

impl HostMessage {
    pub fn status(text: impl Into<String>) -> Self {
        Self::Status { text: text.into() }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::Info { text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::Warning { text: text.into() }
    }

    pub fn report(text: impl Into<String>) -> Self {
        Self::Report { text: text.into() }
    }

    pub fn heartbeat(text: impl Into<String>) -> Self {
        Self::Heartbeat { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            HostMessage::Status { text }
            | HostMessage::Info { text }
            | HostMessage::Warning { text }
            | HostMessage::Report { text }
            | HostMessage::Heartbeat { text } => text,
        }
    }
}
