//! Per-channel session state: the one-process slot and the one-shot
//! fresh-start flag.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tokio::sync::watch;

/// Opaque channel key; the chat transport's conversation identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Handle to one running assistant invocation.
pub struct RunningProcess {
    pub project: String,
    pub abort_tx: watch::Sender<bool>,
}

impl RunningProcess {
    pub fn abort(&self) {
        let _ = self.abort_tx.send(true);
    }
}

/// All per-channel runtime state. At most one `RunningProcess` per channel;
/// a second registration is rejected, never queued.
#[derive(Default)]
pub struct ChannelSessions {
    running: BTreeMap<ChannelId, RunningProcess>,
    fresh_start: BTreeSet<ChannelId>,
}

impl ChannelSessions {
    pub fn mark_fresh_start(&mut self, channel: &ChannelId) {
        self.fresh_start.insert(channel.clone());
    }

    /// Consume the one-shot fresh-start flag.
    pub fn take_fresh_start(&mut self, channel: &ChannelId) -> bool {
        self.fresh_start.remove(channel)
    }

    pub fn running_project(&self, channel: &ChannelId) -> Option<&str> {
        self.running.get(channel).map(|p| p.project.as_str())
    }

    /// Claim the channel's execution slot. Fails with the occupying project
    /// name when an invocation is already running.
    pub fn register(
        &mut self,
        channel: ChannelId,
        process: RunningProcess,
    ) -> Result<(), String> {
        if let Some(existing) = self.running.get(&channel) {
            return Err(existing.project.clone());
        }
        self.running.insert(channel, process);
        Ok(())
    }

    pub fn deregister(&mut self, channel: &ChannelId) -> Option<RunningProcess> {
        self.running.remove(channel)
    }

    /// Remove and return every running invocation (shutdown path).
    pub fn drain_all(&mut self) -> Vec<(ChannelId, RunningProcess)> {
        std::mem::take(&mut self.running).into_iter().collect()
    }
}
