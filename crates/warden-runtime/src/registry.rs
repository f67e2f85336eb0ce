//! Bounded index of the agents the gatekeeper is tracking.
//!
//! An LRU over agent ids: touching an agent at capacity pushes out the least recently used
//! one, and the caller is expected to purge that agent from every service.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::request::ExecutionRecord;

#[derive(Debug, Clone)]
pub(crate) struct AgentSlot {
    pub last_seen: DateTime<Utc>,
    pub history: VecDeque<ExecutionRecord>,
    pub active_frame: Option<String>,
}

impl AgentSlot {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_seen: now,
            history: VecDeque::new(),
            active_frame: None,
        }
    }
}

pub(crate) struct AgentRegistry {
    slots: LruCache<String, AgentSlot>,
}

fn capacity(max_agents: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_agents).unwrap_or(NonZeroUsize::MIN)
}

impl AgentRegistry {
    pub fn new(max_agents: usize) -> Self {
        Self {
            slots: LruCache::new(capacity(max_agents)),
        }
    }

    /// Mark the agent as seen. Returns the id of an agent pushed out to make room.
    pub fn touch(&mut self, agent_id: &str, now: DateTime<Utc>, max_agents: usize) -> Vec<String> {
        let mut evicted = Vec::new();
        let cap = capacity(max_agents);
        if self.slots.cap() != cap {
            // Shrinking drops from the LRU end; collect those ids first.
            while self.slots.len() > cap.get() {
                match self.slots.pop_lru() {
                    Some((id, _)) => evicted.push(id),
                    None => break,
                }
            }
            self.slots.resize(cap);
        }

        if let Some(slot) = self.slots.get_mut(agent_id) {
            slot.last_seen = now;
            return evicted;
        }
        if let Some((id, _)) = self.slots.push(agent_id.to_string(), AgentSlot::new(now))
            && id != agent_id
        {
            evicted.push(id);
        }
        evicted
    }

    pub fn slot(&self, agent_id: &str) -> Option<&AgentSlot> {
        self.slots.peek(agent_id)
    }

    pub fn slot_mut(&mut self, agent_id: &str) -> Option<&mut AgentSlot> {
        self.slots.peek_mut(agent_id)
    }

    pub fn remove(&mut self, agent_id: &str) -> bool {
        self.slots.pop(agent_id).is_some()
    }

    /// Agents not seen for longer than `timeout`.
    pub fn inactive(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| now - slot.last_seen > timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Tracked ids, most recently used first.
    pub fn ids(&self) -> Vec<String> {
        self.slots.iter().map(|(id, _)| id.clone()).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
