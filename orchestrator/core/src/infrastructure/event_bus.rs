// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Session Events
//
// In-memory fan-out over a tokio broadcast channel. Feeds the CLI live view
// and any UI bridge. Publishing never blocks: slow subscribers lag and lose
// the oldest events instead of stalling the coordinator.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::SessionEvent;
use crate::domain::session::SessionId;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<SessionEvent>>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: SessionEvent) {
        debug!(session_id = %event.session_id(), event = event.name(), "Publishing event");
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Receiver that only yields events for one session
    pub fn subscribe_session(&self, session_id: SessionId) -> SessionEventReceiver {
        SessionEventReceiver {
            receiver: self.sender.subscribe(),
            session_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<SessionEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<SessionEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

pub struct SessionEventReceiver {
    receiver: broadcast::Receiver<SessionEvent>,
    session_id: SessionId,
}

impl SessionEventReceiver {
    pub async fn recv(&mut self) -> Result<SessionEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.session_id() == self.session_id {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
