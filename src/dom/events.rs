//! DOM event listeners.
//!
//! Same shape as the spark-tui keyboard handler registry: listeners live in a
//! `Vec` tagged with ids, removal is by id. Events do not bubble; only
//! listeners registered on the target node run.

use std::rc::Rc;

use super::{Document, NodeId};
use crate::engine::AbortSignal;

/// An event delivered to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: String,
    pub target: NodeId,
}

/// Listener callback. Receives the document so it can read the target.
pub type EventListener = Rc<dyn Fn(&Document, &Event)>;

pub(crate) struct Registration {
    pub(crate) id: usize,
    pub(crate) node: NodeId,
    pub(crate) event_type: String,
    pub(crate) listener: EventListener,
    pub(crate) signal: Option<AbortSignal>,
}

#[derive(Default)]
pub(crate) struct EventRegistry {
    registrations: Vec<Registration>,
    next_id: usize,
}

impl EventRegistry {
    pub(crate) fn add(
        &mut self,
        node: NodeId,
        event_type: &str,
        listener: EventListener,
        signal: Option<AbortSignal>,
    ) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.registrations.push(Registration {
            id,
            node,
            event_type: event_type.to_string(),
            listener,
            signal,
        });
        id
    }

    pub(crate) fn remove(&mut self, id: usize) {
        self.registrations.retain(|registration| registration.id != id);
    }

    /// Listeners for `node`/`event_type`, in registration order.
    pub(crate) fn snapshot(
        &self,
        node: NodeId,
        event_type: &str,
    ) -> Vec<(EventListener, Option<AbortSignal>)> {
        self.registrations
            .iter()
            .filter(|r| r.node == node && r.event_type == event_type)
            .map(|r| (r.listener.clone(), r.signal.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.len()
    }
}
