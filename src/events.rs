//! Typed publish/subscribe bus.
//!
//! Handlers run synchronously on the publishing thread, in registration
//! order. A handler that returns an error or panics is logged and skipped;
//! the remaining handlers still run and the publisher never sees the failure.

use log::{debug, error, warn};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::models::{GameState, Mode, MoveRecord, Origin};
use crate::session::peer::{ConnectionPhase, RoomCode};

/// An event that can travel on an [`EventBus`]
pub trait BusEvent {
    type Kind: Copy + Eq + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

pub type Handler<E> = Box<dyn FnMut(&E) -> anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

struct Listener<E: BusEvent> {
    id: SubscriptionId,
    kind: E::Kind,
    handler: Handler<E>,
}

pub struct EventBus<E: BusEvent> {
    listeners: RefCell<Vec<Listener<E>>>,
    removed_during_dispatch: RefCell<Vec<SubscriptionId>>,
    dispatching: Cell<bool>,
    next_id: Cell<u64>,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        EventBus {
            listeners: RefCell::new(Vec::new()),
            removed_during_dispatch: RefCell::new(Vec::new()),
            dispatching: Cell::new(false),
            next_id: Cell::new(0),
        }
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one kind of event
    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: FnMut(&E) -> anyhow::Result<()> + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            kind,
            handler: Box::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.dispatching.get() {
            self.removed_during_dispatch.borrow_mut().push(id);
        } else {
            self.listeners.borrow_mut().retain(|l| l.id != id);
        }
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.kind == kind)
            .count()
    }

    /// Deliver an event to every handler registered for its kind
    pub fn publish(&self, event: &E) -> Delivery {
        let kind = event.kind();
        if self.dispatching.replace(true) {
            warn!("Dropping {:?} published from inside a handler", kind);
            return Delivery::default();
        }

        // Handlers run with the list taken out so they may subscribe or
        // unsubscribe without tripping the RefCell.
        let mut listeners = self.listeners.take();
        let mut delivery = Delivery::default();

        for listener in listeners.iter_mut().filter(|l| l.kind == kind) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (listener.handler)(event)));
            match outcome {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    error!("Handler for {:?} failed: {:#}", kind, e);
                    delivery.failed += 1;
                }
                Err(_) => {
                    error!("Handler for {:?} panicked", kind);
                    delivery.failed += 1;
                }
            }
        }

        let mut current = self.listeners.borrow_mut();
        let added = std::mem::take(&mut *current);
        listeners.extend(added);
        let removed = std::mem::take(&mut *self.removed_during_dispatch.borrow_mut());
        listeners.retain(|l| !removed.contains(&l.id));
        *current = listeners;
        drop(current);

        self.dispatching.set(false);
        debug!("Published {:?}: {:?}", kind, delivery);
        delivery
    }
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Status text for the menu/status collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Everything the session publishes
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(GameState),
    MoveApplied { record: MoveRecord, origin: Origin },
    MoveUndone { origin: Origin },
    GameReset { origin: Origin },
    ModeChanged(Mode),
    ConnectionChanged(ConnectionPhase),
    RoomAdvertised(RoomCode),
    Notice(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    MoveApplied,
    MoveUndone,
    GameReset,
    ModeChanged,
    ConnectionChanged,
    RoomAdvertised,
    Notice,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::StateChanged,
        EventKind::MoveApplied,
        EventKind::MoveUndone,
        EventKind::GameReset,
        EventKind::ModeChanged,
        EventKind::ConnectionChanged,
        EventKind::RoomAdvertised,
        EventKind::Notice,
    ];
}

impl BusEvent for SessionEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            SessionEvent::StateChanged(_) => EventKind::StateChanged,
            SessionEvent::MoveApplied { .. } => EventKind::MoveApplied,
            SessionEvent::MoveUndone { .. } => EventKind::MoveUndone,
            SessionEvent::GameReset { .. } => EventKind::GameReset,
            SessionEvent::ModeChanged(_) => EventKind::ModeChanged,
            SessionEvent::ConnectionChanged(_) => EventKind::ConnectionChanged,
            SessionEvent::RoomAdvertised(_) => EventKind::RoomAdvertised,
            SessionEvent::Notice(_) => EventKind::Notice,
        }
    }
}

pub type SessionBus = EventBus<SessionEvent>;
