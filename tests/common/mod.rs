#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use chess_sync::config::SyncConfig;
use chess_sync::events::{EventKind, SessionEvent};
use chess_sync::models::PeerMessage;
use chess_sync::session::{LoopbackHub, LoopbackInbox, PeerEvent, SessionController};
use chess_sync::storage::{KeyValueStore, MemoryStore};

pub struct Surface {
    pub controller: SessionController,
    pub inbox: LoopbackInbox,
    pub storage: MemoryStore,
    pub events: Rc<RefCell<Vec<SessionEvent>>>,
}

impl Surface {
    pub fn new(hub: &LoopbackHub) -> Self {
        let storage = MemoryStore::new();
        Self::with_storage(hub, Box::new(storage.clone()), storage)
    }

    pub fn with_storage(hub: &LoopbackHub, medium: Box<dyn KeyValueStore>, storage: MemoryStore) -> Self {
        let (transport, inbox) = hub.endpoint();
        let mut controller =
            SessionController::new(&SyncConfig::default(), Box::new(transport), medium);
        controller.initialize(None);

        let events = Rc::new(RefCell::new(Vec::new()));
        for kind in EventKind::ALL {
            let sink = events.clone();
            controller.bus().subscribe(kind, move |event| {
                sink.borrow_mut().push(event.clone());
                Ok(())
            });
        }
        Surface {
            controller,
            inbox,
            storage,
            events,
        }
    }

    /// Hand every queued transport event to the controller
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.inbox.next() {
            self.controller.handle_peer_event(event);
            handled += 1;
        }
        handled
    }

    pub fn room(&self) -> Option<String> {
        self.controller.session().room.map(|r| r.0)
    }
}

/// Pump both sides until nothing is in flight
pub fn settle(a: &mut Surface, b: &mut Surface) {
    while a.pump() + b.pump() > 0 {}
}

/// Host and guest, connected over a loopback hub
pub fn connected_pair() -> (LoopbackHub, Surface, Surface) {
    let hub = LoopbackHub::new();
    let mut host = Surface::new(&hub);
    let mut guest = Surface::new(&hub);

    host.controller.create_room().unwrap();
    host.pump();
    let room = host.room().expect("host advertised a room");
    guest.controller.join_room(&room).unwrap();
    settle(&mut host, &mut guest);
    (hub, host, guest)
}

/// Peer messages carried by a batch of transport events
pub fn peer_messages(events: &[PeerEvent]) -> Vec<PeerMessage> {
    events
        .iter()
        .filter_map(|event| match event {
            PeerEvent::Data(frame) => serde_json::from_str(frame).ok(),
            _ => None,
        })
        .collect()
}
