//! In-process peer transport.
//!
//! Endpoints created from one [`LoopbackHub`] can find each other by room
//! code. Every outcome is queued on the receiving endpoint's
//! [`LoopbackInbox`] and only delivered when someone drains it, which keeps
//! delivery ordered and on the caller's thread.

use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use uuid::Uuid;

use crate::error::TransportError;
use crate::session::peer::{LinkId, PeerEvent, PeerTransport, RoomCode};

type EndpointId = usize;

#[derive(Default)]
struct Endpoint {
    queue: VecDeque<PeerEvent>,
    room: Option<String>,
    peer: Option<EndpointId>,
}

#[derive(Default)]
struct Hub {
    endpoints: Vec<Endpoint>,
    rooms: HashMap<String, EndpointId>,
    /// Pending guests by link id: (host, guest)
    links: HashMap<String, (EndpointId, EndpointId)>,
}

impl Hub {
    fn push(&mut self, to: EndpointId, event: PeerEvent) {
        if let Some(endpoint) = self.endpoints.get_mut(to) {
            endpoint.queue.push_back(event);
        }
    }

    fn unpair(&mut self, id: EndpointId) -> Option<EndpointId> {
        let peer = self.endpoints.get_mut(id)?.peer.take()?;
        if let Some(other) = self.endpoints.get_mut(peer) {
            other.peer = None;
        }
        Some(peer)
    }
}

/// Shared switchboard for loopback endpoints
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inner: Rc<RefCell<Hub>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new endpoint: the transport half goes into a session, the inbox
    /// half is drained into that session's controller.
    pub fn endpoint(&self) -> (LoopbackTransport, LoopbackInbox) {
        let mut hub = self.inner.borrow_mut();
        hub.endpoints.push(Endpoint::default());
        let id = hub.endpoints.len() - 1;
        (
            LoopbackTransport {
                hub: self.clone(),
                id,
            },
            LoopbackInbox {
                hub: self.clone(),
                id,
            },
        )
    }

    /// Events waiting across all endpoints
    pub fn pending(&self) -> usize {
        self.inner
            .borrow()
            .endpoints
            .iter()
            .map(|e| e.queue.len())
            .sum()
    }
}

pub struct LoopbackTransport {
    hub: LoopbackHub,
    id: EndpointId,
}

impl PeerTransport for LoopbackTransport {
    fn advertise(&mut self) -> Result<(), TransportError> {
        let mut hub = self.hub.inner.borrow_mut();
        let code = Uuid::new_v4().to_string();
        hub.rooms.insert(code.clone(), self.id);
        if let Some(endpoint) = hub.endpoints.get_mut(self.id) {
            endpoint.room = Some(code.clone());
        }
        hub.push(self.id, PeerEvent::Advertising { room: RoomCode(code) });
        Ok(())
    }

    fn connect(&mut self, room: &RoomCode) -> Result<(), TransportError> {
        let mut hub = self.hub.inner.borrow_mut();
        let Some(&host) = hub.rooms.get(room.as_str()) else {
            // Reported asynchronously, like a real signalling failure
            hub.push(self.id, PeerEvent::Error(format!("could not connect to peer {room}")));
            return Ok(());
        };
        let link = Uuid::new_v4().to_string();
        hub.links.insert(link.clone(), (host, self.id));
        hub.push(host, PeerEvent::Incoming { link: LinkId(link) });
        Ok(())
    }

    fn accept(&mut self, link: &LinkId) -> Result<(), TransportError> {
        let mut hub = self.hub.inner.borrow_mut();
        let (host, guest) = hub
            .links
            .remove(&link.0)
            .ok_or_else(|| TransportError::UnknownLink(link.to_string()))?;
        if host != self.id {
            return Err(TransportError::UnknownLink(link.to_string()));
        }
        hub.endpoints[host].peer = Some(guest);
        hub.endpoints[guest].peer = Some(host);
        hub.push(guest, PeerEvent::Open);
        Ok(())
    }

    fn refuse(&mut self, link: &LinkId) {
        let mut hub = self.hub.inner.borrow_mut();
        if let Some((_, guest)) = hub.links.remove(&link.0) {
            hub.push(guest, PeerEvent::Closed);
        }
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut hub = self.hub.inner.borrow_mut();
        let peer = hub
            .endpoints
            .get(self.id)
            .and_then(|e| e.peer)
            .ok_or(TransportError::NotOpen)?;
        hub.push(peer, PeerEvent::Data(frame.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        let mut hub = self.hub.inner.borrow_mut();
        if let Some(peer) = hub.unpair(self.id) {
            hub.push(peer, PeerEvent::Closed);
        }
        if let Some(room) = hub.endpoints.get_mut(self.id).and_then(|e| e.room.take()) {
            debug!("Loopback room {} withdrawn", room);
            hub.rooms.remove(&room);
        }
        let id = self.id;
        hub.links.retain(|_, (host, guest)| *host != id && *guest != id);
        // Nothing that was in flight to us matters any more
        if let Some(endpoint) = hub.endpoints.get_mut(id) {
            endpoint.queue.clear();
        }
    }
}

/// Receiving half of a loopback endpoint
pub struct LoopbackInbox {
    hub: LoopbackHub,
    id: EndpointId,
}

impl LoopbackInbox {
    pub fn next(&self) -> Option<PeerEvent> {
        self.hub
            .inner
            .borrow_mut()
            .endpoints
            .get_mut(self.id)
            .and_then(|e| e.queue.pop_front())
    }

    pub fn drain(&self) -> Vec<PeerEvent> {
        std::iter::from_fn(|| self.next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advertised_room(inbox: &LoopbackInbox) -> RoomCode {
        match inbox.next() {
            Some(PeerEvent::Advertising { room }) => room,
            other => panic!("expected a room, got {other:?}"),
        }
    }

    #[test]
    fn guest_reaches_host_through_the_room() {
        let hub = LoopbackHub::new();
        let (mut host, host_inbox) = hub.endpoint();
        let (mut guest, guest_inbox) = hub.endpoint();

        host.advertise().unwrap();
        let room = advertised_room(&host_inbox);
        guest.connect(&room).unwrap();

        let Some(PeerEvent::Incoming { link }) = host_inbox.next() else {
            panic!("host saw no guest");
        };
        host.accept(&link).unwrap();
        assert_eq!(guest_inbox.drain(), vec![PeerEvent::Open]);

        guest.send("hello").unwrap();
        host.send("hi").unwrap();
        assert_eq!(host_inbox.drain(), vec![PeerEvent::Data("hello".into())]);
        assert_eq!(guest_inbox.drain(), vec![PeerEvent::Data("hi".into())]);
    }

    #[test]
    fn unknown_room_fails_asynchronously() {
        let hub = LoopbackHub::new();
        let (mut guest, inbox) = hub.endpoint();
        guest.connect(&RoomCode("nowhere".into())).unwrap();
        assert!(matches!(inbox.next(), Some(PeerEvent::Error(_))));
    }

    #[test]
    fn close_notifies_the_other_side() {
        let hub = LoopbackHub::new();
        let (mut host, host_inbox) = hub.endpoint();
        let (mut guest, guest_inbox) = hub.endpoint();
        host.advertise().unwrap();
        let room = advertised_room(&host_inbox);
        guest.connect(&room).unwrap();
        let Some(PeerEvent::Incoming { link }) = host_inbox.next() else {
            panic!("host saw no guest");
        };
        host.accept(&link).unwrap();
        guest_inbox.drain();

        host.close();
        assert_eq!(guest_inbox.drain(), vec![PeerEvent::Closed]);
        assert_eq!(guest.send("late"), Err(TransportError::NotOpen));

        // The room is gone once the host closes
        let (mut late, late_inbox) = hub.endpoint();
        late.connect(&room).unwrap();
        assert!(matches!(late_inbox.next(), Some(PeerEvent::Error(_))));
        assert_eq!(hub.pending(), 0);
    }

    #[test]
    fn refused_guest_sees_closed() {
        let hub = LoopbackHub::new();
        let (mut host, host_inbox) = hub.endpoint();
        let (mut guest, guest_inbox) = hub.endpoint();
        host.advertise().unwrap();
        let room = advertised_room(&host_inbox);
        guest.connect(&room).unwrap();
        let Some(PeerEvent::Incoming { link }) = host_inbox.next() else {
            panic!("host saw no guest");
        };
        host.refuse(&link);
        assert_eq!(guest_inbox.drain(), vec![PeerEvent::Closed]);
        assert_eq!(host.accept(&link), Err(TransportError::UnknownLink(link.to_string())));
    }
}
