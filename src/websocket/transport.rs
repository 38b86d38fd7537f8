use actix_web::web;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{future, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use uuid::Uuid;

use chess_sync::error::TransportError;
use chess_sync::session::{LinkId, PeerEvent, PeerTransport, RoomCode};

use crate::websocket::app_state::{lock, AppState};
use crate::websocket::peer_socket::{LinkControl, OutboundFrame};

/// Peer transport over websockets.
///
/// A host registers a room and hands out `ws://<public address>/peer/<id>`
/// as its room code. A guest dials that address directly. Everything the
/// transport learns goes to the owning surface through `events`.
pub struct WsPeerTransport {
    app_state: web::Data<AppState>,
    events: UnboundedSender<PeerEvent>,
    room: Option<String>,
    link: Option<String>,
    outbound: Option<UnboundedSender<String>>,
    cancelled: Arc<AtomicBool>,
}

impl WsPeerTransport {
    pub fn new(app_state: web::Data<AppState>, events: UnboundedSender<PeerEvent>) -> Self {
        WsPeerTransport {
            app_state,
            events,
            room: None,
            link: None,
            outbound: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn link_control(&self, link: &str, control: LinkControl) -> Result<(), TransportError> {
        let links = lock(&self.app_state.links);
        let addr = links
            .get(link)
            .ok_or_else(|| TransportError::UnknownLink(link.to_string()))?;
        addr.do_send(control);
        Ok(())
    }
}

impl PeerTransport for WsPeerTransport {
    fn advertise(&mut self) -> Result<(), TransportError> {
        let id = Uuid::new_v4().to_string();
        lock(&self.app_state.rooms).insert(id.clone(), self.events.clone());
        let code = format!("{}/peer/{}", self.app_state.config.public_ws, id);
        info!("Advertising room {}", code);
        self.room = Some(id);
        self.events
            .unbounded_send(PeerEvent::Advertising {
                room: RoomCode(code),
            })
            .map_err(|e| TransportError::Failed(e.to_string()))
    }

    fn connect(&mut self, room: &RoomCode) -> Result<(), TransportError> {
        let url = room.as_str().to_string();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::UnknownRoom(url));
        }

        let (outbound, frames) = mpsc::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));
        self.outbound = Some(outbound);
        self.cancelled = cancelled.clone();
        actix_rt::spawn(dial(url, self.events.clone(), frames, cancelled));
        Ok(())
    }

    fn accept(&mut self, link: &LinkId) -> Result<(), TransportError> {
        self.link_control(&link.0, LinkControl::Accept)?;
        self.link = Some(link.0.clone());
        // No longer reachable once a guest is in
        if let Some(room) = self.room.take() {
            lock(&self.app_state.rooms).remove(&room);
        }
        Ok(())
    }

    fn refuse(&mut self, link: &LinkId) {
        if let Err(e) = self.link_control(&link.0, LinkControl::Refuse) {
            debug!("Refusing {}: {}", link, e);
        }
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if let Some(outbound) = &self.outbound {
            return outbound
                .unbounded_send(frame.to_string())
                .map_err(|_| TransportError::NotOpen);
        }
        let link = self.link.as_ref().ok_or(TransportError::NotOpen)?;
        let links = lock(&self.app_state.links);
        let addr = links.get(link).ok_or(TransportError::NotOpen)?;
        addr.do_send(OutboundFrame(frame.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        if let Some(room) = self.room.take() {
            lock(&self.app_state.rooms).remove(&room);
        }
        if let Some(link) = self.link.take() {
            let _ = self.link_control(&link, LinkControl::Close);
        }
        self.cancelled.store(true, Ordering::SeqCst);
        // Dropping the sender ends the dialer's write half
        self.outbound = None;
    }
}

/// Guest side of a peer channel
async fn dial(
    url: String,
    events: UnboundedSender<PeerEvent>,
    frames: UnboundedReceiver<String>,
    cancelled: Arc<AtomicBool>,
) {
    let report = |event: PeerEvent| {
        if !cancelled.load(Ordering::SeqCst) {
            let _ = events.unbounded_send(event);
        }
    };

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("Could not reach {}: {}", url, e);
            report(PeerEvent::Error(e.to_string()));
            return;
        }
    };
    info!("Connected to {}", url);
    report(PeerEvent::Open);

    let (sink, mut incoming) = stream.split();
    let writer = frames
        .map(|frame| Ok::<_, WsError>(Message::text(frame)))
        .forward(sink);
    let reader = async {
        while let Some(message) = incoming.next().await {
            match message {
                Ok(Message::Text(text)) => report(PeerEvent::Data(text.as_str().to_string())),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    report(PeerEvent::Error(e.to_string()));
                    return;
                }
            }
        }
        report(PeerEvent::Closed);
    };

    let (written, ()) = future::join(writer, reader).await;
    if let Err(e) = written {
        debug!("Writer for {} stopped: {}", url, e);
    }
}
