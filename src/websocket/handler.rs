use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::channel::mpsc;
use log::{debug, info, warn};
use serde::Deserialize;
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

use chess_sync::error::SyncError;
use chess_sync::events::EventKind;
use chess_sync::models::{MoveCandidate, ServerMessage, SurfaceIntent};
use chess_sync::session::{PeerEvent, SessionController};
use chess_sync::storage::FileStore;

use crate::websocket::app_state::{lock, AppState};
use crate::websocket::peer_socket::PeerSocket;
use crate::websocket::transport::WsPeerTransport;

/// WebSocket handler for one browser surface.
///
/// Owns the surface's session. Intents from the browser and events from the
/// peer transport are both handled on this actor, one at a time.
pub struct SurfaceSocket {
    pub id: String,
    controller: SessionController,
    outbox: Rc<RefCell<Vec<ServerMessage>>>,
    startup_link: Option<String>,
    peer_events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    last_link: String,
}

impl SurfaceSocket {
    pub fn new(app_state: web::Data<AppState>, startup_link: Option<String>) -> Self {
        let (events, peer_events) = mpsc::unbounded();
        let config = app_state.config.clone();
        let transport = WsPeerTransport::new(app_state, events);
        let storage = FileStore::new(&config.storage.dir);
        SurfaceSocket {
            id: Uuid::new_v4().to_string(),
            controller: SessionController::new(&config, Box::new(transport), Box::new(storage)),
            outbox: Rc::new(RefCell::new(Vec::new())),
            startup_link,
            peer_events: Some(peer_events),
            last_link: String::new(),
        }
    }

    fn reply(&self, message: ServerMessage) {
        self.outbox.borrow_mut().push(message);
    }

    /// Send everything queued since the last flush
    fn flush(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let link = self.controller.current_link();
        if link != self.last_link {
            self.reply(ServerMessage {
                link: Some(link.clone()),
                ..ServerMessage::new("address")
            });
            self.last_link = link;
        }

        let pending = std::mem::take(&mut *self.outbox.borrow_mut());
        for message in pending {
            match serde_json::to_string(&message) {
                Ok(text) => ctx.text(text),
                Err(e) => warn!("Failed to encode {} message: {}", message.message_type, e),
            }
        }
    }

    fn handle_intent(&mut self, intent: SurfaceIntent) -> Result<(), SyncError> {
        match intent {
            SurfaceIntent::StartLocal => self.controller.start_local(),
            SurfaceIntent::CreateRoom => self.controller.create_room()?,
            SurfaceIntent::JoinRoom { room } => self.controller.join_room(&room)?,
            SurfaceIntent::LoadFromUrl { url } => self.controller.load_from_url(&url)?,
            SurfaceIntent::Move { from, to, promotion } => {
                self.controller
                    .request_move(MoveCandidate::Squares { from, to, promotion })?;
            }
            SurfaceIntent::Undo => {
                self.controller.request_undo()?;
            }
            SurfaceIntent::Reset => self.controller.request_reset()?,
            SurfaceIntent::Disconnect => self.controller.disconnect(),
            SurfaceIntent::BackToMenu => self.controller.back_to_menu(),
            SurfaceIntent::LegalMoves { square } => {
                let moves = self.controller.legal_destinations(&square)?;
                self.reply(ServerMessage {
                    available_moves: Some(moves),
                    ..ServerMessage::new("available_moves")
                });
            }
            SurfaceIntent::ShareLink => {
                self.reply(ServerMessage {
                    link: Some(self.controller.share_link()),
                    ..ServerMessage::new("share_link")
                });
            }
            SurfaceIntent::ResumeSavedGame => {
                self.controller.resume_saved_game()?;
            }
        }
        Ok(())
    }
}

impl Actor for SurfaceSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Surface connected: {}", self.id);

        for kind in EventKind::ALL {
            let outbox = self.outbox.clone();
            self.controller.bus().subscribe(kind, move |event| {
                outbox.borrow_mut().push(ServerMessage::from(event));
                Ok(())
            });
        }
        if let Some(peer_events) = self.peer_events.take() {
            ctx.add_stream(peer_events);
        }

        let startup = self.controller.initialize(self.startup_link.as_deref());
        if let Some(saved) = startup.saved_game {
            self.reply(ServerMessage {
                info: Some(format!("{} moves", saved.state.move_history.len())),
                state: Some(saved.state),
                ..ServerMessage::new("saved_game")
            });
        }
        self.flush(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.controller.teardown();
        info!("Surface disconnected: {}", self.id);
        Running::Stop
    }
}

// Browser intents
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SurfaceSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                debug!("Surface {} sent {}", self.id, text);
                match serde_json::from_str::<SurfaceIntent>(text.as_ref()) {
                    Ok(intent) => {
                        if let Err(e) = self.handle_intent(intent) {
                            warn!("Intent refused: {}", e);
                            self.reply(ServerMessage::error(e.to_string()));
                        }
                    }
                    Err(e) => {
                        warn!("Error parsing surface message: {}", e);
                        self.reply(ServerMessage::error(format!("Invalid message format: {}", e)));
                    }
                }
                self.flush(ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary messages are not supported");
                self.reply(ServerMessage::error("Binary messages are not supported"));
                self.flush(ctx);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

// Peer transport events
impl StreamHandler<PeerEvent> for SurfaceSocket {
    fn handle(&mut self, event: PeerEvent, ctx: &mut Self::Context) {
        self.controller.handle_peer_event(event);
        self.flush(ctx);
    }

    fn finished(&mut self, _: &mut Self::Context) {
        // The transport holds a sender for as long as the surface lives
        debug!("Peer event stream of {} ended", self.id);
    }
}

#[derive(Debug, Deserialize)]
pub struct SurfaceQuery {
    /// Address the surface was opened with, possibly carrying a shared game
    pub link: Option<String>,
}

/// Surface websocket
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<SurfaceQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let socket = SurfaceSocket::new(app_state, query.into_inner().link);
    info!("New surface connection: {}", socket.id);
    ws::start(socket, &req, stream)
}

/// Inbound connection from a guest to an advertised room
pub async fn peer_index(
    req: HttpRequest,
    stream: web::Payload,
    room: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let room = room.into_inner();
    let Some(host) = lock(&app_state.rooms).get(&room).cloned() else {
        info!("No room {} for incoming peer", room);
        return Ok(HttpResponse::NotFound().body("Room not found"));
    };

    let link = Uuid::new_v4().to_string();
    info!("Incoming peer {} for room {}", link, room);
    ws::start(PeerSocket::new(link, app_state.clone(), host), &req, stream)
}
