use actix::prelude::*;
use actix_web::web;
use actix_web_actors::ws;
use futures::channel::mpsc::UnboundedSender;
use log::{debug, info, warn};

use chess_sync::session::{LinkId, PeerEvent};

use crate::websocket::app_state::{lock, AppState};

/// Frame the host wants delivered to its guest
#[derive(Message)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub String);

/// Host decisions about an inbound link
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
#[rtype(result = "()")]
pub enum LinkControl {
    Accept,
    Refuse,
    Close,
}

/// A guest's websocket into a hosting surface.
///
/// Frames are held back until the host accepts the link, then forwarded to
/// the host's session as [`PeerEvent::Data`].
pub struct PeerSocket {
    pub link: String,
    pub app_state: web::Data<AppState>,
    pub host: UnboundedSender<PeerEvent>,
    accepted: bool,
    held: Vec<String>,
}

impl PeerSocket {
    pub fn new(link: String, app_state: web::Data<AppState>, host: UnboundedSender<PeerEvent>) -> Self {
        PeerSocket {
            link,
            app_state,
            host,
            accepted: false,
            held: Vec::new(),
        }
    }

    fn forward(&mut self, event: PeerEvent, ctx: &mut ws::WebsocketContext<Self>) {
        if self.host.unbounded_send(event).is_err() {
            // The hosting surface is gone
            debug!("Host of link {} went away", self.link);
            self.accepted = false;
            ctx.close(None);
            ctx.stop();
        }
    }
}

impl Actor for PeerSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        lock(&self.app_state.links).insert(self.link.clone(), ctx.address());
        info!("Peer link {} opened", self.link);
        let link = LinkId(self.link.clone());
        self.forward(PeerEvent::Incoming { link }, ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        lock(&self.app_state.links).remove(&self.link);
        if self.accepted {
            let _ = self.host.unbounded_send(PeerEvent::Closed);
        }
        info!("Peer link {} closed", self.link);
        Running::Stop
    }
}

impl Handler<OutboundFrame> for PeerSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<LinkControl> for PeerSocket {
    type Result = ();

    fn handle(&mut self, msg: LinkControl, ctx: &mut Self::Context) {
        debug!("Link {}: {:?}", self.link, msg);
        match msg {
            LinkControl::Accept => {
                self.accepted = true;
                for frame in std::mem::take(&mut self.held) {
                    self.forward(PeerEvent::Data(frame), ctx);
                }
            }
            LinkControl::Refuse | LinkControl::Close => {
                // The host already knows; no Closed event back to it
                self.accepted = false;
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for PeerSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                if self.accepted {
                    self.forward(PeerEvent::Data(text.to_string()), ctx);
                } else {
                    self.held.push(text.to_string());
                }
            }
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary frame on peer link {} ignored", self.link);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Guest closed link {}: {:?}", self.link, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Peer link {} protocol error: {}", self.link, e);
                if self.accepted {
                    self.accepted = false;
                    let _ = self.host.unbounded_send(PeerEvent::Error(e.to_string()));
                }
                ctx.stop();
            }
        }
    }
}
