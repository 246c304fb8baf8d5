//! Viewer session state machine.
//!
//! All per-session state lives in [`Session`]; the async driver translates
//! socket, timer and input callbacks into [`SessionEvent`]s and executes the
//! returned [`SessionAction`]s. Nothing here touches a socket or a clock, so
//! every path can be driven deterministically in tests.
//!
//! Request discipline:
//! - at most one request in flight, identified by a [`RequestToken`]
//! - requests only while the connection is open and the queue is at or below
//!   the throttle
//! - closing invalidates the in-flight token; responses carrying a stale
//!   token are dropped

use serde::Serialize;
use starfield_shared::{config::ClientConfig, net::Frame, render::SceneBackend};
use tracing::{debug, info, warn};

use crate::{
    animator::Animator,
    camera::{pick, Camera},
    input::{Key, KeyState},
    queue::FrameQueue,
};

/// Identity of one outstanding frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(pub u64);

/// Connection lifecycle as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Open,
    Closed,
}

/// Why the connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The fixed session timeout elapsed.
    Timeout,
    /// The server closed or the stream ended.
    Remote,
    /// A socket read or write failed.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    PollTick,
    /// A batch arrived; `token` is the request it answers, `None` if nothing
    /// was outstanding.
    FramesReceived {
        token: Option<RequestToken>,
        frames: Vec<Frame>,
    },
    /// Display refresh.
    FrameTick,
    KeyDown(Key),
    KeyUp(Key),
    /// Pointer press in normalized device coordinates.
    PointerDown { x: f64, y: f64 },
    Closed(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    SendRequest(RequestToken),
    /// Animation went from idle to running.
    StartAnimation,
    CloseConnection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub requests_sent: u64,
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub frames_rendered: u64,
    pub stale_responses: u64,
}

pub struct Session {
    cfg: ClientConfig,
    conn: ConnState,
    queue: FrameQueue,
    animator: Animator,
    camera: Camera,
    keys: KeyState,
    running: bool,
    in_flight: Option<RequestToken>,
    next_token: u64,
    stats: SessionStats,
}

impl Session {
    pub fn new(cfg: ClientConfig) -> Self {
        Self {
            queue: FrameQueue::new(cfg.queue_throttle),
            animator: Animator::new(&cfg),
            camera: Camera::new(cfg.fov_deg, cfg.aspect),
            keys: KeyState::default(),
            conn: ConnState::Connecting,
            running: false,
            in_flight: None,
            next_token: 0,
            stats: SessionStats::default(),
            cfg,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn == ConnState::Open
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Closed and fully drained; nothing else can happen.
    pub fn is_finished(&self) -> bool {
        self.conn == ConnState::Closed && !self.running && self.queue.is_empty()
    }

    pub fn in_flight(&self) -> Option<RequestToken> {
        self.in_flight
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Applies one event and returns what the driver must do next.
    pub fn handle<S: SceneBackend + ?Sized>(
        &mut self,
        event: SessionEvent,
        scene: &mut S,
    ) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        match event {
            SessionEvent::Connected => {
                if self.conn == ConnState::Connecting {
                    info!("Connection open, polling for frames");
                    self.conn = ConnState::Open;
                }
            }
            SessionEvent::PollTick => {
                if let Some(token) = self.try_request() {
                    actions.push(SessionAction::SendRequest(token));
                }
            }
            SessionEvent::FramesReceived { token, frames } => {
                if self.accept_frames(token, frames) {
                    actions.push(SessionAction::StartAnimation);
                }
            }
            SessionEvent::FrameTick => self.frame_tick(scene),
            SessionEvent::KeyDown(key) => self.keys.press(key),
            SessionEvent::KeyUp(key) => self.keys.release(key),
            SessionEvent::PointerDown { x, y } => self.pointer_down(x, y),
            SessionEvent::Closed(reason) => {
                if self.conn != ConnState::Closed {
                    info!(?reason, queued = self.queue.len(), "Connection closed");
                    self.conn = ConnState::Closed;
                    self.in_flight = None;
                    if reason == CloseReason::Timeout {
                        actions.push(SessionAction::CloseConnection);
                    }
                }
            }
        }
        actions
    }

    fn try_request(&mut self) -> Option<RequestToken> {
        if self.in_flight.is_some() || !self.is_open() || !self.queue.wants_more() {
            return None;
        }
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.in_flight = Some(token);
        self.stats.requests_sent += 1;
        debug!(token = token.0, queued = self.queue.len(), "Requesting frames");
        Some(token)
    }

    /// Returns true if the animation must be started.
    fn accept_frames(&mut self, token: Option<RequestToken>, frames: Vec<Frame>) -> bool {
        if token.is_none() || self.in_flight != token {
            warn!(?token, frames = frames.len(), "Dropping response to a stale request");
            self.stats.stale_responses += 1;
            return false;
        }
        self.in_flight = None;

        let was_empty = self.queue.is_empty();
        for frame in frames {
            match frame.validate() {
                Ok(()) => {
                    self.stats.frames_received += 1;
                    self.queue.push(frame);
                }
                Err(e) => {
                    warn!(error = %e, "Rejecting malformed frame");
                    self.stats.frames_rejected += 1;
                }
            }
        }
        debug!(queued = self.queue.len(), "Frames buffered");

        if was_empty && !self.queue.is_empty() && !self.running {
            self.running = true;
            return true;
        }
        false
    }

    fn frame_tick<S: SceneBackend + ?Sized>(&mut self, scene: &mut S) {
        let moved = self.keys.is_moving();
        if moved {
            let delta = self.keys.movement(&self.camera, self.cfg.camera_step);
            self.camera.translate(delta);
        }

        if self.running {
            match self.queue.pop() {
                Some(frame) => {
                    self.animator.apply(&frame, scene);
                    self.render(scene);
                    self.stats.frames_rendered += 1;
                }
                None => {
                    debug!("Queue drained, animation idle");
                    self.running = false;
                    if moved {
                        self.render(scene);
                    }
                }
            }
        } else if moved {
            self.render(scene);
        }
    }

    fn pointer_down(&mut self, x: f64, y: f64) {
        let (origin, dir) = self.camera.ray(x, y);
        let centers = self.animator.entities().values().map(|v| v.position);
        if let Some(hit) = pick(origin, dir, self.animator.node_radius(), centers) {
            debug!(?hit, "Looking at picked entity");
            self.camera.look_at(hit);
        }
    }

    fn render<S: SceneBackend + ?Sized>(&self, scene: &mut S) {
        scene.set_view(self.camera.eye, self.camera.target);
        scene.render();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfield_shared::{math::Vec3, net::EntityKey, render::HeadlessScene};

    fn frame(entities: &[(&str, [f64; 3])]) -> Frame {
        Frame::from_entities(
            entities
                .iter()
                .map(|(id, p)| (EntityKey::from(*id), Vec3::new(p[0], p[1], p[2]))),
        )
    }

    fn open_session() -> (Session, HeadlessScene) {
        let mut scene = HeadlessScene::new();
        let mut s = Session::new(ClientConfig::default());
        s.handle(SessionEvent::Connected, &mut scene);
        (s, scene)
    }

    /// Sends a request and answers it with `frames`.
    fn deliver(
        s: &mut Session,
        scene: &mut HeadlessScene,
        frames: Vec<Frame>,
    ) -> Vec<SessionAction> {
        let actions = s.handle(SessionEvent::PollTick, scene);
        let Some(SessionAction::SendRequest(token)) = actions.first().copied() else {
            panic!("expected a request, got {actions:?}");
        };
        s.handle(
            SessionEvent::FramesReceived {
                token: Some(token),
                frames,
            },
            scene,
        )
    }

    #[test]
    fn no_request_before_connect() {
        let mut scene = HeadlessScene::new();
        let mut s = Session::new(ClientConfig::default());
        assert!(s.handle(SessionEvent::PollTick, &mut scene).is_empty());
    }

    #[test]
    fn single_frame_scenario() {
        let (mut s, mut scene) = open_session();
        let actions = deliver(
            &mut s,
            &mut scene,
            vec![frame(&[("a", [0.0; 3]), ("b", [1.0; 3])])],
        );
        assert_eq!(actions, vec![SessionAction::StartAnimation]);
        assert!(s.is_running());

        s.handle(SessionEvent::FrameTick, &mut scene);
        let ents = s.animator().entities();
        assert_eq!(ents.len(), 2);
        assert_eq!(s.animator().entity("a").unwrap().position, Vec3::ZERO);
        assert_eq!(s.animator().entity("b").unwrap().position, Vec3::new(1.0, 1.0, 1.0));
        assert!(s.queue().is_empty());
        assert!(s.is_running());
        assert_eq!(scene.renders, 1);

        s.handle(SessionEvent::FrameTick, &mut scene);
        assert!(!s.is_running());
        assert_eq!(scene.renders, 1);
    }

    #[test]
    fn entity_absent_from_next_frame_is_removed() {
        let (mut s, mut scene) = open_session();
        deliver(
            &mut s,
            &mut scene,
            vec![frame(&[("a", [0.0; 3]), ("b", [0.0; 3])]), frame(&[("b", [1.0; 3])])],
        );
        s.handle(SessionEvent::FrameTick, &mut scene);
        assert!(s.animator().entity("a").is_some());
        s.handle(SessionEvent::FrameTick, &mut scene);
        assert!(s.animator().entity("a").is_none());
        assert_eq!(s.animator().entities().len(), 1);
    }

    #[test]
    fn frames_render_in_arrival_order() {
        let (mut s, mut scene) = open_session();
        deliver(
            &mut s,
            &mut scene,
            vec![frame(&[("a", [1.0; 3])]), frame(&[("a", [2.0; 3])])],
        );
        s.handle(SessionEvent::FrameTick, &mut scene);
        assert_eq!(s.animator().entity("a").unwrap().position, Vec3::new(1.0, 1.0, 1.0));
        deliver(&mut s, &mut scene, vec![frame(&[("a", [3.0; 3])])]);
        s.handle(SessionEvent::FrameTick, &mut scene);
        assert_eq!(s.animator().entity("a").unwrap().position, Vec3::new(2.0, 2.0, 2.0));
        s.handle(SessionEvent::FrameTick, &mut scene);
        assert_eq!(s.animator().entity("a").unwrap().position, Vec3::new(3.0, 3.0, 3.0));
    }

    #[test]
    fn throttle_blocks_requests_above_depth() {
        let (mut s, mut scene) = open_session();
        let eleven = (0..11).map(|_| frame(&[("a", [0.0; 3])])).collect();
        deliver(&mut s, &mut scene, eleven);
        assert_eq!(s.queue().len(), 11);
        assert!(s.handle(SessionEvent::PollTick, &mut scene).is_empty());

        s.handle(SessionEvent::FrameTick, &mut scene);
        assert_eq!(s.queue().len(), 10);
        let actions = s.handle(SessionEvent::PollTick, &mut scene);
        assert!(matches!(actions.as_slice(), [SessionAction::SendRequest(_)]));
    }

    #[test]
    fn only_one_request_in_flight() {
        let (mut s, mut scene) = open_session();
        let first = s.handle(SessionEvent::PollTick, &mut scene);
        assert_eq!(first.len(), 1);
        assert!(s.handle(SessionEvent::PollTick, &mut scene).is_empty());
        assert_eq!(s.stats().requests_sent, 1);
    }

    #[test]
    fn mismatched_frames_never_reach_the_queue() {
        let (mut s, mut scene) = open_session();
        let bad = Frame {
            ids: vec!["a".into(), "b".into()],
            positions: vec![0.0, 0.0, 0.0],
        };
        let actions = deliver(&mut s, &mut scene, vec![bad, frame(&[("c", [0.0; 3])])]);
        assert_eq!(actions, vec![SessionAction::StartAnimation]);
        assert_eq!(s.queue().len(), 1);
        assert_eq!(s.stats().frames_rejected, 1);
        assert_eq!(s.stats().frames_received, 1);
    }

    #[test]
    fn all_bad_batch_does_not_start_animation() {
        let (mut s, mut scene) = open_session();
        let bad = Frame {
            ids: vec!["a".into()],
            positions: vec![],
        };
        assert!(deliver(&mut s, &mut scene, vec![bad]).is_empty());
        assert!(!s.is_running());
    }

    #[test]
    fn duplicate_ids_are_rejected_before_the_animator() {
        let (mut s, mut scene) = open_session();
        let dup = frame(&[("a", [0.0; 3]), ("a", [1.0; 3])]);
        assert!(deliver(&mut s, &mut scene, vec![dup]).is_empty());
        assert_eq!(s.stats().frames_rejected, 1);
        assert!(s.queue().is_empty());
    }

    #[test]
    fn unsolicited_batch_counts_as_stale() {
        let (mut s, mut scene) = open_session();
        let actions = s.handle(
            SessionEvent::FramesReceived {
                token: None,
                frames: vec![frame(&[("a", [0.0; 3])])],
            },
            &mut scene,
        );
        assert!(actions.is_empty());
        assert!(s.queue().is_empty());
        assert_eq!(s.stats().stale_responses, 1);
        assert_eq!(s.stats().frames_received, 0);
    }

    #[test]
    fn response_after_timeout_is_ignored() {
        let (mut s, mut scene) = open_session();
        let actions = s.handle(SessionEvent::PollTick, &mut scene);
        let Some(SessionAction::SendRequest(token)) = actions.first().copied() else {
            panic!("expected a request");
        };
        let closed = s.handle(SessionEvent::Closed(CloseReason::Timeout), &mut scene);
        assert_eq!(closed, vec![SessionAction::CloseConnection]);
        assert_eq!(s.in_flight(), None);

        let late = s.handle(
            SessionEvent::FramesReceived {
                token: Some(token),
                frames: vec![frame(&[("a", [0.0; 3])])],
            },
            &mut scene,
        );
        assert!(late.is_empty());
        assert!(s.queue().is_empty());
        assert_eq!(s.stats().stale_responses, 1);
        assert!(s.is_finished());
        assert!(s.handle(SessionEvent::PollTick, &mut scene).is_empty());
    }

    #[test]
    fn closed_session_drains_queue_then_finishes() {
        let (mut s, mut scene) = open_session();
        deliver(
            &mut s,
            &mut scene,
            vec![frame(&[("a", [0.0; 3])]), frame(&[("a", [1.0; 3])])],
        );
        assert!(s.handle(SessionEvent::Closed(CloseReason::Remote), &mut scene).is_empty());
        assert!(!s.is_finished());
        s.handle(SessionEvent::FrameTick, &mut scene);
        s.handle(SessionEvent::FrameTick, &mut scene);
        s.handle(SessionEvent::FrameTick, &mut scene);
        assert!(s.is_finished());
        assert_eq!(s.stats().frames_rendered, 2);
    }

    #[test]
    fn held_key_pans_camera_even_when_idle() {
        let (mut s, mut scene) = open_session();
        let eye = s.camera().eye;
        s.handle(SessionEvent::KeyDown(Key::Right), &mut scene);
        s.handle(SessionEvent::FrameTick, &mut scene);
        s.handle(SessionEvent::KeyUp(Key::Right), &mut scene);
        s.handle(SessionEvent::FrameTick, &mut scene);
        assert_eq!(s.camera().eye, eye + Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(scene.renders, 1);
        assert_eq!(scene.view.map(|(e, _)| e), Some(s.camera().eye));
    }

    #[test]
    fn pointer_on_entity_turns_camera_toward_it() {
        let (mut s, mut scene) = open_session();
        deliver(&mut s, &mut scene, vec![frame(&[("a", [0.0, 0.0, 5.0])])]);
        s.handle(SessionEvent::FrameTick, &mut scene);

        s.handle(SessionEvent::PointerDown { x: 0.0, y: 0.0 }, &mut scene);
        let target = s.camera().target;
        assert!((target - Vec3::new(0.0, 0.0, 5.5)).len() < 1e-9);

        s.handle(SessionEvent::PointerDown { x: 0.9, y: 0.9 }, &mut scene);
        assert_eq!(s.camera().target, target);
    }
}
