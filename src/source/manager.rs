//! フレームソースの状態機械
//!
//! 同時にアクティブなソースは高々 1 つ。新しいソースの取得は、前のソースの解放が
//! 完了してから始める。取得は別スレッドで行い、結果は受信箱経由で `pump` 時に反映する。

use log::{debug, info, warn};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::device::{
    CameraDevice, DepthSessionProvider, EndSignal, Facing, FrameStream, SessionCapabilities,
};
use super::frame::SourceFrame;
use crate::config::Config;
use crate::error::SourceError;

/// 外部から観測できる状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSourceState {
    Idle,
    CameraStarting,
    CameraActive,
    SessionRequesting,
    SessionActive,
    /// 前のソースの解放（または取り消した取得の戻り）待ち
    Stopping,
}

impl FrameSourceState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::CameraActive | Self::SessionActive)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::CameraStarting | Self::SessionRequesting | Self::Stopping)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    Session,
}

impl SourceKind {
    fn active_state(self) -> FrameSourceState {
        match self {
            Self::Camera => FrameSourceState::CameraActive,
            Self::Session => FrameSourceState::SessionActive,
        }
    }

    fn pending_state(self) -> FrameSourceState {
        match self {
            Self::Camera => FrameSourceState::CameraStarting,
            Self::Session => FrameSourceState::SessionRequesting,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera => f.write_str("camera"),
            Self::Session => f.write_str("depth session"),
        }
    }
}

/// ソースが止まった理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// 呼び出し側の stop / end_session
    Requested,
    /// 別ソースへの切り替え
    Switched,
    /// プラットフォームによる終了
    Terminated,
    /// 読み取り中のハード障害
    Failed(SourceError),
}

/// `pump` が返す遷移結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Activated(SourceKind),
    Failed { kind: SourceKind, error: SourceError },
    Stopped { kind: SourceKind, reason: StopReason },
}

/// 受信箱のメッセージ
pub(crate) enum Event {
    Acquired {
        ticket: u64,
        kind: SourceKind,
        result: Result<Box<dyn FrameStream>, SourceError>,
    },
    Ended {
        ticket: u64,
    },
}

struct ActiveSource {
    kind: SourceKind,
    ticket: u64,
    stream: Box<dyn FrameStream>,
}

struct InFlight {
    ticket: u64,
    kind: SourceKind,
    cancelled: bool,
    /// 許可が届く前にプラットフォームが終了を通知した
    ended: bool,
}

/// カメラと深度セッションを調停するマネージャ
pub struct FrameSourceManager {
    camera: Arc<dyn CameraDevice>,
    sessions: Arc<dyn DepthSessionProvider>,
    facing: Facing,
    capabilities: SessionCapabilities,
    resume_camera_on_end: bool,

    state: FrameSourceState,
    active: Option<ActiveSource>,
    in_flight: Option<InFlight>,
    queued: Option<SourceKind>,
    next_ticket: u64,

    tx: Sender<Event>,
    rx: Receiver<Event>,
    /// false になった後は取得スレッドが受信箱へ送らず、自分で解放する
    inbox_open: Arc<Mutex<bool>>,
    outcomes: Vec<SourceOutcome>,
}

impl FrameSourceManager {
    pub fn new(camera: Arc<dyn CameraDevice>, sessions: Arc<dyn DepthSessionProvider>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            camera,
            sessions,
            facing: Facing::default(),
            capabilities: SessionCapabilities::default(),
            resume_camera_on_end: false,
            state: FrameSourceState::Idle,
            active: None,
            in_flight: None,
            queued: None,
            next_ticket: 1,
            tx,
            rx,
            inbox_open: Arc::new(Mutex::new(true)),
            outcomes: Vec::new(),
        }
    }

    /// 設定から作成
    pub fn from_config(
        config: &Config,
        camera: Arc<dyn CameraDevice>,
        sessions: Arc<dyn DepthSessionProvider>,
    ) -> Self {
        Self::new(camera, sessions)
            .with_facing(config.camera.facing)
            .with_capabilities(config.session.capabilities())
            .with_resume_camera_on_end(config.session.resume_camera_on_end)
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_capabilities(mut self, capabilities: SessionCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_resume_camera_on_end(mut self, resume: bool) -> Self {
        self.resume_camera_on_end = resume;
        self
    }

    pub fn state(&self) -> FrameSourceState {
        self.state
    }

    pub fn active_kind(&self) -> Option<SourceKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// 次に取得するカメラの向き（取得済みのストリームには影響しない）
    pub fn set_facing(&mut self, facing: Facing) {
        self.facing = facing;
    }

    /// カメラを開始する。既にカメラが対象なら false
    pub fn start_camera(&mut self) -> bool {
        self.request(SourceKind::Camera)
    }

    /// 深度セッションを開始する。カメラが動いていれば先に解放する
    pub fn start_session(&mut self) -> bool {
        self.request(SourceKind::Session)
    }

    /// 深度セッションを終了する。セッションが対象でなければ何もしない
    pub fn end_session(&mut self) -> bool {
        if self.target() != Some(SourceKind::Session) {
            return false;
        }
        self.stop();
        if self.resume_camera_on_end {
            self.start_camera();
        }
        true
    }

    /// すべてのソースを解放し、取得中のものを取り消す
    ///
    /// 何度呼んでもよい。解放・取り消し対象が無ければ false。
    pub fn stop(&mut self) -> bool {
        let mut changed = self.queued.take().is_some();
        if let Some(active) = self.active.take() {
            self.release_active(active, StopReason::Requested);
            changed = true;
        }
        if let Some(in_flight) = self.in_flight.as_mut() {
            changed |= !in_flight.cancelled;
            in_flight.cancelled = true;
        }
        self.settle();
        changed
    }

    /// 受信箱を処理して遷移結果を返す（ブロックしない）
    pub fn pump(&mut self) -> Vec<SourceOutcome> {
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
        }
        std::mem::take(&mut self.outcomes)
    }

    /// 受信箱にメッセージが届くまで最大 `timeout` 待ってから `pump` する
    pub fn wait_for_events(&mut self, timeout: Duration) -> Vec<SourceOutcome> {
        if self.outcomes.is_empty() {
            // tx を自分で持っているので切断は起きない
            if let Ok(event) = self.rx.recv_timeout(timeout) {
                self.handle(event);
            }
        }
        self.pump()
    }

    /// アクティブなソースから次のフレームを取り出す
    ///
    /// フレーム未到着なら None（ログは出さない）。ハード障害ならソースを解放して Idle に戻る。
    pub fn next_frame(&mut self) -> Option<SourceFrame<'_>> {
        let advanced = self.active.as_mut()?.stream.advance();
        match advanced {
            Ok(true) => {}
            Ok(false) => return None,
            Err(error) => {
                if let Some(active) = self.active.take() {
                    warn!("{} failed: {}", active.kind, error);
                    self.release_active(active, StopReason::Failed(error));
                }
                self.settle();
                return None;
            }
        }
        self.active.as_ref().and_then(|a| a.stream.current())
    }

    /// 現在向かっているソース（アクティブ・取得中・待機中）
    fn target(&self) -> Option<SourceKind> {
        if let Some(active) = &self.active {
            return Some(active.kind);
        }
        if let Some(in_flight) = self.in_flight.as_ref().filter(|f| !f.cancelled) {
            return Some(in_flight.kind);
        }
        self.queued
    }

    fn request(&mut self, kind: SourceKind) -> bool {
        if self.target() == Some(kind) {
            debug!("{} already requested", kind);
            return false;
        }
        self.queued = Some(kind);
        if let Some(active) = self.active.take() {
            self.release_active(active, StopReason::Switched);
        }
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.cancelled = true;
        }
        self.settle();
        true
    }

    /// 内部状態から公開状態を決め、解放が済んでいれば待機中の取得を始める
    fn settle(&mut self) {
        if self.active.is_none() && self.in_flight.is_none() {
            if let Some(kind) = self.queued.take() {
                self.spawn_acquisition(kind);
            }
        }
        self.state = match (&self.active, &self.in_flight) {
            (Some(active), _) => active.kind.active_state(),
            (None, Some(f)) if !f.cancelled => f.kind.pending_state(),
            (None, Some(_)) => FrameSourceState::Stopping,
            (None, None) if self.queued.is_some() => FrameSourceState::Stopping,
            (None, None) => FrameSourceState::Idle,
        };
    }

    fn spawn_acquisition(&mut self, kind: SourceKind) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let tx = self.tx.clone();
        let inbox_open = Arc::clone(&self.inbox_open);
        let ended = EndSignal::new(ticket, self.tx.clone());
        let facing = self.facing;
        let capabilities = self.capabilities;
        let camera = Arc::clone(&self.camera);
        let sessions = Arc::clone(&self.sessions);

        info!("requesting {} (ticket {})", kind, ticket);
        let spawned = thread::Builder::new()
            .name(format!("acquire-{}", ticket))
            .spawn(move || {
                let result = match kind {
                    SourceKind::Camera => camera.acquire(facing, ended),
                    SourceKind::Session => sessions.request_session(capabilities, ended),
                };
                let event = Event::Acquired { ticket, kind, result };
                // 受信箱が閉じていれば（マネージャ破棄後）自分で解放する
                let open = inbox_open.lock().unwrap_or_else(|e| e.into_inner());
                let undelivered = if *open {
                    tx.send(event).err().map(|mpsc::SendError(event)| event)
                } else {
                    Some(event)
                };
                drop(open);
                if let Some(Event::Acquired { result: Ok(stream), .. }) = undelivered {
                    match kind {
                        SourceKind::Camera => camera.release(stream),
                        SourceKind::Session => sessions.end_session(stream),
                    }
                }
            });

        match spawned {
            Ok(_) => {
                self.in_flight = Some(InFlight { ticket, kind, cancelled: false, ended: false });
            }
            Err(e) => {
                let error = SourceError::hardware(format!("failed to spawn acquisition: {e}"));
                warn!("{} not started: {}", kind, error);
                self.outcomes.push(SourceOutcome::Failed { kind, error });
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Acquired { ticket, kind, result } => self.on_acquired(ticket, kind, result),
            Event::Ended { ticket } => self.on_ended(ticket),
        }
        self.settle();
    }

    fn on_acquired(
        &mut self,
        ticket: u64,
        kind: SourceKind,
        result: Result<Box<dyn FrameStream>, SourceError>,
    ) {
        let (cancelled, ended) = match self.in_flight.as_ref().filter(|f| f.ticket == ticket) {
            Some(in_flight) => (in_flight.cancelled, in_flight.ended),
            None => {
                if let Ok(stream) = result {
                    warn!("unexpected {} grant (ticket {}), releasing", kind, ticket);
                    self.release_stream(kind, stream);
                }
                return;
            }
        };
        self.in_flight = None;

        match (cancelled, result) {
            (false, Ok(stream)) if ended => {
                info!("{} ended by platform before activation (ticket {})", kind, ticket);
                self.release_stream(kind, stream);
                self.outcomes.push(SourceOutcome::Stopped { kind, reason: StopReason::Terminated });
                self.queue_resume(kind);
            }
            (false, Ok(stream)) => {
                info!("{} active (ticket {})", kind, ticket);
                self.active = Some(ActiveSource { kind, ticket, stream });
                self.outcomes.push(SourceOutcome::Activated(kind));
            }
            (true, Ok(stream)) => {
                debug!("{} granted after cancel (ticket {}), releasing", kind, ticket);
                self.release_stream(kind, stream);
            }
            (false, Err(error)) => {
                warn!("{} not started: {}", kind, error);
                self.outcomes.push(SourceOutcome::Failed { kind, error });
            }
            (true, Err(error)) => {
                debug!("cancelled {} request failed: {}", kind, error);
            }
        }
    }

    fn on_ended(&mut self, ticket: u64) {
        if let Some(in_flight) = self.in_flight.as_mut().filter(|f| f.ticket == ticket) {
            // 許可が届いた時点で解放し、終了として通知する
            in_flight.ended = true;
            return;
        }
        match self.active.take() {
            Some(active) if active.ticket == ticket => {
                info!("{} ended by platform", active.kind);
                let kind = active.kind;
                self.release_active(active, StopReason::Terminated);
                self.queue_resume(kind);
            }
            other => {
                self.active = other;
                debug!("end notification for released source (ticket {})", ticket);
            }
        }
    }

    /// プラットフォームがセッションを終わらせたらカメラへ戻る（設定時のみ）
    fn queue_resume(&mut self, ended: SourceKind) {
        if ended == SourceKind::Session && self.resume_camera_on_end && self.queued.is_none() {
            self.queued = Some(SourceKind::Camera);
        }
    }

    fn release_active(&mut self, active: ActiveSource, reason: StopReason) {
        self.state = FrameSourceState::Stopping;
        debug!("releasing {} (ticket {}, {:?})", active.kind, active.ticket, reason);
        self.release_stream(active.kind, active.stream);
        self.outcomes.push(SourceOutcome::Stopped { kind: active.kind, reason });
    }

    fn release_stream(&self, kind: SourceKind, stream: Box<dyn FrameStream>) {
        match kind {
            SourceKind::Camera => self.camera.release(stream),
            SourceKind::Session => self.sessions.end_session(stream),
        }
    }
}

impl Drop for FrameSourceManager {
    fn drop(&mut self) {
        self.stop();
        // 閉じた後に届く許可は取得スレッドが解放する
        *self.inbox_open.lock().unwrap_or_else(|e| e.into_inner()) = false;
        while let Ok(event) = self.rx.try_recv() {
            if let Event::Acquired { kind, result: Ok(stream), .. } = event {
                self.release_stream(kind, stream);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::synthetic::{
        AcquireBehavior, Gate, HardwareLedger, SyntheticCamera, SyntheticSession,
    };

    const WAIT: Duration = Duration::from_secs(5);

    struct Rig {
        ledger: Arc<HardwareLedger>,
        camera: Arc<SyntheticCamera>,
        session: Arc<SyntheticSession>,
        manager: FrameSourceManager,
    }

    fn rig_with(camera: SyntheticCamera, session: SyntheticSession) -> Rig {
        let ledger = camera.ledger();
        let camera = Arc::new(camera);
        let session = Arc::new(session);
        let manager = FrameSourceManager::new(camera.clone(), session.clone());
        Rig { ledger, camera, session, manager }
    }

    fn rig() -> Rig {
        let ledger = HardwareLedger::new();
        rig_with(
            SyntheticCamera::new(640, 480, ledger.clone()),
            SyntheticSession::new(640, 480, ledger),
        )
    }

    /// 期待する状態になるまで受信箱を処理する
    fn settle_until(m: &mut FrameSourceManager, state: FrameSourceState) -> Vec<SourceOutcome> {
        let mut outcomes = Vec::new();
        let deadline = std::time::Instant::now() + WAIT;
        while m.state() != state {
            assert!(std::time::Instant::now() < deadline, "stuck in {:?}", m.state());
            outcomes.extend(m.wait_for_events(Duration::from_millis(50)));
        }
        outcomes
    }

    #[test]
    fn test_camera_start_and_grant() {
        let mut r = rig();
        assert_eq!(r.manager.state(), FrameSourceState::Idle);
        assert!(r.manager.start_camera());
        assert_eq!(r.manager.state(), FrameSourceState::CameraStarting);

        let outcomes = settle_until(&mut r.manager, FrameSourceState::CameraActive);
        assert_eq!(outcomes, vec![SourceOutcome::Activated(SourceKind::Camera)]);
        assert_eq!(r.manager.active_kind(), Some(SourceKind::Camera));
        assert!(r.ledger.camera_held());

        let frame = r.manager.next_frame().expect("frame");
        assert!(frame.depth.is_none());
        assert_eq!(frame.frame.width(), 640);
    }

    #[test]
    fn test_start_camera_twice_is_noop() {
        let mut r = rig();
        assert!(r.manager.start_camera());
        assert!(!r.manager.start_camera());
        settle_until(&mut r.manager, FrameSourceState::CameraActive);
        assert!(!r.manager.start_camera());
        assert_eq!(r.ledger.camera_acquires(), 1);
    }

    #[test]
    fn test_camera_denied_returns_to_idle() {
        let ledger = HardwareLedger::new();
        let mut r = rig_with(
            SyntheticCamera::new(640, 480, ledger.clone())
                .with_behavior(AcquireBehavior::Deny),
            SyntheticSession::new(640, 480, ledger),
        );
        r.manager.start_camera();
        let outcomes = settle_until(&mut r.manager, FrameSourceState::Idle);
        assert!(matches!(
            outcomes.as_slice(),
            [SourceOutcome::Failed { kind: SourceKind::Camera, error: SourceError::PermissionDenied(_) }]
        ));
        assert!(!r.ledger.camera_held());
    }

    #[test]
    fn test_session_unsupported_is_reported() {
        let ledger = HardwareLedger::new();
        let mut r = rig_with(
            SyntheticCamera::new(640, 480, ledger.clone()),
            SyntheticSession::new(640, 480, ledger).with_behavior(AcquireBehavior::Unsupported),
        );
        r.manager.start_session();
        assert_eq!(r.manager.state(), FrameSourceState::SessionRequesting);
        let outcomes = settle_until(&mut r.manager, FrameSourceState::Idle);
        match &outcomes[..] {
            [SourceOutcome::Failed { kind: SourceKind::Session, error }] => {
                assert!(error.is_capability_gap())
            }
            other => panic!("unexpected outcomes: {other:?}"),
        }
    }

    #[test]
    fn test_camera_to_session_never_overlaps() {
        let mut r = rig();
        r.manager.start_camera();
        settle_until(&mut r.manager, FrameSourceState::CameraActive);

        assert!(r.manager.start_session());
        // カメラは同期的に解放済み
        assert!(!r.ledger.camera_held());
        assert_eq!(r.manager.state(), FrameSourceState::SessionRequesting);

        let outcomes = settle_until(&mut r.manager, FrameSourceState::SessionActive);
        assert_eq!(
            outcomes,
            vec![
                SourceOutcome::Stopped { kind: SourceKind::Camera, reason: StopReason::Switched },
                SourceOutcome::Activated(SourceKind::Session),
            ]
        );
        assert!(r.ledger.session_held());
        assert_eq!(r.ledger.overlaps(), 0);

        let frame = r.manager.next_frame().expect("frame");
        assert!(frame.depth.is_some());
    }

    #[test]
    fn test_end_session_returns_to_idle() {
        let mut r = rig();
        r.manager.start_session();
        settle_until(&mut r.manager, FrameSourceState::SessionActive);

        assert!(r.manager.end_session());
        assert_eq!(r.manager.state(), FrameSourceState::Idle);
        assert!(!r.ledger.session_held());
        assert!(!r.manager.end_session());
    }

    #[test]
    fn test_end_session_resumes_camera() {
        let mut r = rig();
        r.manager = FrameSourceManager::new(r.camera.clone(), r.session.clone())
            .with_resume_camera_on_end(true);
        r.manager.start_session();
        settle_until(&mut r.manager, FrameSourceState::SessionActive);

        r.manager.end_session();
        assert_eq!(r.manager.state(), FrameSourceState::CameraStarting);
        settle_until(&mut r.manager, FrameSourceState::CameraActive);
        assert_eq!(r.ledger.overlaps(), 0);
    }

    #[test]
    fn test_double_stop_is_noop() {
        let mut r = rig();
        r.manager.start_camera();
        settle_until(&mut r.manager, FrameSourceState::CameraActive);

        assert!(r.manager.stop());
        assert!(!r.manager.stop());
        assert_eq!(r.manager.state(), FrameSourceState::Idle);
        assert_eq!(r.ledger.camera_releases(), 1);
        let outcomes = r.manager.pump();
        assert_eq!(
            outcomes,
            vec![SourceOutcome::Stopped { kind: SourceKind::Camera, reason: StopReason::Requested }]
        );
    }

    #[test]
    fn test_platform_end_after_explicit_stop_is_noop() {
        let mut r = rig();
        r.manager.start_session();
        settle_until(&mut r.manager, FrameSourceState::SessionActive);

        r.manager.end_session();
        r.manager.pump();
        r.session.terminate();
        let outcomes = r.manager.wait_for_events(Duration::from_millis(200));
        assert!(outcomes.is_empty());
        assert_eq!(r.ledger.session_releases(), 1);
        assert_eq!(r.manager.state(), FrameSourceState::Idle);
    }

    #[test]
    fn test_platform_termination_releases_session() {
        let mut r = rig();
        r.manager.start_session();
        settle_until(&mut r.manager, FrameSourceState::SessionActive);

        r.session.terminate();
        let outcomes = settle_until(&mut r.manager, FrameSourceState::Idle);
        assert_eq!(
            outcomes,
            vec![SourceOutcome::Stopped {
                kind: SourceKind::Session,
                reason: StopReason::Terminated
            }]
        );
        assert!(!r.ledger.session_held());
    }

    #[test]
    fn test_stop_while_pending_releases_late_grant() {
        let ledger = HardwareLedger::new();
        let (gate, key) = Gate::new();
        let mut r = rig_with(
            SyntheticCamera::new(640, 480, ledger.clone()).with_gate(gate),
            SyntheticSession::new(640, 480, ledger),
        );
        r.manager.start_camera();
        assert_eq!(r.manager.state(), FrameSourceState::CameraStarting);

        assert!(r.manager.stop());
        assert_eq!(r.manager.state(), FrameSourceState::Stopping);

        key.open();
        let outcomes = settle_until(&mut r.manager, FrameSourceState::Idle);
        assert!(outcomes.is_empty());
        assert_eq!(r.ledger.camera_acquires(), 1);
        assert_eq!(r.ledger.camera_releases(), 1);
        assert!(!r.ledger.camera_held());
    }

    #[test]
    fn test_session_waits_for_cancelled_camera() {
        let ledger = HardwareLedger::new();
        let (gate, key) = Gate::new();
        let mut r = rig_with(
            SyntheticCamera::new(640, 480, ledger.clone()).with_gate(gate),
            SyntheticSession::new(640, 480, ledger),
        );
        r.manager.start_camera();
        r.manager.start_session();
        // カメラ取得が戻るまでセッション要求は出さない
        assert_eq!(r.manager.state(), FrameSourceState::Stopping);
        assert_eq!(r.ledger.session_acquires(), 0);

        key.open();
        settle_until(&mut r.manager, FrameSourceState::SessionActive);
        assert_eq!(r.ledger.camera_releases(), 1);
        assert_eq!(r.ledger.overlaps(), 0);
    }

    #[test]
    fn test_stream_failure_returns_to_idle() {
        let ledger = HardwareLedger::new();
        let mut r = rig_with(
            SyntheticCamera::new(640, 480, ledger.clone()).with_fail_after(2),
            SyntheticSession::new(640, 480, ledger),
        );
        r.manager.start_camera();
        settle_until(&mut r.manager, FrameSourceState::CameraActive);

        assert!(r.manager.next_frame().is_some());
        assert!(r.manager.next_frame().is_some());
        assert!(r.manager.next_frame().is_none());
        assert_eq!(r.manager.state(), FrameSourceState::Idle);
        assert!(!r.ledger.camera_held());
        let outcomes = r.manager.pump();
        assert!(matches!(
            outcomes.as_slice(),
            [SourceOutcome::Stopped { kind: SourceKind::Camera, reason: StopReason::Failed(_) }]
        ));
    }

    #[test]
    fn test_warmup_frames_are_skipped() {
        let ledger = HardwareLedger::new();
        let mut r = rig_with(
            SyntheticCamera::new(640, 480, ledger.clone()).with_warmup(2),
            SyntheticSession::new(640, 480, ledger),
        );
        r.manager.start_camera();
        settle_until(&mut r.manager, FrameSourceState::CameraActive);
        assert!(r.manager.next_frame().is_none());
        assert!(r.manager.next_frame().is_none());
        assert!(r.manager.next_frame().is_some());
        assert_eq!(r.manager.state(), FrameSourceState::CameraActive);
    }

    #[test]
    fn test_drop_releases_active_source() {
        let mut r = rig();
        r.manager.start_camera();
        settle_until(&mut r.manager, FrameSourceState::CameraActive);
        drop(r.manager);
        assert!(!r.ledger.camera_held());
    }

    /// 許可を返す直前にプラットフォームが終了を通知するセッション
    struct EndsBeforeGrant(SyntheticSession);

    impl DepthSessionProvider for EndsBeforeGrant {
        fn request_session(
            &self,
            capabilities: SessionCapabilities,
            ended: EndSignal,
        ) -> Result<Box<dyn FrameStream>, SourceError> {
            let stream = self.0.request_session(capabilities, ended.clone())?;
            ended.notify();
            Ok(stream)
        }

        fn end_session(&self, session: Box<dyn FrameStream>) {
            self.0.end_session(session)
        }
    }

    fn ends_before_grant_rig(resume: bool) -> (Arc<HardwareLedger>, FrameSourceManager) {
        let ledger = HardwareLedger::new();
        let camera = SyntheticCamera::new(640, 480, ledger.clone());
        let session = EndsBeforeGrant(SyntheticSession::new(640, 480, ledger.clone()));
        let manager = FrameSourceManager::new(Arc::new(camera), Arc::new(session))
            .with_resume_camera_on_end(resume);
        (ledger, manager)
    }

    #[test]
    fn test_end_before_grant_is_reported_as_terminated() {
        let (ledger, mut manager) = ends_before_grant_rig(false);
        manager.start_session();

        let outcomes = settle_until(&mut manager, FrameSourceState::Idle);
        assert_eq!(
            outcomes,
            vec![SourceOutcome::Stopped {
                kind: SourceKind::Session,
                reason: StopReason::Terminated
            }]
        );
        assert_eq!(ledger.session_acquires(), 1);
        assert_eq!(ledger.session_releases(), 1);
        assert!(!ledger.session_held());
    }

    #[test]
    fn test_end_before_grant_resumes_camera() {
        let (ledger, mut manager) = ends_before_grant_rig(true);
        manager.start_session();

        let outcomes = settle_until(&mut manager, FrameSourceState::CameraActive);
        assert_eq!(
            outcomes,
            vec![
                SourceOutcome::Stopped { kind: SourceKind::Session, reason: StopReason::Terminated },
                SourceOutcome::Activated(SourceKind::Camera),
            ]
        );
        assert_eq!(ledger.overlaps(), 0);
    }

    #[test]
    fn test_platform_termination_resumes_camera() {
        let mut r = rig();
        r.manager = FrameSourceManager::new(r.camera.clone(), r.session.clone())
            .with_resume_camera_on_end(true);
        r.manager.start_session();
        settle_until(&mut r.manager, FrameSourceState::SessionActive);

        r.session.terminate();
        let outcomes = settle_until(&mut r.manager, FrameSourceState::CameraActive);
        assert_eq!(
            outcomes,
            vec![
                SourceOutcome::Stopped { kind: SourceKind::Session, reason: StopReason::Terminated },
                SourceOutcome::Activated(SourceKind::Camera),
            ]
        );
        assert!(!r.ledger.session_held());
        assert!(r.ledger.camera_held());
        assert_eq!(r.ledger.overlaps(), 0);
    }

    /// 解放数が期待値になるまで待つ
    fn wait_for_camera_releases(ledger: &HardwareLedger, expected: usize) {
        let deadline = std::time::Instant::now() + WAIT;
        while ledger.camera_releases() < expected {
            assert!(std::time::Instant::now() < deadline, "camera never released");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_grant_after_drop_is_released_by_worker() {
        let ledger = HardwareLedger::new();
        let (gate, key) = Gate::new();
        let r = rig_with(
            SyntheticCamera::new(640, 480, ledger.clone()).with_gate(gate),
            SyntheticSession::new(640, 480, ledger),
        );
        let mut manager = r.manager;
        manager.start_camera();
        drop(manager);

        key.open();
        wait_for_camera_releases(&r.ledger, 1);
        assert_eq!(r.ledger.camera_acquires(), 1);
        assert!(!r.ledger.camera_held());
    }

    #[test]
    fn test_unprocessed_grant_is_released_on_drop() {
        let mut r = rig();
        r.manager.start_camera();
        // 許可が届くまで待つが pump はしない
        let deadline = std::time::Instant::now() + WAIT;
        while r.ledger.camera_acquires() == 0 {
            assert!(std::time::Instant::now() < deadline, "camera never granted");
            thread::sleep(Duration::from_millis(5));
        }
        drop(r.manager);

        wait_for_camera_releases(&r.ledger, 1);
        assert!(!r.ledger.camera_held());
    }
}
