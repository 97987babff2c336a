//! 実機なしで状態機械とパイプラインを動かすための合成デバイス
//!
//! 取得の遅延（ゲート）、拒否・非対応、途中のハード障害、プラットフォーム終了を再現できる。
//! `HardwareLedger` はカメラとセッションの保持状況を記録し、同時保持を数える。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use super::device::{
    CameraDevice, DepthSessionProvider, EndSignal, Facing, FrameStream, SessionCapabilities,
};
use super::frame::{Frame, SourceFrame};
use crate::error::SourceError;
use crate::geometry::DepthMap;

/// ハードウェア保持状況の記録
#[derive(Debug, Default)]
pub struct HardwareLedger {
    camera_held: AtomicBool,
    session_held: AtomicBool,
    camera_acquires: AtomicUsize,
    camera_releases: AtomicUsize,
    session_acquires: AtomicUsize,
    session_releases: AtomicUsize,
    overlaps: AtomicUsize,
}

impl HardwareLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn camera_held(&self) -> bool {
        self.camera_held.load(Ordering::SeqCst)
    }

    pub fn session_held(&self) -> bool {
        self.session_held.load(Ordering::SeqCst)
    }

    pub fn camera_acquires(&self) -> usize {
        self.camera_acquires.load(Ordering::SeqCst)
    }

    pub fn camera_releases(&self) -> usize {
        self.camera_releases.load(Ordering::SeqCst)
    }

    pub fn session_acquires(&self) -> usize {
        self.session_acquires.load(Ordering::SeqCst)
    }

    pub fn session_releases(&self) -> usize {
        self.session_releases.load(Ordering::SeqCst)
    }

    /// カメラとセッションを同時に保持した回数
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn acquire(&self, kind: HardwareKind) {
        let (mine, other, count) = self.slots(kind);
        if other.load(Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        mine.store(true, Ordering::SeqCst);
        count.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, kind: HardwareKind) {
        let (mine, _, _) = self.slots(kind);
        mine.store(false, Ordering::SeqCst);
        match kind {
            HardwareKind::Camera => self.camera_releases.fetch_add(1, Ordering::SeqCst),
            HardwareKind::Session => self.session_releases.fetch_add(1, Ordering::SeqCst),
        };
    }

    fn slots(&self, kind: HardwareKind) -> (&AtomicBool, &AtomicBool, &AtomicUsize) {
        match kind {
            HardwareKind::Camera => (&self.camera_held, &self.session_held, &self.camera_acquires),
            HardwareKind::Session => (&self.session_held, &self.camera_held, &self.session_acquires),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum HardwareKind {
    Camera,
    Session,
}

/// 取得要求への応答
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquireBehavior {
    #[default]
    Grant,
    Deny,
    Unsupported,
}

/// 取得をテスト側から解放するまで止めておくゲート
#[derive(Debug, Clone)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

/// ゲートを開ける側
#[derive(Debug, Clone)]
pub struct GateKey(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn new() -> (Gate, GateKey) {
        let inner = Arc::new((Mutex::new(false), Condvar::new()));
        (Gate(inner.clone()), GateKey(inner))
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*open {
            open = cvar.wait(open).unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl GateKey {
    pub fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }
}

#[derive(Debug, Clone, Default)]
struct StreamScript {
    warmup: u32,
    fail_after: Option<u64>,
}

/// 合成フレーム列
struct SyntheticStream {
    frame: Frame,
    depth: Option<DepthMap>,
    script: StreamScript,
    advances: u64,
    ready: bool,
}

impl SyntheticStream {
    fn new(width: u32, height: u32, depth: Option<DepthMap>, script: StreamScript) -> Self {
        Self {
            frame: Frame::blank(width, height, 0),
            depth,
            script,
            advances: 0,
            ready: false,
        }
    }
}

impl FrameStream for SyntheticStream {
    fn advance(&mut self) -> Result<bool, SourceError> {
        self.advances += 1;
        if self.advances <= self.script.warmup as u64 {
            return Ok(false);
        }
        let produced = self.advances - self.script.warmup as u64;
        if let Some(limit) = self.script.fail_after {
            if produced > limit {
                return Err(SourceError::hardware("synthetic stream failure"));
            }
        }
        self.frame.sequence = produced;
        self.ready = true;
        Ok(true)
    }

    fn current(&self) -> Option<SourceFrame<'_>> {
        self.ready
            .then(|| SourceFrame::with_depth(&self.frame, self.depth.as_ref()))
    }
}

/// 共通の取得ロジック
struct SyntheticDevice {
    width: u32,
    height: u32,
    ledger: Arc<HardwareLedger>,
    behavior: AcquireBehavior,
    gate: Option<Gate>,
    script: StreamScript,
    ended: Mutex<Option<EndSignal>>,
}

impl SyntheticDevice {
    fn new(width: u32, height: u32, ledger: Arc<HardwareLedger>) -> Self {
        Self {
            width,
            height,
            ledger,
            behavior: AcquireBehavior::Grant,
            gate: None,
            script: StreamScript::default(),
            ended: Mutex::new(None),
        }
    }

    fn acquire(
        &self,
        kind: HardwareKind,
        ended: EndSignal,
        depth: Option<DepthMap>,
    ) -> Result<Box<dyn FrameStream>, SourceError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        match self.behavior {
            AcquireBehavior::Grant => {}
            AcquireBehavior::Deny => return Err(SourceError::denied("synthetic prompt declined")),
            AcquireBehavior::Unsupported => {
                return Err(SourceError::unsupported("synthetic device has no depth sensing"))
            }
        }
        self.ledger.acquire(kind);
        *self.ended.lock().unwrap_or_else(|e| e.into_inner()) = Some(ended);
        Ok(Box::new(SyntheticStream::new(
            self.width,
            self.height,
            depth,
            self.script.clone(),
        )))
    }

    fn release(&self, kind: HardwareKind) {
        self.ledger.release(kind);
    }

    fn terminate(&self) {
        if let Some(signal) = self.ended.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            signal.notify();
        }
    }
}

/// 合成カメラ
pub struct SyntheticCamera {
    device: SyntheticDevice,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, ledger: Arc<HardwareLedger>) -> Self {
        Self { device: SyntheticDevice::new(width, height, ledger) }
    }

    pub fn with_behavior(mut self, behavior: AcquireBehavior) -> Self {
        self.device.behavior = behavior;
        self
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.device.gate = Some(gate);
        self
    }

    /// 最初の `frames` 回はフレーム未到着を返す
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.device.script.warmup = frames;
        self
    }

    /// `frames` 枚出した後にハード障害を起こす
    pub fn with_fail_after(mut self, frames: u64) -> Self {
        self.device.script.fail_after = Some(frames);
        self
    }

    pub fn ledger(&self) -> Arc<HardwareLedger> {
        self.device.ledger.clone()
    }

    /// プラットフォームがストリームを止めたことを通知する
    pub fn terminate(&self) {
        self.device.terminate();
    }
}

impl CameraDevice for SyntheticCamera {
    fn acquire(
        &self,
        _facing: Facing,
        ended: EndSignal,
    ) -> Result<Box<dyn FrameStream>, SourceError> {
        self.device.acquire(HardwareKind::Camera, ended, None)
    }

    fn release(&self, _stream: Box<dyn FrameStream>) {
        self.device.release(HardwareKind::Camera);
    }
}

/// 合成深度セッション。毎フレーム同じ深度マップを返す
pub struct SyntheticSession {
    device: SyntheticDevice,
    depth: Option<DepthMap>,
}

impl SyntheticSession {
    /// 全面 1.5m の深度を返すセッション
    pub fn new(width: u32, height: u32, ledger: Arc<HardwareLedger>) -> Self {
        let depth = DepthMap::from_meters(
            (width / 4).max(1),
            (height / 4).max(1),
            vec![1.5; ((width / 4).max(1) * (height / 4).max(1)) as usize],
        )
        .ok();
        Self { device: SyntheticDevice::new(width, height, ledger), depth }
    }

    /// 深度マップを差し替える。None なら深度なしフレームになる
    pub fn with_depth(mut self, depth: Option<DepthMap>) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_behavior(mut self, behavior: AcquireBehavior) -> Self {
        self.device.behavior = behavior;
        self
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.device.gate = Some(gate);
        self
    }

    pub fn ledger(&self) -> Arc<HardwareLedger> {
        self.device.ledger.clone()
    }

    pub fn terminate(&self) {
        self.device.terminate();
    }
}

impl DepthSessionProvider for SyntheticSession {
    fn request_session(
        &self,
        capabilities: SessionCapabilities,
        ended: EndSignal,
    ) -> Result<Box<dyn FrameStream>, SourceError> {
        if !capabilities.depth {
            return Err(SourceError::unsupported("depth-sensing not requested"));
        }
        self.device.acquire(HardwareKind::Session, ended, self.depth.clone())
    }

    fn end_session(&self, _session: Box<dyn FrameStream>) {
        self.device.release(HardwareKind::Session);
    }
}
