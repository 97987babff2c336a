//! カメラ／深度セッションの外部インターフェース
//!
//! 実機のドライバやプラットフォーム API はこのトレイトを実装して注入する。
//! 取得処理は数秒ブロックしうる（権限ダイアログ、ハード初期化）ので、
//! マネージャは専用スレッドから呼ぶ。

use serde::Deserialize;
use std::fmt;
use std::sync::mpsc::Sender;

use super::frame::SourceFrame;
use super::manager::Event;
use crate::error::SourceError;

/// カメラの向き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// インカメラ
    #[serde(alias = "user")]
    Front,
    /// アウトカメラ
    #[default]
    #[serde(alias = "environment")]
    Back,
}

/// 深度セッションに要求する機能
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCapabilities {
    /// 深度センシング（必須）
    pub depth: bool,
    /// DOM overlay（任意）
    pub dom_overlay: bool,
}

impl Default for SessionCapabilities {
    fn default() -> Self {
        Self { depth: true, dom_overlay: true }
    }
}

/// 取得済みのフレーム供給源（カメラストリーム or 深度セッション）
pub trait FrameStream: Send {
    /// 次のフレームへ進める
    ///
    /// `Ok(false)` はまだフレームが無い（初期化中・デコード待ち）。`Err` は致命的なハード障害。
    fn advance(&mut self) -> Result<bool, SourceError>;

    /// 現在のフレーム。深度セッションなら深度マップも付く
    fn current(&self) -> Option<SourceFrame<'_>>;
}

/// カメラデバイス
pub trait CameraDevice: Send + Sync {
    fn acquire(&self, facing: Facing, ended: EndSignal)
        -> Result<Box<dyn FrameStream>, SourceError>;

    fn release(&self, stream: Box<dyn FrameStream>);
}

/// 深度セッション提供元
///
/// 非対応なら `SourceError::Unsupported`、拒否なら `SourceError::PermissionDenied` を返す。
pub trait DepthSessionProvider: Send + Sync {
    fn request_session(
        &self,
        capabilities: SessionCapabilities,
        ended: EndSignal,
    ) -> Result<Box<dyn FrameStream>, SourceError>;

    fn end_session(&self, session: Box<dyn FrameStream>);
}

/// プラットフォーム側からソース終了を通知するハンドル
///
/// どのスレッドから呼んでもよい。通知はマネージャの受信箱に積まれ、次の tick で処理される。
/// 既に解放済みのソースへの通知は無視される。
#[derive(Clone)]
pub struct EndSignal {
    ticket: u64,
    tx: Sender<Event>,
}

impl EndSignal {
    pub(crate) fn new(ticket: u64, tx: Sender<Event>) -> Self {
        Self { ticket, tx }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn notify(&self) {
        // マネージャ破棄後なら何もしない
        let _ = self.tx.send(Event::Ended { ticket: self.ticket });
    }
}

impl fmt::Debug for EndSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndSignal").field("ticket", &self.ticket).finish()
    }
}
