//! フレームソースの失敗分類
//!
//! どれもプロセスを落とさない。呼び出し側（UI）がリトライかフォールバックを決める。

use thiserror::Error;

/// カメラ／深度セッションの取得・維持に関するエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// 端末が深度センシングや AR セッションに対応していない
    #[error("unsupported capability: {0}")]
    Unsupported(String),

    /// ユーザーがカメラ／セッションへのアクセスを拒否した
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// デバイス側の致命的エラー（ストリーム読み取り失敗など）
    #[error("hardware error: {0}")]
    Hardware(String),

    /// プラットフォームがソースを終了させた（バックグラウンド移行など）
    #[error("source terminated by platform")]
    Terminated,
}

impl SourceError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied(reason.into())
    }

    pub fn hardware(reason: impl Into<String>) -> Self {
        Self::Hardware(reason.into())
    }

    /// 単眼モードで続行できる失敗か
    pub fn is_capability_gap(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// 深度マップ構築時のエラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DepthMapError {
    #[error("depth buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("invalid raw-to-meters scale: {0}")]
    InvalidScale(f32),
}
