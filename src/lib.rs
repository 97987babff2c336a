pub mod config;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod pose;
pub mod source;

use log::LevelFilter;

/// ログを初期化する（`RUST_LOG` が優先）
///
/// 二重初期化は無視する。
pub fn init_logging(default_filter: LevelFilter) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    let _ = builder.try_init();
}
