//! ログインフラモジュール

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログシステムを初期化
///
/// 標準出力は結果表示に使うため、ログは標準エラーに出す。
/// RUST_LOG環境変数が設定されていればそちらを優先:
/// - warn: 警告以上（デフォルト）
/// - warn,tmlr=debug: 通信内容の概要（--verbose）
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "warn,tmlr=debug"
    } else {
        "warn"
    }
}
