//! CLIモジュール

use crate::api::{Api, Credentials};
use crate::config::{CliArgs, Config};
use crate::error::ConfigError;
use crate::transport::HttpTransport;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// tmlr - Timeularのコマンドラインクライアント
#[derive(Parser, Debug)]
#[command(name = "tmlr")]
#[command(about = "Timeularのコマンドラインクライアント", long_about = None)]
pub struct Cli {
    /// 設定ファイル（デフォルト: ~/.tmlr.toml）
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Timeularのアクセストークン
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// 詳細ログを標準エラーに出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// サブコマンド
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// ログインしてJWTトークンを表示
    Login {
        /// APIキー
        #[arg(long = "apiKey")]
        api_key: String,

        /// APIシークレット
        #[arg(long = "apiSecret")]
        api_secret: String,
    },
    /// 設定されたトークンでログアウト
    Logout,
    /// バージョンを表示
    Version,
}

impl Cli {
    fn config_args(&self) -> CliArgs {
        CliArgs {
            config: self.config.clone(),
            token: self.token.clone(),
        }
    }
}

/// CLIエントリポイント
///
/// 設定ファイルの読み込みに失敗した場合のみ終了コード1で終了する。
/// 通信や応答の失敗は結果として標準出力に表示する。
pub fn run(cli: Cli) -> Result<()> {
    let config = match Config::load(&cli.config_args()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", config_error_message(&e));
            process::exit(1);
        }
    };
    let transport = HttpTransport::new().context("HTTPクライアントの作成に失敗")?;
    let api = Api::new(&transport);

    let mut out = io::stdout().lock();
    execute(cli.command, &config, &api, &mut out)?;
    Ok(())
}

fn config_error_message(err: &ConfigError) -> String {
    format!("Can't read config: {}", err)
}

fn execute(command: Commands, config: &Config, api: &Api<'_>, out: &mut dyn Write) -> io::Result<()> {
    match command {
        Commands::Login {
            api_key,
            api_secret,
        } => {
            let credentials = Credentials::new(api_key, api_secret);
            api.login(&credentials).render(out)?;
        }
        Commands::Logout => {
            api.logout(config.token.as_deref()).render(out)?;
        }
        Commands::Version => {
            write!(out, "tmlr v{}", VERSION)?;
        }
    }
    writeln!(out)
}
