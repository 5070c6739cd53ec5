mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pushflow")]
#[command(about = "描いて、比べて、変わった分だけ届ける。", long_about = None)]
struct Cli {
    /// プロジェクトファイル（pushflow.kdl またはそのディレクトリ）
    #[arg(short, long, global = true, env = "PUSHFLOW_PROJECT")]
    project: Option<PathBuf>,

    /// 詳細なログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// プロジェクトのサービス一覧を表示
    Services,
    /// マルチインスタンスサービスのインスタンス一覧を表示
    List {
        /// サービス名
        service: String,
    },
    /// テンプレートを展開して表示（リモートには触れない）
    Render {
        /// サービス名
        service: String,
        /// インスタンス名（マルチインスタンスのみ）
        instance: Option<String>,
        /// すべてのインスタンスを対象にする
        #[arg(long, conflicts_with = "instance")]
        all: bool,
    },
    /// 展開結果とリモートの現在の内容を比較
    Diff {
        /// サービス名
        service: String,
        /// インスタンス名（マルチインスタンスのみ）
        instance: Option<String>,
        /// すべてのインスタンスを対象にする
        #[arg(long, conflicts_with = "instance")]
        all: bool,
    },
    /// 変更のあったファイルだけを配布し、必要ならサービスを再起動
    ///
    /// 同期に失敗したファイルやシークレットの書き込みに失敗したフックがある
    /// インスタンスでは、変更があっても再起動を保留する（--force でも同じ）。
    Deploy {
        /// サービス名
        service: String,
        /// インスタンス名（マルチインスタンスのみ）
        instance: Option<String>,
        /// すべてのインスタンスを対象にする
        #[arg(long, conflicts_with = "instance")]
        all: bool,
        /// 再起動しない
        #[arg(long)]
        no_restart: bool,
        /// 変更がなくても再起動する
        #[arg(long)]
        force: bool,
    },
    /// ワイルドカード証明書を管理
    #[command(subcommand)]
    Certs(CertsCommands),
    /// バージョン情報を表示
    Version,
}

/// 証明書管理のサブコマンド
#[derive(Subcommand)]
enum CertsCommands {
    /// 証明書の有効期限と配布先を表示
    Status,
    /// 証明書を発行・更新（有効期限に余裕があれば何もしない）
    Issue {
        /// 有効期限に関係なく更新する
        #[arg(long)]
        force: bool,
    },
    /// 証明書を配布先へ送る
    Distribute {
        /// 配布先（省略時はすべて）
        host: Option<String>,
    },
    /// issue の後、すべての配布先へ distribute
    Renew,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(utils::exit_code(&e))
        }
    }
}

/// ログは stderr に出す（stdout は render の出力に使う）
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(verbose)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Versionコマンドはプロジェクトファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("pushflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let project = utils::load_project(cli.project.as_deref())?;

    match cli.command {
        Commands::Services => commands::services::handle(&project),
        Commands::List { service } => commands::list::handle(&project, &service),
        Commands::Render {
            service,
            instance,
            all,
        } => commands::render::handle(&project, &service, instance, all),
        Commands::Diff {
            service,
            instance,
            all,
        } => commands::diff::handle(&project, &service, instance, all),
        Commands::Deploy {
            service,
            instance,
            all,
            no_restart,
            force,
        } => commands::deploy::handle(&project, &service, instance, all, force, no_restart),
        Commands::Certs(certs_cmd) => match certs_cmd {
            CertsCommands::Status => commands::certs::handle_status(&project),
            CertsCommands::Issue { force } => commands::certs::handle_issue(&project, force),
            CertsCommands::Distribute { host } => {
                commands::certs::handle_distribute(&project, host.as_deref())
            }
            CertsCommands::Renew => commands::certs::handle_renew(&project),
        },
        Commands::Version => unreachable!("Version is handled before project loading"),
    }
}
