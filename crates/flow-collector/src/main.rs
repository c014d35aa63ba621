//! 시장 수급 수집기 CLI.
//!
//! 모든 명령은 결과를 표준 출력에 JSON으로 씁니다. 실패하면
//! `{"ok": false, "error": <종류>, "message": ...}`를 쓰고 0이 아닌 코드로 끝납니다.

use chrono::Utc;
use clap::{Parser, Subcommand};
use flow_collector::{build_service, BackfillRequest, IngestStats, IngestionService};
use flow_core::{init_logging, AppConfig, FlowError, LogConfig};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

#[derive(Parser)]
#[command(name = "flow-collector")]
#[command(about = "KOSPI/KOSDAQ investor flow collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,

    /// 로그 레벨 (trace, debug, info, warn, error). 설정 파일보다 우선
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 현재 시각 슬롯을 즉시 수집 (거래 시간 무시)
    Ingest,

    /// 정기 수집: 그리드 슬롯, 거래 시간 외에는 건너뜀
    Cron,

    /// 지정 날짜의 시간 범위를 간격별로 수집
    Backfill {
        /// 날짜 (YYYY-MM-DD, 기본: 오늘)
        #[arg(long)]
        date: Option<String>,

        /// 시작 시각 (HH:MM)
        #[arg(long)]
        start_time: Option<String>,

        /// 종료 시각 (HH:MM, 포함)
        #[arg(long)]
        end_time: Option<String>,

        /// 간격 (분)
        #[arg(long, allow_negative_numbers = true)]
        interval: Option<i64>,
    },

    /// 날짜별 저장된 레코드 조회
    Records {
        /// 날짜 (YYYY-MM-DD, 기본: 오늘)
        #[arg(long)]
        date: Option<String>,
    },

    /// 장 마감 이후 레코드 삭제
    Cleanup {
        /// 특정 날짜만 (기본: 전체)
        #[arg(long)]
        date: Option<String>,

        /// 장 시작 이전 레코드도 삭제
        #[arg(long)]
        include_pre_open: bool,
    },

    /// 데몬 모드: 그리드 경계마다 정기 수집
    Daemon,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::load_with_dotenv(&cli.config) {
        Ok(config) => config,
        Err(e) => return report_error(&anyhow::Error::new(e)),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    if let Err(e) = init_logging(LogConfig::from_settings(&config.logging)) {
        eprintln!("로깅 초기화 실패: {}", e);
    }

    tracing::info!(mode = ?config.fetch_mode, "Market Flow Collector 시작");

    match run(cli.command, &config).await {
        Ok(()) => {
            tracing::info!("Market Flow Collector 종료");
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

async fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    let runtime = build_service(config).await?;
    let result = execute(command, &runtime.service).await;
    runtime.shutdown().await;
    result
}

async fn execute(command: Commands, service: &IngestionService) -> anyhow::Result<()> {
    match command {
        Commands::Ingest => {
            let outcome = service.ingest_now(Utc::now()).await?;
            print_ok(&outcome)
        }
        Commands::Cron => {
            let outcome = service.run_scheduled(Utc::now()).await?;
            print_ok(&outcome)
        }
        Commands::Backfill {
            date,
            start_time,
            end_time,
            interval,
        } => {
            let request = BackfillRequest {
                date,
                start_time,
                end_time,
                interval_minutes: interval,
            };
            let report = service.backfill(&request, Utc::now()).await?;
            print_ok(&report)
        }
        Commands::Records { date } => {
            let report = service.records(date.as_deref(), Utc::now()).await?;
            print_ok(&report)
        }
        Commands::Cleanup {
            date,
            include_pre_open,
        } => {
            let report = service.cleanup(date.as_deref(), include_pre_open).await?;
            print_ok(&report)
        }
        Commands::Daemon => {
            let stats = run_daemon(service).await;
            print_ok(&stats)
        }
    }
}

/// 그리드 경계에 맞춰 정기 수집을 반복합니다. 개별 실패는 기록만 하고 계속합니다.
async fn run_daemon(service: &IngestionService) -> IngestStats {
    let scheduler = service.scheduler();
    let period = Duration::from_secs(u64::from(scheduler.grid_minutes().max(1)) * 60);
    let first_tick = tokio::time::Instant::now() + scheduler.until_next_slot(Utc::now());

    tracing::info!(
        "=== 데몬 모드 시작 (주기: {}분, 공급원: {}) ===",
        scheduler.grid_minutes(),
        service.source_name()
    );

    let mut interval = tokio::time::interval_at(first_tick, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut stats = IngestStats::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("종료 신호 수신, 데몬 종료 중...");
                break;
            }
            _ = interval.tick() => {
                stats.attempted += 1;
                match service.run_scheduled(Utc::now()).await {
                    Ok(outcome) if outcome.is_skipped() => stats.skipped += 1,
                    Ok(_) => stats.ingested += 1,
                    Err(e) => {
                        stats.failed += 1;
                        tracing::error!(kind = e.kind(), "정기 수집 실패: {}", e);
                    }
                }
            }
        }
    }

    stats.elapsed = started.elapsed();
    stats.log_summary("데몬");
    stats
}

/// 결과 객체에 `"ok": true`를 붙여 출력합니다.
fn print_ok<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut body = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut body {
        map.insert("ok".to_string(), Value::Bool(true));
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn report_error(err: &anyhow::Error) -> ExitCode {
    let kind = err
        .downcast_ref::<FlowError>()
        .map(FlowError::kind)
        .unwrap_or("internal_error");

    tracing::error!(kind, "명령 실패: {:#}", err);
    println!(
        "{}",
        json!({
            "ok": false,
            "error": kind,
            "message": err.to_string(),
        })
    );
    ExitCode::FAILURE
}
