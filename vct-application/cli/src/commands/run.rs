//! Run 命令处理
//!
//! 在模拟总线上运行演示流程：Part 1-3 确认发动机运转，
//! Part 4 Step 2 执行 DM12 激活故障码检查。Ctrl-C 设置取消标志。

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tracing::{info, warn};

use vct_executor::steps::{Dm12ActiveDtcStep, KeyStateStep};
use vct_executor::{
    EngineConfig, KeyState, Part, PartReport, PartStatus, Procedure, ProcedureReport,
    ProcedureRunner, RunStatus, SharedEngineState, StepStatus,
};
use vct_protocol::{
    pgn, AckKind, AcknowledgmentPacket, DiagnosticTroubleCode, DiagnosticTroubleCodePacket,
    LampStatus,
};
use vct_transport::{Destination, SimulatedBus, GLOBAL_ADDRESS};

use super::console::ConsoleListener;

/// 演示车辆的 OBD ECU：发动机与变速箱
const DEMO_OBD_ADDRESSES: [u8; 2] = [0x00, 0x03];

/// 发动机在第几轮全局请求时开始报告故障码
const DEMO_DTC_ROUND: usize = 3;

pub async fn handle(mut config: EngineConfig, format: &str) -> Result<()> {
    if config.vehicle.obd_addresses.is_empty() {
        config.vehicle.obd_addresses = DEMO_OBD_ADDRESSES.to_vec();
    }

    let bus = Arc::new(demo_bus(&config));
    let listener = Arc::new(ConsoleListener::new());
    let engine = Arc::new(SharedEngineState::new(KeyState::KeyOnEngineRunning));

    let runner = ProcedureRunner::new(bus.clone(), listener.clone())
        .with_config(config)
        .with_engine_monitor(engine);

    println!("{}", "VCT 演示流程 (模拟总线)".cyan().bold());
    println!("按 {} 取消测试", "Ctrl-C".yellow());
    println!();

    let handle = runner.spawn(demo_procedure());

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到 Ctrl-C，取消测试");
            cancel.cancel();
        }
    });

    let result = handle.join().await;
    listener.finish();

    let report = result.context("测试流程异常终止")?;
    info!("运行 {} 结束: {}", report.run_id, report.status);

    match format {
        "json" => println!("{}", report.to_json()?),
        "yaml" => println!("{}", report.to_yaml()?),
        _ => print_report(&report),
    }

    Ok(())
}

fn demo_procedure() -> Procedure {
    let names = [
        "Test vehicle data collection",
        "Engine running tests",
        "Monitor readiness",
    ];

    let mut procedure = Procedure::new();
    for (number, name) in (1u8..).zip(names) {
        procedure = procedure
            .with_part(Part::new(number, name).with_step(KeyStateStep::key_on_engine_running()));
    }
    procedure.with_part(
        Part::new(4, "DM12 confirmed and active DTC")
            .with_step(KeyStateStep::key_on_engine_running())
            .with_step(Dm12ActiveDtcStep::new()),
    )
}

/// 演示总线：发动机从第三轮起报告激活故障码并点亮 MIL，
/// 变速箱没有故障码，对定向请求回复 NACK
fn demo_bus(config: &EngineConfig) -> SimulatedBus {
    let bus = SimulatedBus::with_config(config.bus.clone());
    let dtc = DiagnosticTroubleCode::new(102, 2, 1);

    let engine_dm12 = move |round: usize| {
        if round >= DEMO_DTC_ROUND {
            DiagnosticTroubleCodePacket::encode(pgn::DM12, 0x00, LampStatus::On, &[dtc])
        } else {
            DiagnosticTroubleCodePacket::encode(pgn::DM12, 0x00, LampStatus::Off, &[])
        }
    };

    bus.respond(pgn::DM12, move |req| match req.destination {
        Destination::Global => vec![
            engine_dm12(req.round),
            DiagnosticTroubleCodePacket::encode(pgn::DM12, 0x03, LampStatus::Off, &[]),
        ],
        Destination::Specific(0x00) => vec![engine_dm12(DEMO_DTC_ROUND)],
        Destination::Specific(0x03) => vec![AcknowledgmentPacket::encode(
            0x03,
            AckKind::Nack,
            pgn::DM12,
            GLOBAL_ADDRESS,
        )],
        Destination::Specific(_) => vec![],
    });

    bus
}

fn print_report(report: &ProcedureReport) {
    println!();
    println!("{}", "测试报告".cyan().bold());
    println!("运行 ID: {}", report.run_id.bright_black());

    for part in &report.parts {
        print_part(part);
    }

    println!();
    let status = report.status.to_string();
    let status = match report.status {
        RunStatus::Completed => status.green().bold(),
        RunStatus::Aborted => status.magenta().bold(),
        _ => status.red().bold(),
    };
    println!(
        "状态: {}  FAIL: {}  WARN: {}",
        status,
        report.fail_count().to_string().red(),
        report.warn_count().to_string().yellow()
    );
}

fn print_part(part: &PartReport) {
    let marker = match part.status {
        PartStatus::Completed if part.passed() => "✓".green().bold(),
        PartStatus::Completed => "!".yellow().bold(),
        PartStatus::Aborted => "■".magenta().bold(),
        PartStatus::Failed => "✗".red().bold(),
    };
    println!();
    println!(
        "{} Part {} {} ({} ms)",
        marker,
        part.part_number,
        part.part_name.bold(),
        part.duration_ms
    );

    for step in &part.steps {
        let status = format!("{:?}", step.status);
        let status = match step.status {
            StepStatus::Passed => status.green(),
            StepStatus::Warned => status.yellow(),
            StepStatus::Aborted => status.magenta(),
            StepStatus::Failed | StepStatus::Errored => status.red(),
        };
        println!(
            "  {:<16} {:<8} {:>8} ms  {}",
            step.display_name,
            status,
            step.duration_ms,
            step.description.bright_black()
        );
        if let Some(error) = &step.error {
            println!("    {}", error.red());
        }
    }

    for outcome in &part.outcomes {
        println!("    {}", outcome);
    }
}
