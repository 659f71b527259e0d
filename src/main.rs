//! `evp` 命令列：充電站與太陽能設置規劃

mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use evp_calc::DemandEstimator;
use evp_core::{PlanConfig, WarningSeverity};
use evp_io::{load_sites, write_demand_csv, write_outputs, LoadReport, OutputOptions};
use evp_optimizer::{GoodLpSolver, MilpSolver, Planner, PreSolveCheck};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, InputArgs, Overrides};

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// 載入配置並套用命令列覆寫
fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<PlanConfig> {
    let mut config = match path {
        Some(path) => PlanConfig::from_path(path).with_context(|| format!("讀取配置 {}", path.display()))?,
        None => PlanConfig::default(),
    };
    if let Some(months) = overrides.months {
        config = config.with_months(months);
    }
    if let Some(start) = overrides.start {
        config.horizon.start = start;
    }
    if let Some(equity) = overrides.equity {
        config = config.with_equity_mode(equity.into());
    }
    if let Some(budget) = overrides.budget {
        config = config.with_budget(budget);
    }
    if let Some(secs) = overrides.time_limit {
        config = config.with_time_limit(secs);
    }
    config.validate().context("配置驗證失敗")?;
    Ok(config)
}

fn load_input(input: &InputArgs) -> Result<LoadReport> {
    let report = load_sites(&input.sites).with_context(|| format!("載入站點 {}", input.sites.display()))?;
    if report.districts.is_empty() {
        anyhow::bail!("{} 中沒有任何行政區", input.sites.display());
    }
    Ok(report)
}

fn run_plan(input: &InputArgs, out: &Path, overrides: &Overrides, geojson: bool, write_model: bool) -> Result<ExitCode> {
    let mut config = load_config(input.config.as_deref(), overrides)?;
    config.solver.write_model |= write_model;
    let loaded = load_input(input)?;

    let solver = GoodLpSolver::default();
    tracing::info!("使用求解器 {}", solver.name());
    let mut report = Planner::new(config, solver)
        .with_artifact_dir(out)
        .plan(&loaded.districts)
        .context("規劃失敗")?;

    let mut warnings = loaded.warnings;
    warnings.append(&mut report.warnings);
    report.warnings = warnings;

    let written = write_outputs(&report, out, &OutputOptions { geojson }).context("輸出結果失敗")?;

    println!("狀態: {} ({})", report.status, report.status_code);
    if let Some(summary) = &report.summary {
        print!("{}", summary.render());
    }
    if let Some(conflict) = &report.conflict {
        println!("衝突約束 {} 條: {}", conflict.constraints.len(), conflict.constraints.join(", "));
    }
    for path in written.iter().chain(report.model_path.iter()).chain(report.conflict_path.iter()) {
        println!("輸出: {}", path.display());
    }

    Ok(if report.is_solved() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn run_demand(input: &InputArgs, out: &Path, overrides: &Overrides) -> Result<ExitCode> {
    let config = load_config(input.config.as_deref(), overrides)?;
    let loaded = load_input(input)?;
    let horizon = config.planning_horizon()?;

    let demand = DemandEstimator::new(&config.demand).build_table(&loaded.districts, &horizon);
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("建立目錄 {}", parent.display()))?;
    }
    write_demand_csv(out, &demand).with_context(|| format!("寫入 {}", out.display()))?;

    for period in horizon.periods() {
        println!("{}: {}", horizon.label(period), demand.period_total(period));
    }
    println!("輸出: {}", out.display());
    Ok(ExitCode::SUCCESS)
}

fn run_check(input: &InputArgs, overrides: &Overrides, json: bool) -> Result<ExitCode> {
    let config = load_config(input.config.as_deref(), overrides)?;
    let loaded = load_input(input)?;
    let horizon = config.planning_horizon()?;

    let demand = DemandEstimator::new(&config.demand).build_table(&loaded.districts, &horizon);
    let mut warnings = loaded.warnings.clone();
    warnings.extend(PreSolveCheck::new(&config, &horizon).run(&loaded.districts, &demand));
    warnings.sort_by(|a, b| b.severity.cmp(&a.severity));

    if json {
        println!("{}", serde_json::to_string_pretty(&warnings)?);
    } else {
        println!(
            "行政區 {}，站點 {}，讀取 {} 列，略過 {} 列",
            loaded.districts.len(),
            loaded.site_count(),
            loaded.rows_read,
            loaded.rows_skipped
        );
        for warning in &warnings {
            println!("{warning}");
        }
    }

    let has_errors = warnings.iter().any(|w| w.severity == WarningSeverity::Error);
    Ok(if has_errors { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Plan {
            input,
            out,
            overrides,
            geojson,
            write_model,
        } => run_plan(&input, &out, &overrides, geojson, write_model),
        Commands::Demand { input, out, overrides } => run_demand(&input, &out, &overrides),
        Commands::Check { input, overrides, json } => run_check(&input, &overrides, json),
        Commands::Config => {
            print!("{}", PlanConfig::default().to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("錯誤: {err:#}");
            ExitCode::FAILURE
        }
    }
}
