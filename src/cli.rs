use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum, ValueHint};
use evp_core::EquityMode;
use rust_decimal::Decimal;

#[derive(Parser, Debug)]
#[command(name = "evp", author, version, about = "充電站與太陽能設置規劃", long_about = None)]
pub struct Cli {
    /// 提高日誌層級（-v debug，-vv trace）；RUST_LOG 優先
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 完整規劃：載入、預測、建模、求解、輸出
    Plan {
        #[command(flatten)]
        input: InputArgs,

        /// 輸出目錄
        #[arg(long, value_hint = ValueHint::DirPath)]
        out: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        /// 另外輸出 sites.geojson
        #[arg(long)]
        geojson: bool,

        /// 另外輸出 model.lp
        #[arg(long)]
        write_model: bool,
    },
    /// 只輸出需求預測表
    Demand {
        #[command(flatten)]
        input: InputArgs,

        /// 輸出 CSV 檔
        #[arg(long, value_hint = ValueHint::FilePath)]
        out: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// 載入資料並執行求解前檢查
    Check {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        overrides: Overrides,

        /// 以 JSON 輸出警告
        #[arg(long)]
        json: bool,
    },
    /// 印出預設配置（TOML）
    Config,
}

#[derive(clap::Args, Debug)]
pub struct InputArgs {
    /// 站點 CSV 檔或每區一檔的目錄
    #[arg(long, value_hint = ValueHint::AnyPath)]
    pub sites: PathBuf,

    /// 配置檔（TOML）
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Default)]
pub struct Overrides {
    /// 規劃月數
    #[arg(long)]
    pub months: Option<u32>,

    /// 起始月份（YYYY-MM-DD）
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// 公平性限制模式
    #[arg(long, value_enum)]
    pub equity: Option<EquityArg>,

    /// 總預算
    #[arg(long)]
    pub budget: Option<Decimal>,

    /// 求解時限（秒）
    #[arg(long)]
    pub time_limit: Option<f64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EquityArg {
    Strict,
    Relaxed,
    Omitted,
}

impl From<EquityArg> for EquityMode {
    fn from(arg: EquityArg) -> Self {
        match arg {
            EquityArg::Strict => EquityMode::Strict,
            EquityArg::Relaxed => EquityMode::Relaxed,
            EquityArg::Omitted => EquityMode::Omitted,
        }
    }
}
