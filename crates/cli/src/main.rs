//! Administrative command-line entry points: month-scoped report generation
//! and the external inventory sync.

use clap::{Parser, Subcommand, ValueEnum};

mod reports;
mod sync_cmd;

#[derive(Parser)]
#[command(name = "forgecrm")]
#[command(about = "Administrative tooling for the forgecrm backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate month-scoped reports (summary, leads, activities, products)
    Reports {
        /// Month number (1-12); defaults to the current month
        #[arg(long)]
        month: Option<u32>,
        /// Year (e.g. 2026); defaults to the current year
        #[arg(long)]
        year: Option<i32>,
        /// Which report to generate
        #[arg(long = "type", value_enum, default_value_t = ReportKind::All)]
        report: ReportKind,
        /// Output directory for report files
        #[arg(long, default_value = "reports")]
        out_dir: std::path::PathBuf,
    },
    /// Sync products from the external inventory feed
    Sync {
        /// Test the API connection and list a few sample items, without syncing
        #[arg(long)]
        test: bool,
        /// Only refresh stock quantities for products we already carry
        #[arg(long)]
        refresh_stock: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    Summary,
    Leads,
    Activities,
    Products,
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    forgecrm_observability::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Reports {
            month,
            year,
            report,
            out_dir,
        } => reports::run(month, year, report, &out_dir).await,
        Commands::Sync { test, refresh_stock } => sync_cmd::run(test, refresh_stock).await,
    }
}
