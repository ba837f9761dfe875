#![allow(clippy::result_large_err)]

use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use geargrab_ledger::{
    config::{
        self, AppConfig,
        database::{create_connection, create_tables},
    },
    core::{
        UserId,
        compliance::{archive_records, check_data_retention, generate_compliance_report},
        export::{
            ExportFile, ExportFormat, TransactionFilter, export_1099_filing_data,
            export_tax_documents, export_transactions, export_user_tax_data,
            generate_annual_tax_report, generate_json, write_export_file,
        },
        tax_document::{
            StoredDocumentRenderer, generate_1099_for_user, generate_1099_forms_for_year,
            generate_annual_summary, send_tax_document,
        },
        transaction::{get_transaction_summary, reconcile_annual_earnings},
    },
    errors::{Error, Result},
};
use sea_orm::DatabaseConnection;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geargrab-ledger")]
#[command(about = "Rental payment ledger and tax-document tooling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate 1099-MISC forms for a year (one user, or every eligible user)
    Generate1099 {
        /// Tax year
        #[arg(long)]
        year: i32,

        /// Only generate for this user's email
        #[arg(long)]
        user: Option<String>,
    },

    /// Show a user's earnings for a year, recomputed from the ledger
    Summary {
        /// User email
        #[arg(long)]
        user: String,

        /// Tax year
        #[arg(long)]
        year: i32,
    },

    /// Generate or refresh a user's annual earnings summary
    AnnualSummary {
        /// User email
        #[arg(long)]
        user: String,

        /// Tax year
        #[arg(long)]
        year: i32,
    },

    /// Mark a tax document as delivered
    SendDocument {
        /// Document id
        id: i64,
    },

    /// Write an export file
    Export {
        #[command(subcommand)]
        kind: ExportCommand,

        /// Output directory
        #[arg(long, default_value = "exports")]
        out_dir: PathBuf,
    },

    /// List records past their retention period
    RetentionScan {
        /// Write an archive audit entry for every flagged record
        #[arg(long)]
        archive: bool,
    },

    /// Show 1099 and retention status for a year
    ComplianceReport {
        /// Tax year
        #[arg(long)]
        year: i32,
    },

    /// Rebuild a user's running earnings total from the ledger
    Reconcile {
        /// User email
        #[arg(long)]
        user: String,

        /// Tax year
        #[arg(long)]
        year: i32,
    },
}

#[derive(Subcommand)]
enum ExportCommand {
    /// Ledger rows joined with payee details
    Transactions {
        /// Restrict to one tax year
        #[arg(long)]
        year: Option<i32>,

        /// Restrict to one payee email
        #[arg(long)]
        user: Option<String>,

        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },

    /// Tax documents for a year
    TaxDocuments {
        #[arg(long)]
        year: i32,

        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },

    /// 1099-MISC rows in filing layout
    Filing {
        #[arg(long)]
        year: i32,

        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },

    /// Annual tax report (JSON)
    Report {
        #[arg(long)]
        year: i32,
    },

    /// Everything held about one user (JSON)
    User {
        /// User email
        #[arg(long)]
        user: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => Self::Csv,
            Format::Json => Self::Json,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();

    let cli = Cli::parse();

    // 3. Settings and database
    let app_config = config::settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    let db = create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db).await?;
    info!("Database ready");

    run(cli.command, &db, &app_config).await
}

async fn run(command: Commands, db: &DatabaseConnection, app_config: &AppConfig) -> Result<()> {
    let renderer = StoredDocumentRenderer::new(&app_config.documents);

    match command {
        Commands::Generate1099 {
            year,
            user: Some(user),
        } => {
            let user = UserId::new(user);
            match generate_1099_for_user(db, &renderer, &app_config.payer, &user, year).await? {
                Some(document) => println!("{}", generate_json(&document)?),
                None => println!("No 1099-MISC required for {user} in {year}"),
            }
        }
        Commands::Generate1099 { year, user: None } => {
            let result =
                generate_1099_forms_for_year(db, &renderer, &app_config.payer, year).await?;
            println!(
                "{} generated, {} skipped for missing tax info, {} failed",
                result.documents.len(),
                result.skipped.len(),
                result.failures.len()
            );
            for failure in &result.failures {
                println!("  {}: {}", failure.user_id, failure.error);
            }
        }
        Commands::Summary { user, year } => {
            let summary = get_transaction_summary(db, &UserId::new(user), year).await?;
            println!("{}", generate_json(&summary)?);
        }
        Commands::AnnualSummary { user, year } => {
            let document = generate_annual_summary(db, &renderer, &UserId::new(user), year).await?;
            println!("{}", generate_json(&document)?);
        }
        Commands::SendDocument { id } => {
            if !send_tax_document(db, id).await? {
                return Err(Error::TaxDocumentNotFound { id });
            }
            println!("Tax document {id} sent");
        }
        Commands::Export { kind, out_dir } => {
            let file = export(db, kind).await?;
            let path = write_export_file(&file, &out_dir)?;
            println!("{}", path.display());
        }
        Commands::RetentionScan { archive } => {
            let scan = check_data_retention(db, &app_config.retention, chrono::Utc::now()).await;
            for item in &scan.items {
                println!(
                    "{:?} {} {} ({})",
                    item.action,
                    item.record_kind.as_str(),
                    item.record_id,
                    item.record_date.format("%Y-%m-%d")
                );
            }
            for failure in &scan.failures {
                warn!(
                    "Could not scan {}: {}",
                    failure.record_kind.as_str(),
                    failure.error
                );
            }
            if archive {
                let outcome = archive_records(db, &scan.items, "cli").await;
                println!("{} archived, {} failed", outcome.archived, outcome.failed);
            }
        }
        Commands::ComplianceReport { year } => {
            let report =
                generate_compliance_report(db, &app_config.retention, year, chrono::Utc::now())
                    .await?;
            println!("{}", generate_json(&report)?);
        }
        Commands::Reconcile { user, year } => {
            let outcome = reconcile_annual_earnings(db, &UserId::new(user), year).await?;
            println!(
                "{} {}: recorded {}, ledger {}{}",
                outcome.user_id,
                outcome.tax_year,
                outcome.recorded,
                outcome.ledger,
                if outcome.corrected { " (corrected)" } else { "" }
            );
        }
    }

    Ok(())
}

async fn export(db: &DatabaseConnection, kind: ExportCommand) -> Result<ExportFile> {
    match kind {
        ExportCommand::Transactions { year, user, format } => {
            let filter = TransactionFilter {
                tax_year: year,
                payee: user.map(UserId::new),
            };
            export_transactions(db, &filter, format.into()).await
        }
        ExportCommand::TaxDocuments { year, format } => {
            export_tax_documents(db, year, format.into()).await
        }
        ExportCommand::Filing { year, format } => {
            export_1099_filing_data(db, year, format.into()).await
        }
        ExportCommand::Report { year } => {
            let report = generate_annual_tax_report(db, year).await?;
            Ok(ExportFile {
                content: generate_json(&report)?,
                filename: format!("annual_tax_report_{year}.json"),
                mime_type: ExportFormat::Json.mime_type().to_string(),
            })
        }
        ExportCommand::User { user } => export_user_tax_data(db, &UserId::new(user)).await,
    }
}
