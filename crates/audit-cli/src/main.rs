//! Access Audit CLI
//!
//! Scans every dataset in a project, keeps the per-user grants, and writes
//! them to a BigQuery table in one load job.

use access_audit_client::config::DEFAULT_BASE_URL;
use access_audit_client::{auth, BigQueryClient, ClientConfig};
use access_audit_core::{
    AccessEntryRecord, AuditConfig, AuditPipeline, TableDestination, WriteDisposition,
};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "access-audit")]
#[command(version, about = "Audit user access grants on BigQuery datasets", long_about = None)]
struct Cli {
    /// Project whose datasets are scanned [default: GOOGLE_CLOUD_PROJECT, then the credentials file's project, then the destination project]
    #[arg(short, long, env = "ACCESS_AUDIT_PROJECT")]
    project: Option<String>,

    /// Project holding the destination table
    #[arg(long, env = "ACCESS_AUDIT_DESTINATION_PROJECT", default_value = "yhcr-prd-phm-bia-core")]
    destination_project: String,

    /// Dataset holding the destination table
    #[arg(long, env = "ACCESS_AUDIT_DESTINATION_DATASET", default_value = "CB_SAM_TEST")]
    destination_dataset: String,

    /// Destination table name
    #[arg(long, env = "ACCESS_AUDIT_DESTINATION_TABLE", default_value = "gbq_dataset_permissions")]
    destination_table: String,

    /// truncate, append, or empty
    #[arg(short, long, env = "ACCESS_AUDIT_WRITE_DISPOSITION", default_value = "truncate")]
    write_disposition: WriteDisposition,

    /// Location of the load job (e.g. EU)
    #[arg(long, env = "ACCESS_AUDIT_LOCATION")]
    location: Option<String>,

    /// Listing page size
    #[arg(long)]
    page_size: Option<u32>,

    /// Include hidden datasets in the scan
    #[arg(long)]
    include_hidden: bool,

    /// Seconds to wait for the load job to finish
    #[arg(long, default_value_t = 600)]
    job_timeout: u64,

    /// BigQuery API root
    #[arg(long, env = "ACCESS_AUDIT_API_URL", default_value = DEFAULT_BASE_URL, hide = true)]
    api_url: String,

    /// Collect and print the records without writing them
    #[arg(long)]
    dry_run: bool,

    /// Output format for --dry-run
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = auth::default_credentials()?;
    let project = resolve_project(
        cli.project.clone(),
        std::env::var("GOOGLE_CLOUD_PROJECT").ok(),
        credentials.project_id.clone(),
        &cli.destination_project,
    );

    let destination = TableDestination::new(
        cli.destination_project.as_str(),
        cli.destination_dataset.as_str(),
        cli.destination_table.as_str(),
    )?;

    let mut builder = ClientConfig::builder(project.as_str())
        .base_url(cli.api_url.as_str())
        .include_hidden(cli.include_hidden)
        .job_timeout(Duration::from_secs(cli.job_timeout));
    if let Some(ref location) = cli.location {
        builder = builder.location(location.as_str());
    }
    if let Some(size) = cli.page_size {
        builder = builder.page_size(size);
    }

    let client = Arc::new(BigQueryClient::new(builder.build()?, credentials.provider)?);

    tracing::info!(
        project = %project,
        destination = %destination,
        disposition = %cli.write_disposition,
        dry_run = cli.dry_run,
        "Starting access audit"
    );

    let config = AuditConfig::new(destination).with_write_disposition(cli.write_disposition);
    let pipeline = AuditPipeline::new(client.clone(), client, config);

    if cli.dry_run {
        let collected = pipeline.collect().await?;
        match cli.output {
            OutputFormat::Table => print_table(&collected.records),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&collected.records)?),
        }
        return Ok(());
    }

    let summary = pipeline.run().await?;
    tracing::info!(
        datasets = summary.datasets_scanned,
        entries = summary.entries_seen,
        records = summary.records_collected,
        rows = summary.rows_written,
        job_id = summary.job_id.as_deref().unwrap_or("-"),
        "Access audit complete"
    );

    Ok(())
}

/// First non-empty of: `--project`, `GOOGLE_CLOUD_PROJECT`, the credentials
/// file's project, the destination project.
fn resolve_project(
    flag: Option<String>,
    env: Option<String>,
    credentials: Option<String>,
    destination: &str,
) -> String {
    [flag, env, credentials]
        .into_iter()
        .flatten()
        .find(|p| !p.is_empty())
        .unwrap_or_else(|| destination.to_string())
}

fn print_table(records: &[AccessEntryRecord]) {
    let dataset_width = column_width("dataset", records.iter().map(|r| r.dataset.as_str()));
    let entity_width = column_width("entity_id", records.iter().map(|r| r.entity_id.as_str()));

    println!(
        "{:<dw$}  {:<ew$}  role",
        "dataset",
        "entity_id",
        dw = dataset_width,
        ew = entity_width
    );
    for record in records {
        println!(
            "{:<dw$}  {:<ew$}  {}",
            record.dataset,
            record.entity_id,
            record.role.as_deref().unwrap_or("-"),
            dw = dataset_width,
            ew = entity_width
        );
    }
    println!();
    println!("{} record(s)", records.len());
}

fn column_width<'a>(header: &str, values: impl Iterator<Item = &'a str>) -> usize {
    values.map(str::len).fold(header.len(), usize::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["access-audit"]).unwrap();
        assert_eq!(cli.destination_project, "yhcr-prd-phm-bia-core");
        assert_eq!(cli.destination_dataset, "CB_SAM_TEST");
        assert_eq!(cli.destination_table, "gbq_dataset_permissions");
        assert_eq!(cli.write_disposition, WriteDisposition::WriteTruncate);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_write_disposition() {
        let cli = Cli::try_parse_from(["access-audit", "--write-disposition", "append"]).unwrap();
        assert_eq!(cli.write_disposition, WriteDisposition::WriteAppend);

        assert!(Cli::try_parse_from(["access-audit", "--write-disposition", "merge"]).is_err());
    }

    #[test]
    fn test_resolve_project_order() {
        let some = |p: &str| Some(p.to_string());
        assert_eq!(
            resolve_project(some("flag-project"), some("env-project"), some("key-project"), "dest-project"),
            "flag-project"
        );
        assert_eq!(
            resolve_project(None, some("env-project"), some("key-project"), "dest-project"),
            "env-project"
        );
        assert_eq!(
            resolve_project(None, some(""), some("key-project"), "dest-project"),
            "key-project"
        );
        assert_eq!(resolve_project(None, None, None, "dest-project"), "dest-project");
    }

    #[test]
    fn test_column_width() {
        assert_eq!(column_width("dataset", ["A", "B"].into_iter()), 7);
        assert_eq!(column_width("dataset", ["a_long_dataset"].into_iter()), 14);
    }
}
