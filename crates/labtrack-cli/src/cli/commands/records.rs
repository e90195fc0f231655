//! Test-record command handlers.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use comfy_table::{ContentArrangement, Table};
use labtrack_core::AppContext;
use labtrack_core::records::{NewTestRecord, TestRecord, parse_timestamp};

#[derive(clap::Args, Debug, Clone)]
pub struct AddArgs {
    /// Test name, e.g. "Glucose"
    #[arg(long = "type", value_name = "TYPE")]
    pub test_type: String,

    /// Measured value
    #[arg(long)]
    pub value: f64,

    /// Unit of the value, e.g. "mmol/L"
    #[arg(long)]
    pub unit: String,

    /// Lower bound of the reference range
    #[arg(long)]
    pub min: Option<f64>,

    /// Upper bound of the reference range
    #[arg(long)]
    pub max: Option<f64>,

    /// Date of the test (YYYY-MM-DD or RFC 3339; default: now)
    #[arg(long, value_parser = parse_date)]
    pub date: Option<DateTime<Utc>>,
}

pub async fn list(ctx: &AppContext, json: bool) -> Result<()> {
    ensure_signed_in(ctx).await?;
    let records = ctx.records.list().await.context("list test records")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No test records found.");
        return Ok(());
    }

    println!("{}", render_table(&records));
    Ok(())
}

pub async fn add(ctx: &AppContext, args: &AddArgs) -> Result<()> {
    ensure_signed_in(ctx).await?;
    let record = NewTestRecord {
        test_type: args.test_type.clone(),
        value: args.value,
        unit: args.unit.clone(),
        min_range: args.min,
        max_range: args.max,
        date: args.date.unwrap_or_else(Utc::now),
    };

    let created = ctx
        .records
        .create(&record)
        .await
        .context("create test record")?;
    println!("✓ Saved {} ({})", created.test_type, created.id);
    Ok(())
}

/// Validates stored credentials, then applies the signed-in guard.
///
/// Rejected credentials fall through to the guard; any other failure is
/// returned as-is.
async fn ensure_signed_in(ctx: &AppContext) -> Result<()> {
    match ctx.controller.verify_session().await {
        Err(err) if err.is_unauthorized() => {
            tracing::debug!(error = %err, "stored session rejected");
        }
        Err(err) => return Err(err).context("could not verify stored session"),
        Ok(_) => {}
    }
    ctx.controller.require_session()?;
    Ok(())
}

fn render_table(records: &[TestRecord]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(["Date", "Test", "Value", "Unit", "Range", "Status"]);

    for record in records {
        let range = match (record.min_range, record.max_range) {
            (Some(min), Some(max)) => format!("{min}-{max}"),
            (Some(min), None) => format!(">= {min}"),
            (None, Some(max)) => format!("<= {max}"),
            (None, None) => "-".to_string(),
        };
        table.add_row([
            record.date.format("%Y-%m-%d").to_string(),
            record.test_type.clone(),
            record.value.to_string(),
            record.unit.clone(),
            range,
            record.status().to_string(),
        ]);
    }
    table
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| format!("invalid date: {raw}"));
    }
    parse_timestamp(raw)
}
