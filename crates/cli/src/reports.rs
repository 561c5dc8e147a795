//! Month-scoped report generation.
//!
//! Reads are replay-based: the event store is loaded into fresh projections,
//! then the reports query those read models. No API process needs to run.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Datelike, TimeZone, Utc};

use forgecrm_activities::ActivityStatus;
use forgecrm_infra::event_store::PostgresEventStore;
use forgecrm_infra::projections::{
    ActivityBoardProjection, LeadPipelineProjection, ProductCatalogProjection,
};
use forgecrm_infra::read_model::InMemoryStore;

use crate::ReportKind;

struct ReadModels {
    leads: LeadPipelineProjection<Arc<InMemoryStore<forgecrm_pipeline::LeadId, forgecrm_infra::projections::LeadReadModel>>>,
    activities: ActivityBoardProjection<Arc<InMemoryStore<forgecrm_activities::ActivityId, forgecrm_infra::projections::ActivityReadModel>>>,
    products: ProductCatalogProjection<Arc<InMemoryStore<forgecrm_catalog::ProductId, forgecrm_infra::projections::ProductReadModel>>>,
}

async fn replay_store() -> anyhow::Result<ReadModels> {
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for report generation")?;
    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .context("failed to connect to the database")?;
    let store = PostgresEventStore::new(pool);
    store.ensure_schema().await?;

    let models = ReadModels {
        leads: LeadPipelineProjection::new(Arc::new(InMemoryStore::new())),
        activities: ActivityBoardProjection::new(Arc::new(InMemoryStore::new())),
        products: ProductCatalogProjection::new(Arc::new(InMemoryStore::new())),
    };

    let events = store.load_all_async().await?;
    tracing::info!(count = events.len(), "replaying events into report models");
    for stored in &events {
        let envelope = stored.to_envelope();
        // A report run tolerates individual decode failures; skip and continue.
        let _ = models.leads.apply_envelope(&envelope);
        let _ = models.activities.apply_envelope(&envelope);
        let _ = models.products.apply_envelope(&envelope);
    }

    Ok(models)
}

fn month_range(year: i32, month: u32) -> anyhow::Result<(DateTime<Utc>, DateTime<Utc>)> {
    if !(1..=12).contains(&month) {
        bail!("month must be between 1 and 12, got {month}");
    }
    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .context("invalid report period")?;
    let end = if month == 12 {
        Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
    } else {
        Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0)
    }
    .single()
    .context("invalid report period")?;
    Ok((start, end))
}

pub async fn run(
    month: Option<u32>,
    year: Option<i32>,
    kind: ReportKind,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let month = month.unwrap_or(now.month());
    let year = year.unwrap_or(now.year());
    let (start, end) = month_range(year, month)?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;

    println!("Generating reports for {year}-{month:02}...");
    let models = replay_store().await?;

    if matches!(kind, ReportKind::Summary | ReportKind::All) {
        summary_report(&models, start, end, out_dir, year, month)?;
    }
    if matches!(kind, ReportKind::Leads | ReportKind::All) {
        leads_report(&models, start, end, out_dir, year, month)?;
    }
    if matches!(kind, ReportKind::Activities | ReportKind::All) {
        activities_report(&models, start, end, out_dir, year, month)?;
    }
    if matches!(kind, ReportKind::Products | ReportKind::All) {
        products_report(&models, out_dir, year, month)?;
    }

    println!("Reports written to {}/", out_dir.display());
    Ok(())
}

fn minor_to_display(minor: i64) -> String {
    format!("{}.{:02}", minor / 100, (minor % 100).abs())
}

fn summary_report(
    models: &ReadModels,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    out_dir: &Path,
    year: i32,
    month: u32,
) -> anyhow::Result<()> {
    let leads = models.leads.opened_between(start, end);
    let total_leads = leads.len();
    let won: Vec<_> = leads.iter().filter(|l| l.stage.is_won).collect();
    let lost = leads.iter().filter(|l| l.stage.is_lost).count();
    let total_value: i64 = leads.iter().filter_map(|l| l.estimated_value_minor).sum();
    let won_value: i64 = won.iter().filter_map(|l| l.estimated_value_minor).sum();
    let conversion = if total_leads > 0 {
        won.len() as f64 / total_leads as f64 * 100.0
    } else {
        0.0
    };

    let activities = models.activities.scheduled_between(start, end);
    let completed = activities
        .iter()
        .filter(|a| a.status == ActivityStatus::Completed)
        .count();

    let mut out = String::new();
    out.push_str("forgecrm monthly summary report\n");
    out.push_str(&format!("Period: {year}-{month:02}\n"));
    out.push_str(&format!("Generated: {}\n", Utc::now().format("%Y-%m-%d %H:%M")));
    out.push_str(&"=".repeat(50));
    out.push_str("\n\nLEAD METRICS\n");
    out.push_str(&"-".repeat(20));
    out.push('\n');
    out.push_str(&format!("Total leads: {total_leads}\n"));
    out.push_str(&format!("Won leads: {}\n", won.len()));
    out.push_str(&format!("Lost leads: {lost}\n"));
    out.push_str(&format!("Conversion rate: {conversion:.1}%\n"));
    out.push_str(&format!("Total value: {}\n", minor_to_display(total_value)));
    out.push_str(&format!("Won value: {}\n", minor_to_display(won_value)));
    out.push_str("\nACTIVITY METRICS\n");
    out.push_str(&"-".repeat(20));
    out.push('\n');
    out.push_str(&format!("Total activities: {}\n", activities.len()));
    out.push_str(&format!("Completed activities: {completed}\n"));

    let path = out_dir.join(format!("summary_{year}-{month:02}.txt"));
    fs::write(&path, out).with_context(|| format!("failed to write {}", path.display()))?;
    println!("- {}", path.display());
    Ok(())
}

fn leads_report(
    models: &ReadModels,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    out_dir: &Path,
    year: i32,
    month: u32,
) -> anyhow::Result<()> {
    let path = out_dir.join(format!("leads_{year}-{month:02}.csv"));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record([
        "number",
        "title",
        "stage",
        "estimated_value_minor",
        "probability",
        "weighted_value_minor",
        "requires_approval",
        "approved",
        "owner",
        "opened_at",
    ])?;

    for lead in models.leads.opened_between(start, end) {
        writer.write_record([
            lead.number.to_string(),
            lead.title.clone(),
            lead.stage.name.clone(),
            lead
                .estimated_value_minor
                .map(|v| v.to_string())
                .unwrap_or_default(),
            lead.probability.to_string(),
            lead
                .weighted_value_minor
                .map(|v| v.to_string())
                .unwrap_or_default(),
            lead.requires_approval.to_string(),
            lead.approval.is_some().to_string(),
            lead.owner.map(|o| o.to_string()).unwrap_or_default(),
            lead.opened_at.to_rfc3339(),
        ])?;
    }

    writer.flush()?;
    println!("- {}", path.display());
    Ok(())
}

fn activities_report(
    models: &ReadModels,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    out_dir: &Path,
    year: i32,
    month: u32,
) -> anyhow::Result<()> {
    let path = out_dir.join(format!("activities_{year}-{month:02}.csv"));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record([
        "subject",
        "kind",
        "status",
        "priority",
        "scheduled_at",
        "duration_minutes",
        "assigned_to",
        "completed_at",
        "completed_by",
    ])?;

    for activity in models.activities.scheduled_between(start, end) {
        writer.write_record([
            activity.subject.clone(),
            format!("{:?}", activity.kind),
            format!("{:?}", activity.status),
            format!("{:?}", activity.priority),
            activity.scheduled_at.to_rfc3339(),
            activity.duration_minutes.to_string(),
            activity
                .assigned_to
                .map(|u| u.to_string())
                .unwrap_or_default(),
            activity
                .completed_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            activity
                .completed_by
                .map(|u| u.to_string())
                .unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    println!("- {}", path.display());
    Ok(())
}

fn products_report(
    models: &ReadModels,
    out_dir: &Path,
    year: i32,
    month: u32,
) -> anyhow::Result<()> {
    let path = out_dir.join(format!("products_{year}-{month:02}.csv"));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record([
        "sku",
        "name",
        "brand",
        "category",
        "price_minor",
        "stock_quantity",
        "active",
        "imported",
    ])?;

    for product in models.products.list() {
        writer.write_record([
            product.sku.clone(),
            product.name.clone(),
            product.brand.clone(),
            product.details.category.code().to_string(),
            product
                .details
                .price_minor
                .map(|p| p.to_string())
                .unwrap_or_default(),
            product.stock_quantity.to_string(),
            product.active.to_string(),
            product.imported.to_string(),
        ])?;
    }

    writer.flush()?;
    println!("- {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_range_covers_whole_month_exclusive() {
        let (start, end) = month_range(2026, 8).unwrap();
        assert_eq!(start.to_rfc3339(), "2026-08-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2026-09-01T00:00:00+00:00");

        let (_, december_end) = month_range(2026, 12).unwrap();
        assert_eq!(december_end.year(), 2027);
        assert_eq!(december_end.month(), 1);
    }

    #[test]
    fn month_range_rejects_bad_months() {
        assert!(month_range(2026, 0).is_err());
        assert!(month_range(2026, 13).is_err());
    }

    #[test]
    fn minor_units_render_with_two_decimals() {
        assert_eq!(minor_to_display(1_234_56), "1234.56");
        assert_eq!(minor_to_display(100), "1.00");
        assert_eq!(minor_to_display(0), "0.00");
    }
}
