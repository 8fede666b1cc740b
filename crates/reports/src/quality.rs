use crate::envelope::ReportBuilder;
use crate::error::ReportError;
use crate::orchestrator::ReportContext;
use analytics::aggregate::mean;
use analytics::{JoinKind, Metric, Signal, percent, round2};
use core_types::{DataSystem, Table};
use datastore::profile_table;
use serde_json::{Map, Value as Json, json};

const ALL_CLEAR: &str = "Data quality is in good overall shape";

/// Completeness, duplicates and referential integrity of the identity store.
pub(crate) fn data_quality(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let users = ctx.load(report, DataSystem::Mysql, "users")?;
    let clients = ctx.load(report, DataSystem::Mysql, "clients")?;
    let agents = ctx.load(report, DataSystem::Mysql, "agents")?;
    let beneficiaries = ctx.load(report, DataSystem::Mysql, "beneficiaries")?;
    let tables = [&users, &clients, &agents, &beneficiaries];

    let mut signals = Vec::new();
    let mut table_quality = Map::new();
    let mut completeness = Vec::new();
    for table in tables {
        let profile = profile_table(table);
        completeness.push(profile.completeness);
        if !table.is_empty() {
            signals.push(Signal::about(Metric::Completeness, profile.completeness, table.name()));
            signals.push(Signal::about(Metric::DuplicatePercentage, profile.duplicate_percentage, table.name()));
        }

        let null_counts: Map<String, Json> = profile
            .columns
            .iter()
            .map(|c| (c.name.clone(), Json::from(c.nulls)))
            .collect();
        let null_percentages: Map<String, Json> = profile
            .columns
            .iter()
            .map(|c| (c.name.clone(), Json::from(c.null_percentage)))
            .collect();
        let kinds: Map<String, Json> = profile
            .columns
            .iter()
            .map(|c| (c.name.clone(), Json::from(c.kind)))
            .collect();
        table_quality.insert(
            profile.table.clone(),
            json!({
                "total_rows": profile.rows,
                "total_columns": profile.columns.len(),
                "null_counts": null_counts,
                "null_percentages": null_percentages,
                "duplicate_rows": profile.duplicate_rows,
                "duplicate_percentage": profile.duplicate_percentage,
                "completeness_score": profile.completeness,
                "column_kinds": kinds,
            }),
        );
    }

    let mut integrity = Map::new();
    for (relationship, child, parent, keys) in [
        ("clients->users", &clients, &users, ("user_id", "id")),
        ("beneficiaries->clients", &beneficiaries, &clients, ("client_id", "user_id")),
    ] {
        if let Some(entry) = references(ctx, report, relationship, child, parent, keys)? {
            if let (false, Some(pct)) = (child.is_empty(), entry["integrity_percentage"].as_f64()) {
                signals.push(Signal::about(Metric::IntegrityPercentage, pct, relationship));
            }
            integrity.insert(relationship.to_string(), entry);
        }
    }

    report.summary("total_records", tables.iter().map(|t| t.len()).sum::<usize>());
    report.summary("overall_completeness_score", round2(mean(&completeness).unwrap_or(0.0)));
    report.breakdown("table_quality", table_quality);
    report.breakdown("referential_integrity", integrity);
    report.insights(ctx.insights.evaluate_or(&signals, ALL_CLEAR));
    Ok(())
}

/// Share of `child` rows whose reference resolves in `parent`; `None` when
/// the key columns are missing on either side.
fn references(
    ctx: &ReportContext<'_>,
    report: &mut ReportBuilder,
    relationship: &str,
    child: &Table,
    parent: &Table,
    keys: (&str, &str),
) -> Result<Option<Json>, ReportError> {
    let Some(joined) = ctx
        .join(report, relationship, child, parent, &[keys], JoinKind::Left)?
        .into_joined()
    else {
        return Ok(None);
    };
    let total = child.len();
    let valid = joined.matched_left_rows();
    Ok(Some(json!({
        "valid_references": valid,
        "total_rows": total,
        "integrity_percentage": percent(valid, total),
        "orphaned_rows": total - valid,
    })))
}
