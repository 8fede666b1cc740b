use crate::envelope::{ReportBuilder, counts, peak, trough};
use crate::error::ReportError;
use crate::orchestrator::ReportContext;
use analytics::aggregate::{max, mean, std_dev};
use analytics::{Metric, Signal, parse_timestamp, round2, safe_div, value_counts};
use chrono::{NaiveDate, TimeDelta, Timelike};
use core_types::{DataSystem, KeyValue, Table};
use itertools::Itertools;
use serde_json::{Map, Value as Json, json};
use std::collections::{BTreeMap, BTreeSet};

const TIMESTAMP: &str = "timestamp";
const SERVICE: &str = "servicio";

/// Hourly, daily and per-service load of the audit trail within the last
/// `hours`.
pub(crate) fn activity_patterns(
    ctx: &ReportContext<'_>,
    report: &mut ReportBuilder,
    hours: u32,
) -> Result<(), ReportError> {
    report.parameter("hours", hours);
    let audit = ctx.load(report, DataSystem::Cassandra, "transaction_audit")?;
    ctx.require(&audit, TIMESTAMP)?;

    let recent = ctx.clock.recent(&audit, TIMESTAMP, TimeDelta::hours(i64::from(hours)));
    report.summary("total_transactions_analyzed", recent.len());
    report.summary("analysis_period_hours", hours);
    if recent.is_empty() {
        report.summary("note", format!("No data found in the last {hours} hours"));
        return Ok(());
    }

    let hourly = ctx.clock.counts_by_hour(&recent, TIMESTAMP);
    let active: Vec<(u32, usize)> = (0u32..)
        .zip(hourly)
        .filter(|(_, n)| *n > 0)
        .collect();
    let volumes: Vec<f64> = active.iter().map(|(_, n)| *n as f64).collect();
    let average = mean(&volumes).unwrap_or(0.0);
    let spread = std_dev(&volumes);

    let mut hourly_patterns = Map::new();
    hourly_patterns.insert("total_activity_by_hour".to_string(), counts(active.clone()).into());
    hourly_patterns.insert("peak_activity_hour".to_string(), json!(peak(&active)));
    hourly_patterns.insert("lowest_activity_hour".to_string(), json!(trough(&active)));
    if recent.has_column(SERVICE) {
        hourly_patterns.extend(service_hours(&recent));
    }
    report.breakdown("hourly_patterns", hourly_patterns);

    let days: Vec<(&str, usize)> = ctx
        .clock
        .counts_by_weekday(&recent, TIMESTAMP)
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .collect();
    let busiest = peak(&days);
    let peak_hours: Vec<(u32, usize)> = match spread {
        Some(spread) => active
            .iter()
            .copied()
            .filter(|(_, n)| *n as f64 > average + spread)
            .collect(),
        None => Vec::new(),
    };
    report.breakdown(
        "workload_analysis",
        json!({
            "workload_by_day": counts(days.clone()),
            "busiest_day": busiest,
            "quietest_day": trough(&days),
            "peak_hours": {
                "hours": peak_hours.iter().map(|(h, _)| *h).collect::<Vec<_>>(),
                "threshold": spread.map(|s| round2(average + s)),
                "peak_hours_activity": counts(peak_hours.clone()),
            },
        }),
    );

    if recent.has_column(SERVICE) {
        report.breakdown("service_efficiency", service_efficiency(ctx, &recent));
        let services: BTreeSet<KeyValue> = recent
            .rows()
            .filter_map(|row| row.get(SERVICE).key())
            .collect();
        report.summary("unique_services", services.len());
    }

    let daily: Vec<(NaiveDate, usize)> = ctx.clock.counts_by_date(&recent, TIMESTAMP).into_iter().collect();
    if daily.len() > 1 {
        let changes: Vec<f64> = daily
            .iter()
            .tuple_windows()
            .map(|((_, a), (_, b))| *b as f64 - *a as f64)
            .collect();
        let change = mean(&changes).unwrap_or(0.0);
        let direction = if change > 0.0 {
            "increasing"
        } else if change < 0.0 {
            "decreasing"
        } else {
            "stable"
        };
        report.breakdown(
            "temporal_trends",
            json!({
                "daily_activity": counts(daily.clone()),
                "average_daily_change": round2(change),
                "trend_direction": direction,
                "most_active_date": peak(&daily).map(|d| d.to_string()),
                "least_active_date": trough(&daily).map(|d| d.to_string()),
            }),
        );
    }

    let multiplier = safe_div(max(&volumes).unwrap_or(0.0), Some(average));
    let consistency = spread.map(|s| round2(100.0 - safe_div(s * 100.0, Some(average))));
    report.summary("transactions_per_hour", safe_div(recent.len() as f64, Some(f64::from(hours))));
    report.summary("peak_activity_multiplier", multiplier);
    report.summary_opt("activity_consistency_score", consistency);

    let mut signals = vec![Signal::new(Metric::PeakMultiplier, multiplier)];
    if let (Some((first, _)), Some((last, _))) = (peak_hours.first(), peak_hours.last()) {
        signals.push(Signal::about(
            Metric::PeakHourCount,
            peak_hours.len() as f64,
            format!("{first}:00-{last}:00"),
        ));
    }
    if let Some(score) = consistency {
        signals.push(Signal::new(Metric::ConsistencyScore, score));
    }
    if let Some(day) = busiest {
        let volume = days.iter().find(|(d, _)| *d == day).map_or(0, |(_, n)| *n);
        signals.push(Signal::about(Metric::BusiestDayVolume, volume as f64, day));
    }
    report.insights(ctx.insights.evaluate(&signals));

    Ok(())
}

/// The service by hour matrix, zero-filled across all services, and the
/// busiest service of each active hour.
fn service_hours(recent: &Table) -> Map<String, Json> {
    let mut matrix: BTreeMap<u32, BTreeMap<KeyValue, usize>> = BTreeMap::new();
    let mut services: BTreeSet<KeyValue> = BTreeSet::new();
    for row in recent.rows() {
        let (Some(instant), Some(service)) = (parse_timestamp(row.get(TIMESTAMP)), row.get(SERVICE).key()) else {
            continue;
        };
        services.insert(service.clone());
        *matrix.entry(instant.hour()).or_default().entry(service).or_insert(0) += 1;
    }

    let mut rendered = Map::new();
    let mut leaders = Map::new();
    for (hour, row) in &matrix {
        let filled: Vec<(&KeyValue, usize)> = services
            .iter()
            .map(|s| (s, row.get(s).copied().unwrap_or(0)))
            .collect();
        if let Some(leader) = peak(&filled) {
            leaders.insert(
                hour.to_string(),
                json!({
                    "most_active_service": leader.to_string(),
                    "activity_count": row.get(leader).copied().unwrap_or(0),
                    "total_activity": row.values().sum::<usize>(),
                }),
            );
        }
        rendered.insert(hour.to_string(), counts(filled).into());
    }

    let mut out = Map::new();
    out.insert("peak_services_by_hour".to_string(), Json::Object(leaders));
    out.insert("service_activity_matrix".to_string(), Json::Object(rendered));
    out
}

/// Volume per service and transactions per distinct active day.
fn service_efficiency(ctx: &ReportContext<'_>, recent: &Table) -> Json {
    let mut per_service: BTreeMap<KeyValue, (usize, BTreeSet<NaiveDate>)> = BTreeMap::new();
    for row in recent.rows() {
        let (Some(service), Some(instant)) = (row.get(SERVICE).key(), parse_timestamp(row.get(TIMESTAMP))) else {
            continue;
        };
        let entry = per_service.entry(service).or_default();
        entry.0 += 1;
        entry.1.insert(instant.date_naive());
    }

    let n = ctx.top_n();
    let by_volume: Vec<Json> = per_service
        .iter()
        .sorted_by(|a, b| b.1.0.cmp(&a.1.0))
        .take(n)
        .map(|(service, (count, _))| json!({ "servicio": service.to_string(), "transactions": count }))
        .collect();
    let by_consistency: Vec<Json> = per_service
        .iter()
        .map(|(service, (count, dates))| (service, safe_div(*count as f64, Some(dates.len() as f64))))
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .take(n)
        .map(|(service, rate)| json!({ "servicio": service.to_string(), "transactions_per_day": rate }))
        .collect();
    let distribution = value_counts(recent, SERVICE).unwrap_or_default();

    json!({
        "top_services_by_volume": by_volume,
        "most_consistent_services": by_consistency,
        "service_distribution": counts(distribution.into_iter().take(n)),
    })
}

/// Whole-trail view of the audit log: services, hours of day and operations.
pub(crate) fn transaction_audit(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let audit = ctx.load(report, DataSystem::Cassandra, "transaction_audit")?;
    report.summary("total_transactions", audit.len());

    if let Some(services) = value_counts(&audit, SERVICE) {
        report.summary("total_services", services.len());
        report.breakdown(
            "service_analysis",
            json!({
                "top_services": counts(services.iter().take(ctx.top_n()).cloned()),
                "total_services": services.len(),
                "service_usage_distribution": counts(services),
            }),
        );
    }

    if audit.has_column(TIMESTAMP) {
        let active: Vec<(u32, usize)> = (0u32..)
            .zip(ctx.clock.counts_by_hour(&audit, TIMESTAMP))
            .filter(|(_, n)| *n > 0)
            .collect();
        report.breakdown(
            "temporal_analysis",
            json!({
                "hourly_distribution": counts(active.clone()),
                "peak_hour": peak(&active),
                "lowest_activity_hour": trough(&active),
            }),
        );
    }

    if let Some(operations) = value_counts(&audit, "operacion") {
        let most_common = operations.first().map(|(op, _)| op.to_string());
        report.summary_opt("most_common_operation", most_common.clone());
        report.breakdown(
            "operation_analysis",
            json!({
                "operation_types": counts(operations),
                "most_common_operation": most_common,
            }),
        );
    }

    Ok(())
}
