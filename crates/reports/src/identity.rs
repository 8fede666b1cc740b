//! Single-table reports over the identity store: users, clients, agents and
//! beneficiaries.

use crate::cross::{AGE_BREAKPOINTS, AGE_LABELS};
use crate::envelope::{ReportBuilder, counts, money_opt};
use crate::error::ReportError;
use crate::orchestrator::ReportContext;
use analytics::aggregate::{max, mean, median, min};
use analytics::{Buckets, MetricSpec, Reducer, count_keys, group_by, round_dp, trailing, value_counts};
use core_types::{DataSystem, Table, Value};
use serde_json::{Map, Value as Json, json};
use std::collections::HashSet;

const REGISTRATION_MONTHS: usize = 12;

/// The non-null cells of a column rendered as text; `None` if the column is absent.
pub(crate) fn texts(table: &Table, column: &str) -> Option<Vec<String>> {
    let values = table.column(column).ok()?;
    Some(
        values
            .into_iter()
            .filter(|v| !v.is_null())
            .map(ToString::to_string)
            .collect(),
    )
}

/// Mean character length, one decimal.
pub(crate) fn mean_length(values: &[String]) -> Option<f64> {
    let lengths: Vec<f64> = values.iter().map(|v| v.chars().count() as f64).collect();
    mean(&lengths).map(|m| round_dp(m, 1))
}

/// `length -> occurrences`, most frequent first.
pub(crate) fn length_distribution(values: &[String]) -> Map<String, Json> {
    counts(count_keys(values.iter().map(|v| v.chars().count())))
}

/// Whole-year ages of a `birth_date` column, aligned with the table rows.
fn ages_of(ctx: &ReportContext<'_>, table: &Table) -> Vec<Option<i64>> {
    table
        .rows()
        .map(|row| ctx.clock.age_years(row.get("birth_date")))
        .collect()
}

pub(crate) fn user_statistics(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let users = ctx.load(report, DataSystem::Mysql, "users")?;
    let n = ctx.top_n();

    report.summary("total_users", users.len());
    let recent = if users.has_column("created_at") {
        ctx.clock.count_recent(&users, "created_at", ctx.recent_window())
    } else {
        0
    };
    report.summary("recent_registrations", recent);

    if let Some(roles) = value_counts(&users, "role") {
        report.breakdown("users_by_role", counts(roles));
    }
    if let Some(states) = value_counts(&users, "state") {
        report.breakdown("users_by_state", counts(states.into_iter().take(n)));
    }
    if let Some(cities) = value_counts(&users, "city") {
        report.breakdown("top_cities", counts(cities.into_iter().take(n)));
    }
    if users.has_column("created_at") {
        let monthly = ctx.clock.counts_by_period(&users, "created_at");
        report.breakdown(
            "monthly_registrations",
            counts(trailing(&monthly, REGISTRATION_MONTHS)),
        );
    }

    let (missing_emails, duplicate_emails) = match users.column("email") {
        Ok(emails) => {
            let mut seen = HashSet::new();
            let duplicates = emails
                .iter()
                .filter_map(|v| v.key())
                .filter(|email| !seen.insert(email.clone()))
                .count();
            (emails.iter().filter(|v| v.is_null()).count(), duplicates)
        }
        Err(_) => (0, 0),
    };
    let missing_phones = if users.has_column("phone") {
        users.len() - users.non_null_count("phone")
    } else {
        0
    };
    report.breakdown(
        "data_quality",
        json!({
            "missing_emails": missing_emails,
            "missing_phones": missing_phones,
            "duplicate_emails": duplicate_emails,
        }),
    );

    Ok(())
}

pub(crate) fn client_demographics(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let clients = ctx.load(report, DataSystem::Mysql, "clients")?;
    let n = ctx.top_n();

    report.summary("total_clients", clients.len());
    if let Some(documents) = value_counts(&clients, "document_type") {
        report.breakdown("document_types", counts(documents));
    }

    if clients.has_column("birth_date") {
        let known: Vec<f64> = ages_of(ctx, &clients).into_iter().flatten().map(|a| a as f64).collect();
        let mut statistics = Map::new();
        if let Some(average) = mean(&known) {
            statistics.insert("average_age".to_string(), json!(round_dp(average, 1)));
            statistics.insert("median_age".to_string(), json!(median(&known)));
            statistics.insert("min_age".to_string(), json!(min(&known).map(|a| a as i64)));
            statistics.insert("max_age".to_string(), json!(max(&known).map(|a| a as i64)));
            let buckets = Buckets::new(&AGE_BREAKPOINTS, &AGE_LABELS)?;
            statistics.insert("age_distribution".to_string(), counts(buckets.counts(&known)).into());
        }
        report.summary_opt("average_age", statistics.get("average_age").cloned());
        report.breakdown("age_statistics", statistics);
    }

    let mut common_names = Map::new();
    for (column, key) in [("first_name", "first_names"), ("last_name", "last_names")] {
        if let Some(names) = value_counts(&clients, column) {
            common_names.insert(key.to_string(), counts(names.into_iter().take(n)).into());
        }
    }
    report.breakdown("common_names", common_names);

    report.breakdown(
        "data_completeness",
        json!({
            "has_birth_date": clients.non_null_count("birth_date"),
            "has_first_name": clients.non_null_count("first_name"),
            "has_last_name": clients.non_null_count("last_name"),
        }),
    );

    Ok(())
}

/// Head count and code shape of the agent roster, without any policy data.
pub(crate) fn agent_overview(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let agents = ctx.load(report, DataSystem::Mysql, "agents")?;

    let status = value_counts(&agents, "is_active").unwrap_or_default();
    let tally = |flag: bool| -> usize {
        status
            .iter()
            .filter(|(k, _)| k.to_value().as_bool() == Some(flag))
            .map(|(_, n)| *n)
            .sum()
    };
    report.summary("total_agents", agents.len());
    report.summary("active_agents", tally(true));
    report.summary("inactive_agents", tally(false));
    report.breakdown("status_distribution", counts(status.iter().cloned()));

    if let Some(codes) = texts(&agents, "code") {
        let unique: HashSet<&str> = codes.iter().map(String::as_str).collect();
        report.breakdown(
            "code_analysis",
            json!({
                "avg_code_length": mean_length(&codes),
                "code_length_distribution": length_distribution(&codes),
                "unique_codes": unique.len(),
            }),
        );
    }

    Ok(())
}

pub(crate) fn beneficiary_relationships(
    ctx: &ReportContext<'_>,
    report: &mut ReportBuilder,
) -> Result<(), ReportError> {
    let beneficiaries = ctx.load(report, DataSystem::Mysql, "beneficiaries")?;

    report.summary("total_beneficiaries", beneficiaries.len());
    if let Some(relationships) = value_counts(&beneficiaries, "relationship") {
        report.breakdown("relationship_distribution", counts(relationships));
    }

    if let Some(per_client) = value_counts(&beneficiaries, "client_id") {
        let sizes: Vec<f64> = per_client.iter().map(|(_, n)| *n as f64).collect();
        let multiple = per_client.iter().filter(|(_, n)| *n > 1).count();
        report.breakdown(
            "beneficiaries_per_client",
            json!({
                "avg_beneficiaries_per_client": money_opt(mean(&sizes)),
                "max_beneficiaries_per_client": max(&sizes).map(|m| m as usize),
                "clients_with_multiple_beneficiaries": multiple,
                "distribution": counts(count_keys(per_client.iter().map(|(_, n)| *n))),
            }),
        );
    }

    if beneficiaries.has_column("birth_date") {
        let ages: Vec<Value> = ages_of(ctx, &beneficiaries).into_iter().map(Value::from).collect();
        let known: Vec<f64> = ages.iter().filter_map(Value::as_f64).collect();
        let mut analysis = Map::new();
        analysis.insert("average_age".to_string(), json!(mean(&known).map(|a| round_dp(a, 1))));
        if beneficiaries.has_column("relationship") {
            let aged = beneficiaries.with_column("age", ages)?;
            let by_relationship: Map<String, Json> = group_by(&aged, &["relationship"])?
                .aggregate(&[MetricSpec::new("age", Reducer::Mean)])
                .iter()
                .filter_map(|row| Some((row.label(), json!(round_dp(row.get_f64("age_mean")?, 1)))))
                .collect();
            analysis.insert("age_by_relationship".to_string(), by_relationship.into());
        }
        report.breakdown("age_analysis", analysis);
    }

    Ok(())
}
