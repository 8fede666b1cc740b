//! Reports that stitch datasets from more than one record system together.

use crate::envelope::{ReportBuilder, counts, grouped, money, money_opt, ranked};
use crate::error::ReportError;
use crate::orchestrator::ReportContext;
use analytics::aggregate::{mean, sum};
use analytics::{
    Buckets, GroupRow, JoinKind, JoinOutcome, JoinResult, Metric, MetricSpec, Reducer, Signal,
    group_by, parse_timestamp, percent, percentile, ratio, safe_div, trailing, value_counts,
};
use chrono::{DateTime, Utc};
use core_types::{DataSystem, KeyValue, Table, Value};
use serde_json::{Map, Value as Json, json};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) const AGE_BREAKPOINTS: [f64; 6] = [0.0, 25.0, 35.0, 45.0, 55.0, 65.0];
pub(crate) const AGE_LABELS: [&str; 6] = ["<25", "25-34", "35-44", "45-54", "55-64", "65+"];

const CLAIM_KEYS: &[(&str, &str)] = &[("id", "policy_id"), ("policy_number", "policy_number")];

/// Specs over right-side columns of a join, named after the original column
/// so that collision renames never leak into report fields.
fn right_metrics(result: &JoinResult, wanted: &[(&str, Reducer)]) -> Vec<MetricSpec> {
    wanted
        .iter()
        .filter_map(|(column, reducer)| {
            result.right_column(column).map(|actual| {
                MetricSpec::new(actual, *reducer).alias(&format!("{column}_{}", reducer.suffix()))
            })
        })
        .collect()
}

fn entry(label: &str, row: &GroupRow) -> Json {
    let mut object = Map::new();
    object.insert(label.to_string(), Json::from(row.label()));
    object.extend(row.metrics_json(2));
    Json::Object(object)
}

fn ranking(label: &str, rows: &[&GroupRow], metric: &str, n: usize) -> Vec<Json> {
    ranked(rows, metric, n)
        .into_iter()
        .map(|row| entry(label, row))
        .collect()
}

fn keys_of(table: &Table, column: &str) -> BTreeSet<KeyValue> {
    table
        .column(column)
        .map(|values| values.into_iter().filter_map(Value::key).collect())
        .unwrap_or_default()
}

pub(crate) fn customer_policy_profile(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let users = ctx.load(report, DataSystem::Mysql, "users")?;
    let clients = ctx.load(report, DataSystem::Mysql, "clients")?;
    let policies = ctx.load(report, DataSystem::Postgresql, "policies")?;

    let customers = match ctx.join(report, "users-clients", &users, &clients, &[("id", "user_id")], JoinKind::Inner)? {
        JoinOutcome::Joined(result) => result.into_table(),
        JoinOutcome::Fallback { .. } => {
            report.summary("total_users", users.len());
            report.summary("total_clients", clients.len());
            report.summary("total_policies", policies.len());
            report.summary_opt("total_premium_volume", policies.numeric("premium").map(|p| money(sum(&p))));
            if let Some(states) = value_counts(&users, "state") {
                report.breakdown("users_by_state", counts(states));
            }
            return Ok(());
        }
    };
    let total_customers = customers.len();

    let profile = match ctx.join(
        report,
        "clients-policies",
        &customers,
        &policies,
        &[("user_id", "customer_id"), ("id", "customer_id")],
        JoinKind::Left,
    )? {
        JoinOutcome::Joined(result) => result,
        JoinOutcome::Fallback { .. } => {
            report.summary("total_customers", total_customers);
            report.summary("total_policies", policies.len());
            report.summary_opt("total_premium_volume", policies.numeric("premium").map(|p| money(sum(&p))));
            if let Some(states) = value_counts(&customers, "state") {
                report.breakdown("customers_by_state", counts(states));
            }
            return Ok(());
        }
    };

    let table = profile.table();
    let customer_key = profile.keys().left.clone();
    let with_policies = profile.matched_left_keys();
    let total_policies = profile.matched_rows();
    let premiums = profile.right_column("premium").and_then(|c| table.numeric(c));

    report.summary("total_customers", total_customers);
    report.summary("customers_with_policies", with_policies);
    report.summary("penetration_rate", percent(with_policies, total_customers));
    report.summary("total_policies", total_policies);
    report.summary_opt("total_premium_volume", premiums.as_ref().map(|p| money(sum(p))));
    report.summary(
        "avg_policies_per_customer",
        safe_div(total_policies as f64, Some(with_policies as f64)),
    );

    let mut policy_specs = vec![MetricSpec::new(&customer_key, Reducer::Distinct).alias("customers")];
    policy_specs.extend(right_metrics(
        &profile,
        &[
            ("policy_number", Reducer::Count),
            ("policy_number", Reducer::Distinct),
            ("premium", Reducer::Sum),
            ("premium", Reducer::Mean),
            ("sum_insured", Reducer::Sum),
            ("sum_insured", Reducer::Mean),
        ],
    ));

    if table.has_column("state") {
        let by_state = group_by(table, &["state"])?.aggregate(&policy_specs);
        report.breakdown("by_state", grouped(&by_state));
    }

    if table.has_column("birth_date") {
        let buckets = Buckets::new(&AGE_BREAKPOINTS, &AGE_LABELS)?;
        let ages: Vec<Option<i64>> = table
            .rows()
            .map(|row| ctx.clock.age_years(row.get("birth_date")))
            .collect();
        let groups: Vec<Value> = ages
            .iter()
            .map(|age| Value::from(age.map(|a| buckets.label_for(a as f64).to_string())))
            .collect();
        let aged = table
            .with_column("age", ages.into_iter().map(Value::from).collect())?
            .with_column("age_group", groups)?;

        let mut specs = policy_specs.clone();
        specs.push(MetricSpec::new("age", Reducer::Mean).alias("age_mean"));
        let rows = group_by(&aged, &["age_group"])?.aggregate(&specs);
        let by_label: BTreeMap<String, &GroupRow> = rows.iter().map(|r| (r.label(), r)).collect();
        let ordered: Map<String, Json> = buckets
            .labels()
            .iter()
            .filter_map(|label| {
                by_label
                    .get(label)
                    .map(|row| (label.clone(), Json::Object(row.metrics_json(2))))
            })
            .collect();
        report.breakdown("by_age_group", ordered);
    }

    if let Some(premium_col) = profile.right_column("premium") {
        let per_customer = group_by(table, &[customer_key.as_str()])?
            .aggregate(&[MetricSpec::new(premium_col, Reducer::Sum).alias("premium")]);
        let values: Vec<f64> = per_customer.iter().filter_map(|r| r.get_f64("premium")).collect();
        if let (Some(p40), Some(p80)) = (percentile(&values, 40.0), percentile(&values, 80.0)) {
            let refs: Vec<&GroupRow> = per_customer.iter().collect();
            let top: Vec<Json> = ranked(&refs, "premium", ctx.top_n())
                .into_iter()
                .map(|row| json!({ "customer": row.label(), "premium": money(row.get_f64("premium").unwrap_or(0.0)) }))
                .collect();
            report.breakdown(
                "customer_value",
                json!({
                    "high_value_customers": values.iter().filter(|v| **v > p80).count(),
                    "medium_value_customers": values.iter().filter(|v| **v > p40 && **v <= p80).count(),
                    "low_value_customers": values.iter().filter(|v| **v <= p40).count(),
                    "p40_threshold": money(p40),
                    "p80_threshold": money(p80),
                    "avg_customer_value": money_opt(mean(&values)),
                    "top_customers": top,
                }),
            );
        }
    }

    Ok(())
}

pub(crate) fn agent_performance(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let agents = ctx.load(report, DataSystem::Mysql, "agents")?;
    let policies = ctx.load(report, DataSystem::Postgresql, "policies")?;
    let products = ctx.load_optional(report, DataSystem::Postgresql, "products")?;

    let total_agents = agents.len();
    let active_agents = if agents.has_column("is_active") {
        agents
            .rows()
            .filter(|row| row.get("is_active").as_bool() == Some(true))
            .count()
    } else {
        total_agents
    };
    report.summary("total_agents", total_agents);
    report.summary("active_agents", active_agents);

    let joined = match ctx.join(report, "agents-policies", &agents, &policies, &[("code", "agent_id")], JoinKind::Left)? {
        JoinOutcome::Joined(result) => result,
        JoinOutcome::Fallback { .. } => {
            report.summary("total_policies", policies.len());
            report.summary_opt("total_premium", policies.numeric("premium").map(|p| money(sum(&p))));
            if let Some(status) = value_counts(&agents, "is_active") {
                report.breakdown("agents_by_status", counts(status));
            }
            return Ok(());
        }
    };

    let mut specs = vec![MetricSpec::new(joined.right_key_column(), Reducer::Count).alias("policy_count")];
    for column in ["first_name", "last_name", "is_active"] {
        if agents.has_column(column) {
            specs.push(MetricSpec::new(column, Reducer::First).alias(column));
        }
    }
    specs.extend(right_metrics(
        &joined,
        &[
            ("premium", Reducer::Sum),
            ("premium", Reducer::Mean),
            ("sum_insured", Reducer::Sum),
            ("sum_insured", Reducer::Mean),
        ],
    ));
    let product_col = joined.right_column("product_id").map(str::to_string);
    if let Some(column) = &product_col {
        specs.push(MetricSpec::new(column, Reducer::Distinct).alias("product_diversity"));
    }

    let enriched = match (&products, &product_col) {
        (Some(products), Some(column)) => ctx
            .join(
                report,
                "policies-products",
                joined.table(),
                products,
                &[(column.as_str(), "code")],
                JoinKind::Left,
            )?
            .into_joined(),
        _ => None,
    };
    if let Some(type_col) = enriched.as_ref().and_then(|r| r.right_column("product_type")) {
        specs.push(MetricSpec::new(type_col, Reducer::Distinct).alias("product_type_diversity"));
    }
    let table = enriched.as_ref().map(JoinResult::table).unwrap_or(joined.table());

    let agent_key = joined.keys().left.clone();
    let rows = group_by(table, &[agent_key.as_str()])?.aggregate(&specs);
    report.breakdown("agents", grouped(&rows));

    let with_sales: Vec<&GroupRow> = rows
        .iter()
        .filter(|r| r.get_f64("policy_count").unwrap_or(0.0) > 0.0)
        .collect();
    let policy_counts: Vec<f64> = with_sales.iter().filter_map(|r| r.get_f64("policy_count")).collect();
    let premium_sums: Vec<f64> = with_sales.iter().filter_map(|r| r.get_f64("premium_sum")).collect();

    report.summary("agents_with_sales", with_sales.len());
    report.summary("sales_penetration", percent(with_sales.len(), active_agents));
    report.summary("total_policies_sold", sum(&policy_counts) as u64);
    report.summary("total_premium_generated", money(sum(&premium_sums)));
    report.summary("avg_policies_per_agent", money(mean(&policy_counts).unwrap_or(0.0)));

    let n = ctx.top_n();
    let mut top = Map::new();
    top.insert("by_volume".to_string(), Json::from(ranking("agent", &with_sales, "policy_count", n)));
    top.insert("by_premium".to_string(), Json::from(ranking("agent", &with_sales, "premium_sum", n)));
    if product_col.is_some() {
        top.insert(
            "by_diversification".to_string(),
            Json::from(ranking("agent", &with_sales, "product_diversity", n)),
        );
    }
    report.breakdown("top_performers", top);

    Ok(())
}

pub(crate) fn claims_vs_policies(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let policies = ctx.load(report, DataSystem::Postgresql, "policies")?;
    let claims = ctx.load(report, DataSystem::Cassandra, "reclamos")?;
    let products = ctx.load_optional(report, DataSystem::Postgresql, "products")?;

    let enriched = match &products {
        Some(products) => ctx
            .join(report, "policies-products", &policies, products, &[("product_id", "code")], JoinKind::Left)?
            .into_joined(),
        None => None,
    };
    let base = enriched.as_ref().map(JoinResult::table).unwrap_or(&policies);

    let joined = match ctx.join(report, "policies-claims", base, &claims, CLAIM_KEYS, JoinKind::Left)? {
        JoinOutcome::Joined(result) => result,
        JoinOutcome::Fallback { .. } => return separate_claims_policies(ctx, report, &policies, &claims),
    };
    let table = joined.table();

    let total_policies = policies.len();
    let with_claims = joined.matched_left_keys();
    report.summary("total_policies", total_policies);
    report.summary("policies_with_claims", with_claims);
    report.summary("claim_rate_percentage", percent(with_claims, total_policies));
    report.summary("total_claims", claims.len());
    report.summary("linked_claims", joined.matched_rows());

    if table.has_column("product_id") {
        let mut specs = vec![
            MetricSpec::new(&joined.keys().left, Reducer::Distinct).alias("policies"),
            MetricSpec::new(joined.right_key_column(), Reducer::Count).alias("claims"),
        ];
        specs.extend(right_metrics(&joined, &[("monto", Reducer::Sum), ("monto", Reducer::Mean)]));
        if let Some(name_col) = enriched.as_ref().and_then(|r| r.right_column("name")) {
            specs.push(MetricSpec::new(name_col, Reducer::First).alias("product_name"));
        }
        let rows = group_by(table, &["product_id"])?.aggregate(&specs);
        let by_product: Map<String, Json> = rows
            .iter()
            .map(|row| {
                let mut metrics = row.metrics_json(2);
                let per_policy = safe_div(
                    row.get_f64("claims").unwrap_or(0.0),
                    row.get_f64("policies"),
                );
                metrics.insert("claims_per_policy".to_string(), Json::from(per_policy));
                (row.label(), Json::Object(metrics))
            })
            .collect();
        report.breakdown("by_product", by_product);
    }

    let amounts = joined.right_column("monto").and_then(|c| table.numeric(c));
    let premiums = policies.numeric("premium");
    if let (Some(amounts), Some(premiums)) = (amounts, premiums) {
        let total_claims_amount = sum(&amounts);
        let total_premiums = sum(&premiums);
        let loss_ratio = ratio(total_claims_amount, Some(total_premiums));
        report.breakdown(
            "financial_analysis",
            json!({
                "total_claims_amount": money(total_claims_amount),
                "total_premiums": money(total_premiums),
                "loss_ratio": loss_ratio,
                "avg_claim_amount": money_opt(mean(&amounts)),
            }),
        );
        if total_premiums > 0.0 {
            report.insights(ctx.insights.evaluate(&[Signal::new(Metric::LossRatio, loss_ratio)]));
        }
    }

    Ok(())
}

fn separate_claims_policies(
    ctx: &ReportContext<'_>,
    report: &mut ReportBuilder,
    policies: &Table,
    claims: &Table,
) -> Result<(), ReportError> {
    report.summary("total_policies", policies.len());
    report.summary("total_claims", claims.len());
    report.summary("note", "Analysis performed separately - no direct join possible");

    let periods = ctx.settings.trailing_periods;
    let mut temporal = Map::new();
    if policies.has_column("created_at") {
        let monthly = ctx.clock.counts_by_period(policies, "created_at");
        temporal.insert("monthly_policies".to_string(), counts(trailing(&monthly, periods)).into());
    }
    if claims.has_column("fecha_reclamo") {
        let monthly = ctx.clock.counts_by_period(claims, "fecha_reclamo");
        temporal.insert("monthly_claims".to_string(), counts(trailing(&monthly, periods)).into());
    }
    report.breakdown("temporal_comparison", temporal);

    let mut claims_analysis = Map::new();
    if let Some(status) = value_counts(claims, "estado") {
        claims_analysis.insert("claims_by_status".to_string(), counts(status).into());
    }
    if let Some(amounts) = claims.numeric("monto") {
        claims_analysis.insert("total_claims_amount".to_string(), money(sum(&amounts)));
        if let Some(avg) = money_opt(mean(&amounts)) {
            claims_analysis.insert("avg_claim_amount".to_string(), avg);
        }
    }
    report.breakdown("claims_analysis", claims_analysis);
    Ok(())
}

pub(crate) fn customer_journey(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let users = ctx.load(report, DataSystem::Mysql, "users")?;
    let clients = ctx.load(report, DataSystem::Mysql, "clients")?;
    let policies = ctx.load(report, DataSystem::Postgresql, "policies")?;
    let claims = ctx.load(report, DataSystem::Cassandra, "reclamos")?;
    let payments = ctx.load(report, DataSystem::Cassandra, "pagos")?;

    let registered = users.len();
    let customers = ctx
        .join(report, "users-clients", &users, &clients, &[("id", "user_id")], JoinKind::Inner)?
        .into_joined();

    let holders = match &customers {
        Some(customers) => ctx
            .join(
                report,
                "clients-policies",
                customers.table(),
                &policies,
                &[("user_id", "customer_id"), ("id", "customer_id")],
                JoinKind::Inner,
            )?
            .into_joined(),
        None => None,
    };
    let holder_keys = holders
        .as_ref()
        .map(|h| keys_of(h.table(), h.right_key_column()));

    let claimants = match &holder_keys {
        Some(holder_keys) if policies.has_column("customer_id") => ctx
            .join(report, "policies-claims", &policies, &claims, CLAIM_KEYS, JoinKind::Inner)?
            .into_joined()
            .map(|joined| {
                keys_of(joined.table(), "customer_id")
                    .intersection(holder_keys)
                    .count()
            }),
        _ => None,
    };

    let payers = match &holders {
        Some(holders) => ctx
            .join(
                report,
                "customers-payments",
                holders.table(),
                &payments,
                &[(holders.right_key_column(), "customer_id")],
                JoinKind::Inner,
            )?
            .into_joined()
            .map(|joined| joined.matched_left_keys()),
        None => None,
    };

    let stages = [
        ("registered_users", Some(registered)),
        ("clients", customers.as_ref().map(JoinResult::matched_left_keys)),
        ("customers_with_policies", holder_keys.as_ref().map(BTreeSet::len)),
        ("customers_with_claims", claimants),
        ("customers_with_payments", payers),
    ];

    let mut funnel = Vec::new();
    let mut previous = None;
    for (stage, count) in stages {
        let step = match count {
            Some(count) => {
                let mut step = json!({
                    "stage": stage,
                    "customers": count,
                    "conversion_from_start": percent(count, registered),
                });
                if let Some(prev) = previous {
                    step["conversion_from_previous"] = Json::from(percent(count, prev));
                }
                report.summary(stage, count);
                step
            }
            None => json!({ "stage": stage, "status": "unavailable" }),
        };
        previous = count;
        funnel.push(step);
    }
    if let Some(count) = holder_keys.as_ref().map(BTreeSet::len) {
        report.summary("overall_conversion_rate", percent(count, registered));
    }
    report.breakdown("funnel", funnel);

    if let Some(holders) = &holders {
        let policy_date = holders.right_column("created_at");
        if let (true, Some(policy_date)) = (users.has_column("created_at"), policy_date) {
            let days = days_to_first_policy(holders.table(), holders.right_key_column(), policy_date);
            report.summary_opt("avg_days_to_first_policy", money_opt(mean(&days)));
        }
    }

    if let (Some(customers), true) = (&customers, users.has_column("state")) {
        let customer_key = customers.keys().left.clone();
        let base = group_by(customers.table(), &["state"])?
            .aggregate(&[MetricSpec::new(&customer_key, Reducer::Distinct).alias("customers")]);
        let with_policies: BTreeMap<String, f64> = match &holders {
            Some(holders) => group_by(holders.table(), &["state"])?
                .aggregate(&[MetricSpec::new(&customer_key, Reducer::Distinct).alias("with_policies")])
                .iter()
                .map(|r| (r.label(), r.get_f64("with_policies").unwrap_or(0.0)))
                .collect(),
            None => BTreeMap::new(),
        };
        let by_state: Map<String, Json> = base
            .iter()
            .map(|row| {
                let total = row.get_f64("customers").unwrap_or(0.0);
                let covered = with_policies.get(&row.label()).copied().unwrap_or(0.0);
                (
                    row.label(),
                    json!({
                        "customers": total as u64,
                        "with_policies": covered as u64,
                        "penetration_rate": percent(covered as usize, total as usize),
                    }),
                )
            })
            .collect();
        report.breakdown("by_state", by_state);
    }

    Ok(())
}

/// Days from registration to the earliest policy, one value per customer.
fn days_to_first_policy(table: &Table, customer_col: &str, policy_col: &str) -> Vec<f64> {
    let mut spans: BTreeMap<KeyValue, (DateTime<Utc>, DateTime<Utc>)> = BTreeMap::new();
    for row in table.rows() {
        let (Some(key), Some(registered), Some(issued)) = (
            row.get(customer_col).key(),
            parse_timestamp(row.get("created_at")),
            parse_timestamp(row.get(policy_col)),
        ) else {
            continue;
        };
        spans
            .entry(key)
            .and_modify(|(_, first)| {
                if issued < *first {
                    *first = issued;
                }
            })
            .or_insert((registered, issued));
    }
    spans
        .values()
        .map(|(registered, first)| (*first - *registered).num_days() as f64)
        .collect()
}
