//! Product and customer-base reports over the policy and identity stores.

use crate::envelope::{ReportBuilder, counts, grouped, money, money_opt, ranked};
use crate::error::ReportError;
use crate::identity::{length_distribution, mean_length, texts};
use crate::orchestrator::ReportContext;
use analytics::aggregate::{mean, sum};
use analytics::{
    Buckets, GroupRow, JoinKind, JoinOutcome, MetricSpec, Period, Reducer, SummaryStats, count_keys, group_by,
    parse_timestamp, ratio, safe_div, value_counts,
};
use chrono::TimeDelta;
use core_types::{DataSystem, KeyValue, Value};
use serde_json::{Map, Value as Json, json};
use std::collections::{BTreeMap, BTreeSet};

const PREMIUM_BREAKPOINTS: [f64; 5] = [0.0, 100.0, 500.0, 1000.0, 5000.0];
const PREMIUM_LABELS: [&str; 5] = ["< 100", "100-499", "500-999", "1000-4999", "5000+"];
const PREFIX_LEN: usize = 3;
const TOP_PREFIXES: usize = 5;

/// Connectives left out of the common-words ranking of product names.
const STOP_WORDS: &[&str] = &[
    "de", "la", "el", "en", "y", "a", "que", "es", "se", "no", "te", "lo", "le", "da", "su", "por", "son", "con",
    "para", "al", "del", "los", "las", "un", "una",
];

/// The product catalogue on its own: types, base premiums, code shapes and
/// naming.
pub(crate) fn product_analysis(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let products = ctx.load(report, DataSystem::Postgresql, "products")?;

    report.summary("total_products", products.len());
    if let Some(types) = value_counts(&products, "product_type") {
        report.breakdown("product_types", counts(types));
    }

    let premiums = products.numeric("base_premium").unwrap_or_default();
    if let Some(stats) = SummaryStats::from_values(&premiums) {
        let buckets = Buckets::new(&PREMIUM_BREAKPOINTS, &PREMIUM_LABELS)?;
        report.summary("average_premium", money(stats.mean));
        report.breakdown(
            "premium_statistics",
            json!({
                "average_premium": money(stats.mean),
                "median_premium": money(stats.median),
                "min_premium": money(stats.min),
                "max_premium": money(stats.max),
                "std_premium": money_opt(stats.std),
                "premium_distribution": counts(buckets.counts(&premiums)),
            }),
        );
    }

    if let Some(codes) = texts(&products, "code") {
        let unique: BTreeSet<&str> = codes.iter().map(String::as_str).collect();
        let prefixes = count_keys(codes.iter().map(|c| c.chars().take(PREFIX_LEN).collect::<String>()));
        let shaped = |test: fn(&char) -> bool| {
            codes
                .iter()
                .filter(|c| !c.is_empty() && c.chars().all(|ch| test(&ch)))
                .count()
        };
        let numeric = shaped(char::is_ascii_digit);
        let alpha = shaped(char::is_ascii_alphabetic);
        report.breakdown(
            "code_analysis",
            json!({
                "unique_codes": unique.len(),
                "avg_code_length": mean_length(&codes),
                "code_patterns": {
                    "common_prefixes": counts(prefixes.into_iter().take(TOP_PREFIXES)),
                    "length_distribution": length_distribution(&codes),
                    "format_distribution": {
                        "numeric_only": numeric,
                        "alpha_only": alpha,
                        "mixed": codes.len() - numeric - alpha,
                    },
                },
            }),
        );
    }

    let mut text = Map::new();
    if let Some(names) = texts(&products, "name") {
        text.insert("avg_name_length".to_string(), json!(mean_length(&names)));
        let words = count_keys(
            names
                .iter()
                .flat_map(|name| name.split_whitespace())
                .map(str::to_lowercase)
                .filter(|word| !STOP_WORDS.contains(&word.as_str())),
        );
        text.insert("common_words_in_names".to_string(), counts(words.into_iter().take(ctx.top_n())).into());
    }
    if let Some(descriptions) = texts(&products, "description").filter(|d| !d.is_empty()) {
        text.insert("avg_description_length".to_string(), json!(mean_length(&descriptions)));
        text.insert("products_with_description".to_string(), json!(descriptions.len()));
    }
    report.breakdown("text_analysis", text);

    report.breakdown(
        "data_completeness",
        json!({
            "products_with_premium": products.non_null_count("base_premium"),
            "products_with_description": products.non_null_count("description"),
            "products_with_type": products.non_null_count("product_type"),
        }),
    );

    Ok(())
}

pub(crate) fn product_profitability(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let policies = ctx.load(report, DataSystem::Postgresql, "policies")?;
    let products = ctx.load(report, DataSystem::Postgresql, "products")?;

    let joined = match ctx.join(report, "policies-products", &policies, &products, &[("product_id", "code")], JoinKind::Inner)? {
        JoinOutcome::Joined(result) => result,
        JoinOutcome::Fallback { .. } => {
            report.summary("total_policies", policies.len());
            report.summary("total_products", products.len());
            report.summary_opt("total_premium_volume", policies.numeric("premium").map(|p| money(sum(&p))));
            if let Some(types) = value_counts(&products, "product_type") {
                report.breakdown("products_by_type", counts(types));
            }
            return Ok(());
        }
    };

    let product_key = joined.keys().left.clone();
    // Rows without a policy number are not policies.
    let counted = if joined.table().has_column("policy_number") {
        "policy_number"
    } else {
        product_key.as_str()
    };
    let mut specs = vec![MetricSpec::new(counted, Reducer::Count).alias("policy_count")];
    for (column, reducer) in [
        ("premium", Reducer::Sum),
        ("premium", Reducer::Mean),
        ("sum_insured", Reducer::Sum),
        ("sum_insured", Reducer::Mean),
    ] {
        specs.push(MetricSpec::new(column, reducer));
    }
    for column in ["name", "product_type", "base_premium"] {
        if let Some(actual) = joined.right_column(column) {
            specs.push(MetricSpec::new(actual, Reducer::First).alias(column));
        }
    }

    let mut rows = group_by(joined.table(), &[product_key.as_str()])?.aggregate(&specs);
    for row in &mut rows {
        let premium_mean = row.get_f64("premium_mean");
        let premium_sum = row.get_f64("premium_sum");
        let exposure = row.get_f64("sum_insured_sum");
        if let (Some(premium_mean), Some(base)) = (premium_mean, row.get_f64("base_premium")) {
            row.metrics.insert("premium_efficiency".to_string(), Value::Float(safe_div(premium_mean, Some(base))));
        }
        if let Some(exposure) = exposure {
            row.metrics.insert("total_exposure".to_string(), Value::Float(exposure));
            if let Some(premium_sum) = premium_sum {
                row.metrics.insert(
                    "premium_to_exposure_ratio".to_string(),
                    Value::Float(ratio(premium_sum, Some(exposure))),
                );
            }
        }
    }

    let policy_counts: Vec<f64> = rows.iter().filter_map(|r| r.get_f64("policy_count")).collect();
    let premiums: Vec<f64> = rows.iter().filter_map(|r| r.get_f64("premium_sum")).collect();
    let efficiencies: Vec<f64> = rows.iter().filter_map(|r| r.get_f64("premium_efficiency")).collect();
    report.summary("total_products_with_policies", rows.len());
    report.summary("total_policies_analyzed", sum(&policy_counts) as u64);
    report.summary("total_premium_volume", money(sum(&premiums)));
    report.summary_opt("average_policies_per_product", money_opt(mean(&policy_counts)));
    report.summary_opt("average_premium_efficiency", money_opt(mean(&efficiencies)));

    let refs: Vec<&GroupRow> = rows.iter().collect();
    let n = ctx.top_n();
    let top = |metric: &str| -> Vec<Json> {
        ranked(&refs, metric, n)
            .into_iter()
            .map(|row| {
                let mut entry = Map::new();
                entry.insert("product_id".to_string(), Json::from(row.label()));
                entry.extend(row.metrics_json(2));
                Json::Object(entry)
            })
            .collect()
    };
    report.breakdown("top_products_by_volume", top("policy_count"));
    report.breakdown("top_products_by_premium", top("premium_sum"));
    report.breakdown("top_products_by_efficiency", top("premium_efficiency"));
    report.breakdown("product_performance_matrix", grouped(&rows[..rows.len().min(n)]));

    Ok(())
}

/// Registrations over the last `months` (30-day months) by state and period.
pub(crate) fn user_growth(ctx: &ReportContext<'_>, report: &mut ReportBuilder, months: u32) -> Result<(), ReportError> {
    report.parameter("months", months);
    let users = ctx.load(report, DataSystem::Mysql, "users")?;
    ctx.require(&users, "created_at")?;
    ctx.require(&users, "state")?;

    let window = TimeDelta::days(30 * i64::from(months));
    let recent = ctx.clock.recent(&users, "created_at", window);

    let mut matrix: BTreeMap<Period, BTreeMap<KeyValue, usize>> = BTreeMap::new();
    let mut states: BTreeSet<KeyValue> = BTreeSet::new();
    for row in recent.rows() {
        let (Some(instant), Some(state)) = (parse_timestamp(row.get("created_at")), row.get("state").key()) else {
            continue;
        };
        states.insert(state.clone());
        *matrix.entry(Period::of(&instant)).or_default().entry(state).or_insert(0) += 1;
    }
    let monthly: Vec<(Period, usize)> = ctx.clock.counts_by_period(&recent, "created_at").into_iter().collect();

    report.summary("period_analyzed", format!("Last {months} months"));
    report.summary("total_new_users", recent.len());

    let top_states = value_counts(&recent, "state").unwrap_or_default();
    report.breakdown("top_growing_states", counts(top_states.into_iter().take(ctx.top_n())));
    report.breakdown("monthly_growth", counts(monthly.iter().copied()));

    let by_period: Map<String, Json> = matrix
        .iter()
        .map(|(period, row)| {
            let filled = states.iter().map(|s| (s, row.get(s).copied().unwrap_or(0)));
            (period.to_string(), Json::Object(counts(filled)))
        })
        .collect();
    report.breakdown("growth_by_state_and_month", by_period);

    let current = monthly.last().map(|(_, n)| *n);
    let previous = monthly.len().checked_sub(2).and_then(|i| monthly.get(i)).map(|(_, n)| *n);
    let change = match (current, previous) {
        (Some(current), Some(previous)) => ratio(current as f64 - previous as f64, Some(previous as f64)),
        _ => 0.0,
    };
    report.breakdown(
        "growth_rate",
        json!({
            "current_month": current.unwrap_or(0),
            "previous_month": previous.unwrap_or(0),
            "change_percent": change,
        }),
    );

    Ok(())
}
