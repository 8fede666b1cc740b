//! Claim and payment reports over the event store.

use crate::envelope::{ReportBuilder, counts, money, money_opt, peak, ranked};
use crate::error::ReportError;
use crate::orchestrator::ReportContext;
use analytics::aggregate::{mean, sum};
use analytics::{
    Buckets, GroupRow, Metric, MetricSpec, Period, Reducer, Signal, SummaryStats, align_union,
    count_keys, group_by, pearson, percentile, ratio, round_dp, safe_div, trailing, value_counts,
};
use chrono::Datelike;
use core_types::{DataSystem, KeyValue, Table, Value};
use serde_json::{Map, Value as Json, json};
use std::collections::{BTreeMap, BTreeSet};

const AMOUNT_BREAKPOINTS: [f64; 5] = [0.0, 1_000.0, 5_000.0, 10_000.0, 50_000.0];
const AMOUNT_LABELS: [&str; 5] = ["< 1K", "1K-5K", "5K-10K", "10K-50K", "50K+"];
const PAYMENT_PERCENTILES: [u32; 7] = [0, 25, 50, 75, 90, 95, 100];

fn amount_ranges(values: &[f64]) -> Result<Vec<(&'static str, usize)>, ReportError> {
    let buckets = Buckets::new(&AMOUNT_BREAKPOINTS, &AMOUNT_LABELS)?;
    let counts = buckets.counts(values);
    // Labels come from AMOUNT_LABELS, so map them back to their static form.
    Ok(AMOUNT_LABELS.iter().copied().zip(counts.into_iter().map(|(_, n)| n)).collect())
}

fn to_f64(series: BTreeMap<Period, usize>) -> BTreeMap<Period, f64> {
    series.into_iter().map(|(p, n)| (p, n as f64)).collect()
}

pub(crate) fn claims_payments_correlation(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let claims = ctx.load(report, DataSystem::Cassandra, "reclamos")?;
    let payments = ctx.load(report, DataSystem::Cassandra, "pagos")?;

    let claim_amounts = claims.numeric("monto");
    let payment_amounts = payments.numeric("monto");
    let frequency = safe_div(claims.len() as f64, Some(payments.len() as f64));

    report.summary("total_claims", claims.len());
    report.summary("total_payments", payments.len());
    report.summary("claims_to_payments_ratio", frequency);
    report.summary_opt("avg_claim_amount", money_opt(claim_amounts.as_deref().and_then(mean)));
    report.summary_opt("avg_payment_amount", money_opt(payment_amounts.as_deref().and_then(mean)));
    report.summary_opt("total_claims_amount", claim_amounts.as_deref().map(sum).map(money));
    report.summary_opt("total_payments_amount", payment_amounts.as_deref().map(sum).map(money));

    let mut signals = Vec::new();
    let loss_ratio = match (&claim_amounts, &payment_amounts) {
        (Some(claimed), Some(paid)) if sum(paid) > 0.0 => Some(ratio(sum(claimed), Some(sum(paid)))),
        _ => None,
    };
    if let Some(loss_ratio) = loss_ratio {
        report.summary("loss_ratio", loss_ratio);
        signals.push(Signal::new(Metric::LossRatio, loss_ratio));
    }
    if !payments.is_empty() {
        signals.push(Signal::new(Metric::ClaimsToPaymentsRatio, frequency));
    }

    let dated = claims.has_column("fecha_reclamo") && payments.has_column("fecha_pago");
    if dated {
        let claim_counts = to_f64(ctx.clock.counts_by_period(&claims, "fecha_reclamo"));
        let payment_counts = to_f64(ctx.clock.counts_by_period(&payments, "fecha_pago"));
        let claim_sums = ctx.clock.sum_by_period(&claims, "fecha_reclamo", "monto");
        let payment_sums = ctx.clock.sum_by_period(&payments, "fecha_pago", "monto");

        let aligned = align_union(&claim_counts, &payment_counts);
        let amount_of = |series: &BTreeMap<Period, f64>, period: &Period| series.get(period).copied().unwrap_or(0.0);

        let mut monthly = Map::new();
        if aligned.len() > 1 {
            let (count_a, count_b): (Vec<f64>, Vec<f64>) = aligned.iter().map(|(_, a, b)| (*a, *b)).unzip();
            let (amount_a, amount_b): (Vec<f64>, Vec<f64>) = aligned
                .iter()
                .map(|(p, _, _)| (amount_of(&claim_sums, p), amount_of(&payment_sums, p)))
                .unzip();
            let count_correlation = round_dp(pearson(&count_a, &count_b), 3);
            monthly.insert(
                "correlations".to_string(),
                json!({
                    "count_correlation": count_correlation,
                    "amount_correlation": round_dp(pearson(&amount_a, &amount_b), 3),
                }),
            );
            signals.push(Signal::about(Metric::Correlation, count_correlation, "claim and payment volume"));
        }

        let by_period: BTreeMap<Period, (f64, f64)> = aligned.into_iter().map(|(p, a, b)| (p, (a, b))).collect();
        let recent: Map<String, Json> = trailing(&by_period, ctx.settings.trailing_periods)
            .into_iter()
            .map(|(period, (claimed, paid))| {
                (
                    period.to_string(),
                    json!({
                        "claims_count": claimed as u64,
                        "payments_count": paid as u64,
                        "claims_amount": money(amount_of(&claim_sums, &period)),
                        "payment_amount": money(amount_of(&payment_sums, &period)),
                        "claims_to_payments_ratio": safe_div(claimed, Some(paid)),
                    }),
                )
            })
            .collect();
        monthly.insert("monthly_data".to_string(), Json::Object(recent));
        report.breakdown("monthly_comparison", monthly);

        let claim_days = ctx.clock.counts_by_weekday(&claims, "fecha_reclamo");
        let payment_days = ctx.clock.counts_by_weekday(&payments, "fecha_pago");
        report.breakdown(
            "weekday_analysis",
            json!({
                "claims_by_weekday": counts(claim_days.clone()),
                "payments_by_weekday": counts(payment_days.clone()),
                "highest_claims_day": peak(&claim_days),
                "highest_payments_day": peak(&payment_days),
            }),
        );
    }

    if let (Some(claimed), Some(paid)) = (&claim_amounts, &payment_amounts) {
        let claim_ranges = amount_ranges(claimed)?;
        let payment_ranges = amount_ranges(paid)?;
        report.breakdown(
            "amount_range_analysis",
            json!({
                "claims_by_amount_range": counts(claim_ranges.clone()),
                "payments_by_amount_range": counts(payment_ranges.clone()),
                "dominant_claims_range": peak(&claim_ranges),
                "dominant_payments_range": peak(&payment_ranges),
            }),
        );
    }

    if claims.has_column("customer_id") && payments.has_column("customer_id") {
        report.breakdown("customer_alignment", customer_alignment(&claims, &payments)?);
    }

    report.insights(ctx.insights.evaluate(&signals));
    Ok(())
}

/// Per-customer claim and payment counts over the union of customers.
fn customer_alignment(claims: &Table, payments: &Table) -> Result<Json, ReportError> {
    let per_customer = |table: &Table| -> Result<BTreeMap<KeyValue, f64>, ReportError> {
        let keys = table.column("customer_id")?.into_iter().filter_map(Value::key);
        Ok(count_keys(keys).into_iter().map(|(k, n)| (k, n as f64)).collect())
    };
    let claimed = per_customer(claims)?;
    let paid = per_customer(payments)?;

    let aligned = align_union(&claimed, &paid);
    let (a, b): (Vec<f64>, Vec<f64>) = aligned.iter().map(|(_, a, b)| (*a, *b)).unzip();
    let claimants: BTreeSet<&KeyValue> = claimed.keys().collect();
    let both = paid.keys().filter(|k| claimants.contains(k)).count();

    Ok(json!({
        "customers_with_claims": claimed.len(),
        "customers_with_payments": paid.len(),
        "customers_with_both": both,
        "count_correlation": round_dp(pearson(&a, &b), 3),
    }))
}

pub(crate) fn claims_overview(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let claims = ctx.load(report, DataSystem::Cassandra, "reclamos")?;
    report.summary("total_claims", claims.len());

    if let Some(statuses) = value_counts(&claims, "estado") {
        report.breakdown("status_distribution", counts(statuses));
    }

    if let Some(amounts) = claims.numeric("monto") {
        report.summary("total_claimed_amount", money(sum(&amounts)));
        if let Some(stats) = SummaryStats::from_values(&amounts) {
            report.breakdown(
                "amount_statistics",
                json!({
                    "total_claimed_amount": money(stats.sum),
                    "average_claim_amount": money(stats.mean),
                    "median_claim_amount": money(stats.median),
                    "max_claim_amount": money(stats.max),
                    "min_claim_amount": money(stats.min),
                    "std_claim_amount": money_opt(stats.std),
                    "amount_distribution": counts(amount_ranges(&amounts)?),
                }),
            );
        }
    }

    if claims.has_column("fecha_reclamo") {
        let monthly = ctx.clock.counts_by_period(&claims, "fecha_reclamo");
        let recent = ctx.clock.count_recent(&claims, "fecha_reclamo", ctx.recent_window());
        report.summary("recent_claims", recent);
        report.breakdown(
            "temporal_analysis",
            json!({
                "monthly_claims": counts(trailing(&monthly, ctx.settings.trailing_periods)),
                "recent_claims": recent,
                "claims_by_day_of_week": counts(ctx.clock.counts_by_weekday(&claims, "fecha_reclamo")),
            }),
        );
    }

    if let Some(types) = value_counts(&claims, "tipo_reclamo") {
        let total_types = types.len();
        report.breakdown(
            "type_analysis",
            json!({
                "most_common_types": counts(types.into_iter().take(ctx.top_n())),
                "total_claim_types": total_types,
            }),
        );
    }

    report.breakdown(
        "data_quality",
        json!({
            "claims_with_amount": claims.non_null_count("monto"),
            "claims_with_date": claims.non_null_count("fecha_reclamo"),
            "claims_with_status": claims.non_null_count("estado"),
        }),
    );
    Ok(())
}

pub(crate) fn payments_overview(ctx: &ReportContext<'_>, report: &mut ReportBuilder) -> Result<(), ReportError> {
    let payments = ctx.load(report, DataSystem::Cassandra, "pagos")?;
    report.summary("total_payments", payments.len());

    if let Some(amounts) = payments.numeric("monto") {
        report.summary("total_payment_amount", money(sum(&amounts)));
        if let Some(stats) = SummaryStats::from_values(&amounts) {
            let percentiles: Map<String, Json> = PAYMENT_PERCENTILES
                .iter()
                .filter_map(|p| percentile(&amounts, f64::from(*p)).map(|v| (format!("p{p}"), money(v))))
                .collect();
            report.breakdown(
                "amount_statistics",
                json!({
                    "total_payment_amount": money(stats.sum),
                    "average_payment": money(stats.mean),
                    "median_payment": money(stats.median),
                    "max_payment": money(stats.max),
                    "min_payment": money(stats.min),
                    "percentiles": percentiles,
                }),
            );
        }
    }

    if let Some(methods) = value_counts(&payments, "metodo_pago") {
        let mut analysis = Map::new();
        analysis.insert("most_popular_method".to_string(), json!(methods.first().map(|(m, _)| m.to_string())));
        analysis.insert("payment_methods".to_string(), counts(methods).into());
        if payments.has_column("monto") {
            let rows = group_by(&payments, &["metodo_pago"])?
                .aggregate(&[MetricSpec::new("monto", Reducer::Mean).alias("avg_amount")]);
            let averages: Map<String, Json> = rows
                .iter()
                .filter_map(|row| row.get_f64("avg_amount").map(|v| (row.label(), money(v))))
                .collect();
            analysis.insert("avg_amount_by_method".to_string(), averages.into());
        }
        report.breakdown("payment_method_analysis", analysis);
    }

    if payments.has_column("fecha_pago") {
        let monthly = ctx.clock.counts_by_period(&payments, "fecha_pago");
        let mut seasonal: BTreeMap<u32, usize> = BTreeMap::new();
        for instant in ctx.clock.valid_instants(&payments, "fecha_pago") {
            *seasonal.entry(instant.month()).or_insert(0) += 1;
        }
        report.breakdown(
            "temporal_analysis",
            json!({
                "monthly_payments": counts(trailing(&monthly, ctx.settings.trailing_periods)),
                "seasonal_distribution": counts(seasonal),
                "payments_by_day": counts(ctx.clock.counts_by_weekday(&payments, "fecha_pago")),
            }),
        );
    }

    if payments.has_column("customer_id") {
        report.breakdown("customer_analysis", payment_frequency(ctx, &payments)?);
    }

    report.breakdown(
        "data_completeness",
        json!({
            "payments_with_amount": payments.non_null_count("monto"),
            "payments_with_date": payments.non_null_count("fecha_pago"),
            "payments_with_method": payments.non_null_count("metodo_pago"),
        }),
    );
    Ok(())
}

fn payment_frequency(ctx: &ReportContext<'_>, payments: &Table) -> Result<Json, ReportError> {
    let per_customer = count_keys(payments.column("customer_id")?.into_iter().filter_map(Value::key));
    let frequencies: Vec<f64> = per_customer.iter().map(|(_, n)| *n as f64).collect();

    let mut analysis = json!({
        "total_customers": per_customer.len(),
        "avg_payments_per_customer": money_opt(mean(&frequencies)),
        "max_payments_per_customer": per_customer.iter().map(|(_, n)| *n).max(),
        "customers_with_single_payment": per_customer.iter().filter(|(_, n)| *n == 1).count(),
        "customers_with_multiple_payments": per_customer.iter().filter(|(_, n)| *n > 1).count(),
    });

    if payments.has_column("monto") {
        let rows = group_by(payments, &["customer_id"])?
            .aggregate(&[MetricSpec::new("monto", Reducer::Sum).alias("amount")]);
        let refs: Vec<&GroupRow> = rows.iter().collect();
        let top: Map<String, Json> = ranked(&refs, "amount", ctx.top_n())
            .into_iter()
            .map(|row| (row.label(), money(row.get_f64("amount").unwrap_or(0.0))))
            .collect();
        analysis["top_customers_by_amount"] = Json::Object(top);
    }
    Ok(analysis)
}
