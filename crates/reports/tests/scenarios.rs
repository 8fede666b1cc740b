use chrono::{DateTime, TimeZone, Utc};
use configuration::AnalysisSettings;
use core_types::{DataSystem, Table, Value};
use datastore::{LoaderError, MemoryTableLoader};
use reports::{AnalyticsOrchestrator, ReportError, ReportKind, ReportParams};
use serde_json::Value as Json;
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

fn orchestrator(loader: MemoryTableLoader) -> AnalyticsOrchestrator {
    AnalyticsOrchestrator::new(Arc::new(loader), AnalysisSettings::default()).with_clock(now())
}

fn table(name: &str, records: Vec<Vec<(&str, Value)>>) -> Table {
    Table::from_records(name, records)
}

fn customer_base() -> MemoryTableLoader {
    MemoryTableLoader::new()
        .with_table(
            DataSystem::Mysql,
            table(
                "users",
                vec![
                    vec![("id", Value::from(1)), ("state", Value::from("LIMA"))],
                    vec![("id", Value::from(2)), ("state", Value::from("CUSCO"))],
                ],
            ),
        )
        .with_table(
            DataSystem::Mysql,
            table(
                "clients",
                vec![vec![("user_id", Value::from(1))], vec![("user_id", Value::from(2))]],
            ),
        )
        .with_table(
            DataSystem::Postgresql,
            table(
                "policies",
                vec![
                    vec![("customer_id", Value::from(1)), ("premium", Value::from(100.0))],
                    vec![("customer_id", Value::from(1)), ("premium", Value::from(50.0))],
                ],
            ),
        )
}

#[test]
fn customer_policy_profile_counts_penetration() {
    let report = orchestrator(customer_base()).customer_policy_profile().unwrap();
    let summary = &report["summary"];

    assert_eq!(report["report"], "customer-policy-profile");
    assert_eq!(summary["total_customers"].as_u64(), Some(2));
    assert_eq!(summary["customers_with_policies"].as_u64(), Some(1));
    assert_eq!(summary["penetration_rate"].as_f64(), Some(50.0));
    assert_eq!(summary["total_premium_volume"].as_f64(), Some(150.0));
    assert_eq!(summary["total_policies"].as_u64(), Some(2));
    assert_eq!(summary["avg_policies_per_customer"].as_f64(), Some(2.0));
    assert!(summary.get("mode").is_none());

    let lima = &report["breakdown"]["by_state"]["LIMA"];
    assert_eq!(lima["premium_sum"].as_f64(), Some(150.0));
    assert_eq!(lima["customers"].as_u64(), Some(1));
}

#[test]
fn provenance_records_sources_and_chosen_keys() {
    let report = orchestrator(customer_base()).customer_policy_profile().unwrap();
    let provenance = &report["provenance"];

    assert_eq!(provenance["generated_at"], "2024-03-10T12:00:00Z");
    assert_eq!(provenance["report_id"].as_str().map(str::len), Some(36));
    assert_eq!(provenance["sources"].as_array().map(Vec::len), Some(3));

    let joins = provenance["joins"].as_array().unwrap();
    assert_eq!(joins.len(), 2);
    assert_eq!(joins[1]["relationship"], "clients-policies");
    assert_eq!(joins[1]["status"], "joined");
    assert_eq!(joins[1]["left_key"], "user_id");
    assert_eq!(joins[1]["right_key"], "customer_id");
    assert_eq!(joins[1]["how"], "left");
}

#[test]
fn claims_overview_reports_status_distribution() {
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Cassandra,
        table(
            "reclamos",
            vec![
                vec![("estado", Value::from("aprobado"))],
                vec![("estado", Value::from("aprobado"))],
                vec![("estado", Value::from("pendiente"))],
            ],
        ),
    );
    let report = orchestrator(loader).run(ReportKind::ClaimsOverview, &ReportParams::default()).unwrap();

    let statuses = &report["breakdown"]["status_distribution"];
    assert_eq!(statuses["aprobado"].as_u64(), Some(2));
    assert_eq!(statuses["pendiente"].as_u64(), Some(1));
    assert_eq!(statuses.as_object().map(|m| m.len()), Some(2));
    assert_eq!(report["summary"]["total_claims"].as_u64(), Some(3));
    assert!(report["breakdown"].get("amount_statistics").is_none());
}

#[test]
fn agent_performance_aggregates_policies_per_agent() {
    let loader = MemoryTableLoader::new()
        .with_table(
            DataSystem::Mysql,
            table("agents", vec![vec![("code", Value::from("A1")), ("is_active", Value::from(true))]]),
        )
        .with_table(
            DataSystem::Postgresql,
            table(
                "policies",
                vec![
                    vec![("agent_id", Value::from("A1")), ("premium", Value::from(200.0))],
                    vec![("agent_id", Value::from("A1")), ("premium", Value::from(300.0))],
                ],
            ),
        );
    let report = orchestrator(loader).agent_performance().unwrap();

    let a1 = &report["breakdown"]["agents"]["A1"];
    assert_eq!(a1["policy_count"].as_u64(), Some(2));
    assert_eq!(a1["premium_sum"].as_f64(), Some(500.0));
    assert_eq!(a1["premium_mean"].as_f64(), Some(250.0));
    assert_eq!(report["summary"]["agents_with_sales"].as_u64(), Some(1));
    assert_eq!(report["summary"]["sales_penetration"].as_f64(), Some(100.0));
}

#[test]
fn unjoinable_claims_fall_back_to_separate_analysis() {
    let loader = MemoryTableLoader::new()
        .with_table(
            DataSystem::Postgresql,
            table("policies", vec![vec![("customer_id", Value::from(1)), ("premium", Value::from(10.0))]]),
        )
        .with_table(
            DataSystem::Cassandra,
            table("reclamos", vec![vec![("estado", Value::from("abierto")), ("monto", Value::from(5.0))]]),
        );
    let report = orchestrator(loader).claims_vs_policies().unwrap();

    assert_eq!(report["summary"]["mode"], "separate_analysis");
    assert_eq!(report["summary"]["total_policies"].as_u64(), Some(1));
    assert_eq!(report["breakdown"]["claims_analysis"]["total_claims_amount"].as_f64(), Some(5.0));

    let joins = report["provenance"]["joins"].as_array().unwrap();
    assert_eq!(joins[0]["status"], "fallback");
    assert_eq!(joins[0]["tried"], serde_json::json!(["id=policy_id", "policy_number=policy_number"]));
}

#[test]
fn claims_join_on_the_alternate_key() {
    let loader = MemoryTableLoader::new()
        .with_table(
            DataSystem::Postgresql,
            table(
                "policies",
                vec![
                    vec![("policy_number", Value::from("P-1")), ("premium", Value::from(1000.0))],
                    vec![("policy_number", Value::from("P-2")), ("premium", Value::from(1000.0))],
                ],
            ),
        )
        .with_table(
            DataSystem::Cassandra,
            table("reclamos", vec![vec![("policy_number", Value::from("P-1")), ("monto", Value::from(900.0))]]),
        );
    let report = orchestrator(loader).claims_vs_policies().unwrap();

    assert!(report["summary"].get("mode").is_none());
    assert_eq!(report["summary"]["policies_with_claims"].as_u64(), Some(1));
    assert_eq!(report["summary"]["claim_rate_percentage"].as_f64(), Some(50.0));
    assert_eq!(report["breakdown"]["financial_analysis"]["loss_ratio"].as_f64(), Some(45.0));
    assert_eq!(
        report["insights"],
        serde_json::json!(["Moderate loss ratio (45.0%) - within normal range"])
    );
}

#[test]
fn activity_patterns_requires_a_timestamp_column() {
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Cassandra,
        table("transaction_audit", vec![vec![("servicio", Value::from("auth"))]]),
    );
    let err = orchestrator(loader).activity_patterns(24).unwrap_err();
    assert!(matches!(err, ReportError::RequiredColumn { ref column, .. } if column == "timestamp"));
}

#[test]
fn activity_patterns_windows_and_ranks_hours() {
    let event = |at: &str, service: &str| vec![("timestamp", Value::from(at)), ("servicio", Value::from(service))];
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Cassandra,
        table(
            "transaction_audit",
            vec![
                event("2024-03-10T09:15:00Z", "auth"),
                event("2024-03-10T09:20:00Z", "auth"),
                event("2024-03-10T09:45:00Z", "billing"),
                event("2024-03-09T14:00:00Z", "billing"),
                event("2024-01-01T10:00:00Z", "auth"),
            ],
        ),
    );
    let report = orchestrator(loader).activity_patterns(48).unwrap();
    let summary = &report["summary"];

    assert_eq!(report["provenance"]["parameters"]["hours"].as_u64(), Some(48));
    assert_eq!(summary["total_transactions_analyzed"].as_u64(), Some(4));
    assert_eq!(summary["unique_services"].as_u64(), Some(2));
    assert_eq!(summary["peak_activity_multiplier"].as_f64(), Some(1.5));

    let hourly = &report["breakdown"]["hourly_patterns"];
    assert_eq!(hourly["peak_activity_hour"].as_u64(), Some(9));
    assert_eq!(hourly["lowest_activity_hour"].as_u64(), Some(14));
    assert_eq!(hourly["peak_services_by_hour"]["9"]["most_active_service"], "auth");
    assert_eq!(hourly["service_activity_matrix"]["14"]["auth"].as_u64(), Some(0));

    assert_eq!(report["breakdown"]["workload_analysis"]["busiest_day"], "Sunday");
    let insights: Vec<&str> = report["insights"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Json::as_str)
        .collect();
    assert!(insights.contains(&"Plan additional resources for Sunday"));
}

#[test]
fn empty_activity_window_yields_a_zero_summary() {
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Cassandra,
        table("transaction_audit", vec![vec![("timestamp", Value::from("2023-01-01T00:00:00Z"))]]),
    );
    let report = orchestrator(loader).activity_patterns(24).unwrap();
    assert_eq!(report["summary"]["total_transactions_analyzed"].as_u64(), Some(0));
    assert!(report["summary"]["note"].is_string());
}

#[test]
fn user_growth_tracks_month_over_month_change() {
    let user = |at: &str, state: &str| vec![("created_at", Value::from(at)), ("state", Value::from(state))];
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Mysql,
        table(
            "users",
            vec![
                user("2024-03-01", "LIMA"),
                user("2024-03-05", "LIMA"),
                user("2024-02-10", "CUSCO"),
                user("2023-01-01", "LIMA"),
            ],
        ),
    );
    let report = orchestrator(loader).user_growth(3).unwrap();
    let breakdown = &report["breakdown"];

    assert_eq!(report["summary"]["total_new_users"].as_u64(), Some(3));
    assert_eq!(breakdown["monthly_growth"]["2024-02"].as_u64(), Some(1));
    assert_eq!(breakdown["monthly_growth"]["2024-03"].as_u64(), Some(2));
    assert_eq!(breakdown["growth_by_state_and_month"]["2024-02"]["LIMA"].as_u64(), Some(0));
    assert_eq!(breakdown["growth_rate"]["change_percent"].as_f64(), Some(100.0));
    assert_eq!(breakdown["top_growing_states"]["LIMA"].as_u64(), Some(2));
}

#[test]
fn data_quality_flags_orphaned_references() {
    let loader = MemoryTableLoader::new()
        .with_table(
            DataSystem::Mysql,
            table("users", vec![vec![("id", Value::from(1))], vec![("id", Value::from(2))]]),
        )
        .with_table(
            DataSystem::Mysql,
            table("clients", vec![vec![("user_id", Value::from(1))], vec![("user_id", Value::from(3))]]),
        )
        .with_table(DataSystem::Mysql, table("agents", vec![vec![("code", Value::from("A1"))]]))
        .with_table(
            DataSystem::Mysql,
            table("beneficiaries", vec![vec![("client_id", Value::from(1))]]),
        );
    let report = orchestrator(loader).run(ReportKind::DataQuality, &ReportParams::default()).unwrap();

    assert_eq!(report["summary"]["total_records"].as_u64(), Some(6));
    assert_eq!(report["summary"]["overall_completeness_score"].as_f64(), Some(100.0));
    let integrity = &report["breakdown"]["referential_integrity"];
    assert_eq!(integrity["clients->users"]["orphaned_rows"].as_u64(), Some(1));
    assert_eq!(integrity["beneficiaries->clients"]["integrity_percentage"].as_f64(), Some(100.0));
    assert_eq!(
        report["insights"],
        serde_json::json!(["Fix orphaned references in relationship clients->users (50.0%)"])
    );
}

#[test]
fn missing_source_table_fails_only_that_report() {
    let orchestrator = orchestrator(MemoryTableLoader::new());
    let err = orchestrator.customer_policy_profile().unwrap_err();
    assert!(matches!(
        err,
        ReportError::Load(LoaderError::NotFound { system: DataSystem::Mysql, ref table }) if table == "users"
    ));
}

#[test]
fn concurrent_runs_share_nothing_mutable() {
    let orchestrator = orchestrator(customer_base());
    let summaries: Vec<Json> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| orchestrator.customer_policy_profile().map(|r| r["summary"].clone())))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });
    assert!(summaries.windows(2).all(|w| w[0] == w[1]));
}

fn orchestrator_with(loader: MemoryTableLoader, settings: AnalysisSettings) -> AnalyticsOrchestrator {
    AnalyticsOrchestrator::new(Arc::new(loader), settings).with_clock(now())
}

fn run(loader: MemoryTableLoader, kind: ReportKind) -> Json {
    orchestrator(loader).run(kind, &ReportParams::default()).unwrap()
}

fn claim(at: &str, amount: f64, customer: i64) -> Vec<(&'static str, Value)> {
    vec![
        ("fecha_reclamo", Value::from(at)),
        ("monto", Value::from(amount)),
        ("customer_id", Value::from(customer)),
    ]
}

fn payment(at: &str, amount: f64, customer: i64) -> Vec<(&'static str, Value)> {
    vec![
        ("fecha_pago", Value::from(at)),
        ("monto", Value::from(amount)),
        ("customer_id", Value::from(customer)),
    ]
}

#[test]
fn claims_and_payments_correlate_over_aligned_months() {
    let loader = MemoryTableLoader::new()
        .with_table(
            DataSystem::Cassandra,
            table(
                "reclamos",
                vec![
                    claim("2024-01-15", 500.0, 1),
                    claim("2024-02-03", 2000.0, 1),
                    claim("2024-02-20", 6000.0, 2),
                ],
            ),
        )
        .with_table(
            DataSystem::Cassandra,
            table(
                "pagos",
                vec![
                    payment("2024-01-05", 100.0, 1),
                    payment("2024-01-25", 200.0, 1),
                    payment("2024-02-01", 300.0, 1),
                    payment("2024-02-02", 400.0, 1),
                    payment("2024-02-10", 12000.0, 2),
                    payment("2024-02-11", 60000.0, 2),
                ],
            ),
        );
    let report = run(loader, ReportKind::ClaimsPaymentsCorrelation);
    let summary = &report["summary"];
    let breakdown = &report["breakdown"];

    assert_eq!(summary["total_claims"].as_u64(), Some(3));
    assert_eq!(summary["total_payments"].as_u64(), Some(6));
    assert_eq!(summary["claims_to_payments_ratio"].as_f64(), Some(0.5));
    assert_eq!(summary["total_claims_amount"].as_f64(), Some(8500.0));
    assert_eq!(summary["total_payments_amount"].as_f64(), Some(73000.0));
    assert_eq!(summary["loss_ratio"].as_f64(), Some(11.64));

    let monthly = &breakdown["monthly_comparison"];
    assert_eq!(monthly["correlations"]["count_correlation"].as_f64(), Some(1.0));
    assert_eq!(monthly["correlations"]["amount_correlation"].as_f64(), Some(1.0));
    let january = &monthly["monthly_data"]["2024-01"];
    assert_eq!(january["claims_count"].as_u64(), Some(1));
    assert_eq!(january["payments_count"].as_u64(), Some(2));
    assert_eq!(january["claims_amount"].as_f64(), Some(500.0));
    assert_eq!(january["payment_amount"].as_f64(), Some(300.0));
    assert_eq!(january["claims_to_payments_ratio"].as_f64(), Some(0.5));
    assert_eq!(monthly["monthly_data"]["2024-02"]["payments_count"].as_u64(), Some(4));

    let ranges = &breakdown["amount_range_analysis"];
    assert_eq!(ranges["claims_by_amount_range"]["< 1K"].as_u64(), Some(1));
    assert_eq!(ranges["claims_by_amount_range"]["1K-5K"].as_u64(), Some(1));
    assert_eq!(ranges["claims_by_amount_range"]["5K-10K"].as_u64(), Some(1));
    assert_eq!(ranges["claims_by_amount_range"]["50K+"].as_u64(), Some(0));
    assert_eq!(ranges["payments_by_amount_range"]["< 1K"].as_u64(), Some(4));
    assert_eq!(ranges["payments_by_amount_range"]["10K-50K"].as_u64(), Some(1));
    assert_eq!(ranges["payments_by_amount_range"]["50K+"].as_u64(), Some(1));
    assert_eq!(ranges["dominant_claims_range"], "< 1K");
    assert_eq!(ranges["dominant_payments_range"], "< 1K");

    let alignment = &breakdown["customer_alignment"];
    assert_eq!(alignment["customers_with_claims"].as_u64(), Some(2));
    assert_eq!(alignment["customers_with_payments"].as_u64(), Some(2));
    assert_eq!(alignment["customers_with_both"].as_u64(), Some(2));
    assert_eq!(alignment["count_correlation"].as_f64(), Some(1.0));
}

#[test]
fn a_single_aligned_month_has_no_correlation() {
    let loader = MemoryTableLoader::new()
        .with_table(DataSystem::Cassandra, table("reclamos", vec![claim("2024-01-15", 500.0, 1)]))
        .with_table(DataSystem::Cassandra, table("pagos", vec![payment("2024-01-20", 250.0, 1)]));
    let report = run(loader, ReportKind::ClaimsPaymentsCorrelation);
    let breakdown = &report["breakdown"];

    assert!(breakdown["monthly_comparison"].get("correlations").is_none());
    assert_eq!(
        breakdown["monthly_comparison"]["monthly_data"]["2024-01"]["claims_to_payments_ratio"].as_f64(),
        Some(1.0)
    );
    assert_eq!(breakdown["customer_alignment"]["count_correlation"].as_f64(), Some(0.0));
    assert_eq!(report["summary"]["loss_ratio"].as_f64(), Some(200.0));
}

#[test]
fn customer_journey_converts_through_each_stage() {
    let user = |id: i64| vec![("id", Value::from(id)), ("created_at", Value::from("2024-01-01"))];
    let policy = |id: i64, customer: i64, at: &str| {
        vec![
            ("id", Value::from(id)),
            ("customer_id", Value::from(customer)),
            ("created_at", Value::from(at)),
        ]
    };
    let loader = MemoryTableLoader::new()
        .with_table(DataSystem::Mysql, table("users", vec![user(1), user(2), user(3), user(4)]))
        .with_table(
            DataSystem::Mysql,
            table(
                "clients",
                vec![
                    vec![("user_id", Value::from(1))],
                    vec![("user_id", Value::from(2))],
                    vec![("user_id", Value::from(3))],
                ],
            ),
        )
        .with_table(
            DataSystem::Postgresql,
            table(
                "policies",
                vec![
                    policy(10, 1, "2024-01-11"),
                    policy(11, 1, "2024-02-01"),
                    policy(12, 2, "2024-01-21"),
                ],
            ),
        )
        .with_table(
            DataSystem::Cassandra,
            table("reclamos", vec![vec![("policy_id", Value::from(10)), ("monto", Value::from(50.0))]]),
        )
        .with_table(
            DataSystem::Cassandra,
            table("pagos", vec![vec![("customer_id", Value::from(1)), ("monto", Value::from(20.0))]]),
        );
    let report = orchestrator(loader).customer_journey().unwrap();
    let summary = &report["summary"];

    assert_eq!(summary["registered_users"].as_u64(), Some(4));
    assert_eq!(summary["clients"].as_u64(), Some(3));
    assert_eq!(summary["customers_with_policies"].as_u64(), Some(2));
    assert_eq!(summary["customers_with_claims"].as_u64(), Some(1));
    assert_eq!(summary["customers_with_payments"].as_u64(), Some(1));
    assert_eq!(summary["overall_conversion_rate"].as_f64(), Some(50.0));
    assert_eq!(summary["avg_days_to_first_policy"].as_f64(), Some(15.0));

    let funnel = report["breakdown"]["funnel"].as_array().unwrap();
    assert_eq!(funnel.len(), 5);
    assert!(funnel[0].get("conversion_from_previous").is_none());
    assert_eq!(funnel[1]["conversion_from_start"].as_f64(), Some(75.0));
    assert_eq!(funnel[2]["stage"], "customers_with_policies");
    assert_eq!(funnel[2]["conversion_from_previous"].as_f64(), Some(66.67));
    assert_eq!(funnel[3]["conversion_from_start"].as_f64(), Some(25.0));
    assert_eq!(funnel[3]["conversion_from_previous"].as_f64(), Some(50.0));
    assert_eq!(funnel[4]["conversion_from_previous"].as_f64(), Some(100.0));
}

fn product_book() -> MemoryTableLoader {
    let product = |code: &str, name: &str, base: f64| {
        vec![
            ("code", Value::from(code)),
            ("name", Value::from(name)),
            ("base_premium", Value::from(base)),
        ]
    };
    let policy = |number: Option<&str>, product: &str, premium: f64, insured: f64| {
        vec![
            ("policy_number", Value::from(number)),
            ("product_id", Value::from(product)),
            ("premium", Value::from(premium)),
            ("sum_insured", Value::from(insured)),
        ]
    };
    MemoryTableLoader::new()
        .with_table(
            DataSystem::Postgresql,
            table(
                "products",
                vec![
                    product("001", "Vida Plus", 100.0),
                    product("002", "Auto Basico", 50.0),
                    product("003", "Hogar", 200.0),
                ],
            ),
        )
        .with_table(
            DataSystem::Postgresql,
            table(
                "policies",
                vec![
                    policy(Some("P-1"), "001", 120.0, 10_000.0),
                    policy(Some("P-2"), "001", 80.0, 10_000.0),
                    policy(None, "001", 100.0, 10_000.0),
                    policy(Some("P-3"), "002", 60.0, 3_000.0),
                    policy(Some("P-4"), "003", 300.0, 30_000.0),
                ],
            ),
        )
}

#[test]
fn product_profitability_measures_each_product() {
    let report = run(product_book(), ReportKind::ProductProfitability);
    let summary = &report["summary"];

    assert_eq!(summary["total_products_with_policies"].as_u64(), Some(3));
    assert_eq!(summary["total_policies_analyzed"].as_u64(), Some(4));
    assert_eq!(summary["total_premium_volume"].as_f64(), Some(660.0));
    assert_eq!(summary["average_policies_per_product"].as_f64(), Some(1.33));
    assert_eq!(summary["average_premium_efficiency"].as_f64(), Some(1.23));

    let matrix = &report["breakdown"]["product_performance_matrix"];
    let vida = &matrix["001"];
    assert_eq!(vida["policy_count"].as_u64(), Some(2));
    assert_eq!(vida["premium_sum"].as_f64(), Some(300.0));
    assert_eq!(vida["premium_efficiency"].as_f64(), Some(1.0));
    assert_eq!(vida["total_exposure"].as_f64(), Some(30_000.0));
    assert_eq!(vida["premium_to_exposure_ratio"].as_f64(), Some(1.0));
    assert_eq!(vida["name"], "Vida Plus");
    assert_eq!(matrix["002"]["premium_efficiency"].as_f64(), Some(1.2));
    assert_eq!(matrix["002"]["premium_to_exposure_ratio"].as_f64(), Some(2.0));

    let top = report["breakdown"]["top_products_by_efficiency"].as_array().unwrap();
    assert_eq!(top[0]["product_id"], "003");
    assert_eq!(top[0]["premium_efficiency"].as_f64(), Some(1.5));
}

#[test]
fn product_rankings_and_matrix_stop_at_top_n() {
    let settings = AnalysisSettings {
        top_n: 2,
        ..AnalysisSettings::default()
    };
    let report = orchestrator_with(product_book(), settings)
        .run(ReportKind::ProductProfitability, &ReportParams::default())
        .unwrap();
    let breakdown = &report["breakdown"];

    let matrix = breakdown["product_performance_matrix"].as_object().unwrap();
    assert_eq!(matrix.keys().collect::<Vec<_>>(), vec!["001", "002"]);
    let by_volume = breakdown["top_products_by_volume"].as_array().unwrap();
    assert_eq!(by_volume.len(), 2);
    assert_eq!(by_volume[0]["product_id"], "001");
    let by_premium: Vec<&str> = breakdown["top_products_by_premium"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["product_id"].as_str())
        .collect();
    assert_eq!(by_premium, vec!["001", "003"]);
}

#[test]
fn payments_overview_reports_interpolated_percentiles() {
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Cassandra,
        table(
            "pagos",
            [100.0, 200.0, 300.0, 400.0, 1000.0]
                .into_iter()
                .map(|amount| vec![("monto", Value::from(amount))])
                .collect(),
        ),
    );
    let report = run(loader, ReportKind::PaymentsOverview);
    let stats = &report["breakdown"]["amount_statistics"];

    assert_eq!(stats["total_payment_amount"].as_f64(), Some(2000.0));
    assert_eq!(stats["average_payment"].as_f64(), Some(400.0));
    assert_eq!(stats["median_payment"].as_f64(), Some(300.0));
    let expected = [
        ("p0", 100.0),
        ("p25", 200.0),
        ("p50", 300.0),
        ("p75", 400.0),
        ("p90", 760.0),
        ("p95", 880.0),
        ("p100", 1000.0),
    ];
    for (key, value) in expected {
        assert_eq!(stats["percentiles"][key].as_f64(), Some(value), "{key}");
    }
    assert_eq!(stats["percentiles"].as_object().map(|m| m.len()), Some(7));
}

#[test]
fn a_twenty_fifth_birthday_opens_the_next_age_group() {
    let loader = MemoryTableLoader::new()
        .with_table(
            DataSystem::Mysql,
            table("users", vec![vec![("id", Value::from(1))], vec![("id", Value::from(2))]]),
        )
        .with_table(
            DataSystem::Mysql,
            table(
                "clients",
                vec![
                    vec![("user_id", Value::from(1)), ("birth_date", Value::from("1999-03-10"))],
                    vec![("user_id", Value::from(2)), ("birth_date", Value::from("1999-03-20"))],
                ],
            ),
        )
        .with_table(
            DataSystem::Postgresql,
            table("policies", vec![vec![("customer_id", Value::from(1)), ("premium", Value::from(100.0))]]),
        );
    let report = orchestrator(loader).customer_policy_profile().unwrap();
    let by_age = &report["breakdown"]["by_age_group"];

    assert_eq!(by_age["25-34"]["customers"].as_u64(), Some(1));
    assert_eq!(by_age["25-34"]["age_mean"].as_f64(), Some(25.0));
    assert_eq!(by_age["25-34"]["premium_sum"].as_f64(), Some(100.0));
    assert_eq!(by_age["<25"]["customers"].as_u64(), Some(1));
    assert_eq!(by_age["<25"]["age_mean"].as_f64(), Some(24.0));
}

#[test]
fn user_statistics_counts_roles_registrations_and_gaps() {
    let user = |role: &str, state: &str, at: &str, email: Option<&str>, phone: Option<&str>| {
        vec![
            ("role", Value::from(role)),
            ("state", Value::from(state)),
            ("city", Value::from(if state == "LIMA" { "Miraflores" } else { "Cusco" })),
            ("created_at", Value::from(at)),
            ("email", Value::from(email)),
            ("phone", Value::from(phone)),
        ]
    };
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Mysql,
        table(
            "users",
            vec![
                user("admin", "LIMA", "2024-03-01", Some("ana@example.com"), Some("999")),
                user("client", "LIMA", "2024-02-20", Some("ana@example.com"), None),
                user("client", "CUSCO", "2023-12-05", None, Some("984")),
            ],
        ),
    );
    let report = run(loader, ReportKind::UserStatistics);
    let breakdown = &report["breakdown"];

    assert_eq!(report["summary"]["total_users"].as_u64(), Some(3));
    assert_eq!(report["summary"]["recent_registrations"].as_u64(), Some(2));
    assert_eq!(breakdown["users_by_role"]["client"].as_u64(), Some(2));
    assert_eq!(breakdown["users_by_state"]["LIMA"].as_u64(), Some(2));
    assert_eq!(breakdown["top_cities"]["Cusco"].as_u64(), Some(1));
    assert_eq!(breakdown["monthly_registrations"]["2023-12"].as_u64(), Some(1));
    assert_eq!(breakdown["monthly_registrations"]["2024-03"].as_u64(), Some(1));
    assert_eq!(breakdown["data_quality"]["missing_emails"].as_u64(), Some(1));
    assert_eq!(breakdown["data_quality"]["missing_phones"].as_u64(), Some(1));
    assert_eq!(breakdown["data_quality"]["duplicate_emails"].as_u64(), Some(1));
}

#[test]
fn client_demographics_profiles_ages_and_names() {
    let client = |document: &str, born: Option<&str>, first: &str, last: &str| {
        vec![
            ("document_type", Value::from(document)),
            ("birth_date", Value::from(born)),
            ("first_name", Value::from(first)),
            ("last_name", Value::from(last)),
        ]
    };
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Mysql,
        table(
            "clients",
            vec![
                client("DNI", Some("1999-03-10"), "Ana", "Perez"),
                client("DNI", Some("1984-03-10"), "Ana", "Diaz"),
                client("CE", None, "Luis", "Perez"),
            ],
        ),
    );
    let report = run(loader, ReportKind::ClientDemographics);
    let breakdown = &report["breakdown"];
    let ages = &breakdown["age_statistics"];

    assert_eq!(report["summary"]["total_clients"].as_u64(), Some(3));
    assert_eq!(breakdown["document_types"]["DNI"].as_u64(), Some(2));
    assert_eq!(ages["average_age"].as_f64(), Some(32.5));
    assert_eq!(ages["min_age"].as_i64(), Some(25));
    assert_eq!(ages["max_age"].as_i64(), Some(40));
    assert_eq!(ages["age_distribution"]["<25"].as_u64(), Some(0));
    assert_eq!(ages["age_distribution"]["25-34"].as_u64(), Some(1));
    assert_eq!(ages["age_distribution"]["35-44"].as_u64(), Some(1));
    assert_eq!(breakdown["common_names"]["first_names"]["Ana"].as_u64(), Some(2));
    assert_eq!(breakdown["common_names"]["last_names"]["Perez"].as_u64(), Some(2));
    assert_eq!(breakdown["data_completeness"]["has_birth_date"].as_u64(), Some(2));
    assert_eq!(breakdown["data_completeness"]["has_last_name"].as_u64(), Some(3));
}

#[test]
fn agent_overview_splits_the_roster_by_status() {
    let agent = |code: &str, active: bool| vec![("code", Value::from(code)), ("is_active", Value::from(active))];
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Mysql,
        table("agents", vec![agent("AG01", true), agent("AG02", true), agent("A3", false)]),
    );
    let report = run(loader, ReportKind::AgentOverview);
    let codes = &report["breakdown"]["code_analysis"];

    assert_eq!(report["report"], "agent-overview");
    assert_eq!(report["summary"]["total_agents"].as_u64(), Some(3));
    assert_eq!(report["summary"]["active_agents"].as_u64(), Some(2));
    assert_eq!(report["summary"]["inactive_agents"].as_u64(), Some(1));
    assert_eq!(report["breakdown"]["status_distribution"]["true"].as_u64(), Some(2));
    assert_eq!(codes["avg_code_length"].as_f64(), Some(3.3));
    assert_eq!(codes["code_length_distribution"]["4"].as_u64(), Some(2));
    assert_eq!(codes["code_length_distribution"]["2"].as_u64(), Some(1));
    assert_eq!(codes["unique_codes"].as_u64(), Some(3));
}

#[test]
fn beneficiary_relationships_summarise_clients_and_ages() {
    let beneficiary = |client: i64, relationship: &str, born: &str| {
        vec![
            ("client_id", Value::from(client)),
            ("relationship", Value::from(relationship)),
            ("birth_date", Value::from(born)),
        ]
    };
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Mysql,
        table(
            "beneficiaries",
            vec![
                beneficiary(1, "hijo", "2014-03-10"),
                beneficiary(1, "conyuge", "1989-03-10"),
                beneficiary(2, "hijo", "2004-03-10"),
            ],
        ),
    );
    let report = run(loader, ReportKind::BeneficiaryRelationships);
    let breakdown = &report["breakdown"];
    let per_client = &breakdown["beneficiaries_per_client"];

    assert_eq!(report["summary"]["total_beneficiaries"].as_u64(), Some(3));
    assert_eq!(breakdown["relationship_distribution"]["hijo"].as_u64(), Some(2));
    assert_eq!(per_client["avg_beneficiaries_per_client"].as_f64(), Some(1.5));
    assert_eq!(per_client["max_beneficiaries_per_client"].as_u64(), Some(2));
    assert_eq!(per_client["clients_with_multiple_beneficiaries"].as_u64(), Some(1));
    assert_eq!(per_client["distribution"]["1"].as_u64(), Some(1));
    assert_eq!(per_client["distribution"]["2"].as_u64(), Some(1));
    assert_eq!(breakdown["age_analysis"]["average_age"].as_f64(), Some(21.7));
    assert_eq!(breakdown["age_analysis"]["age_by_relationship"]["hijo"].as_f64(), Some(15.0));
    assert_eq!(breakdown["age_analysis"]["age_by_relationship"]["conyuge"].as_f64(), Some(35.0));
}

#[test]
fn transaction_audit_covers_services_hours_and_operations() {
    let event = |at: &str, service: &str, operation: &str| {
        vec![
            ("timestamp", Value::from(at)),
            ("servicio", Value::from(service)),
            ("operacion", Value::from(operation)),
        ]
    };
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Cassandra,
        table(
            "transaction_audit",
            vec![
                event("2024-03-10T09:00:00Z", "auth", "login"),
                event("2024-03-10T09:30:00Z", "auth", "login"),
                event("2024-01-01T14:00:00Z", "billing", "charge"),
                event("2023-06-01T23:10:00Z", "auth", "logout"),
            ],
        ),
    );
    let report = run(loader, ReportKind::TransactionAudit);
    let breakdown = &report["breakdown"];

    assert_eq!(report["summary"]["total_transactions"].as_u64(), Some(4));
    assert_eq!(breakdown["service_analysis"]["top_services"]["auth"].as_u64(), Some(3));
    assert_eq!(breakdown["service_analysis"]["total_services"].as_u64(), Some(2));
    let temporal = &breakdown["temporal_analysis"];
    assert_eq!(temporal["hourly_distribution"]["9"].as_u64(), Some(2));
    assert!(temporal["hourly_distribution"].get("10").is_none());
    assert_eq!(temporal["peak_hour"].as_u64(), Some(9));
    assert_eq!(temporal["lowest_activity_hour"].as_u64(), Some(14));
    assert_eq!(breakdown["operation_analysis"]["operation_types"]["login"].as_u64(), Some(2));
    assert_eq!(breakdown["operation_analysis"]["most_common_operation"], "login");
}

#[test]
fn product_analysis_describes_the_catalogue() {
    let product = |code: &str, name: &str, kind: &str, base: Option<f64>, description: Option<&str>| {
        vec![
            ("code", Value::from(code)),
            ("name", Value::from(name)),
            ("product_type", Value::from(kind)),
            ("base_premium", Value::from(base)),
            ("description", Value::from(description)),
        ]
    };
    let loader = MemoryTableLoader::new().with_table(
        DataSystem::Postgresql,
        table(
            "products",
            vec![
                product("001", "Seguro de Vida", "vida", Some(80.0), Some("Cobertura total")),
                product("002", "Seguro Auto", "auto", Some(450.0), None),
                product("AUT", "Plan Hogar", "hogar", Some(6000.0), Some("Casa")),
                product("VD-99", "Vida Plus", "vida", None, None),
            ],
        ),
    );
    let report = run(loader, ReportKind::ProductAnalysis);
    let breakdown = &report["breakdown"];

    assert_eq!(report["summary"]["total_products"].as_u64(), Some(4));
    assert_eq!(breakdown["product_types"]["vida"].as_u64(), Some(2));

    let premiums = &breakdown["premium_statistics"];
    assert_eq!(premiums["average_premium"].as_f64(), Some(2176.67));
    assert_eq!(premiums["median_premium"].as_f64(), Some(450.0));
    assert_eq!(premiums["min_premium"].as_f64(), Some(80.0));
    assert_eq!(premiums["max_premium"].as_f64(), Some(6000.0));
    assert_eq!(premiums["premium_distribution"]["< 100"].as_u64(), Some(1));
    assert_eq!(premiums["premium_distribution"]["100-499"].as_u64(), Some(1));
    assert_eq!(premiums["premium_distribution"]["1000-4999"].as_u64(), Some(0));
    assert_eq!(premiums["premium_distribution"]["5000+"].as_u64(), Some(1));

    let codes = &breakdown["code_analysis"];
    assert_eq!(codes["unique_codes"].as_u64(), Some(4));
    assert_eq!(codes["avg_code_length"].as_f64(), Some(3.5));
    let patterns = &codes["code_patterns"];
    assert_eq!(patterns["common_prefixes"]["VD-"].as_u64(), Some(1));
    assert_eq!(patterns["length_distribution"]["3"].as_u64(), Some(3));
    assert_eq!(patterns["format_distribution"]["numeric_only"].as_u64(), Some(2));
    assert_eq!(patterns["format_distribution"]["alpha_only"].as_u64(), Some(1));
    assert_eq!(patterns["format_distribution"]["mixed"].as_u64(), Some(1));

    let text = &breakdown["text_analysis"];
    assert_eq!(text["avg_name_length"].as_f64(), Some(11.0));
    assert_eq!(text["common_words_in_names"]["seguro"].as_u64(), Some(2));
    assert_eq!(text["common_words_in_names"]["vida"].as_u64(), Some(2));
    assert!(text["common_words_in_names"].get("de").is_none());
    assert_eq!(text["avg_description_length"].as_f64(), Some(9.5));
    assert_eq!(text["products_with_description"].as_u64(), Some(2));

    let completeness = &breakdown["data_completeness"];
    assert_eq!(completeness["products_with_premium"].as_u64(), Some(3));
    assert_eq!(completeness["products_with_description"].as_u64(), Some(2));
    assert_eq!(completeness["products_with_type"].as_u64(), Some(4));
}
