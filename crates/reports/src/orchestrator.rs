use crate::envelope::ReportBuilder;
use crate::error::ReportError;
use crate::{activity, claims, cross, identity, portfolio, quality};
use analytics::{InsightEngine, JoinKind, JoinOutcome, JoinPlanner, KeyPair, TemporalBucketer};
use chrono::{DateTime, TimeDelta, Utc};
use configuration::AnalysisSettings;
use core_types::{DataSystem, Table};
use datastore::{LoaderError, TableLoader};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Every report the orchestrator can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    CustomerPolicyProfile,
    AgentPerformance,
    ClaimsVsPolicies,
    CustomerJourney,
    ClaimsPaymentsCorrelation,
    ActivityPatterns,
    ClaimsOverview,
    PaymentsOverview,
    ProductProfitability,
    UserGrowth,
    DataQuality,
    UserStatistics,
    ClientDemographics,
    AgentOverview,
    BeneficiaryRelationships,
    TransactionAudit,
    ProductAnalysis,
}

impl ReportKind {
    pub const ALL: [ReportKind; 17] = [
        ReportKind::CustomerPolicyProfile,
        ReportKind::AgentPerformance,
        ReportKind::ClaimsVsPolicies,
        ReportKind::CustomerJourney,
        ReportKind::ClaimsPaymentsCorrelation,
        ReportKind::ActivityPatterns,
        ReportKind::ClaimsOverview,
        ReportKind::PaymentsOverview,
        ReportKind::ProductProfitability,
        ReportKind::UserGrowth,
        ReportKind::DataQuality,
        ReportKind::UserStatistics,
        ReportKind::ClientDemographics,
        ReportKind::AgentOverview,
        ReportKind::BeneficiaryRelationships,
        ReportKind::TransactionAudit,
        ReportKind::ProductAnalysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::CustomerPolicyProfile => "customer-policy-profile",
            ReportKind::AgentPerformance => "agent-performance",
            ReportKind::ClaimsVsPolicies => "claims-vs-policies",
            ReportKind::CustomerJourney => "customer-journey",
            ReportKind::ClaimsPaymentsCorrelation => "claims-payments-correlation",
            ReportKind::ActivityPatterns => "activity-patterns",
            ReportKind::ClaimsOverview => "claims-overview",
            ReportKind::PaymentsOverview => "payments-overview",
            ReportKind::ProductProfitability => "product-profitability",
            ReportKind::UserGrowth => "user-growth",
            ReportKind::DataQuality => "data-quality",
            ReportKind::UserStatistics => "user-statistics",
            ReportKind::ClientDemographics => "client-demographics",
            ReportKind::AgentOverview => "agent-overview",
            ReportKind::BeneficiaryRelationships => "beneficiary-relationships",
            ReportKind::TransactionAudit => "transaction-audit",
            ReportKind::ProductAnalysis => "product-analysis",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        ReportKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| ReportError::UnknownReport(s.to_string()))
    }
}

/// Already-validated numeric parameters; `None` means "use the configured default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportParams {
    pub months: Option<u32>,
    pub hours: Option<u32>,
}

/// Composes loaders, joins and aggregations into the named reports.
///
/// The orchestrator holds no mutable state; concurrent `run` calls share only
/// the loader.
#[derive(Clone)]
pub struct AnalyticsOrchestrator {
    loader: Arc<dyn TableLoader>,
    settings: AnalysisSettings,
    now: Option<DateTime<Utc>>,
}

impl fmt::Debug for AnalyticsOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsOrchestrator")
            .field("settings", &self.settings)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl AnalyticsOrchestrator {
    pub fn new(loader: Arc<dyn TableLoader>, settings: AnalysisSettings) -> Self {
        Self {
            loader,
            settings,
            now: None,
        }
    }

    /// Pins the reference instant used for windows, ages and timestamps.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Runs one report to completion.
    pub fn run(&self, kind: ReportKind, params: &ReportParams) -> Result<Value, ReportError> {
        let started = Instant::now();
        let ctx = ReportContext {
            loader: self.loader.as_ref(),
            settings: &self.settings,
            clock: TemporalBucketer::new(self.now.unwrap_or_else(Utc::now)),
            planner: JoinPlanner::new(),
            insights: InsightEngine::new(),
        };
        let mut report = ReportBuilder::new(kind.name());

        match kind {
            ReportKind::CustomerPolicyProfile => cross::customer_policy_profile(&ctx, &mut report)?,
            ReportKind::AgentPerformance => cross::agent_performance(&ctx, &mut report)?,
            ReportKind::ClaimsVsPolicies => cross::claims_vs_policies(&ctx, &mut report)?,
            ReportKind::CustomerJourney => cross::customer_journey(&ctx, &mut report)?,
            ReportKind::ClaimsPaymentsCorrelation => claims::claims_payments_correlation(&ctx, &mut report)?,
            ReportKind::ActivityPatterns => {
                let hours = params.hours.unwrap_or(self.settings.default_activity_hours);
                activity::activity_patterns(&ctx, &mut report, hours)?
            }
            ReportKind::ClaimsOverview => claims::claims_overview(&ctx, &mut report)?,
            ReportKind::PaymentsOverview => claims::payments_overview(&ctx, &mut report)?,
            ReportKind::ProductProfitability => portfolio::product_profitability(&ctx, &mut report)?,
            ReportKind::UserGrowth => {
                let months = params.months.unwrap_or(self.settings.default_growth_months);
                portfolio::user_growth(&ctx, &mut report, months)?
            }
            ReportKind::DataQuality => quality::data_quality(&ctx, &mut report)?,
            ReportKind::UserStatistics => identity::user_statistics(&ctx, &mut report)?,
            ReportKind::ClientDemographics => identity::client_demographics(&ctx, &mut report)?,
            ReportKind::AgentOverview => identity::agent_overview(&ctx, &mut report)?,
            ReportKind::BeneficiaryRelationships => identity::beneficiary_relationships(&ctx, &mut report)?,
            ReportKind::TransactionAudit => activity::transaction_audit(&ctx, &mut report)?,
            ReportKind::ProductAnalysis => portfolio::product_analysis(&ctx, &mut report)?,
        }

        info!(report = kind.name(), elapsed_ms = started.elapsed().as_millis() as u64, "Report completed");
        Ok(report.finish(ctx.clock.now()))
    }

    pub fn customer_policy_profile(&self) -> Result<Value, ReportError> {
        self.run(ReportKind::CustomerPolicyProfile, &ReportParams::default())
    }

    pub fn agent_performance(&self) -> Result<Value, ReportError> {
        self.run(ReportKind::AgentPerformance, &ReportParams::default())
    }

    pub fn claims_vs_policies(&self) -> Result<Value, ReportError> {
        self.run(ReportKind::ClaimsVsPolicies, &ReportParams::default())
    }

    pub fn customer_journey(&self) -> Result<Value, ReportError> {
        self.run(ReportKind::CustomerJourney, &ReportParams::default())
    }

    pub fn claims_payments_correlation(&self) -> Result<Value, ReportError> {
        self.run(ReportKind::ClaimsPaymentsCorrelation, &ReportParams::default())
    }

    pub fn activity_patterns(&self, hours: u32) -> Result<Value, ReportError> {
        let params = ReportParams {
            hours: Some(hours),
            ..ReportParams::default()
        };
        self.run(ReportKind::ActivityPatterns, &params)
    }

    pub fn user_growth(&self, months: u32) -> Result<Value, ReportError> {
        let params = ReportParams {
            months: Some(months),
            ..ReportParams::default()
        };
        self.run(ReportKind::UserGrowth, &params)
    }
}

/// Everything a single report execution needs, borrowed for its duration.
pub(crate) struct ReportContext<'a> {
    pub loader: &'a dyn TableLoader,
    pub settings: &'a AnalysisSettings,
    pub clock: TemporalBucketer,
    pub planner: JoinPlanner,
    pub insights: InsightEngine,
}

impl ReportContext<'_> {
    /// Loads a required table and records it as a source.
    pub fn load(&self, report: &mut ReportBuilder, system: DataSystem, name: &str) -> Result<Table, ReportError> {
        let table = self.loader.get_table(system, name)?;
        report.source(system, name);
        Ok(table)
    }

    /// Loads an enrichment table; `None` when it does not exist.
    pub fn load_optional(
        &self,
        report: &mut ReportBuilder,
        system: DataSystem,
        name: &str,
    ) -> Result<Option<Table>, ReportError> {
        match self.loader.get_table(system, name) {
            Ok(table) => {
                report.source(system, name);
                Ok(Some(table))
            }
            Err(LoaderError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Joins through the planner and records the outcome in the provenance.
    pub fn join(
        &self,
        report: &mut ReportBuilder,
        relationship: &str,
        left: &Table,
        right: &Table,
        candidates: &[(&str, &str)],
        how: JoinKind,
    ) -> Result<JoinOutcome, ReportError> {
        let candidates = KeyPair::candidates(candidates);
        let outcome = self.planner.join(left, right, &candidates, how)?;
        match &outcome {
            JoinOutcome::Joined(result) => report.joined(relationship, result),
            JoinOutcome::Fallback { tried } => {
                warn!(relationship, "No usable join keys, falling back to separate analysis");
                report.fallback(relationship, tried);
            }
        }
        Ok(outcome)
    }

    pub fn recent_window(&self) -> TimeDelta {
        TimeDelta::from_std(self.settings.recent_window).unwrap_or(TimeDelta::MAX)
    }

    pub fn top_n(&self) -> usize {
        self.settings.top_n
    }

    /// Fails with `RequiredColumn` unless `table` has `column`.
    pub fn require(&self, table: &Table, column: &str) -> Result<(), ReportError> {
        if table.has_column(column) {
            Ok(())
        } else {
            Err(ReportError::RequiredColumn {
                table: table.name().to_string(),
                column: column.to_string(),
            })
        }
    }
}
