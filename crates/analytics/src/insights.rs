use serde::Serialize;

/// The named inputs the rule table understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    LossRatio,
    ClaimsToPaymentsRatio,
    Correlation,
    PeakHourCount,
    ConsistencyScore,
    BusiestDayVolume,
    PeakMultiplier,
    Completeness,
    DuplicatePercentage,
    IntegrityPercentage,
}

/// One observed figure, optionally about a named subject (a table, a
/// relationship, a day, an hour window).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub metric: Metric,
    pub value: f64,
    pub subject: Option<String>,
}

impl Signal {
    pub fn new(metric: Metric, value: f64) -> Self {
        Self {
            metric,
            value,
            subject: None,
        }
    }

    pub fn about(metric: Metric, value: f64, subject: impl Into<String>) -> Self {
        Self {
            metric,
            value,
            subject: Some(subject.into()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Condition {
    Above(f64),
    Below(f64),
    Within(f64, f64),
}

impl Condition {
    fn holds(&self, value: f64) -> bool {
        match *self {
            Condition::Above(t) => value > t,
            Condition::Below(t) => value < t,
            Condition::Within(lo, hi) => value >= lo && value <= hi,
        }
    }
}

/// A threshold and the message it produces. `{value}` and `{subject}` are
/// substituted on output.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    metric: Metric,
    condition: Condition,
    template: &'static str,
}

const fn rule(metric: Metric, condition: Condition, template: &'static str) -> Rule {
    Rule {
        metric,
        condition,
        template,
    }
}

pub const RULES: &[Rule] = &[
    rule(
        Metric::LossRatio,
        Condition::Above(80.0),
        "High loss ratio ({value}%) - review underwriting policies",
    ),
    rule(
        Metric::LossRatio,
        Condition::Below(30.0),
        "Low loss ratio ({value}%) - excellent risk control",
    ),
    rule(
        Metric::LossRatio,
        Condition::Within(30.0, 80.0),
        "Moderate loss ratio ({value}%) - within normal range",
    ),
    rule(
        Metric::ClaimsToPaymentsRatio,
        Condition::Above(0.5),
        "High claim frequency - consider reviewing customer satisfaction processes",
    ),
    rule(
        Metric::ClaimsToPaymentsRatio,
        Condition::Below(0.1),
        "Low claim frequency - good customer experience or possible under-reporting",
    ),
    rule(
        Metric::Correlation,
        Condition::Above(0.7),
        "Strong relationship between {subject} ({value})",
    ),
    rule(
        Metric::Correlation,
        Condition::Below(-0.7),
        "Strong inverse relationship between {subject} ({value})",
    ),
    rule(
        Metric::PeakHourCount,
        Condition::Above(0.0),
        "Consider auto-scaling during peak hours ({subject})",
    ),
    rule(
        Metric::ConsistencyScore,
        Condition::Below(50.0),
        "High variability in activity patterns - implement dynamic load balancing",
    ),
    rule(
        Metric::ConsistencyScore,
        Condition::Above(80.0),
        "Very consistent activity patterns - well suited to capacity planning",
    ),
    rule(
        Metric::BusiestDayVolume,
        Condition::Above(0.0),
        "Plan additional resources for {subject}",
    ),
    rule(
        Metric::PeakMultiplier,
        Condition::Above(3.0),
        "Activity peaks at {value}x the average - implement aggressive auto-scaling",
    ),
    rule(
        Metric::Completeness,
        Condition::Below(90.0),
        "Improve data completeness in table {subject} ({value}%)",
    ),
    rule(
        Metric::DuplicatePercentage,
        Condition::Above(1.0),
        "Review and remove duplicates in table {subject} ({value}%)",
    ),
    rule(
        Metric::IntegrityPercentage,
        Condition::Below(95.0),
        "Fix orphaned references in relationship {subject} ({value}%)",
    ),
];

/// Evaluates signals against a rule table.
#[derive(Debug, Clone, Copy)]
pub struct InsightEngine {
    rules: &'static [Rule],
}

impl Default for InsightEngine {
    fn default() -> Self {
        Self { rules: RULES }
    }
}

impl InsightEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages for every (rule, signal) pair that fires, in rule order and
    /// then signal order.
    pub fn evaluate(&self, signals: &[Signal]) -> Vec<String> {
        let mut messages = Vec::new();
        for rule in self.rules {
            for signal in signals.iter().filter(|s| s.metric == rule.metric) {
                if signal.value.is_finite() && rule.condition.holds(signal.value) {
                    messages.push(render(rule.template, signal));
                }
            }
        }
        messages
    }

    /// Like `evaluate`, but yields `fallback` alone when nothing fires.
    pub fn evaluate_or(&self, signals: &[Signal], fallback: &str) -> Vec<String> {
        let messages = self.evaluate(signals);
        if messages.is_empty() {
            vec![fallback.to_string()]
        } else {
            messages
        }
    }
}

fn render(template: &str, signal: &Signal) -> String {
    template
        .replace("{value}", &format_value(signal.value))
        .replace("{subject}", signal.subject.as_deref().unwrap_or("the data"))
}

fn format_value(value: f64) -> String {
    let rounded = crate::numeric::round2(value);
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        rounded.to_string()
    }
}
