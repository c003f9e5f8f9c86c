use std::cmp::Ordering;
use std::fmt;

use arrow::array::{BooleanArray, BooleanBuilder};
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;

use super::config::{FilterRule, RuleSet};
use super::rule::{parse_rule, Operator, ParsedPredicate, RuleValue};
use crate::data::model::{find_column, ColumnView, Scalar};
use crate::error::{FilterError, RuleError};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    ColumnNotFound { column: String },
}

#[derive(Debug)]
pub enum RuleStatus {
    Applied { rows_before: usize, rows_after: usize },
    Skipped(SkipReason),
    Failed(FilterError),
}

/// What one rule did during a pass.
#[derive(Debug)]
pub struct RuleOutcome {
    pub name: String,
    pub description: String,
    pub status: RuleStatus,
}

impl RuleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.status, RuleStatus::Applied { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RuleStatus::Failed(_))
    }
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RuleStatus::Applied {
                rows_before,
                rows_after,
            } => {
                write!(f, "{}: {rows_before} → {rows_after} rows", self.name)?;
                if let Some(pct) = retention_pct(*rows_before, *rows_after) {
                    write!(f, " ({pct:.1}% kept)")?;
                }
                Ok(())
            }
            RuleStatus::Skipped(SkipReason::Disabled) => write!(f, "{}: disabled", self.name),
            RuleStatus::Skipped(SkipReason::ColumnNotFound { column }) => {
                write!(f, "{}: column {column} not found, skipped", self.name)
            }
            RuleStatus::Failed(err) => write!(f, "{}: error: {err}", self.name),
        }
    }
}

/// Rows remaining divided by rows before, times 100. `None` for an empty input.
pub fn retention_pct(before: usize, after: usize) -> Option<f64> {
    (before > 0).then(|| after as f64 / before as f64 * 100.0)
}

/// Per-rule outcomes of one pass, in application order.
#[derive(Debug, Default)]
pub struct FilterReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub outcomes: Vec<RuleOutcome>,
}

impl FilterReport {
    pub fn retention_pct(&self) -> Option<f64> {
        retention_pct(self.rows_in, self.rows_out)
    }

    pub fn summary_line(&self) -> String {
        match self.retention_pct() {
            Some(pct) => format!(
                "Filtered: {} → {} events ({pct:.1}% kept)",
                self.rows_in, self.rows_out
            ),
            None => "Filtered: 0 → 0 events".to_string(),
        }
    }

    pub fn outcome(&self, name: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }
}

/// The narrowed collection plus what happened along the way.
#[derive(Debug)]
pub struct FilterOutcome {
    pub batch: RecordBatch,
    pub report: FilterReport,
}

// ---------------------------------------------------------------------------
// EventFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: FilterRule,
    parsed: Result<ParsedPredicate, RuleError>,
}

/// A snapshot of a [`RuleSet`] with every rule parsed once.
#[derive(Debug, Clone)]
pub struct EventFilter {
    rules: Vec<CompiledRule>,
}

impl EventFilter {
    pub fn new(rules: &RuleSet) -> Self {
        let rules = rules
            .iter()
            .map(|rule| CompiledRule {
                rule: rule.clone(),
                parsed: parse_rule(&rule.rule),
            })
            .collect();
        Self { rules }
    }

    pub fn active_count(&self) -> usize {
        self.rules.iter().filter(|r| r.rule.enabled).count()
    }

    /// Apply enabled rules in order, each to the survivors of the previous
    /// ones. A rule that fails or names a missing column leaves the rows as
    /// they were and the pass continues.
    pub fn apply(&self, batch: RecordBatch) -> FilterOutcome {
        let mut report = FilterReport {
            rows_in: batch.num_rows(),
            ..FilterReport::default()
        };
        let mut current = batch;

        for compiled in &self.rules {
            let rule = &compiled.rule;
            let status = if !rule.enabled {
                log::debug!("Skipping disabled rule {}", rule.name);
                RuleStatus::Skipped(SkipReason::Disabled)
            } else {
                match apply_rule(compiled, &current) {
                    Ok(Some(narrowed)) => {
                        let status = RuleStatus::Applied {
                            rows_before: current.num_rows(),
                            rows_after: narrowed.num_rows(),
                        };
                        current = narrowed;
                        status
                    }
                    Ok(None) => {
                        let column = compiled
                            .parsed
                            .as_ref()
                            .map(|p| p.column.clone())
                            .unwrap_or_default();
                        RuleStatus::Skipped(SkipReason::ColumnNotFound { column })
                    }
                    Err(err) => RuleStatus::Failed(err),
                }
            };

            let outcome = RuleOutcome {
                name: rule.name.clone(),
                description: rule.description.clone(),
                status,
            };
            match &outcome.status {
                RuleStatus::Applied { .. } => {
                    if !rule.description.is_empty() {
                        log::info!("Applied: {}", rule.description);
                    }
                    log::info!("{outcome}");
                }
                RuleStatus::Skipped(SkipReason::Disabled) => {}
                RuleStatus::Skipped(SkipReason::ColumnNotFound { column }) => {
                    log::warn!("Column {column} not found for rule: {}", rule.name)
                }
                RuleStatus::Failed(err) => log::error!("Error applying rule {}: {err}", rule.name),
            }
            report.outcomes.push(outcome);
        }

        report.rows_out = current.num_rows();
        if report.rows_in > 0 {
            log::info!("{}", report.summary_line());
        }
        FilterOutcome {
            batch: current,
            report,
        }
    }
}

/// Closure form of [`EventFilter::apply`] for callers that only want rows.
/// The per-rule report is logged and dropped.
pub fn build_filter_function(rules: &RuleSet) -> impl Fn(RecordBatch) -> RecordBatch {
    let filter = EventFilter::new(rules);
    move |batch| filter.apply(batch).batch
}

/// `Ok(None)` when the rule's column is absent.
fn apply_rule(compiled: &CompiledRule, batch: &RecordBatch) -> Result<Option<RecordBatch>, FilterError> {
    let predicate = compiled.parsed.as_ref().map_err(|e| e.clone())?;
    let Some(idx) = find_column(&batch.schema(), &predicate.column) else {
        return Ok(None);
    };
    let column = ColumnView::new(&predicate.column, batch.column(idx))?;
    let mask = build_mask(predicate, &column)?;
    Ok(Some(filter_record_batch(batch, &mask)?))
}

// ---------------------------------------------------------------------------
// Mask evaluation
// ---------------------------------------------------------------------------

fn build_mask(predicate: &ParsedPredicate, column: &ColumnView) -> Result<BooleanArray, FilterError> {
    let matcher = Matcher::new(predicate)?;
    let mut mask = BooleanBuilder::with_capacity(column.len());
    for row in 0..column.len() {
        mask.append_value(matcher.matches(&column.cell(row))?);
    }
    Ok(mask.finish())
}

/// A predicate with its value already checked against the operator's shape.
struct Matcher<'a> {
    column: &'a str,
    kind: MatchKind<'a>,
}

enum MatchKind<'a> {
    Compare(Operator, &'a Scalar),
    Contains { needle: String, negate: bool },
    Member { items: &'a [Scalar], negate: bool },
    Null { negate: bool },
    Between(&'a Scalar, &'a Scalar),
}

impl<'a> Matcher<'a> {
    fn new(predicate: &'a ParsedPredicate) -> Result<Self, FilterError> {
        let op = predicate.operator;
        let invalid = |reason: &str| FilterError::InvalidValue {
            operator: op.to_string(),
            reason: reason.to_string(),
        };

        let kind = match (op, &predicate.value) {
            (Operator::IsNull, _) => MatchKind::Null { negate: false },
            (Operator::NotNull, _) => MatchKind::Null { negate: true },
            (Operator::Between, RuleValue::Range(lo, hi)) => MatchKind::Between(lo, hi),
            (Operator::Between, _) => return Err(invalid("expected `<low> and <high>`")),
            (Operator::In | Operator::NotIn, RuleValue::List(items)) => MatchKind::Member {
                items,
                negate: op == Operator::NotIn,
            },
            (Operator::In | Operator::NotIn, RuleValue::Single(item)) => MatchKind::Member {
                items: std::slice::from_ref(item),
                negate: op == Operator::NotIn,
            },
            (Operator::In | Operator::NotIn, _) => return Err(invalid("expected a `[...]` list")),
            (
                Operator::Contains | Operator::NotContains,
                RuleValue::Single(Scalar::String(needle)),
            ) => MatchKind::Contains {
                needle: needle.to_lowercase(),
                negate: op == Operator::NotContains,
            },
            (Operator::Contains | Operator::NotContains, _) => {
                return Err(invalid("expected a single text value"))
            }
            (_, RuleValue::Single(value)) => MatchKind::Compare(op, value),
            (_, _) => return Err(invalid("expected a single value")),
        };

        Ok(Self {
            column: &predicate.column,
            kind,
        })
    }

    /// Null cells satisfy `is null` and nothing else, negated operators included.
    fn matches(&self, cell: &Scalar) -> Result<bool, FilterError> {
        if cell.is_null() {
            return Ok(matches!(self.kind, MatchKind::Null { negate: false }));
        }

        Ok(match &self.kind {
            MatchKind::Null { negate } => *negate,
            MatchKind::Compare(op, value) => {
                let ord = self.compare(cell, value)?;
                match op {
                    Operator::Gt => ord == Ordering::Greater,
                    Operator::Ge => ord != Ordering::Less,
                    Operator::Lt => ord == Ordering::Less,
                    Operator::Le => ord != Ordering::Greater,
                    Operator::Ne => ord != Ordering::Equal,
                    _ => ord == Ordering::Equal,
                }
            }
            MatchKind::Contains { needle, negate } => {
                let Scalar::String(text) = cell else {
                    return Err(FilterError::TypeMismatch {
                        column: self.column.to_string(),
                        cell: cell.type_name(),
                        literal: "string",
                    });
                };
                text.to_lowercase().contains(needle.as_str()) != *negate
            }
            MatchKind::Member { items, negate } => {
                let mut found = false;
                for item in items.iter() {
                    if self.compare(cell, item)? == Ordering::Equal {
                        found = true;
                        break;
                    }
                }
                found != *negate
            }
            MatchKind::Between(lo, hi) => {
                self.compare(cell, lo)? != Ordering::Less
                    && self.compare(cell, hi)? != Ordering::Greater
            }
        })
    }

    fn compare(&self, cell: &Scalar, literal: &Scalar) -> Result<Ordering, FilterError> {
        cell.compare(literal).ok_or_else(|| FilterError::TypeMismatch {
            column: self.column.to_string(),
            cell: cell.type_name(),
            literal: literal.type_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::config::FilterRule;
    use arrow::array::{Array, AsArray, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Int64Type, Schema};
    use std::sync::Arc;

    fn events() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("GLOBALEVENTID", DataType::Int64, false),
            Field::new("NumMentions", DataType::Int64, true),
            Field::new("GoldsteinScale", DataType::Float64, true),
            Field::new("Actor1Name", DataType::Utf8, true),
            Field::new("ActionGeo_CountryCode", DataType::Utf8, true),
            Field::new("ActionGeo_Lat", DataType::Float64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5, 6])),
                Arc::new(Int64Array::from(vec![
                    Some(1),
                    Some(5),
                    Some(9),
                    None,
                    Some(12),
                    Some(6),
                ])),
                Arc::new(Float64Array::from(vec![
                    Some(-10.0),
                    Some(10.0),
                    Some(-10.5),
                    Some(3.4),
                    None,
                    Some(10.01),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("POLICE"),
                    Some("Protesters"),
                    None,
                    Some("MILITARY"),
                    Some("protest group"),
                    Some("UNITED NATIONS"),
                ])),
                Arc::new(StringArray::from(vec![
                    Some("US"),
                    Some("FR"),
                    Some("US"),
                    None,
                    Some("CN"),
                    Some("DE"),
                ])),
                Arc::new(Float64Array::from(vec![
                    Some(38.9),
                    None,
                    Some(48.8),
                    Some(f64::NAN),
                    Some(39.9),
                    Some(52.5),
                ])),
            ],
        )
        .unwrap()
    }

    fn ids(batch: &RecordBatch) -> Vec<i64> {
        batch
            .column(0)
            .as_primitive::<Int64Type>()
            .values()
            .to_vec()
    }

    fn rules(specs: &[(&str, &str)]) -> RuleSet {
        let mut set = RuleSet::new();
        for (name, text) in specs {
            set.insert(FilterRule::new(*name, *text)).unwrap();
        }
        set
    }

    fn run(text: &str) -> FilterOutcome {
        EventFilter::new(&rules(&[("r", text)])).apply(events())
    }

    #[test]
    fn comparisons_drop_nulls() {
        assert_eq!(ids(&run("NumMentions greater than 5").batch), vec![3, 5, 6]);
        assert_eq!(
            ids(&run("NumMentions greater than or equal 5").batch),
            vec![2, 3, 5, 6]
        );
        assert_eq!(ids(&run("NumMentions less than 5").batch), vec![1]);
        assert_eq!(ids(&run("NumMentions less than or equal 5").batch), vec![1, 2]);
        assert_eq!(ids(&run("NumMentions equals 9").batch), vec![3]);
        assert_eq!(ids(&run("NumMentions not equals 9").batch), vec![1, 2, 5, 6]);
        assert_eq!(ids(&run("GoldsteinScale greater than 3.3").batch), vec![2, 4, 6]);
    }

    #[test]
    fn text_comparisons_ignore_case() {
        assert_eq!(
            ids(&run("ActionGeo_CountryCode equals US").batch),
            vec![1, 3]
        );
        assert_eq!(
            ids(&run("ActionGeo_CountryCode in [US, FR]").batch),
            vec![1, 2, 3]
        );
        assert_eq!(
            ids(&run("ActionGeo_CountryCode not in [US, FR]").batch),
            vec![5, 6]
        );
        assert_eq!(ids(&run("ActionGeo_CountryCode in CN").batch), vec![5]);
    }

    #[test]
    fn contains_excludes_nulls_both_ways() {
        assert_eq!(ids(&run("Actor1Name contains protest").batch), vec![2, 5]);
        assert_eq!(
            ids(&run("Actor1Name not contains protest").batch),
            vec![1, 4, 6]
        );
    }

    #[test]
    fn contains_matches_digits_as_written() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("GLOBALEVENTID", DataType::Int64, false),
            Field::new("Actor1Name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["AGENT 007", "UNIT 7", "BATTALION 70"])),
            ],
        )
        .unwrap();
        let outcome = EventFilter::new(&rules(&[("r", "Actor1Name contains 007")])).apply(batch);
        assert_eq!(ids(&outcome.batch), vec![1]);
    }

    #[test]
    fn oversized_literal_still_compares() {
        let outcome = run("NumMentions less than 99999999999999999999");
        assert!(outcome.report.outcomes[0].is_applied());
        assert_eq!(ids(&outcome.batch), vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn null_checks_treat_nan_as_null() {
        assert_eq!(ids(&run("ActionGeo_Lat is not null").batch), vec![1, 3, 5, 6]);
        assert_eq!(ids(&run("ActionGeo_Lat is null").batch), vec![2, 4]);
        assert_eq!(ids(&run("Actor1Name is null").batch), vec![3]);
    }

    #[test]
    fn between_is_inclusive() {
        assert_eq!(
            ids(&run("GoldsteinScale between -10 and 10").batch),
            vec![1, 2, 4]
        );
    }

    #[test]
    fn type_mismatch_fails_only_that_rule() {
        let set = rules(&[
            ("bad", "Actor1Name greater than 5"),
            ("good", "NumMentions greater than 5"),
        ]);
        let outcome = EventFilter::new(&set).apply(events());

        assert_eq!(ids(&outcome.batch), vec![3, 5, 6]);
        let bad = outcome.report.outcome("bad").unwrap();
        assert!(matches!(
            bad.status,
            RuleStatus::Failed(FilterError::TypeMismatch { cell: "string", literal: "integer", .. })
        ));
        assert!(outcome.report.outcome("good").unwrap().is_applied());
        assert_eq!(outcome.report.failures().count(), 1);
    }

    #[test]
    fn contains_on_numeric_column_is_a_mismatch() {
        let outcome = run("NumMentions contains 5");
        assert_eq!(outcome.batch.num_rows(), 6);
        assert!(outcome.report.outcomes[0].is_failed());
    }

    #[test]
    fn unparsable_rule_fails_without_aborting() {
        let set = rules(&[
            ("broken", "NumMentions > 5"),
            ("located", "ActionGeo_Lat is not null"),
        ]);
        let outcome = EventFilter::new(&set).apply(events());
        assert!(matches!(
            outcome.report.outcome("broken").unwrap().status,
            RuleStatus::Failed(FilterError::Rule(RuleError::UnknownOperator { .. }))
        ));
        assert_eq!(ids(&outcome.batch), vec![1, 3, 5, 6]);
    }

    #[test]
    fn wrong_value_shape_is_invalid() {
        let outcome = run("GoldsteinScale between 5");
        assert!(matches!(
            outcome.report.outcomes[0].status,
            RuleStatus::Failed(FilterError::InvalidValue { .. })
        ));
        let outcome = run("NumMentions greater than [1, 2]");
        assert!(outcome.report.outcomes[0].is_failed());
        assert_eq!(outcome.batch.num_rows(), 6);
    }

    #[test]
    fn missing_column_leaves_rows_unchanged() {
        let outcome = run("NoSuchColumn greater than 1");
        assert_eq!(outcome.batch.num_rows(), 6);
        assert_eq!(
            outcome.report.outcomes[0].status_skip(),
            Some(&SkipReason::ColumnNotFound {
                column: "NOSUCHCOLUMN".to_string()
            })
        );
    }

    #[test]
    fn disabled_rules_never_change_row_count() {
        let mut set = rules(&[("off", "NumMentions greater than 100")]);
        set.set_enabled("off", false);
        let outcome = EventFilter::new(&set).apply(events());
        assert_eq!(outcome.batch.num_rows(), 6);
        assert_eq!(
            outcome.report.outcomes[0].status_skip(),
            Some(&SkipReason::Disabled)
        );
    }

    #[test]
    fn filtering_is_idempotent() {
        let filter = EventFilter::new(&rules(&[
            ("mentions", "NumMentions greater than or equal 5"),
            ("located", "ActionGeo_Lat is not null"),
            ("tone", "GoldsteinScale between -10 and 10"),
        ]));
        let once = filter.apply(events()).batch;
        let twice = filter.apply(once.clone()).batch;
        assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn independent_rules_commute() {
        let forward = EventFilter::new(&rules(&[
            ("r1", "NumMentions greater than 5"),
            ("r2", "ActionGeo_Lat is not null"),
        ]));
        let backward = EventFilter::new(&rules(&[
            ("r2", "ActionGeo_Lat is not null"),
            ("r1", "NumMentions greater than 5"),
        ]));
        assert_eq!(
            ids(&forward.apply(events()).batch),
            ids(&backward.apply(events()).batch)
        );
    }

    #[test]
    fn sources_threshold_over_hundred_rows() {
        // NumSources cycles 0..=4 with every tenth row null.
        let sources: Vec<Option<i64>> = (0..100)
            .map(|i| if i % 10 == 9 { None } else { Some(i % 5) })
            .collect();
        let expected = sources.iter().filter(|s| matches!(s, Some(n) if *n > 2)).count();
        let schema = Arc::new(Schema::new(vec![Field::new(
            "NumSources",
            DataType::Int64,
            true,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(sources))]).unwrap();

        let outcome = EventFilter::new(&rules(&[("recent_sources", "NumSources greater than 2")]))
            .apply(batch);

        assert_eq!(outcome.batch.num_rows(), expected);
        assert_eq!(outcome.batch.column(0).null_count(), 0);
        assert_eq!(outcome.report.rows_in, 100);
        assert_eq!(outcome.report.rows_out, expected);
        assert_eq!(
            outcome.report.summary_line(),
            format!("Filtered: 100 → {expected} events ({:.1}% kept)", expected as f64)
        );
        assert_eq!(
            outcome.report.outcomes[0].to_string(),
            format!("recent_sources: 100 → {expected} rows ({:.1}% kept)", expected as f64)
        );
    }

    #[test]
    fn retention_rounds_to_one_decimal() {
        let report = FilterReport {
            rows_in: 3,
            rows_out: 2,
            outcomes: Vec::new(),
        };
        assert_eq!(report.summary_line(), "Filtered: 3 → 2 events (66.7% kept)");
        assert_eq!(retention_pct(0, 0), None);
    }

    #[test]
    fn closure_form_returns_rows_only() {
        let filter = build_filter_function(&rules(&[("r", "NumMentions greater than 5")]));
        let input = events();
        let output = filter(input.clone());
        assert_eq!(ids(&output), vec![3, 5, 6]);
        // The caller's batch is untouched.
        assert_eq!(input.num_rows(), 6);
    }

    #[test]
    fn default_rules_run_end_to_end() {
        let outcome = EventFilter::new(&crate::filter::config::default_rules()).apply(events());
        // NumSources is absent from this table, so recent_sources is skipped.
        assert!(matches!(
            outcome.report.outcome("recent_sources").unwrap().status,
            RuleStatus::Skipped(SkipReason::ColumnNotFound { .. })
        ));
        assert_eq!(
            outcome.report.outcome("specific_countries").unwrap().status_skip(),
            Some(&SkipReason::Disabled)
        );
        // Row 6 survives until its Goldstein score of 10.01 falls outside the range.
        assert_eq!(
            outcome.report.outcome("has_actors").unwrap().to_string(),
            "has_actors: 3 → 2 rows (66.7% kept)"
        );
        assert_eq!(outcome.batch.num_rows(), 0);
        assert_eq!(outcome.report.outcomes.len(), 7);
    }

    impl RuleOutcome {
        fn status_skip(&self) -> Option<&SkipReason> {
            match &self.status {
                RuleStatus::Skipped(reason) => Some(reason),
                _ => None,
            }
        }
    }
}
