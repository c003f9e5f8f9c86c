/// Rule engine: plain-English rule text in, narrowed row collections out.
///
/// ```text
///   rules.json / rules.yaml ──► config::RuleSet
///                                    │
///                                    ▼
///   "NumMentions greater than 5" ─► rule::parse_rule ─► ParsedPredicate
///                                    │
///                                    ▼
///   RecordBatch ───────────────► apply::EventFilter ─► FilterOutcome
///                                                     (batch + FilterReport)
/// ```

pub mod apply;
pub mod config;
pub mod rule;

pub use apply::{build_filter_function, EventFilter, FilterOutcome, FilterReport};
pub use config::{default_rules, load_rules, save_rules, FilterRule, RuleSet};
pub use rule::{parse_rule, Operator, ParsedPredicate, RuleValue};
