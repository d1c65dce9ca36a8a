//! The ordered transformation chain applied to every captured event.
//!
//! Stages are pure functions of the event and their static configuration;
//! they never block or perform I/O, so the chain runs inline on the worker.

use cdc_config::shared::TransformationConfig;

use crate::types::{CdcEvent, EventType};

/// Outcome of applying a transformation stage (or the whole chain) to an
/// event.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The event passes through unchanged.
    Keep(CdcEvent),
    /// The event passes through with modified content.
    KeepModified(CdcEvent),
    /// The event is filtered out; remaining stages are skipped.
    Drop,
}

/// An ordered chain of transformation stages.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    stages: Vec<TransformationConfig>,
}

impl TransformChain {
    /// Builds a chain from the configured stages, preserving their order.
    pub fn new(stages: Vec<TransformationConfig>) -> Self {
        Self { stages }
    }

    /// Applies every stage in configuration order.
    ///
    /// A [`Decision::Drop`] from any stage short-circuits the rest of the
    /// chain. The result is [`Decision::KeepModified`] when at least one
    /// stage changed the event.
    pub fn apply(&self, event: CdcEvent) -> Decision {
        let mut current = event;
        let mut modified = false;

        for stage in &self.stages {
            match apply_stage(stage, current) {
                Decision::Keep(event) => current = event,
                Decision::KeepModified(event) => {
                    current = event;
                    modified = true;
                }
                Decision::Drop => return Decision::Drop,
            }
        }

        if modified {
            Decision::KeepModified(current)
        } else {
            Decision::Keep(current)
        }
    }
}

fn apply_stage(stage: &TransformationConfig, event: CdcEvent) -> Decision {
    match stage {
        TransformationConfig::ExcludeInserts => {
            if event.event_type == EventType::Insert {
                Decision::Drop
            } else {
                Decision::Keep(event)
            }
        }
        TransformationConfig::ExcludeUpdates => {
            if event.event_type == EventType::Update {
                Decision::Drop
            } else {
                Decision::Keep(event)
            }
        }
        TransformationConfig::ExcludeDeletes => {
            if event.event_type == EventType::Delete {
                Decision::Drop
            } else {
                Decision::Keep(event)
            }
        }
        TransformationConfig::IncludeTables { tables } => {
            if tables.iter().any(|table| *table == event.table) {
                Decision::Keep(event)
            } else {
                Decision::Drop
            }
        }
        TransformationConfig::ExcludeTables { tables } => {
            if tables.iter().any(|table| *table == event.table) {
                Decision::Drop
            } else {
                Decision::Keep(event)
            }
        }
        TransformationConfig::ExcludeColumns { columns } => {
            let mut event = event;
            let mut modified = false;

            for image in [event.before.as_mut(), event.after.as_mut()]
                .into_iter()
                .flatten()
            {
                for column in columns {
                    if image.remove(column).is_some() {
                        modified = true;
                    }
                }
            }

            if modified {
                Decision::KeepModified(event)
            } else {
                Decision::Keep(event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn event(table: &str, event_type: EventType) -> CdcEvent {
        let mut after = BTreeMap::new();
        after.insert("id".to_string(), serde_json::json!(1));
        after.insert("ssn".to_string(), serde_json::json!("123-45-6789"));

        CdcEvent {
            event_id: Uuid::new_v4(),
            table: table.to_string(),
            event_type,
            before: None,
            after: Some(after),
            captured_at: Utc::now(),
            sequence: 1,
        }
    }

    #[test]
    fn exclude_inserts_drops_only_inserts() {
        let chain = TransformChain::new(vec![TransformationConfig::ExcludeInserts]);

        assert_eq!(
            chain.apply(event("public.orders", EventType::Insert)),
            Decision::Drop
        );

        let update = event("public.orders", EventType::Update);
        assert_eq!(chain.apply(update.clone()), Decision::Keep(update));
    }

    #[test]
    fn drop_short_circuits_later_stages() {
        let chain = TransformChain::new(vec![
            TransformationConfig::ExcludeTables {
                tables: vec!["public.orders".to_string()],
            },
            TransformationConfig::ExcludeColumns {
                columns: vec!["ssn".to_string()],
            },
        ]);

        assert_eq!(
            chain.apply(event("public.orders", EventType::Insert)),
            Decision::Drop
        );
    }

    #[test]
    fn exclude_columns_reports_modification() {
        let chain = TransformChain::new(vec![TransformationConfig::ExcludeColumns {
            columns: vec!["ssn".to_string()],
        }]);

        let Decision::KeepModified(modified) = chain.apply(event("public.users", EventType::Insert))
        else {
            panic!("expected a modified event");
        };

        assert!(!modified.after.unwrap().contains_key("ssn"));
    }

    #[test]
    fn include_tables_keeps_only_listed_tables() {
        let chain = TransformChain::new(vec![TransformationConfig::IncludeTables {
            tables: vec!["public.users".to_string()],
        }]);

        let users = event("public.users", EventType::Insert);
        assert_eq!(chain.apply(users.clone()), Decision::Keep(users));
        assert_eq!(
            chain.apply(event("public.orders", EventType::Insert)),
            Decision::Drop
        );
    }
}
