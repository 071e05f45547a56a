//! `HelloWorld`: run, sleep, then wait (briefly) for a confirmed last name.
//!
//! The `setName` signal overrides the last name; the `lastName` query reports
//! it whenever it changes.

use fns_core::engine::state::State;
use fns_core::{DefinitionError, Execution, FunctionDefinition, body};
use schemars::JsonSchema;
use serde::Deserialize;

pub const NAME: &str = "HelloWorld";

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct Greeting {
    /// Optional honorific, e.g. "Mr".
    #[serde(default)]
    pub prefix: Option<String>,
}

pub fn definition() -> Result<FunctionDefinition, DefinitionError> {
    let definition = FunctionDefinition::new(NAME, 1, |hooks| {
        let last_name = hooks.use_state("lastName", "fernandes".to_string())?;

        let target = last_name.clone();
        hooks.use_signal("setName", move |state: &State, name: String| {
            state.set(&target, name)?;
            Ok(())
        })?;

        let read = last_name.clone();
        hooks.use_query("lastName", &[last_name.id()], move |state: &State| {
            Ok(state.get(&read)?)
        })?;

        Ok(body(move |Execution { ctx, step, state, logger, .. }| async move {
            let input = if ctx.data.is_null() {
                Greeting::default()
            } else {
                ctx.data_as::<Greeting>()?
            };

            let first: String = step
                .run("set-firstname", || async { anyhow::Ok("lucas".to_string()) })
                .await?;
            logger.info(format_args!("first name is {first}"));

            step.sleep("wait-5s", "5s").await?;

            let expected = last_name.clone();
            let confirmed = step
                .condition(
                    "is-lucas-fernandes",
                    move |state| Ok(state.get(&expected)? == "fernandes"),
                    Some("3s".into()),
                )
                .await?;
            if !confirmed {
                logger.warn("last name was changed before the confirmation window closed");
            }

            let last = state.get(&last_name)?;
            anyhow::Ok(match input.prefix {
                Some(prefix) => format!("Hello {prefix} {first} {last}"),
                None => format!("Hello {first} {last}"),
            })
        }))
    })?;

    Ok(definition
        .with_data_schema::<Greeting>()
        .with_signal_schema::<String>("setName"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fns_core::clock::FixedClock;
    use fns_core::{Engine, EngineConfig, Registry};
    use fns_infra::crypto::hash::Sha256ContentHasher;
    use fns_types::event::{Event, Response, ResponseStatus};
    use fns_types::step::{Mutation, SleepParams, StepKind, StepRecord};
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn engine() -> Engine {
        let mut registry = Registry::new(Arc::new(Sha256ContentHasher::new()));
        registry.register(definition().unwrap());
        Engine::new(EngineConfig::default(), registry).with_clock(Arc::new(FixedClock::default()))
    }

    async fn invoke(steps: Vec<StepRecord>) -> Response {
        let event = Event::new(NAME, json!({ "prefix": "Mr" }))
            .with_ids("exec-1", "run-1")
            .with_steps(steps);
        engine().handle(event, &CancellationToken::new()).await.unwrap()
    }

    fn history() -> Vec<StepRecord> {
        vec![
            StepRecord::completed("set-firstname", StepKind::Run, json!("lucas")),
            StepRecord::completed("wait-5s", StepKind::Sleep(SleepParams::Timeout(5_000)), Value::Null),
        ]
    }

    fn confirmation() -> StepKind {
        StepKind::Condition { timeout: Some(3_000) }
    }

    #[test]
    fn test_definition_exports_hooks_and_schemas() {
        let summary = definition().unwrap().summary();
        assert_eq!(summary.signals, vec!["setName"]);
        assert_eq!(summary.queries, vec!["lastName"]);
        assert_eq!(summary.states.get("lastName"), Some(&json!("fernandes")));
        assert!(summary.schema.data.is_some());
        assert!(summary.schema.signals.contains_key("setName"));
    }

    #[tokio::test]
    async fn test_sleep_is_recorded_after_first_name() {
        let response = invoke(history()[..1].to_vec()).await;
        assert_eq!(
            response.mutations,
            vec![Mutation::Pending {
                id: "wait-5s".into(),
                kind: StepKind::Sleep(SleepParams::Timeout(5_000))
            }]
        );
        assert_eq!(response.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_condition_holds_with_default_name() {
        let mut steps = history();
        steps.push(StepRecord::pending("is-lucas-fernandes", confirmation()));
        let response = invoke(steps).await;
        assert_eq!(
            response.mutations,
            vec![Mutation::Completed {
                id: "is-lucas-fernandes".into(),
                result: json!(true),
                elapsed: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_signal_changes_name_and_reports_query() {
        let mut steps = history();
        steps.push(StepRecord::pending("is-lucas-fernandes", confirmation()));
        steps.push(StepRecord::signal("sig-1", "setName", json!("silva")));
        let response = invoke(steps).await;

        assert_eq!(response.status, ResponseStatus::Incomplete);
        assert!(response.mutations.is_empty());
        assert_eq!(response.queries.get("lastName"), Some(&json!("silva")));
    }

    #[tokio::test]
    async fn test_timed_out_condition_still_greets() {
        let mut steps = history();
        steps.push(StepRecord::completed("is-lucas-fernandes", confirmation(), json!(false)));
        let response = invoke(steps).await;

        assert_eq!(response.status, ResponseStatus::Completed);
        assert_eq!(response.result, json!("Hello Mr lucas fernandes"));
        assert_eq!(response.logs.len(), 1);
    }
}
