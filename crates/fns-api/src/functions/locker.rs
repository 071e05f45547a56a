//! `LockerToUnlock`: holds a named lock until an `unlock` signal arrives.

use fns_core::duration::Duration;
use fns_core::engine::state::State;
use fns_core::{DefinitionError, Execution, FunctionDefinition, body};
use serde_json::json;

pub const NAME: &str = "LockerToUnlock";

pub fn definition() -> Result<FunctionDefinition, DefinitionError> {
    FunctionDefinition::new(NAME, 1, |hooks| {
        let locked = hooks.use_state("isLocked", true)?;

        let target = locked.clone();
        hooks.use_signal("unlock", move |state: &State, _: serde_json::Value| {
            state.set(&target, false)?;
            Ok(())
        })?;

        let read = locked.clone();
        hooks.use_query("isLocked", &[], move |state: &State| Ok(state.get(&read)?))?;

        Ok(body(move |Execution { step, logger, .. }| async move {
            let acquired = step
                .lock("acquire-door", &["door"], Some(Duration::from("1h")))
                .await?;
            if !acquired {
                logger.warn("door lock timed out");
                return anyhow::Ok(json!({ "unlocked": false }));
            }

            step.condition("wait-unlock", |state| Ok(!state.get(&locked)?), None)
                .await?;
            step.unlock("release-door", None).await?;
            logger.info("door released");
            anyhow::Ok(json!({ "unlocked": true }))
        }))
    })
}
