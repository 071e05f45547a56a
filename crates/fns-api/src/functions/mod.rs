//! Functions bundled with the `fns` binary.
//!
//! They double as runnable examples of every hook and step primitive.

pub mod hello_world;
pub mod locker;

use fns_core::{DefinitionError, FunctionDefinition};

pub fn all() -> Result<Vec<FunctionDefinition>, DefinitionError> {
    Ok(vec![hello_world::definition()?, locker::definition()?])
}
