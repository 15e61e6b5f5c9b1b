pub mod common;
pub mod completions;
pub mod conflicts;
pub mod flush;
pub mod queue;
pub mod record;
pub mod stage;
