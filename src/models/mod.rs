mod click;
mod counter;

pub use click::{ClickEvent, ClickStat, EnrichedEvent};
pub use counter::{CounterOp, Scope, GLOBAL_SCOPE};
