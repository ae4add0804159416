use crate::state::State;
use std::sync::Arc;

/// Collection of data that is shared across events
pub struct Context<'a> {
    // Bot's own state, shared with the background jobs
    pub state: &'a Arc<State>,
    // Discord/Serenity context types
    pub cache: &'a Arc<serenity::all::Cache>,
    pub http: &'a Arc<serenity::all::Http>,
}
