//! Miscellaneous convenience methods

use crate::{context::Context, discord::GuildHttp};

pub trait ContextHelper {
    /// HTTP access scoped to the tracked guild, detached from the event's lifetime
    fn guild_http(&self) -> GuildHttp;
}

impl ContextHelper for Context<'_> {
    fn guild_http(&self) -> GuildHttp {
        GuildHttp::new(self.http.clone(), self.state.cfg.general.guild_id)
    }
}
