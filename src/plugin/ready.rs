use crate::{
    channel_filter,
    context::Context,
    event::{Event, EventHandled},
    helper::ContextHelper,
    plugin::Plugin,
    scheduler,
};
use anyhow::Result;

/// Initializes state when the connection to Discord is ready.
pub struct Ready;

#[serenity::async_trait]
impl Plugin for Ready {
    fn name(&self) -> &'static str {
        "ready"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Ready(_) = event else {
            return Ok(EventHandled::No);
        };

        let guild = ctx.guild_http();

        // Channels may have changed while disconnected, so rebuild on every (re)connect.
        channel_filter::refresh(
            &ctx.state.channel_filter,
            &guild,
            ctx.state.cfg.call_timeout(),
        )
        .await;

        if ctx.state.claim_scheduler() {
            scheduler::start(ctx.state.clone(), guild);
        }

        Ok(EventHandled::Yes)
    }
}
