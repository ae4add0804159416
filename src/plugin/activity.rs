use crate::{
    context::Context,
    event::{Event, EventHandled},
    plugin::Plugin,
};
use anyhow::Result;

/// Counts messages in eligible channels toward their author's activity.
pub struct Activity;

#[serenity::async_trait]
impl Plugin for Activity {
    fn name(&self) -> &'static str {
        "activity"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        let me = ctx.cache.current_user().id;
        ctx.state
            .count_message(msg.author.id, msg.channel_id, msg.guild_id, me)
            .await;

        Ok(EventHandled::Yes)
    }
}
