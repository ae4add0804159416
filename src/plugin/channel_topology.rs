use crate::{
    channel_filter,
    context::Context,
    event::{Event, EventHandled},
    helper::ContextHelper,
    plugin::Plugin,
};
use anyhow::Result;

/// Keeps the set of counted channels in sync with the guild's channel layout.
pub struct ChannelTopology;

#[serenity::async_trait]
impl Plugin for ChannelTopology {
    fn name(&self) -> &'static str {
        "channel_topology"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let channel = match event {
            Event::ChannelCreate(channel) | Event::ChannelDelete(channel) => channel,
            Event::ChannelUpdate { new, .. } => new,
            _ => return Ok(EventHandled::No),
        };

        if channel.guild_id == ctx.state.cfg.general.guild_id {
            channel_filter::refresh(
                &ctx.state.channel_filter,
                &ctx.guild_http(),
                ctx.state.cfg.call_timeout(),
            )
            .await;
        }

        Ok(EventHandled::Yes)
    }
}
