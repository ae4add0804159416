use crate::{
    context::Context,
    event::{Event, EventHandled},
    log_event,
    logging::*,
    plugin::Plugin,
};
use anyhow::Result;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Connected to {} server(s) as {}",
                    ready.guilds.len(),
                    ctx.cache.current_user().color(),
                );
            }
            // Too frequent to be worth printing
            Event::Message(_) => {}
            Event::ChannelCreate(channel) => {
                log_event!("channel{}{} created", Glue.color(), channel.color());
            }
            Event::ChannelUpdate { old, new } => match old {
                Some(old) if old.name != new.name => log_event!(
                    "channel{}{} renamed to {}",
                    Glue.color(),
                    old.color(),
                    new.color()
                ),
                _ => log_event!("channel{}{} updated", Glue.color(), new.color()),
            },
            Event::ChannelDelete(channel) => {
                log_event!("channel{}{} deleted", Glue.color(), channel.color());
            }
        }

        Ok(EventHandled::No)
    }
}
