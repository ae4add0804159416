use crate::{context::Context, event::Event, state::State};
use serenity::all::{GuildChannel, Message, Ready};
use std::sync::Arc;

/// Discord event handler
pub struct Handler {
    state: Arc<State>,
}

impl<'a> Handler {
    pub fn new(state: Arc<State>) -> Self {
        Self { state }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            state: &self.state,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }

    async fn channel_create(&self, discord_ctx: serenity::all::Context, channel: GuildChannel) {
        Event::ChannelCreate(channel)
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn channel_update(
        &self,
        discord_ctx: serenity::all::Context,
        old: Option<GuildChannel>,
        new: GuildChannel,
    ) {
        Event::ChannelUpdate { old, new }
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn channel_delete(
        &self,
        discord_ctx: serenity::all::Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        Event::ChannelDelete(channel)
            .handle(self.ctx(&discord_ctx))
            .await;
    }
}
