//! The parts of the Discord API the bot's background work depends on.
//!
//! Event handlers get a full Serenity context, but the channel filter and the reward job only
//! need a few guild-scoped calls.  They go through these traits so they can run against fakes in
//! tests.

use anyhow::Result;
use serenity::all::{
    ChannelId, ChannelType, GuildChannel, GuildId, Http, Member, RoleId, UserId,
};
use std::sync::Arc;

const AUDIT_LOG_REASON: &str = "Activity reward update";

#[derive(Clone, Debug)]
pub struct ChannelInfo {
    pub id: ChannelId,
    /// Category the channel sits in, if any
    pub parent_id: Option<ChannelId>,
    pub kind: ChannelType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberInfo {
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
}

impl From<&GuildChannel> for ChannelInfo {
    fn from(channel: &GuildChannel) -> Self {
        Self {
            id: channel.id,
            parent_id: channel.parent_id,
            kind: channel.kind,
        }
    }
}

impl From<Member> for MemberInfo {
    fn from(member: Member) -> Self {
        Self {
            user_id: member.user.id,
            roles: member.roles,
        }
    }
}

#[serenity::async_trait]
pub trait ChannelDirectory: Sync + Send {
    /// Every channel in the guild, categories included
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>>;
}

#[serenity::async_trait]
pub trait MembershipProvider: Sync + Send {
    /// Up to `page_size` members with IDs greater than `after`, in ascending ID order
    async fn list_members(&self, after: Option<UserId>, page_size: u64)
        -> Result<Vec<MemberInfo>>;
}

#[serenity::async_trait]
pub trait RoleMutator: Sync + Send {
    async fn grant_role(&self, user_id: UserId, role_id: RoleId) -> Result<()>;
    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<()>;
}

/// Discord HTTP API bound to the one guild the bot serves
#[derive(Clone)]
pub struct GuildHttp {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl GuildHttp {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self { http, guild_id }
    }
}

#[serenity::async_trait]
impl ChannelDirectory for GuildHttp {
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        let channels = self.http.get_channels(self.guild_id).await?;
        Ok(channels.iter().map(ChannelInfo::from).collect())
    }
}

#[serenity::async_trait]
impl MembershipProvider for GuildHttp {
    async fn list_members(
        &self,
        after: Option<UserId>,
        page_size: u64,
    ) -> Result<Vec<MemberInfo>> {
        let members = self
            .guild_id
            .members(&self.http, Some(page_size), after)
            .await?;
        Ok(members.into_iter().map(MemberInfo::from).collect())
    }
}

#[serenity::async_trait]
impl RoleMutator for GuildHttp {
    async fn grant_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        self.http
            .add_member_role(self.guild_id, user_id, role_id, Some(AUDIT_LOG_REASON))
            .await?;
        Ok(())
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        self.http
            .remove_member_role(self.guild_id, user_id, role_id, Some(AUDIT_LOG_REASON))
            .await?;
        Ok(())
    }
}
