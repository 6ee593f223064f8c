//! Read-only account lookups behind the `test-resolve`, `list-chats` and
//! `list-topics` commands.

use crate::remote::{RemoteContent, RemoteError};
use crate::retry::{self, RetryPolicy};

/// Resolve an identifier and describe the chat it points at.
pub(crate) async fn describe_resolution(
    remote: &dyn RemoteContent,
    policy: &RetryPolicy,
    identifier: &str,
) -> Result<String, RemoteError> {
    let chat = retry::execute(policy, || remote.resolve(identifier)).await?;
    let info = retry::execute(policy, || remote.container(chat)).await?;
    Ok(format!("{} -> \"{}\" ({})", identifier, info.title, info.id))
}

/// One `title (id, type)` line per visible chat.
pub(crate) async fn chat_lines(
    remote: &dyn RemoteContent,
    policy: &RetryPolicy,
) -> Result<Vec<String>, RemoteError> {
    let chats = retry::execute(policy, || remote.list_chats()).await?;
    Ok(chats
        .iter()
        .map(|c| format!("{} ({}, {})", c.title, c.id, c.kind))
        .collect())
}

/// Topic table of a forum group, header first. `None` when the group has
/// no topics.
pub(crate) async fn topic_table(
    remote: &dyn RemoteContent,
    policy: &RetryPolicy,
    identifier: &str,
) -> Result<Option<Vec<String>>, RemoteError> {
    let chat = retry::execute(policy, || remote.resolve(identifier)).await?;
    let topics = retry::execute(policy, || remote.list_topics(chat)).await?;
    if topics.is_empty() {
        return Ok(None);
    }
    let width = topics
        .iter()
        .map(|t| t.id.to_string().len())
        .max()
        .unwrap_or(2)
        .max(2);
    let mut lines = vec![format!("{:>width$}  Title", "ID")];
    lines.extend(
        topics
            .iter()
            .map(|t| format!("{:>width$}  {}", t.id, t.title)),
    );
    Ok(Some(lines))
}
