//! Strategy interface
//!
//! A strategy is the behavior bound to one task node. It only ever sees one
//! message at a time for its node. Long work is launched with
//! [`TaskContext::continue_with`] and its result arrives as a later message.

use anyhow::Result;
use async_trait::async_trait;

use super::dispatcher::TaskContext;
use super::message::{Message, Origin};

#[async_trait]
pub trait Strategy: Send + 'static {
    /// Name used for logging and for fallback-chain lookups
    fn name(&self) -> &str;

    /// Handle one message. An `Err` or a panic fails the node at the dispatch
    /// boundary; business failures should go through [`TaskContext::fail`].
    ///
    /// `Abort` arrives after the node is already `aborted`, as a notification.
    async fn on_message(&mut self, ctx: &TaskContext, origin: Origin, message: Message)
        -> Result<()>;
}
