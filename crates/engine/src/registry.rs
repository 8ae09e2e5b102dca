//! Registration of channels named by an operator.
//!
//! A handle is resolved upstream once so the stored title is current. Only a
//! credential rejection or a store failure stops registration; any other
//! upstream error is logged and the channel is handled per channel like a
//! failed sync.

use tracing::{info, warn};

use crate::policy::SyncError;
use crate::source::{MessageSource, SourceError};
use crate::store::PostStore;
use crate::types::Channel;

#[derive(Debug)]
pub enum Registration {
    /// Resolved upstream and stored with its current title.
    Resolved(Channel),
    /// Upstream could not answer; stored under its handle and retried on sync.
    Deferred { channel: Channel, reason: SourceError },
    /// Upstream has no such channel; nothing was stored.
    NotFound(String),
}

impl Registration {
    pub fn channel(&self) -> Option<&Channel> {
        match self {
            Registration::Resolved(channel) | Registration::Deferred { channel, .. } => {
                Some(channel)
            }
            Registration::NotFound(_) => None,
        }
    }
}

pub async fn register<S, P>(
    source: &S,
    store: &P,
    handle: &str,
) -> Result<Registration, SyncError>
where
    S: MessageSource + ?Sized,
    P: PostStore + ?Sized,
{
    match source.resolve(handle).await {
        Ok(resolved) => {
            let mut channel = store
                .ensure_channel(&resolved.handle, &resolved.title)
                .await?;
            if channel.title != resolved.title {
                store.set_title(&channel, &resolved.title).await?;
                channel.title = resolved.title;
            }
            info!(channel = %channel.username, title = %channel.title, "channel registered");
            Ok(Registration::Resolved(channel))
        }
        Err(SourceError::NotFound(_)) => {
            warn!(channel = %handle, "channel not found upstream, skipping");
            Ok(Registration::NotFound(handle.to_string()))
        }
        Err(err) if !err.is_fatal() => {
            let channel = store.ensure_channel(handle, handle).await?;
            warn!(
                channel = %handle,
                error = %err,
                "could not resolve channel, registered under its handle"
            );
            Ok(Registration::Deferred {
                channel,
                reason: err,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Outcome of registering a list of handles.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registered {
    /// Stored handles, in request order, ready to be synced.
    pub handles: Vec<String>,
    /// Handles the upstream does not know.
    pub missing: Vec<String>,
}

pub async fn register_all<S, P>(
    source: &S,
    store: &P,
    handles: &[String],
) -> Result<Registered, SyncError>
where
    S: MessageSource + ?Sized,
    P: PostStore + ?Sized,
{
    let mut registered = Registered::default();
    for handle in handles {
        match register(source, store, handle).await? {
            Registration::NotFound(handle) => registered.missing.push(handle),
            other => {
                if let Some(channel) = other.channel() {
                    registered.handles.push(channel.username.clone());
                }
            }
        }
    }
    Ok(registered)
}
