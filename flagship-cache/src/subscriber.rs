//! Cache invalidation subscriber.
//!
//! Consumes invalidation events published by the administrative service
//! on the Redis pub/sub bus and translates each into cache key removals.
//! The bus carries only keys to invalidate, never payloads.

use crate::{keys, Cache};
use flagship_core::InvalidationEvent;
use futures::StreamExt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const PATTERN_FLAG: &str = "flag:*";
const PATTERN_FLAG_VALUE: &str = "flag-value:*";
const PATTERN_ENVIRONMENT: &str = "environment:*";

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Subscriber lifecycle: `idle → subscribed → draining → stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriberState {
    Idle = 0,
    Subscribed = 1,
    Draining = 2,
    Stopped = 3,
}

impl SubscriberState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Subscribed,
            2 => Self::Draining,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Listens for invalidation events and applies them to the tiered cache.
pub struct InvalidationSubscriber {
    client: redis::Client,
    cache: Arc<dyn Cache>,
    state: Arc<AtomicU8>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InvalidationSubscriber {
    pub fn new(client: redis::Client, cache: Arc<dyn Cache>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            client,
            cache,
            state: Arc::new(AtomicU8::new(SubscriberState::Idle as u8)),
            shutdown_tx,
            shutdown_rx,
            task: Mutex::new(None),
        }
    }

    /// Spawn the background consumer. Transient bus disconnections are
    /// retried with capped exponential backoff; while the subscriber is
    /// down, evaluation falls back to TTL-driven staleness.
    pub fn start(&self) {
        let client = self.client.clone();
        let cache = self.cache.clone();
        let state = self.state.clone();
        let shutdown = self.shutdown_rx.clone();

        let handle = tokio::spawn(run(client, cache, state, shutdown));

        let mut task = self.task.lock().expect("subscriber task lock poisoned");
        *task = Some(handle);
    }

    /// Signal cancellation and wait for the consumer to drain and stop.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        let handle = {
            let mut task = self.task.lock().expect("subscriber task lock poisoned");
            task.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriberState {
        SubscriberState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

async fn run(
    client: redis::Client,
    cache: Arc<dyn Cache>,
    state: Arc<AtomicU8>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match subscribe(&client).await {
            Ok(mut pubsub) => {
                state.store(SubscriberState::Subscribed as u8, Ordering::SeqCst);
                info!("cache invalidation subscriber started");
                backoff = INITIAL_BACKOFF;

                let mut stream = pubsub.on_message();
                loop {
                    tokio::select! {
                        msg = stream.next() => {
                            match msg {
                                Some(msg) => handle_message(cache.as_ref(), &msg).await,
                                None => {
                                    warn!("invalidation bus connection lost, reconnecting");
                                    break;
                                }
                            }
                        }
                        _ = shutdown.changed() => {
                            state.store(SubscriberState::Draining as u8, Ordering::SeqCst);
                            // Drain whatever is already in flight, then close.
                            while let Ok(Some(msg)) =
                                tokio::time::timeout(DRAIN_POLL, stream.next()).await
                            {
                                handle_message(cache.as_ref(), &msg).await;
                            }
                            state.store(SubscriberState::Stopped as u8, Ordering::SeqCst);
                            info!("cache invalidation subscriber stopped");
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to subscribe to invalidation bus");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => break,
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }

    state.store(SubscriberState::Stopped as u8, Ordering::SeqCst);
}

async fn subscribe(client: &redis::Client) -> redis::RedisResult<redis::aio::PubSub> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(PATTERN_FLAG).await?;
    pubsub.psubscribe(PATTERN_FLAG_VALUE).await?;
    pubsub.psubscribe(PATTERN_ENVIRONMENT).await?;
    Ok(pubsub)
}

async fn handle_message(cache: &dyn Cache, msg: &redis::Msg) {
    let channel = msg.get_channel_name().to_string();
    let payload: String = match msg.get_payload() {
        Ok(payload) => payload,
        Err(err) => {
            error!(channel, error = %err, "failed to read invalidation payload");
            return;
        }
    };

    debug!(channel, payload, "received invalidation event");

    let event: InvalidationEvent = match serde_json::from_str(&payload) {
        Ok(event) => event,
        Err(err) => {
            error!(channel, payload, error = %err, "malformed invalidation event");
            return;
        }
    };

    apply_event(cache, &channel, &event).await;
}

/// Translate one event into cache removals, per the channel family.
pub async fn apply_event(cache: &dyn Cache, channel: &str, event: &InvalidationEvent) {
    if channel.starts_with("flag:") {
        handle_flag_event(cache, channel, event).await;
    } else if channel.starts_with("flag-value:") {
        handle_flag_value_event(cache, channel, event).await;
    } else if channel.starts_with("environment:") {
        handle_environment_event(cache, channel, event).await;
    } else {
        warn!(channel, "unknown invalidation channel");
    }
}

async fn handle_flag_event(cache: &dyn Cache, channel: &str, event: &InvalidationEvent) {
    let flag_key = event.flag_key.as_deref().unwrap_or_default();
    let keys_to_delete = vec![
        keys::flag_by_key(flag_key),
        keys::KEY_ALL_ACTIVE_FLAGS.to_string(),
    ];

    if let Err(err) = cache.delete(&keys_to_delete).await {
        error!(channel, flag_key, error = %err, "failed to invalidate flag cache");
        return;
    }

    info!(channel, flag_key, "invalidated flag cache");
}

async fn handle_flag_value_event(cache: &dyn Cache, channel: &str, event: &InvalidationEvent) {
    let mut keys_to_delete = Vec::new();

    if let Some(env_id) = event.environment_id.as_deref().filter(|id| !id.is_empty()) {
        keys_to_delete.push(keys::flag_values_env(env_id));
    }
    if let Some(flag_key) = event.flag_key.as_deref().filter(|k| !k.is_empty()) {
        keys_to_delete.push(keys::flag_by_key(flag_key));
    }

    if !keys_to_delete.is_empty() {
        if let Err(err) = cache.delete(&keys_to_delete).await {
            error!(channel, error = %err, "failed to invalidate flag-value cache");
            return;
        }
    }

    // The event cannot name the affected flag-value ids, so variants and
    // flag-value bindings are cleared by pattern.
    let variants_pattern = format!("{}*", keys::PREFIX_VARIANTS);
    if let Err(err) = cache.delete_pattern(&variants_pattern).await {
        error!(channel, error = %err, "failed to invalidate variants cache");
        return;
    }

    let flag_value_pattern = format!("{}*", keys::PREFIX_FLAG_VALUE);
    if let Err(err) = cache.delete_pattern(&flag_value_pattern).await {
        error!(channel, error = %err, "failed to invalidate flag value cache");
        return;
    }

    info!(
        channel,
        environment_id = event.environment_id.as_deref().unwrap_or_default(),
        "invalidated flag-value cache"
    );
}

async fn handle_environment_event(cache: &dyn Cache, channel: &str, event: &InvalidationEvent) {
    let mut keys_to_delete = Vec::new();

    if let Some(env_id) = event.environment_id.as_deref().filter(|id| !id.is_empty()) {
        keys_to_delete.push(keys::flag_values_env(env_id));
    }

    if !keys_to_delete.is_empty() {
        if let Err(err) = cache.delete(&keys_to_delete).await {
            error!(channel, error = %err, "failed to invalidate environment cache");
        }
    }

    // A rotated environment cannot enumerate which api-keys map to it.
    let api_key_pattern = format!("{}*", keys::PREFIX_ENV_API_KEY);
    if let Err(err) = cache.delete_pattern(&api_key_pattern).await {
        error!(channel, error = %err, "failed to invalidate API key cache");
        return;
    }

    info!(
        channel,
        environment_key = event.environment_key.as_deref().unwrap_or_default(),
        "invalidated environment cache"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiered::tests::{sample_value, StubCache};
    use crate::CachedValue;

    fn event(flag_key: Option<&str>, env_id: Option<&str>) -> InvalidationEvent {
        InvalidationEvent {
            event_type: "updated".to_string(),
            flag_key: flag_key.map(String::from),
            environment_key: None,
            environment_id: env_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn flag_event_deletes_flag_and_active_list() {
        let cache = StubCache::default();
        cache.set("flag:key:dark-mode", sample_value()).await.unwrap();
        cache.set("flags:active", sample_value()).await.unwrap();

        apply_event(&cache, "flag:updated", &event(Some("dark-mode"), None)).await;

        let deleted = cache.deleted.lock().clone();
        assert!(deleted.contains(&"flag:key:dark-mode".to_string()));
        assert!(deleted.contains(&"flags:active".to_string()));
    }

    #[tokio::test]
    async fn flag_value_event_clears_variants_and_bindings_by_pattern() {
        let cache = StubCache::default();
        cache.set("variants:fv:1", sample_value()).await.unwrap();
        cache.set("flagvalue:f1:e1", sample_value()).await.unwrap();

        apply_event(
            &cache,
            "flag-value:updated",
            &event(Some("dark-mode"), Some("env-1")),
        )
        .await;

        let deleted = cache.deleted.lock().clone();
        assert!(deleted.contains(&"flagvalues:env:env-1".to_string()));
        assert!(deleted.contains(&"flag:key:dark-mode".to_string()));

        let patterns = cache.patterns.lock().clone();
        assert_eq!(patterns, ["variants:fv:*", "flagvalue:*"]);
        assert!(cache.entries.lock().is_empty());
    }

    #[tokio::test]
    async fn flag_value_event_without_ids_still_pattern_clears() {
        let cache = StubCache::default();

        apply_event(&cache, "flag-value:deleted", &event(None, None)).await;

        assert!(cache.deleted.lock().is_empty());
        assert_eq!(
            cache.patterns.lock().as_slice(),
            ["variants:fv:*", "flagvalue:*"]
        );
    }

    #[tokio::test]
    async fn environment_event_clears_api_key_cache() {
        let cache = StubCache::default();
        cache.set("env:apikey:secret", sample_value()).await.unwrap();

        apply_event(&cache, "environment:rotated", &event(None, Some("env-1"))).await;

        assert!(cache
            .deleted
            .lock()
            .contains(&"flagvalues:env:env-1".to_string()));
        assert_eq!(cache.patterns.lock().as_slice(), ["env:apikey:*"]);
        assert!(!cache.entries.lock().contains_key("env:apikey:secret"));
    }

    #[tokio::test]
    async fn unknown_channel_is_ignored() {
        let cache = StubCache::default();
        cache.set("flag:key:a", sample_value()).await.unwrap();

        apply_event(&cache, "something:else", &event(Some("a"), None)).await;

        assert!(cache.deleted.lock().is_empty());
        assert!(cache.patterns.lock().is_empty());
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            SubscriberState::Idle,
            SubscriberState::Subscribed,
            SubscriberState::Draining,
            SubscriberState::Stopped,
        ] {
            assert_eq!(SubscriberState::from_u8(state as u8), state);
        }
    }

    #[tokio::test]
    async fn coherent_read_after_invalidation() {
        // After the handler completes its deletes, a read-through against
        // the post-mutation store must observe the new value.
        let cache = StubCache::default();
        let stale = sample_value();
        cache.set("flag:key:dark-mode", stale.clone()).await.unwrap();

        apply_event(&cache, "flag:updated", &event(Some("dark-mode"), None)).await;
        assert!(cache.get("flag:key:dark-mode").await.is_err());

        // The next read-through fill stores the fresh value.
        let fresh = sample_value();
        cache
            .set("flag:key:dark-mode", fresh.clone())
            .await
            .unwrap();
        match cache.get("flag:key:dark-mode").await.unwrap() {
            CachedValue::FlagValue(v) => {
                assert_eq!(CachedValue::FlagValue(v), fresh);
                assert_ne!(fresh, stale);
            }
            other => panic!("unexpected cached value: {other:?}"),
        }
    }
}
