use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::{debug, warn};

use perspectiva_types::Comment;

use crate::api::CommentApi;
use crate::error::ClientError;

pub type FetchResult = Result<Vec<Comment>, Arc<ClientError>>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// What a page sees for one theme.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// Last known list in server order; `None` until the first fetch lands.
    pub data: Option<Vec<Comment>>,
    /// Message of the last failed revalidation. Cleared by the next success.
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

struct InFlight {
    fetch: SharedFetch,
    generation: u64,
}

struct Slot {
    tx: watch::Sender<CacheEntry>,
    /// Bumped by every local write. A fetch that started under an older
    /// generation must not overwrite what was written since.
    generation: u64,
    in_flight: Option<InFlight>,
}

impl Slot {
    fn new() -> Self {
        let (tx, _) = watch::channel(CacheEntry::default());
        Self {
            tx,
            generation: 0,
            in_flight: None,
        }
    }
}

/// Identity of the list request a cache entry stands for.
pub fn cache_key(theme: &str) -> String {
    format!("/api/comments?theme={theme}")
}

/// Comment lists keyed per theme.
///
/// Built once and shared by `Arc` with every controller on the page. Local
/// writes are visible to `read` immediately; `revalidate` replaces them with
/// the server's list. Concurrent revalidations of a theme share one request.
pub struct CommentCache<A> {
    api: Arc<A>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<A> CommentCache<A>
where
    A: CommentApi + 'static,
{
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self, theme: &str) -> CacheEntry {
        self.slots()
            .get(&cache_key(theme))
            .map(|slot| slot.tx.borrow().clone())
            .unwrap_or_default()
    }

    /// Observe every write to a theme's entry.
    pub fn subscribe(&self, theme: &str) -> watch::Receiver<CacheEntry> {
        self.slots()
            .entry(cache_key(theme))
            .or_insert_with(Slot::new)
            .tx
            .subscribe()
    }

    /// Replace the cached list without contacting the server. Any fetch
    /// already in flight for the theme will not overwrite this value.
    pub fn optimistic_write(&self, theme: &str, comments: Vec<Comment>) {
        self.optimistic_update(theme, |list| *list = comments);
    }

    /// Edit the cached list in place under the cache lock, so concurrent
    /// optimistic writes do not clobber each other. A theme that was never
    /// loaded starts from an empty list.
    pub fn optimistic_update<F>(&self, theme: &str, f: F)
    where
        F: FnOnce(&mut Vec<Comment>),
    {
        let mut slots = self.slots();
        let slot = slots.entry(cache_key(theme)).or_insert_with(Slot::new);
        slot.generation += 1;
        slot.in_flight = None;
        slot.tx.send_modify(|entry| f(entry.data.get_or_insert_with(Vec::new)));
    }

    /// Drop the cached list. Subscribers stay attached and see an empty entry.
    pub fn invalidate(&self, theme: &str) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(&cache_key(theme)) {
            slot.generation += 1;
            slot.in_flight = None;
            slot.tx.send_replace(CacheEntry::default());
        }
    }

    /// Fetch the authoritative list and store it. Joins the request already
    /// in flight for the theme when there is one.
    pub async fn revalidate(&self, theme: &str) -> FetchResult {
        let key = cache_key(theme);

        let (fetch, generation) = {
            let mut slots = self.slots();
            let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
            match &slot.in_flight {
                Some(in_flight) => {
                    debug!("Joining in-flight fetch for {}", key);
                    (in_flight.fetch.clone(), in_flight.generation)
                }
                None => {
                    let api = Arc::clone(&self.api);
                    let theme = theme.to_string();
                    let fetch = async move { api.list(&theme).await.map_err(Arc::new) }
                        .boxed()
                        .shared();
                    slot.in_flight = Some(InFlight {
                        fetch: fetch.clone(),
                        generation: slot.generation,
                    });
                    (fetch, slot.generation)
                }
            }
        };

        let result = fetch.await;

        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&key) else {
            return result;
        };
        if slot.generation != generation {
            debug!("Discarding stale fetch for {}", key);
            return result;
        }
        slot.in_flight = None;
        match &result {
            Ok(comments) => {
                let comments = comments.clone();
                slot.tx.send_modify(|entry| {
                    entry.data = Some(comments);
                    entry.error = None;
                });
            }
            Err(e) => {
                warn!("Revalidation of {} failed: {}", key, e);
                let message = e.to_string();
                slot.tx.send_modify(|entry| entry.error = Some(message));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, comment};
    use pretty_assertions::assert_eq;

    fn cache_with(comments: Vec<Comment>) -> (Arc<FakeApi>, CommentCache<FakeApi>) {
        let api = Arc::new(FakeApi::with_comments(comments));
        let cache = CommentCache::new(Arc::clone(&api));
        (api, cache)
    }

    #[tokio::test]
    async fn read_before_fetch_is_empty() {
        let (_api, cache) = cache_with(vec![]);
        let entry = cache.read("intro");
        assert_eq!(entry.data, None);
        assert!(!entry.has_error());
    }

    #[tokio::test]
    async fn revalidate_stores_server_list_per_theme() {
        let (api, cache) = cache_with(vec![comment("1", "intro", 0), comment("2", "outro", 1)]);

        cache.revalidate("intro").await.unwrap();
        let ids: Vec<String> = cache.read("intro").data.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["1".to_string()]);
        assert_eq!(cache.read("outro").data, None);
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test]
    async fn optimistic_write_is_visible_without_fetching() {
        let (api, cache) = cache_with(vec![]);
        cache.optimistic_write("intro", vec![comment("local", "intro", 0)]);

        assert_eq!(cache.read("intro").data.unwrap().len(), 1);
        assert_eq!(api.list_calls(), 0);
    }

    #[tokio::test]
    async fn failed_revalidation_keeps_data_and_flags_error() {
        let (api, cache) = cache_with(vec![comment("1", "intro", 0)]);
        cache.revalidate("intro").await.unwrap();

        api.fail_next(ClientError::Unconfirmed);
        assert!(cache.revalidate("intro").await.is_err());

        let entry = cache.read("intro");
        assert!(entry.has_error());
        assert_eq!(entry.data.unwrap().len(), 1);

        cache.revalidate("intro").await.unwrap();
        assert!(!cache.read("intro").has_error());
    }

    #[tokio::test]
    async fn concurrent_revalidations_share_one_request() {
        let (api, cache) = cache_with(vec![comment("1", "intro", 0)]);
        api.hold(true);

        let (a, b, _) = tokio::join!(cache.revalidate("intro"), cache.revalidate("intro"), async {
            api.wait_entered().await;
            api.hold(false);
            api.release();
        });

        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test]
    async fn stale_fetch_does_not_overwrite_optimistic_write() {
        let (api, cache) = cache_with(vec![comment("1", "intro", 0)]);
        api.hold(true);

        let (fetched, _) = tokio::join!(cache.revalidate("intro"), async {
            api.wait_entered().await;
            cache.optimistic_write("intro", vec![comment("local", "intro", 5)]);
            api.hold(false);
            api.release();
        });

        assert!(fetched.is_ok());
        let ids: Vec<String> = cache.read("intro").data.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["local".to_string()]);

        cache.revalidate("intro").await.unwrap();
        let ids: Vec<String> = cache.read("intro").data.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn subscribers_see_optimistic_then_authoritative() {
        let (_api, cache) = cache_with(vec![comment("1", "intro", 0)]);
        let mut rx = cache.subscribe("intro");

        cache.optimistic_write("intro", vec![comment("local", "intro", 3)]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().data.as_ref().unwrap()[0].id, "local");

        cache.revalidate("intro").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().data.as_ref().unwrap()[0].id, "1");
    }

    #[tokio::test]
    async fn invalidate_resets_entry() {
        let (_api, cache) = cache_with(vec![comment("1", "intro", 0)]);
        cache.revalidate("intro").await.unwrap();

        cache.invalidate("intro");
        assert_eq!(cache.read("intro"), CacheEntry::default());
    }
}
