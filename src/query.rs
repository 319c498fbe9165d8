//! Keyed read cache behind the lots/occupancy queries.
//!
//! One entry per `(endpoint, token)` key. An entry holds the latest state,
//! at most one in-flight request shared by every caller of that key, and a
//! watch channel so observers see each update.

use crate::{error::ApiError, session::SessionToken};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub endpoint: String,
    pub token: SessionToken,
}

#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<ApiError>,
    pub is_loading: bool,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading,
        }
    }
}

impl<T> QueryState<T> {
    /// State of a query without a key: nothing requested, nothing pending.
    pub fn idle() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
        }
    }

    fn pending() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: true,
        }
    }
}

type Fetch<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;
type InFlight<T> = Shared<BoxFuture<'static, Result<Arc<T>, ApiError>>>;

struct Entry<T> {
    state: watch::Sender<QueryState<T>>,
    in_flight: Option<InFlight<T>>,
    generation: u64,
    stale: bool,
}

impl<T> Entry<T> {
    fn new() -> Self {
        let (state, _) = watch::channel(QueryState::pending());
        Self {
            state,
            in_flight: None,
            generation: 0,
            stale: true,
        }
    }
}

pub struct QueryCache<T> {
    entries: Arc<Mutex<HashMap<CacheKey, Entry<T>>>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::default()),
        }
    }
}

impl<T: Send + Sync + 'static> QueryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `fetch` to `key`. A `None` key never issues a request.
    pub fn query<F, Fut>(&self, key: Option<CacheKey>, fetch: F) -> Query<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Query {
            cache: self.clone(),
            key,
            fetch: Arc::new(move || fetch().boxed()),
        }
    }

    pub fn state(&self, key: &CacheKey) -> QueryState<T> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|entry| QueryState::clone(&entry.state.borrow()))
            .unwrap_or_else(QueryState::pending)
    }

    /// Marks `key` stale so the next load goes to the server.
    pub fn invalidate(&self, key: &CacheKey) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.stale = true;
        }
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock().unwrap();
        debug!(entries = entries.len(), "Invalidating every cached query");
        for entry in entries.values_mut() {
            entry.stale = true;
        }
    }

    fn fresh_state(&self, key: &CacheKey) -> Option<QueryState<T>> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(key)?;
        if entry.stale || entry.in_flight.is_some() {
            return None;
        }
        let state = QueryState::clone(&entry.state.borrow());
        state.data.is_some().then_some(state)
    }

    fn subscribe(&self, key: &CacheKey) -> WatchStream<QueryState<T>> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        WatchStream::new(entry.state.subscribe())
    }

    fn start_or_join(&self, key: &CacheKey, fetch: &Fetch<T>) -> (InFlight<T>, u64) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);

        if let Some(in_flight) = &entry.in_flight {
            debug!(endpoint = %key.endpoint, "Joining in-flight request");
            return (in_flight.clone(), entry.generation);
        }

        debug!(endpoint = %key.endpoint, "Starting request");
        let request = (**fetch)();
        let in_flight = async move { request.await.map(Arc::new) }.boxed().shared();
        entry.generation += 1;
        entry.stale = false;
        entry.in_flight = Some(in_flight.clone());

        // The request runs to completion even when every waiter goes away.
        let driver = in_flight.clone();
        let cache = self.clone();
        let driven_key = key.clone();
        let generation = entry.generation;
        tokio::spawn(async move {
            let result = driver.await;
            cache.settle(&driven_key, generation, result);
        });

        (in_flight, generation)
    }

    /// Drops entries nobody can observe anymore: stale, idle and without
    /// subscribers. Their next load would go to the server anyway.
    pub fn prune(&self) {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| {
            !entry.stale || entry.in_flight.is_some() || entry.state.receiver_count() > 0
        });
        debug!(removed = before - entries.len(), "Pruned query cache");
    }

    fn settle(
        &self,
        key: &CacheKey,
        generation: u64,
        result: Result<Arc<T>, ApiError>,
    ) -> QueryState<T> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key) else {
            // Pruned while the result was on its way.
            let (data, error) = match result {
                Ok(data) => (Some(data), None),
                Err(err) => (None, Some(err)),
            };
            return QueryState {
                data,
                error,
                is_loading: false,
            };
        };

        // Every caller sharing the request settles; only the first applies it.
        if entry.generation == generation && entry.in_flight.is_some() {
            entry.in_flight = None;
            match result {
                Ok(data) => entry.state.send_modify(|state| {
                    state.data = Some(data);
                    state.error = None;
                    state.is_loading = false;
                }),
                Err(err) => {
                    error!(?err, endpoint = %key.endpoint, "Query failed");
                    entry.stale = true;
                    entry.state.send_modify(|state| {
                        state.error = Some(err);
                        state.is_loading = false;
                    });
                }
            }
        }
        let state = QueryState::clone(&entry.state.borrow());
        state
    }
}

/// A read bound to one cache key, exposing data, loading and error state.
pub struct Query<T> {
    cache: QueryCache<T>,
    key: Option<CacheKey>,
    fetch: Fetch<T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            key: self.key.clone(),
            fetch: self.fetch.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Query<T> {
    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    /// Current state without touching the network.
    pub fn state(&self) -> QueryState<T> {
        match &self.key {
            Some(key) => self.cache.state(key),
            None => QueryState::idle(),
        }
    }

    /// Serves fresh cached data, otherwise fetches (or joins the running fetch).
    pub async fn load(&self) -> QueryState<T> {
        let Some(key) = &self.key else {
            return QueryState::idle();
        };
        if let Some(state) = self.cache.fresh_state(key) {
            return state;
        }
        self.mutate().await
    }

    /// Forces revalidation of this key. The request itself runs on a spawned
    /// task, so dropping this future only stops waiting for it.
    pub async fn mutate(&self) -> QueryState<T> {
        let Some(key) = &self.key else {
            return QueryState::idle();
        };
        let (in_flight, generation) = self.cache.start_or_join(key, &self.fetch);
        let result = in_flight.await;
        self.cache.settle(key, generation, result)
    }

    pub fn invalidate(&self) {
        if let Some(key) = &self.key {
            self.cache.invalidate(key);
        }
    }

    /// Stream of state updates shared by every observer of this key.
    pub fn subscribe(&self) -> Option<WatchStream<QueryState<T>>> {
        self.key.as_ref().map(|key| self.cache.subscribe(key))
    }
}
