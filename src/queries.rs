use crate::{
    backend::ApiBackend,
    client::ApiClient,
    error::ApiError,
    query::{CacheKey, Query, QueryCache},
    session::SessionToken,
    types::{FreeSlots, Lot, Occupancy},
};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Cached reads of lots and occupancy, one cache per payload shape.
#[derive(Clone)]
pub struct ParkingQueries<B: ApiBackend> {
    client: ApiClient<B>,
    lots: QueryCache<Vec<Lot>>,
    occupancy: QueryCache<Occupancy>,
    free_slots: QueryCache<FreeSlots>,
}

impl<B: ApiBackend> ParkingQueries<B> {
    pub fn new(client: ApiClient<B>) -> Self {
        Self {
            client,
            lots: QueryCache::new(),
            occupancy: QueryCache::new(),
            free_slots: QueryCache::new(),
        }
    }

    pub fn client(&self) -> &ApiClient<B> {
        &self.client
    }

    pub fn lots(&self, token: Option<&SessionToken>) -> Query<Vec<Lot>> {
        self.bind(&self.lots, self.client.endpoint("/lots"), token)
    }

    pub fn occupancy(&self, at: DateTime<Utc>, token: Option<&SessionToken>) -> Query<Occupancy> {
        self.bind(&self.occupancy, self.at_endpoint("/occupancy", at), token)
    }

    pub fn free_slots(&self, at: DateTime<Utc>, token: Option<&SessionToken>) -> Query<FreeSlots> {
        self.bind(&self.free_slots, self.at_endpoint("/free-slots", at), token)
    }

    /// Marks every read stale. Call after a booking, cancellation or reservation.
    ///
    /// Occupancy reads are keyed by timestamp, so unobserved ones are dropped
    /// here instead of piling up for every `at` ever asked for.
    pub fn after_booking(&self) {
        debug!("Invalidating lot and occupancy reads after a write");
        self.lots.invalidate_all();
        self.occupancy.invalidate_all();
        self.free_slots.invalidate_all();
        self.occupancy.prune();
        self.free_slots.prune();
    }

    fn at_endpoint(&self, path: &str, at: DateTime<Utc>) -> Url {
        let mut url = self.client.endpoint(path);
        url.query_pairs_mut()
            .append_pair("at", &at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        url
    }

    fn bind<T>(&self, cache: &QueryCache<T>, url: Url, token: Option<&SessionToken>) -> Query<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let Some(token) = token.cloned() else {
            return cache.query(None, || async {
                Err(ApiError::Transport("Not logged in".into()))
            });
        };

        let key = CacheKey {
            endpoint: url.to_string(),
            token: token.clone(),
        };
        let client = self.client.clone();
        cache.query(Some(key), move || {
            let client = client.clone();
            let url = url.clone();
            let token = token.clone();
            async move { client.fetch_json(url, &token).await }
        })
    }
}
