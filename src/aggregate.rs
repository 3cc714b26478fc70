//! Feed fetch fan-out and derived views.
//!
//! [`fetch_and_parse`] is the single-feed pipeline; [`FeedFetcher`] runs it
//! across the whole catalog concurrently and returns a keyed snapshot.
//! Parsing failures propagate untouched — a malformed feed is the caller's
//! signal, never silently defaulted.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug};

use crate::feed::ParsedFeed;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::parser::parse_feed;

/// Fetches one feed and decodes it.
///
/// # Errors
///
/// Transport failures (non-2xx, timeout, connection) and parse failures
/// both propagate; nothing is caught here.
pub async fn fetch_and_parse<C: HttpClient>(client: &C, url: &str) -> Result<ParsedFeed> {
    let bytes = fetch_bytes(client, url).await?;
    let feed = parse_feed(&bytes).with_context(|| format!("parsing feed from {url}"))?;
    Ok(feed)
}

/// Fetches every cataloged feed concurrently into one keyed snapshot.
///
/// Stateless across rounds apart from the in-flight guard: if a poll
/// overlaps a slow previous poll, keys still being fetched are skipped for
/// the new round instead of piling up duplicate requests.
pub struct FeedFetcher<C> {
    client: Arc<C>,
    catalog: BTreeMap<String, String>,
    concurrency: usize,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<C: HttpClient + 'static> FeedFetcher<C> {
    pub fn new(client: C, catalog: BTreeMap<String, String>) -> Self {
        Self {
            client: Arc::new(client),
            catalog,
            concurrency: 4,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetches and parses all feeds, keyed by catalog key.
    ///
    /// All-or-nothing: the first feed failure aborts the round. Keys with
    /// a fetch still in flight from an earlier round are absent from the
    /// result.
    ///
    /// # Errors
    ///
    /// The first transport or parse failure among the feeds, annotated
    /// with its feed key.
    pub async fn fetch_all(&self) -> Result<BTreeMap<String, ParsedFeed>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = Vec::new();

        for (key, url) in &self.catalog {
            if !self.in_flight.lock().unwrap().insert(key.clone()) {
                debug!(feed_key = %key, "Fetch already in flight, skipping this round");
                continue;
            }

            let sem = semaphore.clone();
            let client = self.client.clone();
            let in_flight = self.in_flight.clone();
            let key = key.clone();
            let url = url.clone();
            let span = tracing::info_span!("fetch_feed", feed_key = %key);

            tasks.push(tokio::spawn(
                async move {
                    let _permit = sem.acquire().await.unwrap();
                    let result = fetch_and_parse(client.as_ref(), &url).await;
                    in_flight.lock().unwrap().remove(&key);
                    (key, result)
                }
                .instrument(span),
            ));
        }

        let mut feeds = BTreeMap::new();
        for task in tasks {
            let (key, result) = task.await?;
            let feed = result.with_context(|| format!("feed {key}"))?;
            feeds.insert(key, feed);
        }
        Ok(feeds)
    }
}

/// One vehicle position flattened with its route/trip context, suitable
/// for tabular output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehiclePositionRecord {
    pub feed: String,
    pub entity_id: String,
    pub trip_id: String,
    pub route_id: String,
    pub start_date: String,
    pub latitude: Option<f32>,
    pub longitude: Option<f32>,
    pub bearing: Option<f32>,
    pub speed: Option<f32>,
    pub stop_id: Option<String>,
    pub current_stop_sequence: Option<u32>,
    pub current_status: Option<String>,
    pub timestamp: Option<u64>,
}

/// Flattens every entity carrying a vehicle payload, preserving entity
/// order within the feed.
pub fn extract_vehicle_positions(feed_key: &str, feed: &ParsedFeed) -> Vec<VehiclePositionRecord> {
    feed.entities
        .iter()
        .filter_map(|entity| {
            let vehicle = entity.vehicle.as_ref()?;
            Some(VehiclePositionRecord {
                feed: feed_key.to_string(),
                entity_id: entity.id.clone(),
                trip_id: vehicle.trip.trip_id.clone(),
                route_id: vehicle.trip.route_id.clone(),
                start_date: vehicle.trip.start_date.clone(),
                latitude: vehicle.position.map(|p| p.latitude),
                longitude: vehicle.position.map(|p| p.longitude),
                bearing: vehicle.position.and_then(|p| p.bearing),
                speed: vehicle.position.and_then(|p| p.speed),
                stop_id: vehicle.stop_id.clone(),
                current_stop_sequence: vehicle.current_stop_sequence,
                current_status: vehicle.current_status.map(|s| s.to_string()),
                timestamp: vehicle.timestamp,
            })
        })
        .collect()
}

/// Flattens a whole snapshot: entity order within each feed, key order
/// across feeds.
pub fn extract_all_vehicle_positions(
    feeds: &BTreeMap<String, ParsedFeed>,
) -> Vec<VehiclePositionRecord> {
    feeds
        .iter()
        .flat_map(|(key, feed)| extract_vehicle_positions(key, feed))
        .collect()
}
