//! Authoritative membership state of one room.
//!
//! Guards (`check_*`) are separated from mutators so the room actor can
//! reject an operation before any RPC is issued. Mutators assume their guard
//! passed and never fail.
//!
//! The subscriber list lives inside the publisher entry, so a publisher and
//! its list are created and deleted together.

use super::messages::SubscribeRequest;
use crate::errors::RcError;
use common::types::{PublisherId, SubscriberId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// How a publisher entered the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherSource {
    /// Admitted after worker creation via `addPublisher`.
    WebRtc,
    /// Admitted eagerly via `addExternalInput`.
    ExternalInput { url: String },
}

#[derive(Debug, Clone)]
pub struct PublisherEntry {
    pub source: PublisherSource,
    /// Attach order; each subscriber appears at most once.
    pub subscribers: Vec<SubscriberId>,
    pub admitted_at: i64,
}

/// Concrete descriptor of an active external output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalOutput {
    pub output_id: Uuid,
    pub publisher_id: PublisherId,
    pub url: String,
    pub created_at: i64,
}

#[derive(Debug, Default)]
pub struct RoomMembership {
    publishers: HashMap<PublisherId, PublisherEntry>,
    pending: HashSet<PublisherId>,
    /// Keyed by output url.
    outputs: HashMap<String, ExternalOutput>,
}

impl RoomMembership {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_present(&self, publisher_id: &PublisherId) -> bool {
        self.publishers.contains_key(publisher_id)
    }

    #[must_use]
    pub fn is_pending(&self, publisher_id: &PublisherId) -> bool {
        self.pending.contains(publisher_id)
    }

    #[must_use]
    pub fn publisher(&self, publisher_id: &PublisherId) -> Option<&PublisherEntry> {
        self.publishers.get(publisher_id)
    }

    #[must_use]
    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    /// Total subscriber attachments across publishers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.publishers.values().map(|e| e.subscribers.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty() && self.pending.is_empty() && self.outputs.is_empty()
    }

    // ------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------

    /// Publisher is neither present nor awaiting worker creation.
    pub fn check_absent(&self, publisher_id: &PublisherId) -> Result<(), RcError> {
        if self.is_present(publisher_id) {
            return Err(RcError::PublisherExists(publisher_id.to_string()));
        }
        if self.is_pending(publisher_id) {
            return Err(RcError::PublisherPending(publisher_id.to_string()));
        }
        Ok(())
    }

    pub fn check_present(&self, publisher_id: &PublisherId) -> Result<&PublisherEntry, RcError> {
        self.publishers
            .get(publisher_id)
            .ok_or_else(|| RcError::PublisherNotFound(publisher_id.to_string()))
    }

    /// Publisher present, subscriber not yet attached, description is an offer.
    pub fn check_can_subscribe(&self, request: &SubscribeRequest) -> Result<(), RcError> {
        let entry = self.check_present(&request.publisher_id)?;
        if entry.subscribers.contains(&request.subscriber_id) {
            return Err(RcError::SubscriberExists {
                subscriber_id: request.subscriber_id.to_string(),
                publisher_id: request.publisher_id.to_string(),
            });
        }
        if !request.sdp.is_offer() {
            return Err(RcError::NotAnOffer);
        }
        Ok(())
    }

    pub fn check_subscribed(
        &self,
        subscriber_id: &SubscriberId,
        publisher_id: &PublisherId,
    ) -> Result<(), RcError> {
        let entry = self.check_present(publisher_id)?;
        if entry.subscribers.contains(subscriber_id) {
            Ok(())
        } else {
            Err(RcError::SubscriberNotFound {
                subscriber_id: subscriber_id.to_string(),
                publisher_id: publisher_id.to_string(),
            })
        }
    }

    /// Publisher present and no output registered under `url`.
    pub fn check_output_absent(&self, publisher_id: &PublisherId, url: &str) -> Result<(), RcError> {
        self.check_present(publisher_id)?;
        if self.outputs.contains_key(url) {
            return Err(RcError::OutputExists(url.to_string()));
        }
        Ok(())
    }

    /// Publisher present and `url` registered for that publisher.
    pub fn check_output(&self, publisher_id: &PublisherId, url: &str) -> Result<(), RcError> {
        self.check_present(publisher_id)?;
        match self.outputs.get(url) {
            Some(output) if &output.publisher_id == publisher_id => Ok(()),
            _ => Err(RcError::OutputNotFound(url.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    pub fn mark_pending(&mut self, publisher_id: PublisherId) {
        self.pending.insert(publisher_id);
    }

    /// Returns false if the publisher was not pending.
    pub fn clear_pending(&mut self, publisher_id: &PublisherId) -> bool {
        self.pending.remove(publisher_id)
    }

    /// Mark present with an empty subscriber list.
    pub fn admit(&mut self, publisher_id: PublisherId, source: PublisherSource) {
        self.pending.remove(&publisher_id);
        self.publishers.insert(
            publisher_id,
            PublisherEntry {
                source,
                subscribers: Vec::new(),
                admitted_at: chrono::Utc::now().timestamp(),
            },
        );
    }

    /// Append a subscriber. Returns false if the publisher is absent or the
    /// subscriber is already attached.
    pub fn attach_subscriber(&mut self, subscriber_id: SubscriberId, publisher_id: &PublisherId) -> bool {
        match self.publishers.get_mut(publisher_id) {
            Some(entry) if !entry.subscribers.contains(&subscriber_id) => {
                entry.subscribers.push(subscriber_id);
                true
            }
            _ => false,
        }
    }

    pub fn detach_subscriber(&mut self, subscriber_id: &SubscriberId, publisher_id: &PublisherId) -> bool {
        match self.publishers.get_mut(publisher_id) {
            Some(entry) => {
                let before = entry.subscribers.len();
                entry.subscribers.retain(|s| s != subscriber_id);
                entry.subscribers.len() != before
            }
            None => false,
        }
    }

    /// Publishers whose list contains `subscriber_id`, in identity order.
    #[must_use]
    pub fn publishers_with_subscriber(&self, subscriber_id: &SubscriberId) -> Vec<PublisherId> {
        let mut publishers: Vec<PublisherId> = self
            .publishers
            .iter()
            .filter(|(_, entry)| entry.subscribers.contains(subscriber_id))
            .map(|(id, _)| id.clone())
            .collect();
        publishers.sort();
        publishers
    }

    /// Delete a publisher, its subscriber list and its outputs.
    pub fn remove_publisher(
        &mut self,
        publisher_id: &PublisherId,
    ) -> Option<(PublisherEntry, Vec<ExternalOutput>)> {
        let entry = self.publishers.remove(publisher_id)?;
        let urls: Vec<String> = self
            .outputs
            .values()
            .filter(|o| &o.publisher_id == publisher_id)
            .map(|o| o.url.clone())
            .collect();
        let outputs = urls
            .iter()
            .filter_map(|url| self.outputs.remove(url))
            .collect();
        Some((entry, outputs))
    }

    pub fn register_output(&mut self, publisher_id: PublisherId, url: String) -> ExternalOutput {
        let output = ExternalOutput {
            output_id: Uuid::new_v4(),
            publisher_id,
            url: url.clone(),
            created_at: chrono::Utc::now().timestamp(),
        };
        self.outputs.insert(url, output.clone());
        output
    }

    pub fn remove_output(&mut self, url: &str) -> Option<ExternalOutput> {
        self.outputs.remove(url)
    }

    /// Empty the room, returning the publishers that were present.
    pub fn clear(&mut self) -> Vec<PublisherId> {
        self.pending.clear();
        self.outputs.clear();
        let mut publishers: Vec<PublisherId> = self.publishers.drain().map(|(id, _)| id).collect();
        publishers.sort();
        publishers
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    #[must_use]
    pub fn publishers_view(&self) -> BTreeMap<PublisherId, Vec<SubscriberId>> {
        self.publishers
            .iter()
            .map(|(id, entry)| (id.clone(), entry.subscribers.clone()))
            .collect()
    }

    #[must_use]
    pub fn pending_view(&self) -> BTreeSet<PublisherId> {
        self.pending.iter().cloned().collect()
    }

    /// Outputs ordered by url.
    #[must_use]
    pub fn outputs_view(&self) -> Vec<ExternalOutput> {
        let mut outputs: Vec<ExternalOutput> = self.outputs.values().cloned().collect();
        outputs.sort_by(|a, b| a.url.cmp(&b.url));
        outputs
    }
}
