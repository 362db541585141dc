//! Pre-configured test data for Room Controller tests.

use common::types::{PublisherId, RoomId, SubscriberId};
use room_controller::actors::{SessionDescription, SubscribeRequest};
use uuid::Uuid;

/// A session description that passes the offer check.
#[must_use]
pub fn sdp_offer() -> SessionDescription {
    SessionDescription::new("{\"type\":\"OFFER\",\"sdp\":\"v=0\\r\\no=- 0 0 IN IP4 127.0.0.1\"}")
}

/// A session description that fails the offer check.
#[must_use]
pub fn sdp_answer() -> SessionDescription {
    SessionDescription::new("{\"type\":\"ANSWER\",\"sdp\":\"v=0\"}")
}

#[must_use]
pub fn publisher(id: &str) -> PublisherId {
    PublisherId::from(id)
}

#[must_use]
pub fn subscriber(id: &str) -> SubscriberId {
    SubscriberId::from(id)
}

/// Room id with a random suffix.
#[must_use]
pub fn random_room_id() -> RoomId {
    RoomId::new(format!("room-{}", Uuid::new_v4()))
}

/// Subscribe request builder defaulting to audio+video with an offer.
#[derive(Debug, Clone)]
pub struct TestSubscription {
    request: SubscribeRequest,
}

impl TestSubscription {
    #[must_use]
    pub fn new(subscriber_id: &str, publisher_id: &str) -> Self {
        Self {
            request: SubscribeRequest {
                subscriber_id: subscriber(subscriber_id),
                publisher_id: publisher(publisher_id),
                audio: true,
                video: true,
                sdp: sdp_offer(),
            },
        }
    }

    #[must_use]
    pub fn audio_only(mut self) -> Self {
        self.request.video = false;
        self
    }

    #[must_use]
    pub fn with_sdp(mut self, sdp: SessionDescription) -> Self {
        self.request.sdp = sdp;
        self
    }

    #[must_use]
    pub fn build(self) -> SubscribeRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_fixtures() {
        assert!(sdp_offer().is_offer());
        assert!(!sdp_answer().is_offer());
    }

    #[test]
    fn test_subscription_builder() {
        let request = TestSubscription::new("s1", "p1").audio_only().build();
        assert!(request.audio);
        assert!(!request.video);
        assert_eq!(request.publisher_id, publisher("p1"));
    }

    #[test]
    fn test_random_room_ids_differ() {
        assert_ne!(random_room_id(), random_room_id());
    }
}
