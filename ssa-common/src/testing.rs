//! Dataset fixtures for unit tests

use chrono::NaiveDateTime;

use crate::dataset::{Dataset, LoadReport};
use crate::model::{Audience, DeliveryEvent, Post, Subscriber, SubscriberDetails, SubscriberStatus};
use crate::time::parse_timestamp;

pub fn ts(s: &str) -> NaiveDateTime {
    parse_timestamp(s).unwrap()
}

pub struct DatasetBuilder {
    subscribers: Vec<Subscriber>,
    posts: Vec<Post>,
    deliveries: Vec<DeliveryEvent>,
    report: LoadReport,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            posts: Vec::new(),
            deliveries: Vec::new(),
            report: LoadReport {
                engagement_available: true,
                ..Default::default()
            },
        }
    }

    pub fn subscriber(&mut self, email: &str, created: &str) -> &mut Self {
        self.subscribers.push(Subscriber {
            email: email.to_string(),
            created_at: ts(created),
            plan: None,
            source: None,
            active_subscription: false,
            first_payment_at: None,
            expiry: None,
            status: SubscriberStatus::Active,
            unsubscribed_at: None,
            details: None,
        });
        self
    }

    pub fn paid(&mut self, email: &str, created: &str, first_payment: &str) -> &mut Self {
        self.subscriber(email, created);
        let last = self.last();
        last.first_payment_at = Some(ts(first_payment));
        last.active_subscription = true;
        last.plan = Some("yearly".to_string());
        self
    }

    pub fn unsubscribed(&mut self, email: &str, created: &str, at: Option<&str>) -> &mut Self {
        self.subscriber(email, created);
        let last = self.last();
        last.status = SubscriberStatus::Unsubscribed;
        last.unsubscribed_at = at.map(ts);
        self
    }

    pub fn details(&mut self, details: SubscriberDetails) -> &mut Self {
        self.last().details = Some(details);
        self.report.details_available = true;
        self
    }

    pub fn source(&mut self, source: &str) -> &mut Self {
        self.last().source = Some(source.to_string());
        self
    }

    /// Edit the most recently added subscriber
    pub fn last(&mut self) -> &mut Subscriber {
        self.subscribers.last_mut().unwrap()
    }

    pub fn post(&mut self, post_id: u64, date: &str) -> &mut Self {
        self.posts.push(Post {
            post_id,
            title: format!("Post {}", post_id),
            post_date: Some(ts(date)),
            email_sent_at: None,
            audience: Audience::Everyone,
            post_type: Some("newsletter".to_string()),
        });
        self
    }

    pub fn deliver(&mut self, post_id: u64, email: &str, at: &str) -> &mut Self {
        self.deliveries.push(DeliveryEvent {
            post_id,
            email: email.to_string(),
            delivered_at: ts(at),
            opened_at: None,
            clicked: false,
        });
        self
    }

    pub fn open(&mut self, post_id: u64, email: &str, delivered: &str, opened: &str) -> &mut Self {
        self.deliver(post_id, email, delivered);
        if let Some(d) = self.deliveries.last_mut() {
            d.opened_at = Some(ts(opened));
        }
        self
    }

    pub fn click(&mut self, post_id: u64, email: &str, delivered: &str, opened: &str) -> &mut Self {
        self.open(post_id, email, delivered, opened);
        if let Some(d) = self.deliveries.last_mut() {
            d.clicked = true;
        }
        self.report.clicks_available = true;
        self
    }

    pub fn with_clicks(&mut self) -> &mut Self {
        self.report.clicks_available = true;
        self
    }

    pub fn without_engagement(&mut self) -> &mut Self {
        self.report.engagement_available = false;
        self
    }

    pub fn build(&self) -> Dataset {
        Dataset::new(
            "test",
            "Test export",
            self.subscribers.clone(),
            self.posts.clone(),
            self.deliveries.clone(),
            self.report.clone(),
        )
    }
}
