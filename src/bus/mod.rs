//! Topic bus: typed publish/subscribe registry with latest-value semantics.
//!
//! Each topic is synchronised independently; no lock spans two topics and no
//! lock is held across a wait or across controller compute time.

pub mod catalog;
pub mod message;
pub mod node;
pub mod topic;

pub use catalog::TopicDef;
pub use message::Message;
pub use node::{Node, Publication, Subscription};
pub use topic::Topic;

use dashmap::DashMap;
use std::{any::Any, sync::Arc};

use crate::error::BusError;

pub struct TopicBus {
    topics: DashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl TopicBus {
    pub fn new() -> Arc<Self> {
        Arc::new(TopicBus { topics: DashMap::new() })
    }

    pub fn create_node(self: &Arc<Self>, name: &str) -> Node {
        Node::new(Arc::clone(self), name)
    }

    /// Look up (or lazily create) the topic named by `def`.
    pub fn topic<T: Message>(&self, def: TopicDef<T>) -> Result<Arc<Topic<T>>, BusError> {
        let entry: Arc<dyn Any + Send + Sync> = {
            let slot = self
                .topics
                .entry(def.name())
                .or_insert_with(|| Arc::new(Topic::<T>::new(def.name())) as Arc<dyn Any + Send + Sync>);
            Arc::clone(slot.value())
        };
        entry
            .downcast::<Topic<T>>()
            .map_err(|_| BusError::TypeMismatch(def.name()))
    }

    /// Latest value and sequence of a topic, without a subscription.
    pub fn peek<T: Message>(&self, def: TopicDef<T>) -> Result<(T, u64), BusError> {
        Ok(self.topic(def)?.read())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
