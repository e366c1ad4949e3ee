use crate::messages::Finite;

/// Anything that can live in a topic: cloned out on every `update()`,
/// default-initialised when the topic is first created.
pub trait Message: Clone + Default + Send + Sync + Finite + 'static {}

//blanket impl for all types that meet constraints
impl<T: Clone + Default + Send + Sync + Finite + 'static> Message for T {}
