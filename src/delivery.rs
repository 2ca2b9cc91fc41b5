//! Message delivery to external listeners.
//!
//! A listener binding is acquired for every delivery and released on
//! every exit path, so a misbehaving listener can never hold resources
//! or break the ingestion loop: all acquisition, invocation, and
//! release failures are logged and swallowed.

use anyhow::Result;
use tracing::warn;

use crate::message::Message;

/// A consumer of batched telemetry messages.
///
/// Implemented by the host application. Invocation happens synchronously
/// inside the connection's read loop, serializing ingestion against
/// listener throughput.
pub trait MessageListener: Send {
    /// Invoked once per cycle boundary with the completed batch.
    fn on_message(&mut self, message: Message) -> Result<()>;
}

/// Creates transient [`MessageListener`] bindings, one per delivery.
pub trait ListenerFactory: Send + Sync {
    /// Acquire a listener for a single delivery.
    fn acquire(&self) -> Result<Box<dyn MessageListener>>;

    /// Release a listener once the delivery is over, successful or not.
    ///
    /// The default implementation simply drops it.
    fn release(&self, listener: Box<dyn MessageListener>) -> Result<()> {
        drop(listener);
        Ok(())
    }
}

/// Deliver one message through a freshly acquired listener.
///
/// Returns whether the listener accepted the message. The listener is
/// released even when the invocation fails; no failure propagates to
/// the caller.
pub fn deliver(factory: &dyn ListenerFactory, message: Message) -> bool {
    let mut listener = match factory.acquire() {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Failed to acquire message listener: {:#}", e);
            return false;
        }
    };

    let delivered = match listener.on_message(message) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to pass message to listener: {:#}", e);
            false
        }
    };

    if let Err(e) = factory.release(listener) {
        warn!("Failed to release message listener: {:#}", e);
    }

    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_message(timestamp: i64) -> Message {
        Message {
            drone_names: HashMap::new(),
            measured_values: Vec::new(),
            timestamp,
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        delivered: AtomicU64,
        released: AtomicU64,
        fail_invocation: bool,
        fail_acquisition: bool,
    }

    struct CountingListener {
        factory: Arc<CountingFactory>,
    }

    impl MessageListener for CountingListener {
        fn on_message(&mut self, _message: Message) -> Result<()> {
            if self.factory.fail_invocation {
                return Err(anyhow!("listener is unavailable"));
            }
            self.factory.delivered.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    impl ListenerFactory for Arc<CountingFactory> {
        fn acquire(&self) -> Result<Box<dyn MessageListener>> {
            if self.fail_acquisition {
                return Err(anyhow!("no listener available"));
            }
            Ok(Box::new(CountingListener {
                factory: Arc::clone(self),
            }))
        }

        fn release(&self, listener: Box<dyn MessageListener>) -> Result<()> {
            self.released.fetch_add(1, Ordering::Relaxed);
            drop(listener);
            Ok(())
        }
    }

    #[test]
    fn test_successful_delivery_releases_listener() {
        let factory = Arc::new(CountingFactory::default());

        assert!(deliver(&factory, make_message(1)));

        assert_eq!(factory.delivered.load(Ordering::Relaxed), 1);
        assert_eq!(factory.released.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_invocation_is_swallowed_and_still_releases() {
        let factory = Arc::new(CountingFactory {
            fail_invocation: true,
            ..Default::default()
        });

        assert!(!deliver(&factory, make_message(1)));

        assert_eq!(factory.delivered.load(Ordering::Relaxed), 0);
        assert_eq!(factory.released.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_failed_acquisition_is_swallowed() {
        let factory = Arc::new(CountingFactory {
            fail_acquisition: true,
            ..Default::default()
        });

        assert!(!deliver(&factory, make_message(1)));

        assert_eq!(factory.released.load(Ordering::Relaxed), 0);
    }
}
