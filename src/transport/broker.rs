//! MQTT broker transport
//!
//! The rumqttc event loop is polled in a dedicated task. Reconnection is
//! owned by the session, so the task ends at the first connection error
//! instead of letting rumqttc retry on its own.

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeFilter,
};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{EventSink, Inbound, Outbound, Transport, TransportError, TransportEvent, TransportKind};
use crate::config::BrokerConfig;

/// Bounded request queue between the client handle and the event loop
const REQUEST_CAPACITY: usize = 64;

/// MQTT connection to the message broker
pub struct BrokerTransport {
    config: BrokerConfig,
    link: Mutex<Option<Link>>,
}

struct Link {
    client: AsyncClient,
    task: JoinHandle<()>,
}

impl BrokerTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
        }
    }

    /// A failed `try_*` is either a full request queue or a finished event loop
    fn classify(&self, link: &Link, error: ClientError) -> TransportError {
        if link.task.is_finished() {
            TransportError::SendFailed(error.to_string())
        } else {
            tracing::debug!(error = %error, "MQTT request queue full");
            TransportError::Busy(self.kind())
        }
    }

    fn options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        options.set_clean_session(true);
        if let Some(password) = &self.config.password {
            options.set_credentials(&self.config.username, password);
        }
        options
    }
}

#[async_trait]
impl Transport for BrokerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    fn open(&self, sink: EventSink) {
        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            client_id = %self.config.client_id,
            "Opening MQTT connection"
        );

        let (client, eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        let task = tokio::spawn(drive(eventloop, sink));

        if let Some(previous) = self.link.lock().replace(Link { client, task }) {
            previous.task.abort();
        }
    }

    fn send(&self, frame: Outbound) -> Result<(), TransportError> {
        let link = self.link.lock();
        let link = link.as_ref().ok_or(TransportError::NotConnected(self.kind()))?;

        let result = match frame {
            Outbound::Subscribe { topic } => link.client.try_subscribe(topic, QoS::AtMostOnce),
            Outbound::SubscribeMany { topics } => {
                if topics.is_empty() {
                    return Ok(());
                }
                link.client.try_subscribe_many(
                    topics
                        .into_iter()
                        .map(|topic| SubscribeFilter::new(topic, QoS::AtMostOnce)),
                )
            }
            Outbound::Publish { topic, payload } => {
                link.client
                    .try_publish(topic, QoS::AtMostOnce, false, payload.into_bytes())
            }
            Outbound::Text(_) => {
                return Err(TransportError::Unsupported(self.kind(), "text frames"))
            }
        };

        result.map_err(|e| self.classify(link, e))
    }

    async fn close(&self) {
        let link = self.link.lock().take();
        if let Some(link) = link {
            let _ = link.client.try_disconnect();
            link.task.abort();
        }
    }
}

impl Drop for BrokerTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.task.abort();
        }
    }
}

async fn drive(mut eventloop: EventLoop, sink: EventSink) {
    let mut opened = false;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    opened = true;
                    sink.emit(TransportEvent::Opened);
                } else {
                    sink.emit(TransportEvent::ConnectFailed {
                        reason: format!("{:?}", ack.code),
                    });
                    return;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                sink.emit(TransportEvent::Received(Inbound::Publish {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                }));
            }
            Ok(_) => {}
            Err(e) => {
                if opened {
                    sink.emit(TransportEvent::Closed {
                        reason: Some(e.to_string()),
                    });
                } else {
                    sink.emit(TransportEvent::ConnectFailed {
                        reason: e.to_string(),
                    });
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BrokerConfig {
        BrokerConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 1,
            ..BrokerConfig::default()
        }
    }

    #[test]
    fn test_send_before_open_fails() {
        let transport = BrokerTransport::new(config());
        let result = transport.send(Outbound::Publish {
            topic: "a".to_string(),
            payload: "{}".to_string(),
        });
        assert!(matches!(result, Err(TransportError::NotConnected(TransportKind::Broker))));
    }

    #[tokio::test]
    async fn test_rejects_text_frames() {
        let transport = BrokerTransport::new(config());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        transport.open(EventSink::new(TransportKind::Broker, 1, tx));

        let result = transport.send(Outbound::Text("{}".to_string()));
        assert!(matches!(result, Err(TransportError::Unsupported(..))));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_full_queue_is_busy_not_lost() {
        let transport = BrokerTransport::new(config());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        transport.open(EventSink::new(TransportKind::Broker, 1, tx));

        // The event loop task has not run yet on this single-threaded runtime
        let topics: Vec<String> = (0..100).map(|i| format!("plant/widget{}", i)).collect();
        transport
            .send(Outbound::SubscribeMany {
                topics: topics.clone(),
            })
            .unwrap();

        let mut first_error = None;
        for topic in topics {
            if let Err(e) = transport.send(Outbound::Subscribe { topic }) {
                first_error = Some(e);
                break;
            }
        }
        let error = first_error.unwrap();
        assert!(matches!(error, TransportError::Busy(TransportKind::Broker)));
        assert!(!error.is_connection_lost());
        transport.close().await;
    }

    #[tokio::test]
    async fn test_empty_subscribe_many_is_noop() {
        let transport = BrokerTransport::new(config());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        transport.open(EventSink::new(TransportKind::Broker, 1, tx));
        assert!(transport
            .send(Outbound::SubscribeMany { topics: Vec::new() })
            .is_ok());
        transport.close().await;
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_connect_failure() {
        let transport = BrokerTransport::new(config());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        transport.open(EventSink::new(TransportKind::Broker, 3, tx));

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.epoch, 3);
        assert!(matches!(envelope.event, TransportEvent::ConnectFailed { .. }));
    }
}
