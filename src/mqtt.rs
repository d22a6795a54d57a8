use crate::prelude::*;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(120);

// Message {{{
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

impl Message {
    pub fn for_value(
        ha: &home_assistant::Config,
        descriptor: &MeasurementDescriptor,
        value: &DerivedValue,
    ) -> Message {
        Message {
            topic: ha.state_topic(descriptor),
            retain: false,
            payload: value.to_string(),
        }
    }

    /// The marker sent to the status sensor once the inverter stops answering.
    pub fn offline(ha: &home_assistant::Config, status: &MeasurementDescriptor) -> Message {
        Message {
            topic: ha.state_topic(status),
            retain: false,
            payload: "Offline".to_owned(),
        }
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

pub type Receiver = broadcast::Receiver<ChannelData>;

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    stopping: Arc<AtomicBool>,
}

impl Mqtt {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self {
            config,
            channels,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    fn options(&self) -> MqttOptions {
        let c = self.config.mqtt();

        let mut options = MqttOptions::new(c.client_id(), c.host(), c.port());
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        options
    }

    /// Open the broker connection and wait for it to be accepted.
    ///
    /// Unlike later link loss this is not retried; the caller is expected to
    /// give up.
    pub async fn connect(&self) -> Result<(AsyncClient, EventLoop)> {
        let c = self.config.mqtt();
        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);

        let connack = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                        break if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(anyhow!("broker refused connection: {:?}", ack.code))
                        };
                    }
                    Ok(_) => {}
                    Err(err) => break Err(Error::from(err)),
                }
            }
        };

        match tokio::time::timeout(CONNECT_TIMEOUT, connack).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => bail!("mqtt connection to {}:{} failed: {}", c.host(), c.port(), err),
            Err(_) => bail!(
                "mqtt connection to {}:{} timed out after {}s",
                c.host(),
                c.port(),
                CONNECT_TIMEOUT.as_secs()
            ),
        }

        info!("mqtt connected to {}:{}", c.host(), c.port());

        Ok((client, eventloop))
    }

    /// Publish retained discovery documents ahead of any sensor values.
    pub async fn publish_discovery(&self, client: &AsyncClient, messages: Vec<Message>) {
        for msg in messages {
            debug!("publishing discovery: {}", msg.topic);
            if let Err(err) = client
                .publish(&msg.topic, QoS::AtLeastOnce, msg.retain, msg.payload)
                .await
            {
                error!("MQTT discovery publish to {} failed: {:?}", msg.topic, err);
            }
        }
    }

    /// Run until [`Mqtt::stop`]. `receiver` must be subscribed to
    /// `channels.to_mqtt` before anything is sent there.
    pub async fn start(&self, client: AsyncClient, eventloop: EventLoop, receiver: Receiver) -> Result<()> {
        futures::try_join!(self.receiver(eventloop), self.sender(client, receiver))?;

        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping MQTT client...");
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    fn stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    // drives the connection, reconnecting with backoff on failure
    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        let mut delay = RECONNECT_MIN;

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt (re)connected");
                    delay = RECONNECT_MIN;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("mqtt disconnected");
                    break;
                }
                Ok(_) => {} // keepalives etc
                Err(e) => {
                    if self.stopping() {
                        break;
                    }
                    error!("{}", e);
                    info!("reconnecting in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, RECONNECT_MAX);
                }
            }
        }

        info!("MQTT receiver loop exiting");
        Ok(())
    }

    // poller -> mqtt
    async fn sender(&self, client: AsyncClient, mut receiver: Receiver) -> Result<()> {
        use ChannelData::*;

        loop {
            match receiver.recv().await {
                Ok(Shutdown) => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client.disconnect().await;
                    break;
                }
                Ok(Message(message)) => {
                    debug!("publishing: {} = {}", message.topic, message.payload);
                    if let Err(err) = client
                        .publish(&message.topic, QoS::AtMostOnce, message.retain, message.payload)
                        .await
                    {
                        error!("MQTT publish to {} failed: {:?}", message.topic, err);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("MQTT sender lagged, {} messages dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mqtt() -> Mqtt {
        Mqtt::new(
            ConfigWrapper::from_config(config::Config::default()),
            Channels::new(),
        )
    }

    #[test]
    fn value_and_offline_messages() {
        let ha = home_assistant::Config::new(&config::HomeAssistant::default());
        let power = MeasurementDescriptor::power("AC Power", "mdi:solar-panel", 2);
        let status = MeasurementDescriptor::status("Inverter Operation Mode", 10);

        assert_eq!(
            Message::for_value(&ha, &power, &DerivedValue::Quantity(500.0)),
            Message {
                topic: "homeassistant/sensor/solax_ac_power/state".to_owned(),
                retain: false,
                payload: "500".to_owned(),
            }
        );
        assert_eq!(
            Message::offline(&ha, &status),
            Message {
                topic: "homeassistant/sensor/solax_inverter_operation_mode/state".to_owned(),
                retain: false,
                payload: "Offline".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn sender_stops_at_shutdown() -> Result<()> {
        let mqtt = mqtt();
        // never polled; requests just queue up
        let (client, _eventloop) = AsyncClient::new(mqtt.options(), 10);
        let receiver = mqtt.channels.to_mqtt.subscribe();
        let mut observer = mqtt.channels.to_mqtt.subscribe();

        let message = Message {
            topic: "homeassistant/sensor/solax_ac_power/state".to_owned(),
            retain: false,
            payload: "500".to_owned(),
        };
        mqtt.channels.to_mqtt.send(ChannelData::Message(message.clone()))?;
        mqtt.stop();
        mqtt.channels.to_mqtt.send(ChannelData::Message(message.clone()))?;

        tokio::time::timeout(Duration::from_secs(5), mqtt.sender(client, receiver)).await??;
        assert!(mqtt.stopping());

        assert_eq!(observer.recv().await?, ChannelData::Message(message.clone()));
        assert_eq!(observer.recv().await?, ChannelData::Shutdown);
        assert_eq!(observer.recv().await?, ChannelData::Message(message));

        Ok(())
    }

    #[tokio::test]
    async fn sender_stops_when_channel_closes() -> Result<()> {
        let mqtt = mqtt();
        let (client, _eventloop) = AsyncClient::new(mqtt.options(), 10);
        let (tx, receiver) = broadcast::channel(4);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), mqtt.sender(client, receiver)).await??;
        assert!(!mqtt.stopping());

        Ok(())
    }
}
