use crate::configuration::Configuration;
use crate::entities::{self, Button};
use crate::publication;
use log::{debug, error, info, trace, warn};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use std::error::Error;
use strum_macros::Display;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::{Duration, sleep, timeout};

/// How long the startup waits for the first connection before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between reconnection attempts after a lost connection
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Keep-alive interval of the MQTT session
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Grace period for the final publish and for the disconnect
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

// Holds a full publication burst until the event loop drains it.
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Reachability of the MQTT broker, as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ConnectionLost,
    ShuttingDown,
}

/// Transport notification delivered to the controller
///
/// Decouples the lifecycle logic from the transport's own event types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionEvent {
    /// The broker acknowledged the connection
    Connected,

    /// The connection dropped; the transport will retry
    ConnectionLost,

    /// A reconnection attempt is about to start
    Reconnecting,
}

/// Daemon that bridges the host power controls to Home Assistant over MQTT
pub struct Daemon {
    config: Configuration,
    mqtt_options: MqttOptions,
}

impl Daemon {
    /// Constructs a daemon from the specified configuration
    ///
    /// ```
    /// use mqtt_power_bridge::{Configuration, Daemon};
    ///
    /// let config = Configuration::load("conf/mqtt-power-bridge.conf").expect("Cannot load configuration");
    /// let daemon = Daemon::new(config);
    ///
    /// // later, run daemon.run() in an async function
    /// ```
    pub fn new(config: Configuration) -> Daemon {
        info!("Daemon for {} starting", config.device_name);

        let client_id = format!("{}-{}", env!("CARGO_PKG_NAME"), config.device_name);
        let mut mqtt_options = MqttOptions::new(client_id, &config.mqtt.host, config.mqtt.port);
        mqtt_options.set_credentials(&config.mqtt.username, &config.mqtt.password);
        mqtt_options.set_clean_session(true);
        mqtt_options.set_keep_alive(KEEP_ALIVE_INTERVAL);

        // An abnormal disconnect is announced by the broker itself.
        let availability = entities::device_availability(&config);
        mqtt_options.set_last_will(LastWill::new(
            &availability.topic,
            availability.payload_not_available,
            QoS::AtLeastOnce,
            true,
        ));

        Daemon {
            config,
            mqtt_options,
        }
    }

    /// Connects to the broker and runs until a termination signal arrives
    ///
    /// Fails fast when the initial connection cannot be established within
    /// [`CONNECT_TIMEOUT`]; nothing can proceed without a broker.
    pub async fn run(self) -> Result<(), Box<dyn Error>> {
        let entity_list = entities::get_entities(&self.config);
        let with_commands = entities::filter_entities_with_commands(&entity_list);
        info!(
            "Loaded {} entities ({} with commands)",
            entity_list.len(),
            with_commands.len()
        );

        let (client, event_loop) =
            AsyncClient::new(self.mqtt_options.clone(), REQUEST_CHANNEL_CAPACITY);
        let (established_tx, mut established_rx) = mpsc::channel(1);
        // Latest-transition signal. Nothing waits on it today; senders drop
        // the signal when the slot is full.
        let (lost_tx, _lost_rx) = mpsc::channel(1);

        let terminate = signal(SignalKind::terminate())?;
        let (host, port) = self.mqtt_options.broker_address();
        info!("Connecting to MQTT broker {host}:{port}");

        let controller = Controller::new(self.config, client, established_tx, lost_tx);
        let lifecycle = task::spawn(controller.run(event_loop, terminate));

        match timeout(CONNECT_TIMEOUT, established_rx.recv()).await {
            Ok(Some(())) => info!("Initial connection established"),
            _ => {
                error!("Timeout waiting for the initial MQTT connection");
                std::process::exit(1);
            }
        }

        lifecycle.await?;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Owns the MQTT client and the connection lifecycle
///
/// All events are delivered sequentially from the poll loop, so the state and
/// the discovery flag need no locking.
pub(crate) struct Controller {
    config: Configuration,
    client: AsyncClient,
    state: ConnectionState,
    discovery_published: bool,
    message_count: u64,
    connection_established: mpsc::Sender<()>,
    connection_lost: mpsc::Sender<()>,
}

impl Controller {
    pub(crate) fn new(
        config: Configuration,
        client: AsyncClient,
        connection_established: mpsc::Sender<()>,
        connection_lost: mpsc::Sender<()>,
    ) -> Controller {
        Controller {
            config,
            client,
            state: ConnectionState::Disconnected,
            discovery_published: false,
            message_count: 0,
            connection_established,
            connection_lost,
        }
    }

    /// Drives the transport until a termination signal arrives, then shuts down
    ///
    /// The transport reconnects by being polled again; the loop paces the
    /// retries with [`RECONNECT_INTERVAL`].
    pub(crate) async fn run(mut self, mut event_loop: EventLoop, mut terminate: Signal) {
        self.set_state(ConnectionState::Connecting);

        'lifecycle: loop {
            tokio::select! {
                event = event_loop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        self.on_connection_event(ConnectionEvent::Connected);
                    }
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        self.on_message(&message.topic, &message.payload);
                    }
                    Ok(event) => trace!("MQTT event: {event:?}"),
                    Err(err) => {
                        warn!("Connection lost: {err}");
                        self.on_connection_event(ConnectionEvent::ConnectionLost);
                        tokio::select! {
                            () = sleep(RECONNECT_INTERVAL) => {
                                self.on_connection_event(ConnectionEvent::Reconnecting);
                            }
                            () = termination(&mut terminate) => break 'lifecycle,
                        }
                    }
                },
                () = termination(&mut terminate) => break 'lifecycle,
            }
        }

        self.shutdown(&mut event_loop).await;
    }

    /// Reacts to a reachability change of the broker
    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                info!("Connected to the MQTT broker");
                self.set_state(ConnectionState::Connected);
                // Wakes the startup path if it still waits; the signal is
                // dropped otherwise.
                let _ = self.connection_established.try_send(());

                let first_connection = self.take_first_connection();
                let client = self.client.clone();
                let entity_list = entities::get_entities(&self.config);
                task::spawn(async move {
                    publication::run_connection_sequence(&client, &entity_list, first_connection)
                        .await;
                });
            }
            ConnectionEvent::ConnectionLost => {
                self.set_state(ConnectionState::ConnectionLost);
                let _ = self.connection_lost.try_send(());
            }
            ConnectionEvent::Reconnecting => {
                info!("Attempting to reconnect to the MQTT broker");
                self.set_state(ConnectionState::Connecting);
            }
        }
    }

    /// Returns whether this is the first successful connection of the process
    ///
    /// The flag flips before the publication task is spawned, and connection
    /// events arrive sequentially, so every later connection observes it.
    fn take_first_connection(&mut self) -> bool {
        !std::mem::replace(&mut self.discovery_published, true)
    }

    /// Dispatches an inbound message to the matching command entity
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self.message_count += 1;
        info!(
            "Received message #{} on topic {topic:?}: {:?}",
            self.message_count,
            String::from_utf8_lossy(payload)
        );

        let entity_list = entities::get_entities(&self.config);
        let buttons = entities::filter_entities_with_commands(&entity_list);
        match match_command(&buttons, topic) {
            Some(button) => {
                info!("Queueing command for topic {topic:?}");
                button.queue_action();
            }
            None => warn!("Received message on unhandled topic {topic:?}"),
        }
    }

    /// Publishes the offline status and closes the connection, both bounded
    async fn shutdown(&mut self, event_loop: &mut EventLoop) {
        self.set_state(ConnectionState::ShuttingDown);
        self.publish_offline(event_loop).await;
        self.disconnect(event_loop).await;
        info!("Disconnected from the MQTT broker");
    }

    /// Announces the shutdown on the availability topic
    ///
    /// Waits for the broker acknowledgment at most [`SHUTDOWN_TIMEOUT`]; a
    /// failure here only loses the courtesy notice, the last will still
    /// covers it.
    async fn publish_offline(&mut self, event_loop: &mut EventLoop) {
        info!("Publishing offline status before shutdown");
        let availability = entities::device_availability(&self.config);

        if let Err(err) = self.client.try_publish(
            &availability.topic,
            QoS::AtLeastOnce,
            true,
            availability.payload_not_available,
        ) {
            warn!("Failed to queue the offline status: {err}");
            return;
        }

        match timeout(SHUTDOWN_TIMEOUT, drain_until_acknowledged(event_loop)).await {
            Ok(true) => info!("Offline status published"),
            Ok(false) => warn!("Connection dropped before the offline status was acknowledged"),
            Err(_) => warn!("Timed out waiting for the offline status acknowledgment"),
        }
    }

    /// Closes the connection with a bounded grace period
    async fn disconnect(&mut self, event_loop: &mut EventLoop) {
        if let Err(err) = self.client.try_disconnect() {
            warn!("Failed to queue the disconnect request: {err}");
            return;
        }

        // The poll loop errors out once the broker closes the connection.
        let drained = async {
            while event_loop.poll().await.is_ok() {}
        };
        if timeout(SHUTDOWN_TIMEOUT, drained).await.is_err() {
            warn!("Timed out waiting for a clean disconnect");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state {} -> {state}", self.state);
            self.state = state;
        }
    }
}

/// Finds the entity whose command topic matches exactly
///
/// The first match wins; the list is small enough for a linear scan.
pub fn match_command<'a>(buttons: &[&'a Button], topic: &str) -> Option<&'a Button> {
    buttons
        .iter()
        .find(|button| button.command_topic() == Some(topic))
        .copied()
}

/// Resolves when the process receives an interrupt or termination signal
async fn termination(terminate: &mut Signal) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => debug!("Interrupt received"),
        _ = terminate.recv() => debug!("Termination signal received"),
    }
}
