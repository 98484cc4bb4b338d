//! MQTT consumer (C9). Grounded on `app/mqtt/init_mqtt.py`: a dedicated OS
//! thread, not a tokio task, running a bounded read/write/housekeeping
//! loop with a fixed reconnect back-off; packets are handed to the
//! request-handling domain via a task-spawn API (here: a direct
//! `tokio::runtime::Handle::spawn` into the flush path).

use super::buffer::{self, IngestionBuffer};
use crate::auth::TokenService;
use crate::config::Settings;
use crate::events::EventBus;
use crate::store::Stores;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RETRY_DELAY: Duration = Duration::from_secs(5);
const MAX_PACKETS: u16 = 2000;

pub struct MqttConsumerHandle {
    stop: Arc<AtomicBool>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl MqttConsumerHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub fn start(
    settings: Settings,
    tokens: Arc<TokenService>,
    buffer: IngestionBuffer,
    stores: Stores,
    events: EventBus,
) -> MqttConsumerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_thread = stop.clone();
    let rt_handle = tokio::runtime::Handle::current();

    let join = std::thread::spawn(move || {
        mqtt_main(settings, tokens, buffer, stores, events, stop_thread, rt_handle);
    });

    MqttConsumerHandle {
        stop,
        join: Some(join),
    }
}

fn mqtt_main(
    settings: Settings,
    tokens: Arc<TokenService>,
    buffer: IngestionBuffer,
    stores: Stores,
    events: EventBus,
    stop: Arc<AtomicBool>,
    rt_handle: tokio::runtime::Handle,
) {
    while !stop.load(Ordering::SeqCst) {
        match run_connection(&settings, &tokens, &buffer, &stores, &events, &stop, &rt_handle) {
            Ok(()) => {
                // graceful shutdown requested
                break;
            }
            Err(e) => {
                warn!("MQTT consumer: connection error: {e:#}, retrying in {RETRY_DELAY:?}");
                std::thread::sleep(RETRY_DELAY);
            }
        }
    }
    info!("MQTT consumer: stopped");
}

fn run_connection(
    settings: &Settings,
    tokens: &TokenService,
    buffer: &IngestionBuffer,
    stores: &Stores,
    events: &EventBus,
    stop: &Arc<AtomicBool>,
    rt_handle: &tokio::runtime::Handle,
) -> anyhow::Result<()> {
    let client_id = format!("flight-server-{}", Uuid::new_v4());
    let mut options = MqttOptions::new(client_id, settings.mqtt_host.clone(), settings.mqtt_port);
    options.set_keep_alive(Duration::from_secs(30));

    let self_token = tokens.self_access_token()?;
    options.set_credentials("server", self_token);

    let (client, mut connection) = Client::new(options, MAX_PACKETS as usize);
    client.subscribe("#", QoS::AtMostOnce)?;

    info!("MQTT consumer: connected to {}:{}", settings.mqtt_host, settings.mqtt_port);

    for notification in connection.iter() {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        match notification {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_publish(&publish.topic, publish.payload.to_vec().into(), buffer, stores, events, rt_handle);
            }
            Ok(_) => {}
            Err(e) => {
                anyhow::bail!("mqtt loop error: {e}");
            }
        }
    }
    Ok(())
}

/// Topic grammar: `{flightId}/m/{partIndex}/{seriesIndex}`.
fn handle_publish(
    topic: &str,
    payload: bytes::Bytes,
    buffer: &IngestionBuffer,
    stores: &Stores,
    events: &EventBus,
    rt_handle: &tokio::runtime::Handle,
) {
    let parts: Vec<&str> = topic.split('/').collect();
    let ([flight_str, "m", part_str, series_str], true) = (
        [
            parts.first().copied().unwrap_or(""),
            parts.get(1).copied().unwrap_or(""),
            parts.get(2).copied().unwrap_or(""),
            parts.get(3).copied().unwrap_or(""),
        ],
        parts.len() == 4,
    ) else {
        debug!("MQTT consumer: ignoring non-measurement topic '{topic}'");
        return;
    };

    let (Ok(flight_id), Ok(part_index), Ok(series_index)) = (
        Uuid::parse_str(flight_str),
        part_str.parse::<u32>(),
        series_str.parse::<u32>(),
    ) else {
        debug!("MQTT consumer: malformed topic '{topic}'");
        return;
    };

    if let Some(swapped) = buffer.offer(flight_id, part_index, series_index, payload) {
        let stores = stores.clone();
        let events = events.clone();
        rt_handle.spawn(async move {
            buffer::flush(
                &stores,
                &events,
                flight_id,
                swapped,
                crate::models::flight::MINIMUM_HEAD_TIME,
                crate::models::flight::DEFAULT_HEAD_TIME,
            )
            .await;
        });
    }
}
