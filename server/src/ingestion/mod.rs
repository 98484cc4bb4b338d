pub mod buffer;
pub mod mqtt_consumer;

pub use buffer::IngestionBuffer;
pub use mqtt_consumer::{start as start_mqtt_consumer, MqttConsumerHandle};
