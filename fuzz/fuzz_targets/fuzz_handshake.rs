#![no_main]

use libfuzzer_sys::fuzz_target;
use websocket_wrapper::{Application, ConnectionDriver, Outbox, Transport, TransportConfig};

struct Null;

impl Transport for Null {
    fn write(&mut self, _data: &[u8]) {}
    fn lose_connection(&mut self) {}
}

struct Echo;

impl Application for Echo {
    fn on_receive(&mut self, data: &[u8], outbox: &mut Outbox) {
        outbox.write(data.to_vec());
    }
}

fuzz_target!(|data: &[u8]| {
    // Feed the input in two chunks to exercise resumption
    let split = data.first().map_or(0, |&b| b as usize).min(data.len());
    let mut driver = ConnectionDriver::new(Echo, Null, TransportConfig::default());
    driver.data_received(&data[..split]);
    driver.data_received(&data[split..]);
    driver.connection_lost("fuzz");
});
