#![no_main]

use {
    core::num::Saturating,
    libfuzzer_sys::fuzz_target,
    tether_transport::{channel::ChannelKind, config::EndpointConfig, endpoint::Endpoint},
    web_time::Instant,
};

fuzz_target!(|packets: Vec<&[u8]>| {
    let mut endpoint =
        Endpoint::new("127.0.0.1:25565".parse().unwrap(), EndpointConfig::default()).unwrap();
    let unreliable = endpoint.add_channel(ChannelKind::Unreliable);
    let reliable = endpoint.add_channel(ChannelKind::ReliableOrdered);

    let now = Instant::now();
    for packet in packets {
        let before = endpoint.stats();
        if endpoint.on_datagram_received(now, packet).is_err() {
            let mut expected = before;
            expected.packets_dropped += Saturating(1);
            assert_eq!(expected, endpoint.stats());
        }
        _ = endpoint.recv_messages(unreliable).unwrap();
        _ = endpoint.recv_messages(reliable).unwrap();
    }
});
