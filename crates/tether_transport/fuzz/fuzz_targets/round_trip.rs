#![no_main]

use {
    libfuzzer_sys::fuzz_target,
    tether_transport::{
        bytes::Bytes,
        channel::ChannelKind,
        config::EndpointConfig,
        endpoint::Endpoint,
        io::DatagramQueue,
    },
    web_time::Instant,
};

fuzz_target!(|input: (ChannelKind, Vec<&[u8]>)| {
    let (kind, msgs) = input;

    let config = EndpointConfig::default();
    let mut client = Endpoint::new("127.0.0.1:2000".parse().unwrap(), config.clone()).unwrap();
    let mut server = Endpoint::new("127.0.0.1:1000".parse().unwrap(), config.clone()).unwrap();
    let channel = client.add_channel(kind);
    server.add_channel(kind);

    // stay within one reliable send window
    let mut sent = Vec::new();
    for msg in msgs.into_iter().take(config.message_buffer_len) {
        let msg = Bytes::copy_from_slice(msg);
        if client.send_message(channel, msg.clone()).is_ok() {
            sent.push(msg);
        } else {
            assert!(msg.len() > config.max_message_bytes);
        }
    }

    let now = Instant::now();
    let mut wire = DatagramQueue::default();
    client.transmit_packets(now, &mut wire).unwrap();
    for datagram in wire.drain() {
        server.on_datagram_received(now, &datagram.payload).unwrap();
    }

    // no loss, so every message arrives exactly once
    let mut recv = server.recv_messages(channel).unwrap();
    match kind {
        ChannelKind::ReliableOrdered => assert_eq!(sent, recv),
        // smaller messages may be packed ahead of larger ones
        ChannelKind::Unreliable => {
            sent.sort();
            recv.sort();
            assert_eq!(sent, recv);
        }
    }
});
