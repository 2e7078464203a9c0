#![expect(missing_docs, reason = "testing")]
#![cfg(test)]

use {
    core::time::Duration,
    tether_transport::{
        bits::{self, BitStream},
        bytes::Bytes,
        channel::{Channel, ChannelIndex, ChannelKind},
        config::EndpointConfig,
        endpoint::Endpoint,
        io::{DatagramQueue, DatagramSink},
        packet::HEADER_BITS,
    },
    web_time::Instant,
};

const CLIENT_ADDR: &str = "127.0.0.1:1000";
const SERVER_ADDR: &str = "127.0.0.1:2000";

fn pair(kinds: &[ChannelKind]) -> (Endpoint, Endpoint) {
    let mut client = Endpoint::new(SERVER_ADDR.parse().unwrap(), EndpointConfig::default()).unwrap();
    let mut server = Endpoint::new(CLIENT_ADDR.parse().unwrap(), EndpointConfig::default()).unwrap();
    for &kind in kinds {
        client.add_channel(kind);
        server.add_channel(kind);
    }
    (client, server)
}

fn write_packet(endpoint: &mut Endpoint, now: Instant) -> Vec<u8> {
    let mut dst = BitStream::new(vec![0u8; endpoint.config().max_packet_bytes]);
    endpoint.write_packet(now, &mut dst).unwrap();
    dst.filled().to_vec()
}

const CHANNEL: ChannelIndex = ChannelIndex::new(0);

#[test]
fn small_unreliable_messages_share_one_packet() {
    let (mut client, _) = pair(&[ChannelKind::Unreliable]);
    for len in 0..5 {
        client
            .send_message(CHANNEL, Bytes::from(vec![0xab; len]))
            .unwrap();
    }

    let packet = write_packet(&mut client, Instant::now());
    assert_eq!(0, client.queued_messages(CHANNEL).unwrap());
    assert_eq!(5, bits::read_u8(&packet, HEADER_BITS).unwrap());
}

#[test]
fn large_unreliable_messages_fill_packet() {
    let (mut client, mut server) = pair(&[ChannelKind::Unreliable]);
    for i in 0..5 {
        client
            .send_message(CHANNEL, Bytes::from(vec![i; 256]))
            .unwrap();
    }

    let now = Instant::now();
    let packet = write_packet(&mut client, now);
    assert_eq!(785, packet.len());
    assert_eq!(3, bits::read_u8(&packet, HEADER_BITS).unwrap());
    assert_eq!(2, client.queued_messages(CHANNEL).unwrap());

    server.on_datagram_received(now, &packet).unwrap();
    let msgs = server.recv_messages(CHANNEL).unwrap();
    assert_eq!(3, msgs.len());
    for (i, msg) in (0..).zip(&msgs) {
        assert_eq!(&vec![i; 256][..], &msg[..]);
    }

    // the rest go out in the next packet
    let packet = write_packet(&mut client, now);
    server.on_datagram_received(now, &packet).unwrap();
    assert_eq!(2, server.recv_messages(CHANNEL).unwrap().len());
    assert_eq!(0, client.queued_messages(CHANNEL).unwrap());
}

#[test]
fn acks_under_client_to_server_loss() {
    const PACKETS: u32 = 32;

    let lost = |seq: u32| seq % 5 == 2 || seq >= 30;
    let (mut client, mut server) = pair(&[ChannelKind::Unreliable]);
    let now = Instant::now();

    for seq in 0..PACKETS {
        let to_server = write_packet(&mut client, now);
        if !lost(seq) {
            server.on_datagram_received(now, &to_server).unwrap();
        }
        let to_client = write_packet(&mut server, now);
        client.on_datagram_received(now, &to_client).unwrap();
    }

    let last_delivered = (0..PACKETS).rev().find(|&seq| !lost(seq)).unwrap();
    assert_eq!(29, last_delivered);
    assert_eq!(Some(last_delivered), server.newest_recv_seq());

    for seq in 0..PACKETS {
        assert_eq!(!lost(seq), server.is_packet_received(seq), "seq {seq}");
        assert_eq!(Some(!lost(seq)), client.is_packet_acked(seq), "seq {seq}");
    }
    for seq in 0..last_delivered {
        assert_eq!(Some(true), server.is_packet_acked(seq), "seq {seq}");
    }
    for seq in last_delivered..PACKETS {
        assert_eq!(Some(false), server.is_packet_acked(seq), "seq {seq}");
    }
}

#[test]
fn header_layout() {
    let (mut client, mut server) = pair(&[ChannelKind::Unreliable, ChannelKind::ReliableOrdered]);
    let now = Instant::now();

    // nothing received yet, so the ack and ack bits are all zero
    let first = write_packet(&mut client, now);
    assert_eq!(vec![0; 14], first);
    server.on_datagram_received(now, &first).unwrap();

    let reply = write_packet(&mut server, now);
    client.on_datagram_received(now, &reply).unwrap();

    #[rustfmt::skip]
    let expected = vec![
        1, 0, 0, 0, // seq
        0, 0, 0, 0, // ack
        1, 0, 0, 0, // ack bits
        0, 0,       // message counts
    ];
    assert_eq!(expected, write_packet(&mut client, now));
}

struct LossyLink {
    sent: usize,
    drop_every: usize,
}

impl LossyLink {
    const fn new(drop_every: usize) -> Self {
        Self {
            sent: 0,
            drop_every,
        }
    }

    fn deliver(&mut self, now: Instant, wire: &mut DatagramQueue, to: &mut Endpoint) {
        for datagram in wire.drain() {
            self.sent += 1;
            if self.sent % self.drop_every == 0 {
                continue;
            }
            to.on_datagram_received(now, &datagram.payload).unwrap();
        }
    }
}

fn send_acks(endpoint: &mut Endpoint, now: Instant, wire: &mut DatagramQueue) {
    let packet = write_packet(endpoint, now);
    wire.send_datagram(&packet, endpoint.remote()).unwrap();
}

#[test]
fn reliable_delivery_under_loss() {
    const MSGS: u8 = 20;

    let (mut client, mut server) = pair(&[ChannelKind::ReliableOrdered]);
    let sent = (0..MSGS)
        .map(|i| Bytes::from(vec![i; 100]))
        .collect::<Vec<_>>();
    for msg in &sent {
        client.send_message(CHANNEL, msg.clone()).unwrap();
    }

    let mut to_server = LossyLink::new(3);
    let mut to_client = LossyLink::new(4);
    let mut wire = DatagramQueue::default();
    let mut recv = Vec::new();
    let mut now = Instant::now();

    for _ in 0..200 {
        client.transmit_packets(now, &mut wire).unwrap();
        to_server.deliver(now, &mut wire, &mut server);
        recv.extend(server.recv_messages(CHANNEL).unwrap());

        send_acks(&mut server, now, &mut wire);
        to_client.deliver(now, &mut wire, &mut client);

        if recv.len() == sent.len() && client.queued_messages(CHANNEL).unwrap() == 0 {
            break;
        }
        now += Duration::from_millis(50);
    }

    // in order and exactly once
    assert_eq!(sent, recv);
    assert_eq!(0, client.queued_messages(CHANNEL).unwrap());
    assert!(client.stats().msgs_sent.0 >= usize::from(MSGS));
    assert_eq!(usize::from(MSGS), client.stats().msgs_acked.0);
    assert!(client.rtt().samples() > 0);
}

#[test]
fn reliable_resend_is_throttled() {
    let (mut client, _) = pair(&[ChannelKind::ReliableOrdered]);
    client
        .send_message(CHANNEL, Bytes::from_static(b"hello"))
        .unwrap();

    let start = Instant::now();
    let mut wire = DatagramQueue::default();
    assert_eq!(1, client.transmit_packets(start, &mut wire).unwrap());
    assert_eq!(
        0,
        client
            .transmit_packets(start + Duration::from_millis(99), &mut wire)
            .unwrap()
    );
    assert_eq!(
        1,
        client
            .transmit_packets(start + Duration::from_millis(100), &mut wire)
            .unwrap()
    );
    assert_eq!(2, wire.len());
    assert_eq!(1, client.queued_messages(CHANNEL).unwrap());
}

#[test]
fn duplicates_are_delivered_once() {
    let (mut client, mut server) = pair(&[ChannelKind::ReliableOrdered]);
    client.send_message(CHANNEL, Bytes::from_static(b"a")).unwrap();
    client.send_message(CHANNEL, Bytes::from_static(b"b")).unwrap();

    let start = Instant::now();
    let first = write_packet(&mut client, start);
    server.on_datagram_received(start, &first).unwrap();
    server.on_datagram_received(start, &first).unwrap();
    assert_eq!(
        vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
        server.recv_messages(CHANNEL).unwrap()
    );

    // the ack never reaches the client, so it resends
    let resend_at = start + Duration::from_millis(100);
    let resend = write_packet(&mut client, resend_at);
    server.on_datagram_received(resend_at, &resend).unwrap();
    assert!(server.recv_messages(CHANNEL).unwrap().is_empty());

    let Channel::ReliableOrdered(channel) = server.channel(CHANNEL).unwrap() else {
        panic!("expected a reliable channel");
    };
    assert_eq!(2, channel.next_recv_id().0);
    assert_eq!(0, channel.buffered_recv());
    // every copy is counted, but only delivered once
    assert_eq!(6, server.stats().msgs_recv.0);
}

#[test]
fn reliable_messages_wait_for_gaps() {
    let (mut client, mut server) = pair(&[ChannelKind::ReliableOrdered]);
    let start = Instant::now();

    client.send_message(CHANNEL, Bytes::from_static(b"a")).unwrap();
    let lost = write_packet(&mut client, start);
    client.send_message(CHANNEL, Bytes::from_static(b"b")).unwrap();
    // only "b" is due, since "a" was just sent
    let arrived = write_packet(&mut client, start);

    server.on_datagram_received(start, &arrived).unwrap();
    assert!(server.recv_messages(CHANNEL).unwrap().is_empty());

    server.on_datagram_received(start, &lost).unwrap();
    assert_eq!(
        vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
        server.recv_messages(CHANNEL).unwrap()
    );
}

#[test]
fn mixed_channels_in_one_packet() {
    let (mut client, mut server) = pair(&[ChannelKind::Unreliable, ChannelKind::ReliableOrdered]);
    let unreliable = ChannelIndex::new(0);
    let reliable = ChannelIndex::new(1);
    client
        .send_message(unreliable, Bytes::from_static(b"fire and forget"))
        .unwrap();
    client
        .send_message(reliable, Bytes::from_static(b"important"))
        .unwrap();

    let now = Instant::now();
    let mut wire = DatagramQueue::default();
    assert_eq!(1, client.transmit_packets(now, &mut wire).unwrap());
    assert_eq!(SERVER_ADDR.parse::<core::net::SocketAddr>().unwrap(), wire[0].to);
    for datagram in wire.drain() {
        server.on_datagram_received(now, &datagram.payload).unwrap();
    }

    assert_eq!(
        vec![Bytes::from_static(b"fire and forget")],
        server.recv_messages(unreliable).unwrap()
    );
    assert_eq!(
        vec![Bytes::from_static(b"important")],
        server.recv_messages(reliable).unwrap()
    );
    assert_eq!(client.stats().bytes_sent, server.stats().bytes_recv);
}

#[test]
fn unreliable_packing_can_reorder() {
    let (mut client, mut server) = pair(&[ChannelKind::Unreliable]);
    let big_a = Bytes::from(vec![1; 700]);
    let big_b = Bytes::from(vec![2; 700]);
    let small = Bytes::from(vec![3; 10]);
    for msg in [&big_a, &big_b, &small] {
        client.send_message(CHANNEL, msg.clone()).unwrap();
    }

    let now = Instant::now();
    let mut wire = DatagramQueue::default();
    assert_eq!(2, client.transmit_packets(now, &mut wire).unwrap());
    for datagram in wire.drain() {
        server.on_datagram_received(now, &datagram.payload).unwrap();
    }

    // the second large message doesn't fit after the first, but the small
    // one does, so it overtakes
    assert_eq!(vec![big_a, small, big_b], server.recv_messages(CHANNEL).unwrap());
}

#[test]
fn bandwidth_is_measured_both_ways() {
    // 96 header bits + 8 count bits + 10 length bits + 800 payload bits
    const PACKET_BYTES: usize = 115;

    let (mut client, mut server) = pair(&[ChannelKind::Unreliable]);
    let start = Instant::now();
    let mut wire = DatagramQueue::default();

    for at in [start, start + Duration::from_millis(500)] {
        client
            .send_message(CHANNEL, Bytes::from(vec![0; 100]))
            .unwrap();
        assert_eq!(1, client.transmit_packets(at, &mut wire).unwrap());
        for datagram in wire.drain() {
            assert_eq!(PACKET_BYTES, datagram.payload.len());
            server.on_datagram_received(at, &datagram.payload).unwrap();
        }
    }

    // two packets over half a second
    let expected = 460.0;
    assert!((client.send_speed() - expected).abs() < 1e-9);
    assert!((server.recv_speed() - expected).abs() < 1e-9);
    assert!(client.recv_speed().abs() < f64::EPSILON);
    assert!(server.send_speed().abs() < f64::EPSILON);
}
