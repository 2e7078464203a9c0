#![no_main]

use {arbitrary::Arbitrary, libfuzzer_sys::fuzz_target, tether_transport::seq_buf::SeqBuf};

#[derive(Debug, Arbitrary)]
enum OpKind {
    Insert,
    Remove,
}

#[derive(Debug, Arbitrary)]
struct Op {
    kind: OpKind,
    key: u16,
    value: u16,
}

fuzz_target!(|input: Box<[Op]>| {
    let mut buf = SeqBuf::<u16>::with_capacity(256);

    for op in input {
        let key = u32::from(op.key);
        match op.kind {
            OpKind::Insert => {
                buf.insert(key, op.value);
                assert_eq!(Some(&op.value), buf.get(key));
            }
            OpKind::Remove => {
                buf.remove(key);
                assert!(!buf.contains(key));
            }
        }
        assert!(buf.len() <= buf.capacity());
    }
});
