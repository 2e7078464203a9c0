#![no_main]

use {
    arbitrary::Arbitrary,
    libfuzzer_sys::fuzz_target,
    tether_transport::bits::{self, BitsError},
};

#[derive(Debug, Arbitrary)]
struct Write {
    offset: u16,
    value: u32,
    bits: u8,
}

fuzz_target!(|input: (Vec<u8>, Box<[Write]>)| {
    let (mut buf, writes) = input;

    for write in writes {
        let offset = usize::from(write.offset);
        let width = u32::from(write.bits % 33);
        let mask = if width == 32 {
            u32::MAX
        } else {
            (1 << width) - 1
        };

        let before = buf.clone();
        match bits::write_uint(&mut buf, offset, write.value, width) {
            Ok(end) => {
                assert_eq!(offset + width as usize, end);
                assert_eq!(
                    Ok(write.value & mask),
                    bits::read_uint(&buf, offset, width)
                );
            }
            Err(BitsError::BufferOverrun { .. }) => {
                assert_eq!(before, buf);
                assert!(bits::read_uint(&buf, offset, width).is_err());
            }
            Err(err) => panic!("unexpected error {err:?}"),
        }
    }
});
