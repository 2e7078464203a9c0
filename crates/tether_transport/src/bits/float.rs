//! Conversion between `f32` and IEEE-754 half-precision bit patterns.
//!
//! Rounding is round-to-nearest, ties-to-even. Values out of range become
//! infinity, values too small become signed zero, and NaN payloads keep their
//! high bits.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    reason = "IEEE-754 bit manipulation"
)]

pub fn f32_to_f16_bits(value: f32) -> u16 {
    let x = value.to_bits();
    let sign = (x & 0x8000_0000) >> 16;
    let exp = x & 0x7f80_0000;
    let man = x & 0x007f_ffff;

    // inf or NaN
    if exp == 0x7f80_0000 {
        let nan_bit = if man == 0 { 0 } else { 0x0200 };
        return (sign | 0x7c00 | nan_bit | (man >> 13)) as u16;
    }

    let half_exp = ((exp >> 23) as i32) - 127 + 15;
    if half_exp >= 0x1f {
        return (sign | 0x7c00) as u16;
    }

    if half_exp <= 0 {
        // subnormal or zero
        if 14 - half_exp > 24 {
            return sign as u16;
        }
        let man = man | 0x0080_0000;
        let mut half_man = man >> (14 - half_exp);
        let round_bit = 1u32 << (13 - half_exp);
        if (man & round_bit) != 0 && (man & (3 * round_bit - 1)) != 0 {
            half_man += 1;
        }
        return (sign | half_man) as u16;
    }

    let half_exp = (half_exp as u32) << 10;
    let half_man = man >> 13;
    let round_bit = 0x0000_1000;
    let bits = sign | half_exp | half_man;
    if (man & round_bit) != 0 && (man & (3 * round_bit - 1)) != 0 {
        // a carry out of the mantissa correctly bumps the exponent
        (bits + 1) as u16
    } else {
        bits as u16
    }
}

pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let bits = u32::from(bits);
    if bits & 0x7fff == 0 {
        return f32::from_bits(bits << 16);
    }

    let sign = (bits & 0x8000) << 16;
    let half_exp = bits & 0x7c00;
    let half_man = bits & 0x03ff;

    if half_exp == 0x7c00 {
        return if half_man == 0 {
            f32::from_bits(sign | 0x7f80_0000)
        } else {
            f32::from_bits(sign | 0x7fc0_0000 | (half_man << 13))
        };
    }

    if half_exp == 0 {
        // subnormal, normalize by shifting the leading one into the implicit bit
        let e = (half_man as u16).leading_zeros() - 6;
        let exp = (127 - 15 - e) << 23;
        let man = (half_man << (14 + e)) & 0x007f_ffff;
        return f32::from_bits(sign | exp | man);
    }

    let exp = (((half_exp >> 10) as i32 - 15 + 127) as u32) << 23;
    let man = half_man << 13;
    f32::from_bits(sign | exp | man)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_patterns() {
        assert_eq!(0x0000, f32_to_f16_bits(0.0));
        assert_eq!(0x8000, f32_to_f16_bits(-0.0));
        assert_eq!(0x3c00, f32_to_f16_bits(1.0));
        assert_eq!(0xc000, f32_to_f16_bits(-2.0));
        assert_eq!(0x7bff, f32_to_f16_bits(65504.0));
        assert_eq!(0x7c00, f32_to_f16_bits(1e6));
        assert_eq!(0xfc00, f32_to_f16_bits(f32::NEG_INFINITY));
        assert_eq!(0x0001, f32_to_f16_bits(5.960_464_5e-8));
        assert_eq!(0x0000, f32_to_f16_bits(1e-10));
        assert_eq!(0x7e00, f32_to_f16_bits(f32::NAN) & 0x7e00);
    }

    #[test]
    fn ties_round_to_even() {
        // 1 + 2^-11 is halfway between 1.0 and the next half, which is odd
        assert_eq!(0x3c00, f32_to_f16_bits(1.0 + 2f32.powi(-11)));
        // 1 + 3 * 2^-11 is halfway between two halves, rounds up to the even one
        assert_eq!(0x3c02, f32_to_f16_bits(1.0 + 3.0 * 2f32.powi(-11)));
    }

    #[test]
    fn widening_is_exact() {
        for bits in 0..=u16::MAX {
            let wide = f16_bits_to_f32(bits);
            if wide.is_nan() {
                continue;
            }
            assert_eq!(bits, f32_to_f16_bits(wide), "{bits:#06x} -> {wide}");
        }
    }
}
