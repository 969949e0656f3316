/// 32-bit djb2 (`h = h * 33 + unit`, seed 5381) over UTF-16 code units, so
/// values agree with the page-side hash.
pub fn djb2(s: &str) -> u32 {
    s.encode_utf16()
        .fold(5381u32, |h, unit| h.wrapping_mul(33).wrapping_add(unit as u32))
}
