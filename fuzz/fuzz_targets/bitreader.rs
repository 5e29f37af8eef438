#![no_main]

use bitstream::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = BitReader::new(data);
    let mut idx = 0usize;

    // Input bytes pick a bounded sequence of reads.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 6;
        idx += 1;

        match op {
            0 => {
                let _ = reader.read_bit();
            }
            1 => {
                let bits = (data[idx - 1] / 6 % 64).saturating_add(1);
                let _ = reader.read_bits(bits);
            }
            2 => {
                let _ = reader.read_ubitvar();
            }
            3 => {
                let bits = usize::from(data[idx - 1]);
                if let Ok(mut window) = reader.take_bits(bits) {
                    let _ = window.read_ubitvar();
                }
            }
            4 => {
                let _ = reader.read_varu32();
            }
            _ => {
                let _ = reader.read_vars32();
            }
        }
    }
});
