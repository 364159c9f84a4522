//! Decoder fuzz target: feed arbitrary bytes to the frame decoder.
//! Neither decoding nor re-encoding what decoded may panic.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let result = j2735_uper::decode_frames(data);
    for decoded in &result.frames {
        if let Ok(bytes) = j2735_uper::encode_to_vec(&decoded.frame) {
            let _ = j2735_uper::decode(&bytes);
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
