#![no_main]
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let file = lazydis::formats::sniffer::identify("<fuzz>", Bytes::copy_from_slice(data));
    let _ = file.to_string();
});
