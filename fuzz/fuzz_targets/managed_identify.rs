#![no_main]
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

// exercises the CLI header reader on every input
fuzz_target!(|data: &[u8]| {
    let _ = lazydis::formats::sniffer::identify(
        "assets/bin/Data/Managed/Assembly-CSharp.dll",
        Bytes::copy_from_slice(data),
    );
});
