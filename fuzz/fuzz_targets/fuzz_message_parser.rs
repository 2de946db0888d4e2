#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use async_snmpd::pdu::{Message, Pdu};

fuzz_target!(|data: &[u8]| {
    let bytes = Bytes::copy_from_slice(data);

    // Fuzz the community message decoder
    let _ = Message::decode(bytes.clone());

    // Fuzz the PDU decoder directly
    let mut decoder = async_snmpd::ber::Decoder::new(bytes.clone());
    let _ = Pdu::decode(&mut decoder);
});
