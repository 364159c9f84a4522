//! RTCMcorrections: opaque GNSS correction payload.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use crate::message::common::{
    below, read_minute_of_year, read_msg_count, skip_regional_list, unsupported,
    write_minute_of_year, write_msg_count, MINUTE_OF_YEAR_UNAVAILABLE,
};
use log::trace;

/// Largest single RTCMmessage.
pub const MAX_PAYLOAD: usize = 1023;

wire_enum! {
    #[derive(Default)]
    pub enum RtcmRevision [extensible = true] {
        #[default]
        Unknown = 0,
        Rev2 = 1,
        Rev3 = 2,
        Reserved = 3,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rtcm {
    pub msg_count: u8,
    pub revision: RtcmRevision,
    pub minute_of_year: Option<u32>,
    /// One RTCM message, 1..=1023 octets.
    pub payload: Vec<u8>,
}

pub(crate) fn write(rtcm: &Rtcm, w: &mut BitWriter) -> Result<(), CodecError> {
    if rtcm.payload.is_empty() {
        return Err(CodecError::missing("msgs"));
    }
    let moy = below(rtcm.minute_of_year, MINUTE_OF_YEAR_UNAVAILABLE);
    // timeStamp, anchorPoint, rtcmHeader, regional
    w.write_preamble(true, &[moy.is_some(), false, false, false]);
    write_msg_count(w, "msgCnt", rtcm.msg_count)?;
    rtcm.revision.write(w, "rev")?;
    if let Some(moy) = moy {
        write_minute_of_year(w, "timeStamp", moy)?;
    }
    w.write_count("msgs", 1, 1, 5)?;
    w.write_octet_string("msgs[0]", &rtcm.payload, 1, MAX_PAYLOAD)
}

pub(crate) fn read(r: &mut BitReader<'_>) -> Result<Rtcm, CodecError> {
    let pre = r.read_preamble("", true, 4)?;
    let msg_count = read_msg_count(r, "msgCnt")?;
    let revision = RtcmRevision::read(r, "rev")?;
    let minute_of_year = if pre.is_present(0) {
        Some(read_minute_of_year(r, "timeStamp")?).filter(|&m| m != MINUTE_OF_YEAR_UNAVAILABLE)
    } else {
        None
    };
    if pre.is_present(1) {
        return Err(unsupported("anchorPoint"));
    }
    if pre.is_present(2) {
        return Err(unsupported("rtcmHeader"));
    }
    let count = r.read_count("msgs", 1, 5)?;
    let mut payload = Vec::new();
    for i in 0..count {
        let msg = r.read_octet_string(&format!("msgs[{}]", i), 1, MAX_PAYLOAD)?;
        if payload.is_empty() {
            payload = msg;
        }
    }
    if count > 1 {
        trace!("RTCM: kept the first of {} correction messages", count);
    }
    if pre.is_present(3) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(Rtcm {
        msg_count,
        revision,
        minute_of_year,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ErrorKind;

    #[test]
    fn empty_payload_is_rejected() {
        let err = write(&Rtcm::default(), &mut BitWriter::new()).expect_err("empty");
        assert_eq!(err, CodecError::missing("msgs"));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let rtcm = Rtcm {
            payload: vec![0; MAX_PAYLOAD + 1],
            ..Default::default()
        };
        let err = write(&rtcm, &mut BitWriter::new()).expect_err("too long");
        assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
        assert_eq!(err.path(), "msgs[0]");
    }

    #[test]
    fn first_message_is_kept() {
        let mut w = BitWriter::new();
        w.write_preamble(true, &[false, false, false, false]);
        write_msg_count(&mut w, "msgCnt", 3).expect("cnt");
        RtcmRevision::Rev3.write(&mut w, "rev").expect("rev");
        w.write_count("msgs", 2, 1, 5).expect("count");
        w.write_octet_string("m0", &[0xd3, 0x00], 1, MAX_PAYLOAD).expect("m0");
        w.write_octet_string("m1", &[0xd3, 0x01, 0x02], 1, MAX_PAYLOAD).expect("m1");
        let bytes = w.into_bytes();
        let rtcm = read(&mut BitReader::new(&bytes)).expect("decode");
        assert_eq!(rtcm.payload, vec![0xd3, 0x00]);
        assert_eq!(rtcm.revision, RtcmRevision::Rev3);
        assert_eq!(rtcm.msg_count, 3);
    }
}
