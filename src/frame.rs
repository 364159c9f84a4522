//! MessageFrame envelope: message id plus the payload as an open type.
//!
//! [`Frame`] is the tagged union callers hand to [`crate::encode`] and get back from
//! [`crate::decode`]. [`decode_frames`] walks a buffer holding several concatenated frames;
//! a frame that fails validation is reported and skipped, and decoding carries on with the
//! next one as long as its envelope could be delimited.

use crate::bits::{BitReader, BitWriter};
use crate::codec::{self, bits_to_bytes, CodecError, ErrorKind};
use crate::message::bsm::{self, Bsm};
use crate::message::map::{self, MapData};
use crate::message::rtcm::{self, Rtcm};
use crate::message::spat::{self, Spat};
use crate::message::srm::{self, Srm};
use crate::message::ssm::{self, Ssm};
use log::{trace, warn};

/// DSRCmsgID values of the supported messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    MapData = 18,
    Spat = 19,
    BasicSafetyMessage = 20,
    RtcmCorrections = 28,
    SignalRequest = 29,
    SignalStatus = 30,
}

impl MessageId {
    pub fn from_u16(id: u16) -> Option<Self> {
        match id {
            18 => Some(MessageId::MapData),
            19 => Some(MessageId::Spat),
            20 => Some(MessageId::BasicSafetyMessage),
            28 => Some(MessageId::RtcmCorrections),
            29 => Some(MessageId::SignalRequest),
            30 => Some(MessageId::SignalStatus),
            _ => None,
        }
    }

    pub fn value(self) -> u16 {
        self as u16
    }

    /// ASN.1 type name of the payload; prefixes error paths.
    pub fn type_name(self) -> &'static str {
        match self {
            MessageId::MapData => "MapData",
            MessageId::Spat => "SPAT",
            MessageId::BasicSafetyMessage => "BasicSafetyMessage",
            MessageId::RtcmCorrections => "RTCMcorrections",
            MessageId::SignalRequest => "SignalRequestMessage",
            MessageId::SignalStatus => "SignalStatusMessage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Map(MapData),
    Spat(Spat),
    Bsm(Bsm),
    Rtcm(Rtcm),
    Srm(Srm),
    Ssm(Ssm),
}

impl Frame {
    pub fn message_id(&self) -> MessageId {
        match self {
            Frame::Map(_) => MessageId::MapData,
            Frame::Spat(_) => MessageId::Spat,
            Frame::Bsm(_) => MessageId::BasicSafetyMessage,
            Frame::Rtcm(_) => MessageId::RtcmCorrections,
            Frame::Srm(_) => MessageId::SignalRequest,
            Frame::Ssm(_) => MessageId::SignalStatus,
        }
    }
}

impl From<MapData> for Frame {
    fn from(m: MapData) -> Self {
        Frame::Map(m)
    }
}

impl From<Spat> for Frame {
    fn from(m: Spat) -> Self {
        Frame::Spat(m)
    }
}

impl From<Bsm> for Frame {
    fn from(m: Bsm) -> Self {
        Frame::Bsm(m)
    }
}

impl From<Rtcm> for Frame {
    fn from(m: Rtcm) -> Self {
        Frame::Rtcm(m)
    }
}

impl From<Srm> for Frame {
    fn from(m: Srm) -> Self {
        Frame::Srm(m)
    }
}

impl From<Ssm> for Frame {
    fn from(m: Ssm) -> Self {
        Frame::Ssm(m)
    }
}

/// A delimited but not yet interpreted frame.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub message_id: u16,
    pub payload: Vec<u8>,
    /// Bytes the whole envelope occupies.
    pub extent: usize,
}

pub(crate) fn write_frame(w: &mut BitWriter, frame: &Frame) -> Result<(), CodecError> {
    let id = frame.message_id();
    let mut payload = BitWriter::with_capacity(64);
    let res = match frame {
        Frame::Map(m) => map::write(m, &mut payload),
        Frame::Spat(m) => spat::write(m, &mut payload),
        Frame::Bsm(m) => bsm::write(m, &mut payload),
        Frame::Rtcm(m) => rtcm::write(m, &mut payload),
        Frame::Srm(m) => srm::write(m, &mut payload),
        Frame::Ssm(m) => ssm::write(m, &mut payload),
    };
    res.map_err(|e| e.within(id.type_name()))?;
    trace!("{}: payload {} bits", id.type_name(), payload.bit_len());

    // MessageFrame is extensible with no OPTIONAL components.
    w.write_preamble(true, &[]);
    w.write_constrained("messageId", i64::from(id.value()), 0, 32_767)?;
    w.write_open_type("value", payload)
}

pub(crate) fn read_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let mut r = BitReader::new(bytes);
    let pre = r.read_preamble("MessageFrame", true, 0)?;
    let message_id = r.read_constrained("messageId", 0, 32_767)? as u16;
    let payload = r.read_open_type("value")?;
    r.skip_extensions("MessageFrame", &pre)?;
    Ok(Envelope {
        message_id,
        payload,
        extent: bits_to_bytes(r.position()),
    })
}

pub(crate) fn adapt_payload(envelope: &Envelope) -> Result<Frame, CodecError> {
    let id = MessageId::from_u16(envelope.message_id).ok_or_else(|| {
        CodecError::mismatch(
            "messageId",
            format!("message id {} not supported", envelope.message_id),
        )
    })?;
    let mut r = BitReader::new(&envelope.payload);
    let res = match id {
        MessageId::MapData => map::read(&mut r).map(Frame::Map),
        MessageId::Spat => spat::read(&mut r).map(Frame::Spat),
        MessageId::BasicSafetyMessage => bsm::read(&mut r).map(Frame::Bsm),
        MessageId::RtcmCorrections => rtcm::read(&mut r).map(Frame::Rtcm),
        MessageId::SignalRequest => srm::read(&mut r).map(Frame::Srm),
        MessageId::SignalStatus => ssm::read(&mut r).map(Frame::Ssm),
    };
    let frame = res.map_err(|e| e.within(id.type_name()))?;
    if r.remaining() >= 8 {
        return Err(CodecError::mismatch(
            id.type_name(),
            format!("{} octet(s) left after the payload", r.remaining() / 8),
        ));
    }
    Ok(frame)
}

/// Result of decoding a buffer of concatenated frames.
#[derive(Debug, Default)]
pub struct FrameDecodeResult {
    /// Frames that decoded and passed validation.
    pub frames: Vec<DecodedFrame>,
    /// Frames that were delimited but rejected, and any undecodable tail.
    pub removed: Vec<RemovedFrame>,
}

#[derive(Debug)]
pub struct DecodedFrame {
    pub frame: Frame,
    pub byte_range: (usize, usize),
}

#[derive(Debug)]
pub struct RemovedFrame {
    pub byte_range: (usize, usize),
    pub kind: ErrorKind,
    pub reason: String,
}

/// Decode every frame in `bytes`. Rejected frames are moved to `removed` and skipped.
/// An envelope that cannot be delimited ends the walk; the rest of the buffer is reported
/// as one removed range.
pub fn decode_frames(bytes: &[u8]) -> FrameDecodeResult {
    let mut result = FrameDecodeResult::default();
    let mut offset = 0;
    while offset < bytes.len() {
        let (consumed, decoded) = codec::decode_with_extent(&bytes[offset..]);
        if consumed == 0 {
            if let Err(e) = decoded {
                warn!("frame at byte {}: {}; dropping {} trailing byte(s)", offset, e, bytes.len() - offset);
                result.removed.push(RemovedFrame {
                    byte_range: (offset, bytes.len()),
                    kind: e.kind(),
                    reason: e.to_string(),
                });
            }
            break;
        }
        let byte_range = (offset, offset + consumed);
        match decoded {
            Ok(frame) => result.frames.push(DecodedFrame { frame, byte_range }),
            Err(e) => {
                warn!("frame at bytes {:?} removed: {}", byte_range, e);
                result.removed.push(RemovedFrame {
                    byte_range,
                    kind: e.kind(),
                    reason: e.to_string(),
                });
            }
        }
        offset += consumed;
    }
    result
}

/// Encode frames back to back, each padded to a whole octet.
pub fn encode_frames<'a, I>(frames: I) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut out = Vec::new();
    for frame in frames {
        out.extend(codec::encode_to_vec(frame)?);
    }
    Ok(out)
}

impl FrameDecodeResult {
    /// Re-encode only the frames that decoded cleanly.
    pub fn encode_compliant(&self) -> Result<Vec<u8>, CodecError> {
        encode_frames(self.frames.iter().map(|d| &d.frame))
    }
}
