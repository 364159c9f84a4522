//! # j2735-uper: SAE J2735 message codec
//!
//! Encodes and decodes the V2X messages exchanged between roadside units and vehicles
//! (MAP, SPAT, BSM, RTCM, SRM, SSM) in ASN.1 Unaligned Packed Encoding Rules, wrapped in a
//! `MessageFrame`. Callers work with flat application structs; the codec owns the mapping
//! to the nested wire structure, picks compact wire variants, and validates on the way in.
//!
//! ## Layers
//!
//! - [`bits`]: MSB-first bit writer and bounds-checked bit reader
//! - [`per`]: UPER primitives (constrained integers, length determinants, preambles,
//!   CHOICE/ENUMERATED indices, open types, extension skipping)
//! - [`bitfield`]: named-bit BIT STRING packing
//! - [`variant`]: wire-variant selection (node offsets, lane direction and type,
//!   maneuvers, access points)
//! - [`message`]: one adapter per message type
//! - [`frame`]: `MessageFrame` dispatch and multi-frame buffers
//!
//! ## Errors
//!
//! Every failure is a [`CodecError`] carrying a dotted path to the offending field, e.g.
//! `MapData.intersections[0].laneSet[2].nodeList.nodes`. Nothing partially decoded is
//! returned.
//!
//! ## Usage
//!
//! ```
//! use j2735_uper::message::rtcm::Rtcm;
//! use j2735_uper::{decode, encode_to_vec, Frame};
//!
//! let frame = Frame::Rtcm(Rtcm {
//!     msg_count: 1,
//!     payload: vec![0xd3, 0x00, 0x13],
//!     ..Default::default()
//! });
//! let bytes = encode_to_vec(&frame).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), frame);
//! ```

pub mod bitfield;
pub mod bits;
pub mod codec;
pub mod frame;
pub mod message;
pub mod per;
pub mod variant;

pub use codec::{bits_to_bytes, decode, decode_with_extent, encode, encode_to_vec, CodecError, ErrorKind};
pub use frame::{decode_frames, encode_frames, DecodedFrame, Frame, FrameDecodeResult, MessageId, RemovedFrame};
pub use message::bsm::Bsm;
pub use message::common::Position3D;
pub use message::map::{Approach, ApproachKind, Connection, Lane, LaneKind, MapData, MapLayout, Node};
pub use message::rtcm::Rtcm;
pub use message::spat::{MovementPhase, PhaseState, Spat};
pub use message::srm::Srm;
pub use message::ssm::Ssm;
pub use variant::{AccessPoint, Maneuver, NodeOffsetVariant};
