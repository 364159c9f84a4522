//! Wire-alternative selection: node offset widths, lane direction and lane-type kinds,
//! connection maneuvers and signal-request access points.
//!
//! The application model carries these as explicit enums; the wire carries CHOICE indexes,
//! bit strings or zero/non-zero conventions. Selection on encode and recognition on decode
//! both live here so the two directions cannot drift apart.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use crate::message::common::{self, LATITUDE, LONGITUDE};
use crate::message::map::{ApproachKind, LaneKind, Node};
use log::warn;

/// NodeOffsetPointXY alternatives, in CHOICE index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOffsetVariant {
    /// node-XY1, Offset-B10 per axis
    Xy20,
    /// node-XY2, Offset-B11
    Xy22,
    /// node-XY3, Offset-B12
    Xy24,
    /// node-XY4, Offset-B13
    Xy26,
    /// node-XY5, Offset-B14
    Xy28,
    /// node-XY6, Offset-B16
    Xy32,
    /// node-LatLon, absolute position
    LatLon,
}

const NODE_OFFSET_ALTERNATIVES: u64 = 8;
const NODE_REGIONAL_INDEX: u64 = 7;

impl NodeOffsetVariant {
    const OFFSETS: [NodeOffsetVariant; 6] = [
        NodeOffsetVariant::Xy20,
        NodeOffsetVariant::Xy22,
        NodeOffsetVariant::Xy24,
        NodeOffsetVariant::Xy26,
        NodeOffsetVariant::Xy28,
        NodeOffsetVariant::Xy32,
    ];

    /// Narrowest offset variant for a vector of rounded length `magnitude` (centimetres).
    pub fn for_magnitude(magnitude: u64) -> Self {
        match magnitude {
            0..=511 => NodeOffsetVariant::Xy20,
            512..=1023 => NodeOffsetVariant::Xy22,
            1024..=2047 => NodeOffsetVariant::Xy24,
            2048..=4096 => NodeOffsetVariant::Xy26,
            4097..=8191 => NodeOffsetVariant::Xy28,
            _ => NodeOffsetVariant::Xy32,
        }
    }

    /// Variant for an XY offset: by rounded vector length, widened once more when one axis
    /// sits outside the selected pair's range (only `(4096, 0)` and `(0, 4096)` do).
    pub fn for_offset(x: i32, y: i32) -> Self {
        let magnitude = f64::from(x).hypot(f64::from(y)).round() as u64;
        let selected = Self::for_magnitude(magnitude);
        let fits = |v: Self| {
            v.axis_bounds()
                .map(|(lo, hi)| (lo..=hi).contains(&i64::from(x)) && (lo..=hi).contains(&i64::from(y)))
                .unwrap_or(false)
        };
        if fits(selected) {
            return selected;
        }
        Self::OFFSETS
            .iter()
            .copied()
            .skip_while(|&v| v != selected)
            .find(|&v| fits(v))
            .unwrap_or(NodeOffsetVariant::Xy32)
    }

    pub fn choice_index(self) -> u64 {
        match self {
            NodeOffsetVariant::Xy20 => 0,
            NodeOffsetVariant::Xy22 => 1,
            NodeOffsetVariant::Xy24 => 2,
            NodeOffsetVariant::Xy26 => 3,
            NodeOffsetVariant::Xy28 => 4,
            NodeOffsetVariant::Xy32 => 5,
            NodeOffsetVariant::LatLon => 6,
        }
    }

    pub fn from_choice_index(index: u64) -> Option<Self> {
        Self::OFFSETS
            .get(index as usize)
            .copied()
            .or(if index == 6 { Some(NodeOffsetVariant::LatLon) } else { None })
    }

    /// Per-axis inclusive range of an offset variant; `None` for lat/lon.
    pub fn axis_bounds(self) -> Option<(i64, i64)> {
        let bits = match self {
            NodeOffsetVariant::Xy20 => 10,
            NodeOffsetVariant::Xy22 => 11,
            NodeOffsetVariant::Xy24 => 12,
            NodeOffsetVariant::Xy26 => 13,
            NodeOffsetVariant::Xy28 => 14,
            NodeOffsetVariant::Xy32 => 16,
            NodeOffsetVariant::LatLon => return None,
        };
        Some((-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1))
    }
}

pub(crate) fn write_node_point(w: &mut BitWriter, node: &Node) -> Result<(), CodecError> {
    match *node {
        Node::Offset { x, y } => {
            let variant = NodeOffsetVariant::for_offset(x, y);
            w.write_index("delta", variant.choice_index(), NODE_OFFSET_ALTERNATIVES, false)?;
            let (lo, hi) = variant.axis_bounds().unwrap_or((i64::MIN, i64::MAX));
            w.write_constrained("delta.x", i64::from(x), lo, hi)?;
            w.write_constrained("delta.y", i64::from(y), lo, hi)
        }
        Node::LatLon { lat, lon } => {
            w.write_index(
                "delta",
                NodeOffsetVariant::LatLon.choice_index(),
                NODE_OFFSET_ALTERNATIVES,
                false,
            )?;
            w.write_constrained("delta.lon", i64::from(lon), LONGITUDE.0, LONGITUDE.1)?;
            w.write_constrained("delta.lat", i64::from(lat), LATITUDE.0, LATITUDE.1)
        }
    }
}

/// Read a node position; `None` for a regional node, which is skipped.
pub(crate) fn read_node_point(r: &mut BitReader<'_>) -> Result<Option<Node>, CodecError> {
    let index = r.read_choice_index("delta", NODE_OFFSET_ALTERNATIVES, false)?;
    if index == NODE_REGIONAL_INDEX {
        common::skip_regional_extension(r).map_err(|e| e.within("delta"))?;
        warn!("skipped regional node offset");
        return Ok(None);
    }
    match NodeOffsetVariant::from_choice_index(index) {
        Some(NodeOffsetVariant::LatLon) => {
            let lon = r.read_constrained("delta.lon", LONGITUDE.0, LONGITUDE.1)? as i32;
            let lat = r.read_constrained("delta.lat", LATITUDE.0, LATITUDE.1)? as i32;
            Ok(Some(Node::LatLon { lat, lon }))
        }
        Some(variant) => {
            let (lo, hi) = variant.axis_bounds().unwrap_or((i64::MIN, i64::MAX));
            let x = r.read_constrained("delta.x", lo, hi)? as i32;
            let y = r.read_constrained("delta.y", lo, hi)? as i32;
            Ok(Some(Node::Offset { x, y }))
        }
        None => Err(CodecError::invalid_bits("delta", index)),
    }
}

/// LaneDirection bit string: bit 0 ingress path, bit 1 egress path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneDirection {
    Ingress = 1,
    Egress = 2,
    Both = 3,
}

impl LaneDirection {
    pub fn for_approach(kind: ApproachKind) -> Self {
        match kind {
            ApproachKind::Inbound => LaneDirection::Ingress,
            ApproachKind::Outbound => LaneDirection::Egress,
            ApproachKind::Crosswalk => LaneDirection::Both,
        }
    }

    pub fn approach_kind(self) -> ApproachKind {
        match self {
            LaneDirection::Ingress => ApproachKind::Inbound,
            LaneDirection::Egress => ApproachKind::Outbound,
            LaneDirection::Both => ApproachKind::Crosswalk,
        }
    }

    pub fn bits(self) -> u64 {
        self as u64
    }

    /// A lane usable in neither direction is not a lane.
    pub fn from_bits(value: u64) -> Result<Self, CodecError> {
        match value {
            1 => Ok(LaneDirection::Ingress),
            2 => Ok(LaneDirection::Egress),
            3 => Ok(LaneDirection::Both),
            other => Err(CodecError::invalid_bits("directionalUse", other)),
        }
    }
}

/// LaneTypeAttributes alternatives this crate produces: vehicle lanes and crosswalks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneTypeAttributes {
    Vehicle(u8),
    Crosswalk(u16),
}

const LANE_TYPE_ALTERNATIVES: u64 = 8;

impl LaneTypeAttributes {
    /// Low 8 bits of the packed lane attributes for vehicle lanes, low 16 for crosswalks.
    pub fn for_lane(kind: LaneKind, attributes: u32) -> Self {
        match kind {
            LaneKind::Crosswalk => LaneTypeAttributes::Crosswalk((attributes & 0xffff) as u16),
            LaneKind::Traffic => LaneTypeAttributes::Vehicle((attributes & 0xff) as u8),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            LaneTypeAttributes::Vehicle(v) => u32::from(v),
            LaneTypeAttributes::Crosswalk(v) => u32::from(v),
        }
    }

    pub(crate) fn write(self, w: &mut BitWriter) -> Result<(), CodecError> {
        match self {
            LaneTypeAttributes::Vehicle(v) => {
                w.write_index("laneType", 0, LANE_TYPE_ALTERNATIVES, true)?;
                w.write_extensible_bit_field("laneType.vehicle", u64::from(v), 8)
            }
            LaneTypeAttributes::Crosswalk(v) => {
                w.write_index("laneType", 1, LANE_TYPE_ALTERNATIVES, true)?;
                w.write_bit_field("laneType.crosswalk", u64::from(v), 16)
            }
        }
    }

    pub(crate) fn read(r: &mut BitReader<'_>) -> Result<Self, CodecError> {
        match r.read_choice_index("laneType", LANE_TYPE_ALTERNATIVES, true)? {
            0 => Ok(LaneTypeAttributes::Vehicle(
                r.read_extensible_bit_field("laneType.vehicle", 8)? as u8,
            )),
            1 => Ok(LaneTypeAttributes::Crosswalk(
                r.read_bit_field("laneType.crosswalk", 16)? as u16,
            )),
            other => Err(CodecError::mismatch(
                "laneType",
                format!("lane type alternative {} not supported", other),
            )),
        }
    }
}

/// Maneuver of a single lane connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Maneuver {
    #[default]
    None,
    Straight,
    Left,
    Right,
    UTurn,
}

impl Maneuver {
    /// AllowedManeuvers bits; zero for `None`.
    pub fn bits(self) -> u64 {
        match self {
            Maneuver::None => 0,
            Maneuver::Straight => 0x1,
            Maneuver::Left => 0x2,
            Maneuver::Right => 0x4,
            Maneuver::UTurn => 0x8,
        }
    }

    /// Only single-movement patterns map to a maneuver; anything else reads as `None`.
    pub fn from_bits(bits: u64) -> Self {
        match bits {
            0x1 => Maneuver::Straight,
            0x2 => Maneuver::Left,
            0x4 => Maneuver::Right,
            0x8 => Maneuver::UTurn,
            _ => Maneuver::None,
        }
    }
}

/// Where a signal request enters or leaves the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPoint {
    Lane(u8),
    Approach(u8),
}

const ACCESS_POINT_ALTERNATIVES: u64 = 3;

impl AccessPoint {
    /// Build from the flat `(approach, lane)` id pair where zero means absent.
    /// A lane id wins over an approach id.
    pub fn from_ids(approach_id: u8, lane_id: u8) -> Option<Self> {
        if lane_id != 0 {
            Some(AccessPoint::Lane(lane_id))
        } else if approach_id != 0 {
            Some(AccessPoint::Approach(approach_id))
        } else {
            None
        }
    }

    /// The flat `(approach, lane)` pair, zero for the alternative not chosen.
    pub fn ids(self) -> (u8, u8) {
        match self {
            AccessPoint::Lane(id) => (0, id),
            AccessPoint::Approach(id) => (id, 0),
        }
    }

    pub(crate) fn write(self, w: &mut BitWriter, field: &str) -> Result<(), CodecError> {
        let res = match self {
            AccessPoint::Lane(id) => w
                .write_index("lane", 0, ACCESS_POINT_ALTERNATIVES, true)
                .and_then(|_| w.write_constrained("lane", i64::from(id), 0, 255)),
            AccessPoint::Approach(id) => w
                .write_index("approach", 1, ACCESS_POINT_ALTERNATIVES, true)
                .and_then(|_| w.write_constrained("approach", i64::from(id), 0, 15)),
        };
        res.map_err(|e| e.within(field))
    }

    pub(crate) fn read(r: &mut BitReader<'_>, field: &str) -> Result<Self, CodecError> {
        let read = |r: &mut BitReader<'_>| -> Result<AccessPoint, CodecError> {
            match r.read_choice_index("", ACCESS_POINT_ALTERNATIVES, true)? {
                0 => Ok(AccessPoint::Lane(r.read_constrained("lane", 0, 255)? as u8)),
                1 => Ok(AccessPoint::Approach(r.read_constrained("approach", 0, 15)? as u8)),
                _ => Err(CodecError::mismatch("connection", "connection access points not supported")),
            }
        };
        read(r).map_err(|e| e.within(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ErrorKind;

    #[test]
    fn magnitude_thresholds_are_boundary_exact() {
        use NodeOffsetVariant::*;
        let cases = [
            (0, Xy20),
            (511, Xy20),
            (512, Xy22),
            (1023, Xy22),
            (1024, Xy24),
            (2047, Xy24),
            (2048, Xy26),
            (4096, Xy26),
            (4097, Xy28),
            (8191, Xy28),
            (8192, Xy32),
        ];
        for (d, expected) in cases {
            assert_eq!(NodeOffsetVariant::for_magnitude(d), expected, "magnitude {}", d);
        }
    }

    #[test]
    fn offset_selection_is_monotonic() {
        let mut last = 0;
        for d in 0..20_000 {
            let idx = NodeOffsetVariant::for_offset(d, 0).choice_index();
            assert!(idx >= last, "variant shrank at {}", d);
            last = idx;
        }
    }

    #[test]
    fn offset_selection_rounds_the_vector_length() {
        // sqrt(361^2 + 361^2) = 510.53 -> 511
        assert_eq!(NodeOffsetVariant::for_offset(361, 361), NodeOffsetVariant::Xy20);
        // sqrt(362^2 + 362^2) = 511.95 -> 512
        assert_eq!(NodeOffsetVariant::for_offset(362, 362), NodeOffsetVariant::Xy22);
        assert_eq!(NodeOffsetVariant::for_offset(-300, 400), NodeOffsetVariant::Xy20);
    }

    #[test]
    fn axis_on_the_4096_threshold_widens() {
        assert_eq!(NodeOffsetVariant::for_offset(4096, 0), NodeOffsetVariant::Xy28);
        assert_eq!(NodeOffsetVariant::for_offset(4095, 0), NodeOffsetVariant::Xy26);
        assert_eq!(NodeOffsetVariant::for_offset(0, -4096), NodeOffsetVariant::Xy26);
    }

    #[test]
    fn node_points_round_trip() {
        let nodes = [
            Node::Offset { x: 100, y: 50 },
            Node::Offset { x: -4096, y: 0 },
            Node::Offset { x: 4096, y: 0 },
            Node::Offset { x: 32767, y: -32768 },
            Node::LatLon { lat: 423_000_000, lon: -835_000_000 },
        ];
        for node in nodes {
            let mut w = BitWriter::new();
            write_node_point(&mut w, &node).expect("encode");
            let bytes = w.into_bytes();
            let back = read_node_point(&mut BitReader::new(&bytes)).expect("decode");
            assert_eq!(back, Some(node));
        }
    }

    #[test]
    fn offset_beyond_widest_variant_is_rejected() {
        let mut w = BitWriter::new();
        let err = write_node_point(&mut w, &Node::Offset { x: 40_000, y: 0 }).expect_err("too far");
        assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
        assert_eq!(err.path(), "delta.x");
    }

    #[test]
    fn lane_direction_zero_is_invalid() {
        let err = LaneDirection::from_bits(0).expect_err("no direction");
        assert_eq!(err.kind(), ErrorKind::InvalidBitPattern);
        assert_eq!(LaneDirection::from_bits(3).expect("both"), LaneDirection::Both);
    }

    #[test]
    fn maneuver_patterns() {
        for m in [Maneuver::Straight, Maneuver::Left, Maneuver::Right, Maneuver::UTurn] {
            assert_eq!(Maneuver::from_bits(m.bits()), m);
        }
        assert_eq!(Maneuver::from_bits(0x3), Maneuver::None);
        assert_eq!(Maneuver::from_bits(0), Maneuver::None);
    }

    #[test]
    fn access_point_lane_wins_over_approach() {
        assert_eq!(AccessPoint::from_ids(2, 5), Some(AccessPoint::Lane(5)));
        assert_eq!(AccessPoint::from_ids(2, 0), Some(AccessPoint::Approach(2)));
        assert_eq!(AccessPoint::from_ids(0, 0), None);
        assert_eq!(AccessPoint::Approach(2).ids(), (2, 0));
    }

    #[test]
    fn lane_type_selection_follows_lane_kind() {
        let attrs = 0x0012_3456;
        assert_eq!(
            LaneTypeAttributes::for_lane(LaneKind::Traffic, attrs),
            LaneTypeAttributes::Vehicle(0x56)
        );
        assert_eq!(
            LaneTypeAttributes::for_lane(LaneKind::Crosswalk, attrs),
            LaneTypeAttributes::Crosswalk(0x3456)
        );
    }
}
