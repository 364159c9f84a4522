//! MapData: intersection geometry.
//!
//! The application model is approach-centric (up to 15 approaches, each with ordered lanes);
//! the wire is geometry-centric (IntersectionGeometry blocks, each with a flat lane set and a
//! reference lane width/speed). Two layouts bridge them:
//!
//! - **Single group**: one geometry block. The reference width and speed start from the first
//!   lane of the first approach and are chained: a lane emits a width or speed delta on its
//!   first node only when it differs from the previous reference, which then moves along.
//! - **Multi group**: one geometry block per distinct approach speed, each with a fixed
//!   reference width; width deltas are relative to that and nothing is chained.
//!
//! Encode picks the layout from [`MapData::layout`]. Decode picks it from the block count
//! (one block is always read back as [`MapLayout::SingleGroup`]).
//!
//! Decode is parsed into private wire structs first and then adapted, so that every
//! validation failure happens before any part of the model is handed back.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use crate::message::common::{
    below, read_intersection_ref, read_minute_of_year, read_msg_count,
    skip_descriptive_name, skip_regional_extension, skip_regional_list, unsupported,
    write_intersection_ref, write_msg_count, Position3D, VELOCITY_UNAVAILABLE,
};
use crate::variant::{self, LaneDirection, LaneTypeAttributes, Maneuver};
use log::{trace, warn};

pub const MAX_APPROACHES: usize = 15;
pub const MIN_NODES: usize = 2;
pub const MAX_NODES: usize = 63;

const LANE_WIDTH_MAX: i64 = 32_767;
const LAYER_TYPES: u64 = 8;
const LAYER_INTERSECTION_DATA: u64 = 3;
const SPEED_LIMIT_TYPES: u64 = 13;
const VEHICLE_MAX_SPEED: u64 = 5;
const LANE_DATA_ATTRIBUTES: u64 = 7;
const LANE_DATA_SPEED_LIMITS: u64 = 5;
const NODE_LIST_ALTERNATIVES: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproachKind {
    Inbound,
    Outbound,
    Crosswalk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneKind {
    #[default]
    Traffic,
    Crosswalk,
}

/// Which wire layout produced, or must produce, the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapLayout {
    #[default]
    SingleGroup,
    MultiGroup,
}

/// What a decoded map carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapFeatures {
    pub elevation: bool,
    pub geometry: bool,
    pub speed_limits: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapData {
    pub intersection_id: u16,
    /// Road regulator id, 0 when none.
    pub region_id: u16,
    pub revision: u8,
    /// Filled on decode; ignored on encode.
    pub features: MapFeatures,
    pub reference: Position3D,
    /// At most [`MAX_APPROACHES`]; decode returns them ordered by id.
    pub approaches: Vec<Approach>,
    /// Distinct approach speeds, filled on decode; encode recomputes them.
    pub speeds: Vec<Option<u16>>,
    pub layout: MapLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approach {
    /// 1..=15
    pub id: u8,
    pub kind: ApproachKind,
    /// Velocity in 0.02 m/s units; `None`, 0 or 8191 when unknown, always `None` for
    /// crosswalks after decode.
    pub speed_limit: Option<u16>,
    pub lanes: Vec<Lane>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lane {
    pub id: u8,
    pub kind: LaneKind,
    /// Low 8 bits (16 for crosswalks): lane-type attributes; bits 8..20: allowed maneuvers.
    pub attributes: u32,
    /// Centimetres.
    pub width: u16,
    /// Controlling signal group, `None` (or 0) when uncontrolled.
    pub signal_group: Option<u8>,
    pub connections: Vec<Connection>,
    /// Between [`MIN_NODES`] and [`MAX_NODES`] entries.
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connection {
    pub intersection_id: u16,
    pub region_id: u16,
    pub lane_id: u8,
    pub maneuver: Maneuver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    /// Offset from the previous node (or the reference point), centimetres.
    Offset { x: i32, y: i32 },
    /// Absolute position, 1/10 micro degree.
    LatLon { lat: i32, lon: i32 },
}

/// A speed limit is known when it is neither 0 nor [`VELOCITY_UNAVAILABLE`].
fn known_speed(speed: Option<u16>) -> Option<u16> {
    below(speed, VELOCITY_UNAVAILABLE).filter(|&s| s > 0)
}

impl Approach {
    /// Speed used for grouping: known speeds of vehicle approaches only.
    pub fn effective_speed(&self) -> Option<u16> {
        match self.kind {
            ApproachKind::Crosswalk => None,
            _ => known_speed(self.speed_limit),
        }
    }
}

impl Lane {
    /// The 12 allowed-maneuver bits.
    pub fn maneuvers(&self) -> u16 {
        ((self.attributes >> 8) & 0xfff) as u16
    }

    fn lane_type(&self) -> LaneTypeAttributes {
        LaneTypeAttributes::for_lane(self.kind, self.attributes)
    }

    /// Lane rules that decode enforces and the wire cannot express.
    fn validate(&self, approach: ApproachKind) -> Result<(), CodecError> {
        let crosswalk_approach = approach == ApproachKind::Crosswalk;
        if crosswalk_approach != (self.kind == LaneKind::Crosswalk) {
            return Err(CodecError::mismatch(
                "kind",
                format!("{:?} lane under {:?} approach", self.kind, approach),
            ));
        }
        if approach == ApproachKind::Inbound {
            if self.signal_group.filter(|&g| g != 0).is_none() {
                return Err(CodecError::missing("signalGroup"));
            }
            if self.connections.is_empty() {
                return Err(CodecError::missing("connections"));
            }
        }
        Ok(())
    }
}

impl MapData {
    /// Distinct effective speeds in order of first appearance over approaches with lanes.
    pub fn distinct_speeds(&self) -> Vec<Option<u16>> {
        let mut speeds = Vec::new();
        for approach in self.approaches.iter().filter(|a| !a.lanes.is_empty()) {
            let speed = approach.effective_speed();
            if !speeds.contains(&speed) {
                speeds.push(speed);
            }
        }
        speeds
    }

    fn validate(&self) -> Result<(), CodecError> {
        if self.approaches.len() > MAX_APPROACHES {
            return Err(CodecError::out_of_range(
                "approaches",
                self.approaches.len() as i64,
                0,
                MAX_APPROACHES as i64,
            ));
        }
        for (i, approach) in self.approaches.iter().enumerate() {
            if !(1..=MAX_APPROACHES as u8).contains(&approach.id) {
                return Err(CodecError::out_of_range(
                    &format!("approaches[{}].id", i),
                    i64::from(approach.id),
                    1,
                    MAX_APPROACHES as i64,
                ));
            }
            for (j, lane) in approach.lanes.iter().enumerate() {
                lane.validate(approach.kind)
                    .map_err(|e| e.within(&format!("approaches[{}].lanes[{}]", i, j)))?;
            }
        }
        if self.approaches.iter().all(|a| a.lanes.is_empty()) {
            return Err(CodecError::missing("approaches.lanes"));
        }
        if !self.distinct_speeds().iter().any(Option::is_some) {
            return Err(CodecError::missing("speeds"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// One IntersectionGeometry block to emit.
struct Group<'a> {
    revision: u8,
    speed: Option<u16>,
    reference_width: u16,
    chained: bool,
    approaches: Vec<&'a Approach>,
}

/// Running reference inside one geometry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reference {
    width: u16,
    speed: Option<u16>,
}

/// Width/speed deltas carried by the first node of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct NodeAttributes {
    d_width: Option<i32>,
    speed: Option<u16>,
}

fn single_group(map: &MapData) -> Result<Vec<Group<'_>>, CodecError> {
    let first = map
        .approaches
        .first()
        .ok_or_else(|| CodecError::missing("approaches"))?;
    let lane = first
        .lanes
        .first()
        .ok_or_else(|| CodecError::missing("approaches[0].lanes"))?;
    Ok(vec![Group {
        revision: 0,
        speed: first.effective_speed(),
        reference_width: lane.width,
        chained: true,
        approaches: map.approaches.iter().collect(),
    }])
}

fn multi_groups(map: &MapData) -> Vec<Group<'_>> {
    let mut groups = Vec::new();
    for (i, speed) in map.distinct_speeds().into_iter().enumerate() {
        let approaches: Vec<&Approach> = map
            .approaches
            .iter()
            .filter(|a| !a.lanes.is_empty() && a.effective_speed() == speed)
            .collect();
        let reference_width = approaches
            .first()
            .and_then(|a| a.lanes.first())
            .map_or(0, |l| l.width);
        groups.push(Group {
            revision: i as u8,
            speed,
            reference_width,
            chained: false,
            approaches,
        });
    }
    groups
}

/// Deltas for a lane's first node, moving `reference` along when the group chains.
fn first_node_attributes(
    approach: &Approach,
    lane: &Lane,
    chained: bool,
    reference: &mut Reference,
) -> NodeAttributes {
    let mut attrs = NodeAttributes::default();
    if lane.width != reference.width {
        attrs.d_width = Some(i32::from(lane.width) - i32::from(reference.width));
        if chained {
            reference.width = lane.width;
        }
    }
    if chained && approach.kind != ApproachKind::Crosswalk {
        let speed = approach.effective_speed();
        if speed != reference.speed {
            // an unknown speed after a known one is sent as unavailable
            attrs.speed = Some(speed.unwrap_or(VELOCITY_UNAVAILABLE));
            reference.speed = speed;
        }
    }
    attrs
}

pub(crate) fn write(map: &MapData, w: &mut BitWriter) -> Result<(), CodecError> {
    map.validate()?;
    let groups = match map.layout {
        MapLayout::SingleGroup => single_group(map)?,
        MapLayout::MultiGroup => multi_groups(map),
    };
    trace!(
        "MapData {}: {:?}, {} geometry block(s)",
        map.intersection_id,
        map.layout,
        groups.len()
    );

    // timeStamp, layerType, layerID, intersections, roadSegments, dataParameters,
    // restrictionList, regional
    w.write_preamble(true, &[false, true, false, true, false, false, false, false]);
    write_msg_count(w, "msgIssueRevision", map.revision)?;
    w.write_index("layerType", LAYER_INTERSECTION_DATA, LAYER_TYPES, true)?;
    w.write_count("intersections", groups.len(), 1, 32)?;
    for (i, group) in groups.iter().enumerate() {
        write_geometry(map, group, w).map_err(|e| e.within(&format!("intersections[{}]", i)))?;
    }
    Ok(())
}

fn write_speed_limits(w: &mut BitWriter, field: &str, speed: u16) -> Result<(), CodecError> {
    w.write_count(field, 1, 1, 9)?;
    w.write_index(&format!("{}[0].type", field), VEHICLE_MAX_SPEED, SPEED_LIMIT_TYPES, true)?;
    w.write_constrained(
        &format!("{}[0].speed", field),
        i64::from(speed),
        0,
        i64::from(VELOCITY_UNAVAILABLE),
    )
}

fn write_geometry(map: &MapData, group: &Group<'_>, w: &mut BitWriter) -> Result<(), CodecError> {
    let lane_count: usize = group.approaches.iter().map(|a| a.lanes.len()).sum();
    // name, laneWidth, speedLimits, preemptPriorityData, regional
    w.write_preamble(true, &[false, true, group.speed.is_some(), false, false]);
    write_intersection_ref(w, "id", map.intersection_id, Some(map.region_id))?;
    write_msg_count(w, "revision", group.revision)?;
    map.reference.write(w, "refPoint")?;
    w.write_constrained("laneWidth", i64::from(group.reference_width), 0, LANE_WIDTH_MAX)?;
    if let Some(speed) = group.speed {
        write_speed_limits(w, "speedLimits", speed)?;
    }
    w.write_count("laneSet", lane_count, 1, 255)?;
    let mut reference = Reference {
        width: group.reference_width,
        speed: group.speed,
    };
    let lanes = group
        .approaches
        .iter()
        .flat_map(|a| a.lanes.iter().map(move |l| (*a, l)));
    for (j, (approach, lane)) in lanes.enumerate() {
        let attrs = first_node_attributes(approach, lane, group.chained, &mut reference);
        write_lane(map, approach, lane, attrs, w).map_err(|e| e.within(&format!("laneSet[{}]", j)))?;
    }
    Ok(())
}

fn write_lane(
    map: &MapData,
    approach: &Approach,
    lane: &Lane,
    attrs: NodeAttributes,
    w: &mut BitWriter,
) -> Result<(), CodecError> {
    let outbound = approach.kind == ApproachKind::Outbound;
    let vehicle = lane.kind == LaneKind::Traffic;
    // name, ingressApproach, egressApproach, maneuvers, connectsTo, overlays, regional
    w.write_preamble(
        true,
        &[false, !outbound, outbound, vehicle, !lane.connections.is_empty(), false, false],
    );
    w.write_constrained("laneID", i64::from(lane.id), 0, 255)?;
    let approach_field = if outbound { "egressApproach" } else { "ingressApproach" };
    w.write_constrained(approach_field, i64::from(approach.id), 0, 15)?;

    w.write_preamble(false, &[false]);
    let direction = LaneDirection::for_approach(approach.kind);
    w.write_bit_field("laneAttributes.directionalUse", direction.bits(), 2)?;
    w.write_bit_field("laneAttributes.sharedWith", 0, 10)?;
    lane.lane_type()
        .write(w)
        .map_err(|e| e.within("laneAttributes"))?;
    if vehicle {
        w.write_bit_field("maneuvers", u64::from(lane.maneuvers()), 12)?;
    }

    w.write_index("nodeList", 0, NODE_LIST_ALTERNATIVES, true)?;
    w.write_count("nodeList.nodes", lane.nodes.len(), MIN_NODES, MAX_NODES)?;
    for (i, node) in lane.nodes.iter().enumerate() {
        let node_attrs = if i == 0 { attrs } else { NodeAttributes::default() };
        write_node(w, node, node_attrs).map_err(|e| e.within(&format!("nodeList.nodes[{}]", i)))?;
    }

    if !lane.connections.is_empty() {
        w.write_count("connectsTo", lane.connections.len(), 1, 16)?;
        for (i, connection) in lane.connections.iter().enumerate() {
            write_connection(map, lane, connection, w)
                .map_err(|e| e.within(&format!("connectsTo[{}]", i)))?;
        }
    }
    Ok(())
}

fn write_node(w: &mut BitWriter, node: &Node, attrs: NodeAttributes) -> Result<(), CodecError> {
    let has_attrs = attrs.d_width.is_some() || attrs.speed.is_some();
    w.write_preamble(true, &[has_attrs]);
    variant::write_node_point(w, node)?;
    if !has_attrs {
        return Ok(());
    }
    // localNode, disabled, enabled, data, dWidth, dElevation, regional
    w.write_preamble(
        true,
        &[false, false, false, attrs.speed.is_some(), attrs.d_width.is_some(), false, false],
    );
    if let Some(speed) = attrs.speed {
        w.write_count("attributes.data", 1, 1, 8)?;
        w.write_index(
            "attributes.data[0]",
            LANE_DATA_SPEED_LIMITS,
            LANE_DATA_ATTRIBUTES,
            true,
        )?;
        write_speed_limits(w, "attributes.data[0].speedLimits", speed)?;
    }
    if let Some(d_width) = attrs.d_width {
        w.write_constrained("attributes.dWidth", i64::from(d_width), -512, 511)?;
    }
    Ok(())
}

fn write_connection(
    map: &MapData,
    lane: &Lane,
    connection: &Connection,
    w: &mut BitWriter,
) -> Result<(), CodecError> {
    let remote = connection.intersection_id != map.intersection_id
        || connection.region_id != map.region_id;
    let signal_group = lane.signal_group.filter(|&g| g != 0);
    let maneuver = connection.maneuver != Maneuver::None;
    // remoteIntersection, signalGroup, userClass, connectionID
    w.write_preamble(false, &[remote, signal_group.is_some(), false, false]);
    w.write_preamble(false, &[maneuver]);
    w.write_constrained("connectingLane.lane", i64::from(connection.lane_id), 0, 255)?;
    if maneuver {
        w.write_bit_field("connectingLane.maneuver", connection.maneuver.bits(), 12)?;
    }
    if remote {
        write_intersection_ref(
            w,
            "remoteIntersection",
            connection.intersection_id,
            Some(connection.region_id),
        )?;
    }
    if let Some(group) = signal_group {
        w.write_constrained("signalGroup", i64::from(group), 0, 255)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct SpeedLimitWire {
    kind: u64,
    speed: u16,
}

#[derive(Debug)]
struct GeometryWire {
    id: u16,
    region: Option<u16>,
    ref_point: Position3D,
    lane_width: Option<u16>,
    speed_limits: Vec<SpeedLimitWire>,
    lanes: Vec<LaneWire>,
}

#[derive(Debug)]
struct LaneWire {
    id: u8,
    ingress: Option<u8>,
    egress: Option<u8>,
    direction: u64,
    lane_type: LaneTypeAttributes,
    maneuvers: Option<u16>,
    nodes: Vec<NodeWire>,
    connections: Vec<ConnectionWire>,
}

#[derive(Debug)]
struct NodeWire {
    point: Option<Node>,
    d_width: Option<i32>,
    speed_limits: Vec<SpeedLimitWire>,
}

#[derive(Debug)]
struct ConnectionWire {
    lane_id: u8,
    maneuver: Option<u64>,
    remote: Option<(u16, Option<u16>)>,
    signal_group: Option<u8>,
}

pub(crate) fn read(r: &mut BitReader<'_>) -> Result<MapData, CodecError> {
    let pre = r.read_preamble("", true, 8)?;
    if pre.is_present(0) {
        read_minute_of_year(r, "timeStamp")?;
    }
    let revision = read_msg_count(r, "msgIssueRevision")?;
    if pre.is_present(1) {
        r.read_enumerated("layerType", LAYER_TYPES, true)?;
    }
    if pre.is_present(2) {
        r.read_constrained("layerID", 0, 100)?;
    }
    if !pre.is_present(3) {
        return Err(CodecError::missing("intersections"));
    }
    let count = r.read_count("intersections", 1, 32)?;
    let mut geometries = Vec::with_capacity(count);
    for i in 0..count {
        geometries.push(read_geometry(r).map_err(|e| e.within(&format!("intersections[{}]", i)))?);
    }
    for (index, name) in [(4, "roadSegments"), (5, "dataParameters"), (6, "restrictionList")] {
        if pre.is_present(index) {
            return Err(unsupported(name));
        }
    }
    if pre.is_present(7) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;

    if geometries.len() == 1 {
        from_single(revision, &geometries[0])
    } else {
        from_multi(revision, &geometries)
    }
}

fn read_speed_limits(r: &mut BitReader<'_>, field: &str) -> Result<Vec<SpeedLimitWire>, CodecError> {
    let count = r.read_count(field, 1, 9)?;
    let mut limits = Vec::with_capacity(count);
    for i in 0..count {
        let kind = r.read_enumerated(&format!("{}[{}].type", field, i), SPEED_LIMIT_TYPES, true)?;
        let speed = r.read_constrained(
            &format!("{}[{}].speed", field, i),
            0,
            i64::from(VELOCITY_UNAVAILABLE),
        )? as u16;
        limits.push(SpeedLimitWire { kind, speed });
    }
    Ok(limits)
}

fn read_geometry(r: &mut BitReader<'_>) -> Result<GeometryWire, CodecError> {
    let pre = r.read_preamble("", true, 5)?;
    if pre.is_present(0) {
        skip_descriptive_name(r, "name")?;
    }
    let (id, region) = read_intersection_ref(r, "id")?;
    read_msg_count(r, "revision")?;
    let ref_point = Position3D::read(r, "refPoint")?;
    let lane_width = if pre.is_present(1) {
        Some(r.read_constrained("laneWidth", 0, LANE_WIDTH_MAX)? as u16)
    } else {
        None
    };
    let speed_limits = if pre.is_present(2) {
        read_speed_limits(r, "speedLimits")?
    } else {
        Vec::new()
    };
    let count = r.read_count("laneSet", 1, 255)?;
    let mut lanes = Vec::with_capacity(count);
    for j in 0..count {
        lanes.push(read_lane(r).map_err(|e| e.within(&format!("laneSet[{}]", j)))?);
    }
    if pre.is_present(3) {
        return Err(unsupported("preemptPriorityData"));
    }
    if pre.is_present(4) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(GeometryWire {
        id,
        region,
        ref_point,
        lane_width,
        speed_limits,
        lanes,
    })
}

fn read_lane(r: &mut BitReader<'_>) -> Result<LaneWire, CodecError> {
    let pre = r.read_preamble("", true, 7)?;
    let id = r.read_constrained("laneID", 0, 255)? as u8;
    if pre.is_present(0) {
        skip_descriptive_name(r, "name")?;
    }
    let ingress = if pre.is_present(1) {
        Some(r.read_constrained("ingressApproach", 0, 15)? as u8)
    } else {
        None
    };
    let egress = if pre.is_present(2) {
        Some(r.read_constrained("egressApproach", 0, 15)? as u8)
    } else {
        None
    };

    let attr_pre = r.read_preamble("laneAttributes", false, 1)?;
    let direction = r.read_bit_field("laneAttributes.directionalUse", 2)?;
    r.read_bit_field("laneAttributes.sharedWith", 10)?;
    let lane_type = LaneTypeAttributes::read(r).map_err(|e| e.within("laneAttributes"))?;
    if attr_pre.is_present(0) {
        skip_regional_extension(r).map_err(|e| e.within("laneAttributes.regional"))?;
    }

    let maneuvers = if pre.is_present(3) {
        Some(r.read_bit_field("maneuvers", 12)? as u16)
    } else {
        None
    };

    if r.read_choice_index("nodeList", NODE_LIST_ALTERNATIVES, true)? != 0 {
        return Err(unsupported("nodeList.computed"));
    }
    let count = r.read_count("nodeList.nodes", MIN_NODES, MAX_NODES)?;
    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        nodes.push(read_node(r).map_err(|e| e.within(&format!("nodeList.nodes[{}]", i)))?);
    }

    let mut connections = Vec::new();
    if pre.is_present(4) {
        let count = r.read_count("connectsTo", 1, 16)?;
        for i in 0..count {
            connections
                .push(read_connection(r).map_err(|e| e.within(&format!("connectsTo[{}]", i)))?);
        }
    }
    if pre.is_present(5) {
        return Err(unsupported("overlays"));
    }
    if pre.is_present(6) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(LaneWire {
        id,
        ingress,
        egress,
        direction,
        lane_type,
        maneuvers,
        nodes,
        connections,
    })
}

fn read_node(r: &mut BitReader<'_>) -> Result<NodeWire, CodecError> {
    let pre = r.read_preamble("", true, 1)?;
    let mut node = NodeWire {
        point: variant::read_node_point(r)?,
        d_width: None,
        speed_limits: Vec::new(),
    };
    if pre.is_present(0) {
        let attrs = r.read_preamble("attributes", true, 7)?;
        for (index, name) in [(0, "localNode"), (1, "disabled"), (2, "enabled")] {
            if attrs.is_present(index) {
                return Err(unsupported(name).within("attributes"));
            }
        }
        if attrs.is_present(3) {
            let count = r.read_count("attributes.data", 1, 8)?;
            for i in 0..count {
                let field = format!("attributes.data[{}]", i);
                let choice = r.read_choice_index(&field, LANE_DATA_ATTRIBUTES, true)?;
                if choice != LANE_DATA_SPEED_LIMITS {
                    return Err(CodecError::mismatch(
                        &field,
                        format!("lane data alternative {} not supported", choice),
                    ));
                }
                node.speed_limits
                    .extend(read_speed_limits(r, &format!("{}.speedLimits", field))?);
            }
        }
        if attrs.is_present(4) {
            node.d_width = Some(r.read_constrained("attributes.dWidth", -512, 511)? as i32);
        }
        if attrs.is_present(5) {
            r.read_constrained("attributes.dElevation", -512, 511)?;
        }
        if attrs.is_present(6) {
            skip_regional_list(r, "attributes.regional")?;
        }
        r.skip_extensions("attributes", &attrs)?;
    }
    r.skip_extensions("", &pre)?;
    Ok(node)
}

fn read_connection(r: &mut BitReader<'_>) -> Result<ConnectionWire, CodecError> {
    let pre = r.read_preamble("", false, 4)?;
    let lane_pre = r.read_preamble("connectingLane", false, 1)?;
    let lane_id = r.read_constrained("connectingLane.lane", 0, 255)? as u8;
    let maneuver = if lane_pre.is_present(0) {
        Some(r.read_bit_field("connectingLane.maneuver", 12)?)
    } else {
        None
    };
    let remote = if pre.is_present(0) {
        Some(read_intersection_ref(r, "remoteIntersection")?)
    } else {
        None
    };
    let signal_group = if pre.is_present(1) {
        Some(r.read_constrained("signalGroup", 0, 255)? as u8)
    } else {
        None
    };
    if pre.is_present(2) {
        r.read_constrained("userClass", 0, 255)?;
    }
    if pre.is_present(3) {
        r.read_constrained("connectionID", 0, 255)?;
    }
    Ok(ConnectionWire {
        lane_id,
        maneuver,
        remote,
        signal_group,
    })
}

/// A validated lane plus what its first node says about the reference.
struct AdaptedLane {
    approach_id: u8,
    kind: ApproachKind,
    lane: Lane,
    d_width: Option<i32>,
    speed: Option<u16>,
}

fn adapt_lane(owner: (u16, u16), wire: &LaneWire) -> Result<AdaptedLane, CodecError> {
    let direction =
        LaneDirection::from_bits(wire.direction).map_err(|e| e.within("laneAttributes"))?;
    let (approach_field, approach_id) = match (wire.ingress, wire.egress) {
        (Some(id), _) => ("ingressApproach", id),
        (None, Some(id)) => ("egressApproach", id),
        (None, None) => return Err(CodecError::missing("ingressApproach")),
    };
    let signal_group = wire.connections.first().and_then(|c| c.signal_group);
    if direction == LaneDirection::Ingress && signal_group.is_none() {
        return Err(CodecError::missing("connectsTo[0].signalGroup"));
    }
    if !(1..=MAX_APPROACHES as u8).contains(&approach_id) {
        return Err(CodecError::out_of_range(
            approach_field,
            i64::from(approach_id),
            1,
            MAX_APPROACHES as i64,
        ));
    }

    let (kind, attributes) = match wire.lane_type {
        LaneTypeAttributes::Vehicle(bits) => (
            LaneKind::Traffic,
            u32::from(bits) | u32::from(wire.maneuvers.unwrap_or(0)) << 8,
        ),
        LaneTypeAttributes::Crosswalk(bits) => (LaneKind::Crosswalk, u32::from(bits)),
    };
    let connections = wire
        .connections
        .iter()
        .map(|c| {
            let (intersection_id, region_id) = match c.remote {
                Some((id, region)) => (id, region.unwrap_or(owner.1)),
                None => owner,
            };
            let bits = c.maneuver.unwrap_or(0);
            let maneuver = Maneuver::from_bits(bits);
            if bits != 0 && maneuver == Maneuver::None {
                warn!("lane {} connection maneuver {:#x} read as unspecified", wire.id, bits);
            }
            Connection {
                intersection_id,
                region_id,
                lane_id: c.lane_id,
                maneuver,
            }
        })
        .collect();
    let first = wire.nodes.first();
    let speed = first
        .and_then(|n| n.speed_limits.first())
        .filter(|s| s.kind == VEHICLE_MAX_SPEED)
        .map(|s| s.speed);
    Ok(AdaptedLane {
        approach_id,
        kind: direction.approach_kind(),
        lane: Lane {
            id: wire.id,
            kind,
            attributes,
            width: 0,
            signal_group: signal_group.filter(|&g| g != 0),
            connections,
            nodes: wire.nodes.iter().filter_map(|n| n.point).collect(),
        },
        d_width: first.and_then(|n| n.d_width),
        speed,
    })
}

fn lane_width(reference: i64, d_width: Option<i32>) -> Result<u16, CodecError> {
    let width = reference + i64::from(d_width.unwrap_or(0));
    if !(0..=LANE_WIDTH_MAX).contains(&width) {
        return Err(CodecError::out_of_range("width", width, 0, LANE_WIDTH_MAX));
    }
    Ok(width as u16)
}

type Slots = [Option<Approach>; MAX_APPROACHES];

fn place(slots: &mut Slots, adapted: AdaptedLane, speed: Option<u16>) {
    let slot = &mut slots[usize::from(adapted.approach_id) - 1];
    let approach = slot.get_or_insert_with(|| Approach {
        id: adapted.approach_id,
        kind: adapted.kind,
        speed_limit: None,
        lanes: Vec::new(),
    });
    if adapted.kind != ApproachKind::Crosswalk {
        approach.speed_limit = speed;
    }
    approach.lanes.push(adapted.lane);
}

fn finish(
    revision: u8,
    first: &GeometryWire,
    slots: Slots,
    layout: MapLayout,
) -> Result<MapData, CodecError> {
    let mut map = MapData {
        intersection_id: first.id,
        region_id: first.region.unwrap_or(0),
        revision,
        features: MapFeatures::default(),
        reference: first.ref_point,
        approaches: slots.into_iter().flatten().collect(),
        speeds: Vec::new(),
        layout,
    };
    map.speeds = map.distinct_speeds();
    if !map.speeds.iter().any(Option::is_some) {
        return Err(CodecError::missing("speedLimits"));
    }
    map.features = MapFeatures {
        elevation: map.reference.elevation.is_some(),
        geometry: true,
        speed_limits: true,
    };
    trace!(
        "MapData {}: {:?}, {} approach(es), speeds {:?}",
        map.intersection_id,
        layout,
        map.approaches.len(),
        map.speeds
    );
    Ok(map)
}

fn from_single(revision: u8, geometry: &GeometryWire) -> Result<MapData, CodecError> {
    let owner = (geometry.id, geometry.region.unwrap_or(0));
    let mut width = i64::from(
        geometry
            .lane_width
            .ok_or_else(|| CodecError::missing("intersections[0].laneWidth"))?,
    );
    let mut speed = geometry
        .speed_limits
        .first()
        .filter(|s| s.kind == VEHICLE_MAX_SPEED)
        .and_then(|s| known_speed(Some(s.speed)));
    let mut slots: Slots = Default::default();
    for (j, wire) in geometry.lanes.iter().enumerate() {
        let path = format!("intersections[0].laneSet[{}]", j);
        let mut adapted = adapt_lane(owner, wire).map_err(|e| e.within(&path))?;
        adapted.lane.width = lane_width(width, adapted.d_width).map_err(|e| e.within(&path))?;
        width = i64::from(adapted.lane.width);
        if adapted.kind != ApproachKind::Crosswalk {
            if let Some(s) = adapted.speed {
                speed = known_speed(Some(s));
            }
        }
        place(&mut slots, adapted, speed);
    }
    finish(revision, geometry, slots, MapLayout::SingleGroup)
}

fn from_multi(revision: u8, geometries: &[GeometryWire]) -> Result<MapData, CodecError> {
    let first = &geometries[0];
    let owner = (first.id, first.region.unwrap_or(0));
    let mut slots: Slots = Default::default();
    for (i, geometry) in geometries.iter().enumerate() {
        let path = format!("intersections[{}]", i);
        if geometry.id != first.id {
            return Err(CodecError::mismatch(
                &format!("{}.id", path),
                format!("geometry for intersection {} inside map of {}", geometry.id, first.id),
            ));
        }
        let width = i64::from(
            geometry
                .lane_width
                .ok_or_else(|| CodecError::missing(&format!("{}.laneWidth", path)))?,
        );
        let crosswalk_group = geometry
            .lanes
            .first()
            .map_or(false, |l| l.direction == LaneDirection::Both.bits());
        let speed = if crosswalk_group {
            None
        } else {
            geometry
                .speed_limits
                .iter()
                .filter(|s| s.kind == VEHICLE_MAX_SPEED)
                .find_map(|s| known_speed(Some(s.speed)))
        };
        for (j, wire) in geometry.lanes.iter().enumerate() {
            let lane_path = format!("{}.laneSet[{}]", path, j);
            let mut adapted = adapt_lane(owner, wire).map_err(|e| e.within(&lane_path))?;
            adapted.lane.width =
                lane_width(width, adapted.d_width).map_err(|e| e.within(&lane_path))?;
            place(&mut slots, adapted, speed);
        }
    }
    finish(revision, first, slots, MapLayout::MultiGroup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ErrorKind;

    fn lane(id: u8, width: u16) -> Lane {
        Lane {
            id,
            kind: LaneKind::Traffic,
            attributes: 0,
            width,
            signal_group: Some(2),
            connections: vec![Connection {
                lane_id: 20,
                ..Default::default()
            }],
            nodes: vec![Node::Offset { x: 0, y: 0 }, Node::Offset { x: 10, y: 10 }],
        }
    }

    fn crosswalk_lane(id: u8, width: u16) -> Lane {
        Lane {
            kind: LaneKind::Crosswalk,
            signal_group: None,
            connections: Vec::new(),
            ..lane(id, width)
        }
    }

    fn approach(id: u8, kind: ApproachKind, speed: Option<u16>, lanes: Vec<Lane>) -> Approach {
        Approach {
            id,
            kind,
            speed_limit: speed,
            lanes,
        }
    }

    #[test]
    fn chained_reference_emits_only_changes() {
        let a = approach(1, ApproachKind::Inbound, Some(35), vec![lane(1, 300), lane(2, 350), lane(3, 350)]);
        let mut reference = Reference {
            width: 300,
            speed: Some(35),
        };
        let attrs: Vec<NodeAttributes> = a
            .lanes
            .iter()
            .map(|l| first_node_attributes(&a, l, true, &mut reference))
            .collect();
        assert_eq!(attrs[0], NodeAttributes::default());
        assert_eq!(attrs[1].d_width, Some(50));
        assert_eq!(attrs[2], NodeAttributes::default());
        assert_eq!(reference.width, 350);
    }

    #[test]
    fn unchained_reference_stays_fixed() {
        let a = approach(1, ApproachKind::Inbound, Some(35), vec![lane(1, 300), lane(2, 350), lane(3, 350)]);
        let mut reference = Reference {
            width: 300,
            speed: Some(35),
        };
        for l in &a.lanes[1..] {
            let attrs = first_node_attributes(&a, l, false, &mut reference);
            assert_eq!(attrs.d_width, Some(50));
            assert_eq!(attrs.speed, None);
        }
        assert_eq!(reference.width, 300);
    }

    #[test]
    fn speed_override_skips_crosswalks() {
        let crosswalk = approach(3, ApproachKind::Crosswalk, Some(10), vec![crosswalk_lane(9, 300)]);
        let faster = approach(2, ApproachKind::Outbound, Some(40), vec![lane(5, 300)]);
        let mut reference = Reference {
            width: 300,
            speed: Some(35),
        };
        let attrs = first_node_attributes(&crosswalk, &crosswalk.lanes[0], true, &mut reference);
        assert_eq!(attrs.speed, None);
        let attrs = first_node_attributes(&faster, &faster.lanes[0], true, &mut reference);
        assert_eq!(attrs.speed, Some(40));
        assert_eq!(reference.speed, Some(40));
    }

    #[test]
    fn distinct_speeds_in_first_appearance_order() {
        let map = MapData {
            approaches: vec![
                approach(1, ApproachKind::Inbound, Some(35), vec![lane(1, 300)]),
                approach(2, ApproachKind::Crosswalk, Some(35), vec![lane(2, 300)]),
                approach(3, ApproachKind::Outbound, Some(25), vec![lane(3, 300)]),
                approach(4, ApproachKind::Outbound, Some(35), vec![lane(4, 300)]),
                approach(5, ApproachKind::Outbound, Some(50), Vec::new()),
                approach(6, ApproachKind::Inbound, Some(VELOCITY_UNAVAILABLE), vec![lane(6, 300)]),
            ],
            ..Default::default()
        };
        assert_eq!(map.distinct_speeds(), vec![Some(35), None, Some(25)]);
        assert_eq!(multi_groups(&map).len(), 3);
    }

    #[test]
    fn map_without_known_speed_is_rejected() {
        let map = MapData {
            approaches: vec![approach(1, ApproachKind::Crosswalk, None, vec![crosswalk_lane(1, 300)])],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("no speed");
        assert_eq!(err, CodecError::missing("speeds"));
    }

    #[test]
    fn zero_speed_is_not_a_known_speed() {
        let zero = approach(1, ApproachKind::Inbound, Some(0), vec![lane(1, 300)]);
        assert_eq!(zero.effective_speed(), None);
        assert_eq!(known_speed(Some(1)), Some(1));
        assert_eq!(known_speed(Some(VELOCITY_UNAVAILABLE - 1)), Some(VELOCITY_UNAVAILABLE - 1));
        assert_eq!(known_speed(Some(VELOCITY_UNAVAILABLE)), None);
        let map = MapData {
            approaches: vec![zero],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("speed 0");
        assert_eq!(err, CodecError::missing("speeds"));
    }

    #[test]
    fn chained_unknown_speed_is_sent_as_unavailable() {
        let known = approach(1, ApproachKind::Inbound, Some(35), vec![lane(1, 300)]);
        let unknown = approach(2, ApproachKind::Outbound, None, vec![lane(2, 300), lane(3, 300)]);
        let mut reference = Reference {
            width: 300,
            speed: Some(35),
        };
        let attrs = first_node_attributes(&known, &known.lanes[0], true, &mut reference);
        assert_eq!(attrs, NodeAttributes::default());
        let attrs = first_node_attributes(&unknown, &unknown.lanes[0], true, &mut reference);
        assert_eq!(attrs.speed, Some(VELOCITY_UNAVAILABLE));
        assert_eq!(reference.speed, None);
        let attrs = first_node_attributes(&unknown, &unknown.lanes[1], true, &mut reference);
        assert_eq!(attrs, NodeAttributes::default());
    }

    #[test]
    fn inbound_lane_without_connection_is_rejected_on_encode() {
        let mut bare = lane(1, 300);
        bare.connections.clear();
        let map = MapData {
            approaches: vec![approach(1, ApproachKind::Inbound, Some(35), vec![bare])],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("no connection");
        assert_eq!(err, CodecError::missing("approaches[0].lanes[0].connections"));

        let mut uncontrolled = lane(1, 300);
        uncontrolled.signal_group = Some(0);
        let map = MapData {
            approaches: vec![approach(1, ApproachKind::Inbound, Some(35), vec![uncontrolled])],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("group 0");
        assert_eq!(err, CodecError::missing("approaches[0].lanes[0].signalGroup"));
    }

    #[test]
    fn lane_kind_must_follow_the_approach() {
        let map = MapData {
            approaches: vec![
                approach(1, ApproachKind::Inbound, Some(35), vec![lane(1, 300)]),
                approach(2, ApproachKind::Crosswalk, None, vec![lane(2, 300)]),
            ],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("traffic lane on crosswalk");
        assert_eq!(err.kind(), ErrorKind::StructuralMismatch);
        assert_eq!(err.path(), "approaches[1].lanes[0].kind");

        let map = MapData {
            approaches: vec![approach(1, ApproachKind::Outbound, Some(35), vec![crosswalk_lane(1, 300)])],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("crosswalk lane outbound");
        assert_eq!(err.path(), "approaches[0].lanes[0].kind");
    }

    #[test]
    fn approach_id_must_fit_in_slots() {
        let map = MapData {
            approaches: vec![approach(16, ApproachKind::Inbound, Some(35), vec![lane(1, 300)])],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("id 16");
        assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
        assert_eq!(err.path(), "approaches[0].id");
    }

    #[test]
    fn one_node_lane_is_rejected_on_encode() {
        let mut short = lane(1, 300);
        short.nodes.truncate(1);
        let map = MapData {
            approaches: vec![approach(1, ApproachKind::Inbound, Some(35), vec![short])],
            ..Default::default()
        };
        let err = write(&map, &mut BitWriter::new()).expect_err("one node");
        assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
        assert_eq!(err.path(), "intersections[0].laneSet[0].nodeList.nodes");
    }

    #[test]
    fn sixty_four_nodes_are_rejected_on_decode() {
        // NodeSetXY count is 6 bits offset by 2: raw 62 would be 64 nodes.
        let data = [0b1111_1000u8];
        let err = BitReader::new(&data)
            .read_count("nodeList.nodes", MIN_NODES, MAX_NODES)
            .expect_err("64 nodes");
        assert_eq!(err, CodecError::out_of_range("nodeList.nodes", 64, 2, 63));
    }

    #[test]
    fn lane_without_direction_is_invalid() {
        let wire = LaneWire {
            id: 1,
            ingress: Some(1),
            egress: None,
            direction: 0,
            lane_type: LaneTypeAttributes::Vehicle(0),
            maneuvers: None,
            nodes: Vec::new(),
            connections: Vec::new(),
        };
        let err = adapt_lane((1, 0), &wire).err().expect("direction 0");
        assert_eq!(err.kind(), ErrorKind::InvalidBitPattern);
        assert_eq!(err.path(), "laneAttributes.directionalUse");
    }

    #[test]
    fn inbound_lane_needs_a_signal_group() {
        let wire = LaneWire {
            id: 1,
            ingress: Some(1),
            egress: None,
            direction: LaneDirection::Ingress.bits(),
            lane_type: LaneTypeAttributes::Vehicle(0),
            maneuvers: None,
            nodes: Vec::new(),
            connections: vec![ConnectionWire {
                lane_id: 4,
                maneuver: None,
                remote: None,
                signal_group: None,
            }],
        };
        let err = adapt_lane((1, 0), &wire).err().expect("no signal group");
        assert_eq!(err, CodecError::missing("connectsTo[0].signalGroup"));
    }
}
