//! SPAT: signal phase and timing for one intersection.
//!
//! The model holds eight vehicular and eight pedestrian phases. Vehicular phase `i` is signal
//! group `i + 1`, pedestrian phase `i` is signal group `i + 9`; only groups whose bit is set
//! in the permitted bitmaps go on the wire, each as one movement with one event.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use crate::message::common::{
    below, read_dsecond, read_intersection_ref, read_minute_of_year, read_msg_count,
    skip_descriptive_name, skip_regional_list, unsupported, write_dsecond, write_intersection_ref,
    write_minute_of_year, write_msg_count, DSECOND_UNAVAILABLE, MINUTE_OF_YEAR_UNAVAILABLE,
    TIME_MARK_UNKNOWN,
};
use log::trace;

pub const PHASES: usize = 8;
const PEDESTRIAN_GROUP_OFFSET: u8 = 9;
const MAX_SIGNAL_GROUP: u8 = 16;

wire_enum! {
    /// MovementPhaseState.
    #[derive(Default)]
    pub enum MovementPhase [extensible = false] {
        #[default]
        Unavailable = 0,
        Dark = 1,
        StopThenProceed = 2,
        StopAndRemain = 3,
        PreMovement = 4,
        PermissiveMovementAllowed = 5,
        ProtectedMovementAllowed = 6,
        PermissiveClearance = 7,
        ProtectedClearance = 8,
        CautionConflictingTraffic = 9,
    }
}

/// State and timing of one signal group. Times are TimeMark tenths of a second;
/// 36001 (or `None`) means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseState {
    pub state: MovementPhase,
    pub min_end: Option<u16>,
    pub start: Option<u16>,
    pub max_end: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Spat {
    pub intersection_id: u16,
    pub region_id: u16,
    pub revision: u8,
    pub minute_of_year: Option<u32>,
    /// Milliseconds within the minute.
    pub second: Option<u16>,
    /// IntersectionStatusObject bits.
    pub status: u16,
    pub permitted_phases: u8,
    pub permitted_ped_phases: u8,
    pub phases: [PhaseState; PHASES],
    pub ped_phases: [PhaseState; PHASES],
}

impl Spat {
    /// Active `(signal group, phase)` pairs in wire order.
    fn active_groups(&self) -> Vec<(u8, &PhaseState)> {
        let vehicular = (0..PHASES)
            .filter(|&i| self.permitted_phases >> i & 1 != 0)
            .map(|i| (i as u8 + 1, &self.phases[i]));
        let pedestrian = (0..PHASES)
            .filter(|&i| self.permitted_ped_phases >> i & 1 != 0)
            .map(|i| (i as u8 + PEDESTRIAN_GROUP_OFFSET, &self.ped_phases[i]));
        vehicular.chain(pedestrian).collect()
    }
}

pub(crate) fn write(spat: &Spat, w: &mut BitWriter) -> Result<(), CodecError> {
    let groups = spat.active_groups();
    if groups.is_empty() {
        return Err(CodecError::missing("permittedPhases"));
    }
    trace!("SPAT {}: {} active signal group(s)", spat.intersection_id, groups.len());

    // timeStamp, name, regional
    w.write_preamble(true, &[false, false, false]);
    w.write_count("intersections", 1, 1, 32)?;
    write_state(spat, &groups, w).map_err(|e| e.within("intersections[0]"))
}

fn write_state(spat: &Spat, groups: &[(u8, &PhaseState)], w: &mut BitWriter) -> Result<(), CodecError> {
    let moy = below(spat.minute_of_year, MINUTE_OF_YEAR_UNAVAILABLE);
    let second = below(spat.second, DSECOND_UNAVAILABLE);
    // name, moy, timeStamp, enabledLanes, maneuverAssistList, regional
    w.write_preamble(true, &[false, moy.is_some(), second.is_some(), false, false, false]);
    write_intersection_ref(w, "id", spat.intersection_id, Some(spat.region_id))?;
    write_msg_count(w, "revision", spat.revision)?;
    w.write_bit_field("status", u64::from(spat.status), 16)?;
    if let Some(moy) = moy {
        write_minute_of_year(w, "moy", moy)?;
    }
    if let Some(second) = second {
        write_dsecond(w, "timeStamp", second)?;
    }
    w.write_count("states", groups.len(), 1, 255)?;
    for (i, (group, phase)) in groups.iter().enumerate() {
        write_movement(*group, phase, w).map_err(|e| e.within(&format!("states[{}]", i)))?;
    }
    Ok(())
}

fn write_movement(group: u8, phase: &PhaseState, w: &mut BitWriter) -> Result<(), CodecError> {
    // movementName, maneuverAssistList, regional
    w.write_preamble(true, &[false, false, false]);
    w.write_constrained("signalGroup", i64::from(group), 0, 255)?;
    w.write_count("state-time-speed", 1, 1, 16)?;

    let min_end = below(phase.min_end, TIME_MARK_UNKNOWN);
    // timing, speeds, regional
    w.write_preamble(true, &[min_end.is_some(), false, false]);
    phase.state.write(w, "state-time-speed[0].eventState")?;
    if let Some(min_end) = min_end {
        let start = below(phase.start, TIME_MARK_UNKNOWN);
        let max_end = below(phase.max_end, TIME_MARK_UNKNOWN);
        // startTime, maxEndTime, likelyTime, confidence, nextTime
        w.write_preamble(false, &[start.is_some(), max_end.is_some(), false, false, false]);
        let mark = |w: &mut BitWriter, field: &str, v: u16| {
            w.write_constrained(
                &format!("state-time-speed[0].timing.{}", field),
                i64::from(v),
                0,
                i64::from(TIME_MARK_UNKNOWN),
            )
        };
        if let Some(start) = start {
            mark(w, "startTime", start)?;
        }
        mark(w, "minEndTime", min_end)?;
        if let Some(max_end) = max_end {
            mark(w, "maxEndTime", max_end)?;
        }
    }
    Ok(())
}

pub(crate) fn read(r: &mut BitReader<'_>) -> Result<Spat, CodecError> {
    let pre = r.read_preamble("", true, 3)?;
    if pre.is_present(0) {
        read_minute_of_year(r, "timeStamp")?;
    }
    if pre.is_present(1) {
        skip_descriptive_name(r, "name")?;
    }
    let count = r.read_count("intersections", 1, 32)?;
    let mut first = None;
    for i in 0..count {
        let spat = read_state(r).map_err(|e| e.within(&format!("intersections[{}]", i)))?;
        first.get_or_insert(spat);
    }
    if count > 1 {
        trace!("SPAT: kept the first of {} intersection states", count);
    }
    if pre.is_present(2) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    first.ok_or_else(|| CodecError::missing("intersections"))
}

fn read_state(r: &mut BitReader<'_>) -> Result<Spat, CodecError> {
    let pre = r.read_preamble("", true, 6)?;
    if pre.is_present(0) {
        skip_descriptive_name(r, "name")?;
    }
    let (intersection_id, region) = read_intersection_ref(r, "id")?;
    let mut spat = Spat {
        intersection_id,
        region_id: region.unwrap_or(0),
        revision: read_msg_count(r, "revision")?,
        status: r.read_bit_field("status", 16)? as u16,
        ..Default::default()
    };
    if pre.is_present(1) {
        spat.minute_of_year = Some(read_minute_of_year(r, "moy")?)
            .filter(|&m| m != MINUTE_OF_YEAR_UNAVAILABLE);
    }
    if pre.is_present(2) {
        spat.second = Some(read_dsecond(r, "timeStamp")?).filter(|&s| s != DSECOND_UNAVAILABLE);
    }
    if pre.is_present(3) {
        let count = r.read_count("enabledLanes", 1, 16)?;
        r.skip_bits(count * 8).map_err(|e| e.within("enabledLanes"))?;
    }
    let count = r.read_count("states", 1, 255)?;
    for i in 0..count {
        let path = format!("states[{}]", i);
        let (group, phase) = read_movement(r).map_err(|e| e.within(&path))?;
        if !(1..=MAX_SIGNAL_GROUP).contains(&group) {
            return Err(CodecError::out_of_range(
                &format!("{}.signalGroup", path),
                i64::from(group),
                1,
                i64::from(MAX_SIGNAL_GROUP),
            ));
        }
        let Some(phase) = phase else {
            continue;
        };
        if group < PEDESTRIAN_GROUP_OFFSET {
            let i = usize::from(group - 1);
            spat.permitted_phases |= 1 << i;
            spat.phases[i] = phase;
        } else {
            let i = usize::from(group - PEDESTRIAN_GROUP_OFFSET);
            spat.permitted_ped_phases |= 1 << i;
            spat.ped_phases[i] = phase;
        }
    }
    if pre.is_present(4) {
        return Err(unsupported("maneuverAssistList"));
    }
    if pre.is_present(5) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(spat)
}

/// Signal group and its first event, if any.
fn read_movement(r: &mut BitReader<'_>) -> Result<(u8, Option<PhaseState>), CodecError> {
    let pre = r.read_preamble("", true, 3)?;
    if pre.is_present(0) {
        skip_descriptive_name(r, "movementName")?;
    }
    let group = r.read_constrained("signalGroup", 0, 255)? as u8;
    let count = r.read_count("state-time-speed", 1, 16)?;
    let mut first = None;
    for i in 0..count {
        let event = read_event(r).map_err(|e| e.within(&format!("state-time-speed[{}]", i)))?;
        first.get_or_insert(event);
    }
    if pre.is_present(1) {
        return Err(unsupported("maneuverAssistList"));
    }
    if pre.is_present(2) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok((group, first))
}

fn read_event(r: &mut BitReader<'_>) -> Result<PhaseState, CodecError> {
    let pre = r.read_preamble("", true, 3)?;
    let mut phase = PhaseState {
        state: MovementPhase::read(r, "eventState")?,
        ..Default::default()
    };
    if pre.is_present(0) {
        let t = r.read_preamble("timing", false, 5)?;
        let mut mark = |field: &str| -> Result<Option<u16>, CodecError> {
            let v = r.read_constrained(
                &format!("timing.{}", field),
                0,
                i64::from(TIME_MARK_UNKNOWN),
            )? as u16;
            Ok(Some(v).filter(|&v| v != TIME_MARK_UNKNOWN))
        };
        if t.is_present(0) {
            phase.start = mark("startTime")?;
        }
        phase.min_end = mark("minEndTime")?;
        if t.is_present(1) {
            phase.max_end = mark("maxEndTime")?;
        }
        if t.is_present(2) {
            mark("likelyTime")?;
        }
        if t.is_present(3) {
            r.read_constrained("timing.confidence", 0, 15)?;
        }
        if t.is_present(4) {
            r.read_constrained("timing.nextTime", 0, i64::from(TIME_MARK_UNKNOWN))?;
        }
    }
    if pre.is_present(1) {
        return Err(unsupported("speeds"));
    }
    if pre.is_present(2) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(phase)
}
