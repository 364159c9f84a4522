//! SignalRequestMessage: one priority/preemption request from one vehicle.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use crate::message::common::{
    below, read_dsecond, read_intersection_ref, read_minute_of_year, read_msg_count,
    read_vehicle_id, skip_descriptive_name, skip_regional_extension, skip_regional_list,
    write_dsecond, write_intersection_ref, write_minute_of_year, write_msg_count,
    write_vehicle_id, BasicVehicleRole, Position3D, TransmissionState, VehicleType,
    DSECOND_UNAVAILABLE, MINUTE_OF_YEAR_UNAVAILABLE, MSG_COUNT_UNAVAILABLE,
};
use crate::variant::AccessPoint;
use log::trace;

wire_enum! {
    #[derive(Default)]
    pub enum PriorityRequestType [extensible = true] {
        Reserved = 0,
        #[default]
        Request = 1,
        Update = 2,
        Cancellation = 3,
    }
}

/// The requesting vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requester {
    /// TemporaryID, carried as four big-endian octets.
    pub vehicle_id: u32,
    pub role: BasicVehicleRole,
    pub vehicle_type: VehicleType,
    pub position: Position3D,
    /// 0.0125 degrees.
    pub heading: u16,
    pub transmission: TransmissionState,
    /// 0.02 m/s.
    pub speed: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Srm {
    pub minute_of_year: Option<u32>,
    /// Milliseconds within the minute.
    pub second: u16,
    pub msg_count: Option<u8>,
    pub eta_minute: Option<u32>,
    pub eta_second: Option<u16>,
    pub duration: Option<u16>,
    pub intersection_id: u16,
    pub region_id: u16,
    pub request_id: u8,
    pub request_type: PriorityRequestType,
    /// Required; `None` is rejected on encode.
    pub inbound: Option<AccessPoint>,
    pub outbound: Option<AccessPoint>,
    pub requester: Requester,
}

pub(crate) fn write(srm: &Srm, w: &mut BitWriter) -> Result<(), CodecError> {
    let inbound = srm
        .inbound
        .ok_or_else(|| CodecError::missing("requests[0].request.inBoundLane"))?;
    let moy = below(srm.minute_of_year, MINUTE_OF_YEAR_UNAVAILABLE);
    let msg_count = below(srm.msg_count, MSG_COUNT_UNAVAILABLE);
    // timeStamp, sequenceNumber, requests, regional
    w.write_preamble(true, &[moy.is_some(), msg_count.is_some(), true, false]);
    if let Some(moy) = moy {
        write_minute_of_year(w, "timeStamp", moy)?;
    }
    write_dsecond(w, "second", srm.second)?;
    if let Some(count) = msg_count {
        write_msg_count(w, "sequenceNumber", count)?;
    }
    w.write_count("requests", 1, 1, 32)?;
    write_package(srm, inbound, w).map_err(|e| e.within("requests[0]"))?;
    write_requester(&srm.requester, w).map_err(|e| e.within("requestor"))
}

fn write_package(srm: &Srm, inbound: AccessPoint, w: &mut BitWriter) -> Result<(), CodecError> {
    let minute = below(srm.eta_minute, MINUTE_OF_YEAR_UNAVAILABLE);
    let second = below(srm.eta_second, DSECOND_UNAVAILABLE);
    let duration = below(srm.duration, DSECOND_UNAVAILABLE);
    // minute, second, duration, regional
    w.write_preamble(
        true,
        &[minute.is_some(), second.is_some(), duration.is_some(), false],
    );
    // outBoundLane, regional
    w.write_preamble(true, &[srm.outbound.is_some(), false]);
    write_intersection_ref(w, "request.id", srm.intersection_id, Some(srm.region_id))?;
    w.write_constrained("request.requestID", i64::from(srm.request_id), 0, 255)?;
    srm.request_type.write(w, "request.requestType")?;
    inbound.write(w, "request.inBoundLane")?;
    if let Some(outbound) = srm.outbound {
        outbound.write(w, "request.outBoundLane")?;
    }
    if let Some(minute) = minute {
        write_minute_of_year(w, "minute", minute)?;
    }
    if let Some(second) = second {
        write_dsecond(w, "second", second)?;
    }
    if let Some(duration) = duration {
        write_dsecond(w, "duration", duration)?;
    }
    Ok(())
}

fn write_requester(requester: &Requester, w: &mut BitWriter) -> Result<(), CodecError> {
    // type, position, name, routeName, transitStatus, transitOccupancy, transitSchedule, regional
    w.write_preamble(true, &[true, true, false, false, false, false, false, false]);
    write_vehicle_id(w, "id", requester.vehicle_id)?;

    // subrole, request, iso3883, hpmsType, regional
    w.write_preamble(true, &[false, false, false, true, false]);
    requester.role.write(w, "type.role")?;
    requester.vehicle_type.write(w, "type.hpmsType")?;

    // heading, speed
    w.write_preamble(true, &[true, true]);
    requester.position.write(w, "position.position")?;
    w.write_constrained("position.heading", i64::from(requester.heading), 0, 28_800)?;
    requester.transmission.write(w, "position.speed.transmisson")?;
    w.write_constrained("position.speed.speed", i64::from(requester.speed), 0, 8191)
}

pub(crate) fn read(r: &mut BitReader<'_>) -> Result<Srm, CodecError> {
    let pre = r.read_preamble("", true, 4)?;
    let mut srm = Srm::default();
    if pre.is_present(0) {
        srm.minute_of_year =
            Some(read_minute_of_year(r, "timeStamp")?).filter(|&m| m != MINUTE_OF_YEAR_UNAVAILABLE);
    }
    srm.second = read_dsecond(r, "second")?;
    if pre.is_present(1) {
        srm.msg_count = Some(read_msg_count(r, "sequenceNumber")?);
    }
    if !pre.is_present(2) {
        return Err(CodecError::missing("requests"));
    }
    let count = r.read_count("requests", 1, 32)?;
    for i in 0..count {
        let path = format!("requests[{}]", i);
        if i == 0 {
            read_package(r, &mut srm).map_err(|e| e.within(&path))?;
        } else {
            read_package(r, &mut Srm::default()).map_err(|e| e.within(&path))?;
        }
    }
    if count > 1 {
        trace!("SRM: kept the first of {} request packages", count);
    }
    srm.requester = read_requester(r).map_err(|e| e.within("requestor"))?;
    if pre.is_present(3) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(srm)
}

fn read_package(r: &mut BitReader<'_>, srm: &mut Srm) -> Result<(), CodecError> {
    let pre = r.read_preamble("", true, 4)?;
    let req = r.read_preamble("request", true, 2)?;
    let (id, region) = read_intersection_ref(r, "request.id")?;
    srm.intersection_id = id;
    srm.region_id = region.unwrap_or(0);
    srm.request_id = r.read_constrained("request.requestID", 0, 255)? as u8;
    srm.request_type = PriorityRequestType::read(r, "request.requestType")?;
    srm.inbound = Some(AccessPoint::read(r, "request.inBoundLane")?);
    if req.is_present(0) {
        srm.outbound = Some(AccessPoint::read(r, "request.outBoundLane")?);
    }
    if req.is_present(1) {
        skip_regional_list(r, "request.regional")?;
    }
    r.skip_extensions("request", &req)?;
    if pre.is_present(0) {
        srm.eta_minute =
            Some(read_minute_of_year(r, "minute")?).filter(|&m| m != MINUTE_OF_YEAR_UNAVAILABLE);
    }
    if pre.is_present(1) {
        srm.eta_second = Some(read_dsecond(r, "second")?).filter(|&s| s != DSECOND_UNAVAILABLE);
    }
    if pre.is_present(2) {
        srm.duration = Some(read_dsecond(r, "duration")?).filter(|&s| s != DSECOND_UNAVAILABLE);
    }
    if pre.is_present(3) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)
}

/// RequestorType: role plus the HPMS vehicle type, when carried.
pub(crate) fn read_requestor_type(
    r: &mut BitReader<'_>,
    field: &str,
) -> Result<(BasicVehicleRole, Option<VehicleType>), CodecError> {
    let read = |r: &mut BitReader<'_>| -> Result<(BasicVehicleRole, Option<VehicleType>), CodecError> {
        let pre = r.read_preamble("", true, 5)?;
        let role = BasicVehicleRole::read(r, "role")?;
        if pre.is_present(0) {
            r.read_constrained("subrole", 0, 15)?;
        }
        if pre.is_present(1) {
            r.read_constrained("request", 0, 15)?;
        }
        if pre.is_present(2) {
            r.read_constrained("iso3883", 0, 100)?;
        }
        let hpms = if pre.is_present(3) {
            Some(VehicleType::read(r, "hpmsType")?)
        } else {
            None
        };
        if pre.is_present(4) {
            skip_regional_extension(r).map_err(|e| e.within("regional"))?;
        }
        r.skip_extensions("", &pre)?;
        Ok((role, hpms))
    };
    read(r).map_err(|e| e.within(field))
}

fn read_requester(r: &mut BitReader<'_>) -> Result<Requester, CodecError> {
    let pre = r.read_preamble("", true, 8)?;
    let vehicle_id = read_vehicle_id(r, "id")?;
    if !pre.is_present(0) {
        return Err(CodecError::missing("type"));
    }
    let (role, hpms) = read_requestor_type(r, "type")?;
    let vehicle_type = hpms.ok_or_else(|| CodecError::missing("type.hpmsType"))?;
    if !pre.is_present(1) {
        return Err(CodecError::missing("position"));
    }
    let pos = r.read_preamble("position", true, 2)?;
    let position = Position3D::read(r, "position.position")?;
    if !pos.is_present(0) {
        return Err(CodecError::missing("position.heading"));
    }
    let heading = r.read_constrained("position.heading", 0, 28_800)? as u16;
    if !pos.is_present(1) {
        return Err(CodecError::missing("position.speed"));
    }
    let transmission = TransmissionState::read(r, "position.speed.transmisson")?;
    let speed = r.read_constrained("position.speed.speed", 0, 8191)? as u16;
    r.skip_extensions("position", &pos)?;

    if pre.is_present(2) {
        skip_descriptive_name(r, "name")?;
    }
    if pre.is_present(3) {
        skip_descriptive_name(r, "routeName")?;
    }
    if pre.is_present(4) {
        r.read_bit_field("transitStatus", 8)?;
    }
    if pre.is_present(5) {
        r.read_constrained("transitOccupancy", 0, 7)?;
    }
    if pre.is_present(6) {
        r.read_constrained("transitSchedule", -122, 121)?;
    }
    if pre.is_present(7) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(Requester {
        vehicle_id,
        role,
        vehicle_type,
        position,
        heading,
        transmission,
        speed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ErrorKind;

    #[test]
    fn inbound_access_point_is_required() {
        let srm = Srm {
            inbound: AccessPoint::from_ids(0, 0),
            ..Default::default()
        };
        let err = write(&srm, &mut BitWriter::new()).expect_err("no inbound");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
        assert_eq!(err.path(), "requests[0].request.inBoundLane");
    }

    #[test]
    fn requester_without_hpms_type_is_rejected() {
        let mut w = BitWriter::new();
        w.write_preamble(true, &[true, true, false, false, false, false, false, false]);
        write_vehicle_id(&mut w, "id", 1).expect("id");
        w.write_preamble(true, &[false, false, false, false, false]);
        BasicVehicleRole::Transit.write(&mut w, "role").expect("role");
        let bytes = w.into_bytes();
        let err = read_requester(&mut BitReader::new(&bytes)).expect_err("no hpmsType");
        assert_eq!(err, CodecError::missing("type.hpmsType"));
    }

    #[test]
    fn requester_round_trip() {
        let requester = Requester {
            vehicle_id: 0xdead_beef,
            role: BasicVehicleRole::Transit,
            vehicle_type: VehicleType::Bus,
            position: Position3D {
                lat: 374_000_000,
                lon: -1_220_000_000,
                elevation: Some(120),
            },
            heading: 14_400,
            transmission: TransmissionState::ForwardGears,
            speed: 650,
        };
        let mut w = BitWriter::new();
        write_requester(&requester, &mut w).expect("w");
        let bytes = w.into_bytes();
        assert_eq!(read_requester(&mut BitReader::new(&bytes)).expect("r"), requester);
    }
}
