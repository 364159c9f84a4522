//! SignalStatusMessage: the intersection's answer to pending signal requests.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use crate::message::common::{
    below, read_dsecond, read_intersection_ref, read_minute_of_year, read_msg_count,
    read_vehicle_id, skip_regional_list, write_dsecond, write_intersection_ref,
    write_minute_of_year, write_msg_count, write_vehicle_id, BasicVehicleRole,
    DSECOND_UNAVAILABLE, MINUTE_OF_YEAR_UNAVAILABLE, MSG_COUNT_UNAVAILABLE,
};
use crate::message::srm::read_requestor_type;
use crate::variant::AccessPoint;
use log::trace;

pub const MAX_REQUESTS: usize = 32;

wire_enum! {
    #[derive(Default)]
    pub enum PrioritizationResponseStatus [extensible = true] {
        #[default]
        Unknown = 0,
        Requested = 1,
        Processing = 2,
        WatchOtherTraffic = 3,
        Granted = 4,
        Rejected = 5,
        MaxPresence = 6,
        ReserviceLocked = 7,
    }
}

/// One request and the intersection's response to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalRequestStatus {
    pub vehicle_id: u32,
    pub request_id: u8,
    pub sequence_number: u8,
    pub role: Option<BasicVehicleRole>,
    pub inbound: AccessPoint,
    pub outbound: Option<AccessPoint>,
    pub eta_minute: Option<u32>,
    pub eta_second: Option<u16>,
    pub duration: Option<u16>,
    pub status: PrioritizationResponseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ssm {
    pub minute_of_year: Option<u32>,
    pub second: u16,
    pub msg_count: Option<u8>,
    /// SignalStatus sequence number, bumped whenever any status changes.
    pub update_count: u8,
    pub intersection_id: u16,
    pub region_id: u16,
    /// 1..=32 records.
    pub requests: Vec<SignalRequestStatus>,
}

pub(crate) fn write(ssm: &Ssm, w: &mut BitWriter) -> Result<(), CodecError> {
    if ssm.requests.is_empty() {
        return Err(CodecError::missing("status[0].sigStatus"));
    }
    let moy = below(ssm.minute_of_year, MINUTE_OF_YEAR_UNAVAILABLE);
    let msg_count = below(ssm.msg_count, MSG_COUNT_UNAVAILABLE);
    // timeStamp, sequenceNumber, regional
    w.write_preamble(true, &[moy.is_some(), msg_count.is_some(), false]);
    if let Some(moy) = moy {
        write_minute_of_year(w, "timeStamp", moy)?;
    }
    write_dsecond(w, "second", ssm.second)?;
    if let Some(count) = msg_count {
        write_msg_count(w, "sequenceNumber", count)?;
    }
    w.write_count("status", 1, 1, 32)?;
    write_status(ssm, w).map_err(|e| e.within("status[0]"))
}

fn write_status(ssm: &Ssm, w: &mut BitWriter) -> Result<(), CodecError> {
    // regional
    w.write_preamble(true, &[false]);
    write_msg_count(w, "sequenceNumber", ssm.update_count)?;
    write_intersection_ref(w, "id", ssm.intersection_id, Some(ssm.region_id))?;
    w.write_count("sigStatus", ssm.requests.len(), 1, MAX_REQUESTS)?;
    for (i, request) in ssm.requests.iter().enumerate() {
        write_package(request, w).map_err(|e| e.within(&format!("sigStatus[{}]", i)))?;
    }
    Ok(())
}

fn write_package(req: &SignalRequestStatus, w: &mut BitWriter) -> Result<(), CodecError> {
    let minute = below(req.eta_minute, MINUTE_OF_YEAR_UNAVAILABLE);
    let second = below(req.eta_second, DSECOND_UNAVAILABLE);
    let duration = below(req.duration, DSECOND_UNAVAILABLE);
    // requester, outboundOn, minute, second, duration, regional
    w.write_preamble(
        true,
        &[
            true,
            req.outbound.is_some(),
            minute.is_some(),
            second.is_some(),
            duration.is_some(),
            false,
        ],
    );
    // role, typeData
    w.write_preamble(true, &[req.role.is_some(), false]);
    write_vehicle_id(w, "requester.id", req.vehicle_id)?;
    w.write_constrained("requester.request", i64::from(req.request_id), 0, 255)?;
    write_msg_count(w, "requester.sequenceNumber", req.sequence_number)?;
    if let Some(role) = req.role {
        role.write(w, "requester.role")?;
    }
    req.inbound.write(w, "inboundOn")?;
    if let Some(outbound) = req.outbound {
        outbound.write(w, "outboundOn")?;
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
    req.status.write(w, "status")
}

pub(crate) fn read(r: &mut BitReader<'_>) -> Result<Ssm, CodecError> {
    let pre = r.read_preamble("", true, 3)?;
    let mut ssm = Ssm::default();
    if pre.is_present(0) {
        ssm.minute_of_year =
            Some(read_minute_of_year(r, "timeStamp")?).filter(|&m| m != MINUTE_OF_YEAR_UNAVAILABLE);
    }
    ssm.second = read_dsecond(r, "second")?;
    if pre.is_present(1) {
        ssm.msg_count = Some(read_msg_count(r, "sequenceNumber")?);
    }
    let count = r.read_count("status", 1, 32)?;
    for i in 0..count {
        let path = format!("status[{}]", i);
        let status = read_status(r).map_err(|e| e.within(&path))?;
        if i == 0 {
            let (update_count, intersection_id, region_id, requests) = status;
            ssm.update_count = update_count;
            ssm.intersection_id = intersection_id;
            ssm.region_id = region_id;
            ssm.requests = requests;
        }
    }
    if count > 1 {
        trace!("SSM: kept the first of {} signal status entries", count);
    }
    if pre.is_present(2) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(ssm)
}

type StatusWire = (u8, u16, u16, Vec<SignalRequestStatus>);

fn read_status(r: &mut BitReader<'_>) -> Result<StatusWire, CodecError> {
    let pre = r.read_preamble("", true, 1)?;
    let update_count = read_msg_count(r, "sequenceNumber")?;
    let (id, region) = read_intersection_ref(r, "id")?;
    let count = r.read_count("sigStatus", 1, MAX_REQUESTS)?;
    let mut requests = Vec::with_capacity(count);
    for i in 0..count {
        requests.push(read_package(r).map_err(|e| e.within(&format!("sigStatus[{}]", i)))?);
    }
    if pre.is_present(0) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok((update_count, id, region.unwrap_or(0), requests))
}

fn read_package(r: &mut BitReader<'_>) -> Result<SignalRequestStatus, CodecError> {
    let pre = r.read_preamble("", true, 6)?;
    if !pre.is_present(0) {
        return Err(CodecError::missing("requester"));
    }
    let info = r.read_preamble("requester", true, 2)?;
    let vehicle_id = read_vehicle_id(r, "requester.id")?;
    let request_id = r.read_constrained("requester.request", 0, 255)? as u8;
    let sequence_number = read_msg_count(r, "requester.sequenceNumber")?;
    let role = if info.is_present(0) {
        Some(BasicVehicleRole::read(r, "requester.role")?)
    } else {
        None
    };
    if info.is_present(1) {
        read_requestor_type(r, "requester.typeData")?;
    }
    r.skip_extensions("requester", &info)?;

    let inbound = AccessPoint::read(r, "inboundOn")?;
    let outbound = if pre.is_present(1) {
        Some(AccessPoint::read(r, "outboundOn")?)
    } else {
        None
    };
    let eta_minute = if pre.is_present(2) {
        Some(read_minute_of_year(r, "minute")?).filter(|&m| m != MINUTE_OF_YEAR_UNAVAILABLE)
    } else {
        None
    };
    let eta_second = if pre.is_present(3) {
        Some(read_dsecond(r, "second")?).filter(|&s| s != DSECOND_UNAVAILABLE)
    } else {
        None
    };
    let duration = if pre.is_present(4) {
        Some(read_dsecond(r, "duration")?).filter(|&s| s != DSECOND_UNAVAILABLE)
    } else {
        None
    };
    let status = PrioritizationResponseStatus::read(r, "status")?;
    if pre.is_present(5) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(SignalRequestStatus {
        vehicle_id,
        request_id,
        sequence_number,
        role,
        inbound,
        outbound,
        eta_minute,
        eta_second,
        duration,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ErrorKind;

    fn granted(vehicle_id: u32) -> SignalRequestStatus {
        SignalRequestStatus {
            vehicle_id,
            request_id: 1,
            sequence_number: 4,
            role: Some(BasicVehicleRole::Transit),
            inbound: AccessPoint::Lane(3),
            outbound: None,
            eta_minute: None,
            eta_second: Some(12_000),
            duration: Some(2_000),
            status: PrioritizationResponseStatus::Granted,
        }
    }

    #[test]
    fn empty_status_list_is_rejected() {
        let err = write(&Ssm::default(), &mut BitWriter::new()).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
    }

    #[test]
    fn more_than_32_records_do_not_fit() {
        let ssm = Ssm {
            requests: (0..33).map(granted).collect(),
            ..Default::default()
        };
        let err = write(&ssm, &mut BitWriter::new()).expect_err("33 records");
        assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
        assert_eq!(err.path(), "status[0].sigStatus");
    }

    #[test]
    fn package_without_requester_is_rejected() {
        let mut w = BitWriter::new();
        w.write_preamble(true, &[false, false, false, false, false, false]);
        AccessPoint::Approach(1).write(&mut w, "inboundOn").expect("inbound");
        PrioritizationResponseStatus::Granted.write(&mut w, "status").expect("status");
        let bytes = w.into_bytes();
        let err = read_package(&mut BitReader::new(&bytes)).expect_err("no requester");
        assert_eq!(err, CodecError::missing("requester"));
    }

    #[test]
    fn package_round_trip() {
        let req = granted(0x0102_0304);
        let mut w = BitWriter::new();
        write_package(&req, &mut w).expect("w");
        let bytes = w.into_bytes();
        assert_eq!(read_package(&mut BitReader::new(&bytes)).expect("r"), req);
    }
}
