//! BasicSafetyMessage, core data only.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use crate::message::common::{
    read_dsecond, read_lat, read_lon, read_msg_count, read_temporary_id, skip_regional_list,
    write_dsecond, write_lat, write_lon, write_msg_count, write_temporary_id, Position3D,
    TransmissionState, ELEVATION, ELEVATION_UNAVAILABLE,
};
use log::trace;

wire_enum! {
    /// Shared shape of TractionControlStatus, AntiLockBrakeStatus, StabilityControlStatus
    /// and (with `Engaged` on the reserved code) AuxiliaryBrakeStatus.
    #[derive(Default)]
    pub enum EngageStatus [extensible = false] {
        #[default]
        Unavailable = 0,
        Off = 1,
        On = 2,
        Engaged = 3,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionalAccuracy {
    pub semi_major: u8,
    pub semi_minor: u8,
    pub orientation: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccelerationSet {
    /// 0.01 m/s^2, 2001 unavailable.
    pub longitudinal: i16,
    pub lateral: i16,
    /// 0.02 G.
    pub vertical: i8,
    /// 0.01 degrees per second.
    pub yaw_rate: i16,
}

/// BrakeSystemStatus. `brake_boost` has no engaged state on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrakeStatus {
    /// BrakeAppliedStatus bits: unavailable, leftFront, leftRear, rightFront, rightRear.
    pub wheel_brakes: u8,
    pub traction: EngageStatus,
    pub abs: EngageStatus,
    pub scs: EngageStatus,
    pub brake_boost: EngageStatus,
    pub aux_brakes: EngageStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VehicleSize {
    pub width: u16,
    pub length: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bsm {
    pub msg_count: u8,
    pub id: u32,
    /// Milliseconds within the minute.
    pub sec_mark: u16,
    pub position: Position3D,
    pub accuracy: PositionalAccuracy,
    pub transmission: TransmissionState,
    /// 0.02 m/s, 8191 unavailable.
    pub speed: u16,
    /// 0.0125 degrees, 28800 unavailable.
    pub heading: u16,
    /// 1.5 degrees, 127 unavailable.
    pub steering_angle: i8,
    pub acceleration: AccelerationSet,
    pub brakes: BrakeStatus,
    pub size: VehicleSize,
}

const BRAKE_BOOST_VALUES: i64 = 3;

pub(crate) fn write(bsm: &Bsm, w: &mut BitWriter) -> Result<(), CodecError> {
    // partII, regional
    w.write_preamble(true, &[false, false]);
    write_core(bsm, w).map_err(|e| e.within("coreData"))
}

fn write_core(bsm: &Bsm, w: &mut BitWriter) -> Result<(), CodecError> {
    write_msg_count(w, "msgCnt", bsm.msg_count)?;
    write_temporary_id(w, "id", bsm.id)?;
    write_dsecond(w, "secMark", bsm.sec_mark)?;
    write_lat(w, "lat", bsm.position.lat)?;
    write_lon(w, "long", bsm.position.lon)?;
    let elevation = bsm.position.elevation.unwrap_or(ELEVATION_UNAVAILABLE);
    w.write_constrained("elev", i64::from(elevation), ELEVATION.0, ELEVATION.1)?;

    w.write_constrained("accuracy.semiMajor", i64::from(bsm.accuracy.semi_major), 0, 255)?;
    w.write_constrained("accuracy.semiMinor", i64::from(bsm.accuracy.semi_minor), 0, 255)?;
    w.write_constrained("accuracy.orientation", i64::from(bsm.accuracy.orientation), 0, 65_535)?;

    bsm.transmission.write(w, "transmission")?;
    w.write_constrained("speed", i64::from(bsm.speed), 0, 8191)?;
    w.write_constrained("heading", i64::from(bsm.heading), 0, 28_800)?;
    w.write_constrained("angle", i64::from(bsm.steering_angle), -126, 127)?;

    let accel = &bsm.acceleration;
    w.write_constrained("accelSet.long", i64::from(accel.longitudinal), -2000, 2001)?;
    w.write_constrained("accelSet.lat", i64::from(accel.lateral), -2000, 2001)?;
    w.write_constrained("accelSet.vert", i64::from(accel.vertical), -127, 127)?;
    w.write_constrained("accelSet.yaw", i64::from(accel.yaw_rate), -32_767, 32_767)?;

    let brakes = &bsm.brakes;
    w.write_bit_field("brakes.wheelBrakes", u64::from(brakes.wheel_brakes), 5)?;
    brakes.traction.write(w, "brakes.traction")?;
    brakes.abs.write(w, "brakes.abs")?;
    brakes.scs.write(w, "brakes.scs")?;
    w.write_constrained(
        "brakes.brakeBoost",
        brakes.brake_boost.index() as i64,
        0,
        BRAKE_BOOST_VALUES - 1,
    )?;
    brakes.aux_brakes.write(w, "brakes.auxBrakes")?;

    w.write_constrained("size.width", i64::from(bsm.size.width), 0, 1023)?;
    w.write_constrained("size.length", i64::from(bsm.size.length), 0, 4095)
}

pub(crate) fn read(r: &mut BitReader<'_>) -> Result<Bsm, CodecError> {
    let pre = r.read_preamble("", true, 2)?;
    let bsm = read_core(r).map_err(|e| e.within("coreData"))?;
    if pre.is_present(0) {
        skip_part_two(r)?;
    }
    if pre.is_present(1) {
        skip_regional_list(r, "regional")?;
    }
    r.skip_extensions("", &pre)?;
    Ok(bsm)
}

fn read_core(r: &mut BitReader<'_>) -> Result<Bsm, CodecError> {
    let msg_count = read_msg_count(r, "msgCnt")?;
    let id = read_temporary_id(r, "id")?;
    let sec_mark = read_dsecond(r, "secMark")?;
    let lat = read_lat(r, "lat")?;
    let lon = read_lon(r, "long")?;
    let elevation = r.read_constrained("elev", ELEVATION.0, ELEVATION.1)? as i32;
    let position = Position3D {
        lat,
        lon,
        elevation: Some(elevation).filter(|&e| e != ELEVATION_UNAVAILABLE),
    };
    let accuracy = PositionalAccuracy {
        semi_major: r.read_constrained("accuracy.semiMajor", 0, 255)? as u8,
        semi_minor: r.read_constrained("accuracy.semiMinor", 0, 255)? as u8,
        orientation: r.read_constrained("accuracy.orientation", 0, 65_535)? as u16,
    };
    let transmission = TransmissionState::read(r, "transmission")?;
    let speed = r.read_constrained("speed", 0, 8191)? as u16;
    let heading = r.read_constrained("heading", 0, 28_800)? as u16;
    let steering_angle = r.read_constrained("angle", -126, 127)? as i8;
    let acceleration = AccelerationSet {
        longitudinal: r.read_constrained("accelSet.long", -2000, 2001)? as i16,
        lateral: r.read_constrained("accelSet.lat", -2000, 2001)? as i16,
        vertical: r.read_constrained("accelSet.vert", -127, 127)? as i8,
        yaw_rate: r.read_constrained("accelSet.yaw", -32_767, 32_767)? as i16,
    };
    let wheel_brakes = r.read_bit_field("brakes.wheelBrakes", 5)? as u8;
    let traction = EngageStatus::read(r, "brakes.traction")?;
    let abs = EngageStatus::read(r, "brakes.abs")?;
    let scs = EngageStatus::read(r, "brakes.scs")?;
    let boost = r.read_constrained("brakes.brakeBoost", 0, BRAKE_BOOST_VALUES - 1)? as u64;
    let brake_boost = EngageStatus::from_index(boost)
        .ok_or_else(|| CodecError::invalid_bits("brakes.brakeBoost", boost))?;
    let aux_brakes = EngageStatus::read(r, "brakes.auxBrakes")?;
    let size = VehicleSize {
        width: r.read_constrained("size.width", 0, 1023)? as u16,
        length: r.read_constrained("size.length", 0, 4095)? as u16,
    };
    Ok(Bsm {
        msg_count,
        id,
        sec_mark,
        position,
        accuracy,
        transmission,
        speed,
        heading,
        steering_angle,
        acceleration,
        brakes: BrakeStatus {
            wheel_brakes,
            traction,
            abs,
            scs,
            brake_boost,
            aux_brakes,
        },
        size,
    })
}

/// SEQUENCE (SIZE(1..8)) OF PartIIcontent: an id and an open type each.
fn skip_part_two(r: &mut BitReader<'_>) -> Result<(), CodecError> {
    let count = r.read_count("partII", 1, 8)?;
    for i in 0..count {
        let field = format!("partII[{}]", i);
        let id = r.read_constrained(&format!("{}.partII-Id", field), 0, 63)?;
        r.skip_open_type(&format!("{}.partII-Value", field))?;
        trace!("BSM: skipped part II content {}", id);
    }
    Ok(())
}
