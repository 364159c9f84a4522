//! Data frames and sentinels shared by several messages.

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;
use byteorder::{BigEndian, ByteOrder};
use log::trace;

/// Latitude in 1/10 micro degree; the upper bound means unavailable.
pub const LATITUDE: (i64, i64) = (-900_000_000, 900_000_001);
/// Longitude in 1/10 micro degree; the upper bound means unavailable.
pub const LONGITUDE: (i64, i64) = (-1_799_999_999, 1_800_000_001);
/// Elevation in decimetres.
pub const ELEVATION: (i64, i64) = (-4096, 61439);

pub const ELEVATION_UNAVAILABLE: i32 = -4096;
pub const MINUTE_OF_YEAR_UNAVAILABLE: u32 = 527_040;
pub const DSECOND_UNAVAILABLE: u16 = 65_535;
pub const VELOCITY_UNAVAILABLE: u16 = 8191;
pub const TIME_MARK_UNKNOWN: u16 = 36_001;
pub const MSG_COUNT_UNAVAILABLE: u8 = 0xff;

/// Keep `value` only while it is below `sentinel`.
pub(crate) fn below<T: PartialOrd + Copy>(value: Option<T>, sentinel: T) -> Option<T> {
    value.filter(|v| *v < sentinel)
}

/// Reference point of an intersection or a requesting vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position3D {
    pub lat: i32,
    pub lon: i32,
    /// `None` (or the -4096 sentinel) when not known.
    pub elevation: Option<i32>,
}

impl Position3D {
    pub fn new(lat: i32, lon: i32) -> Self {
        Position3D {
            lat,
            lon,
            elevation: None,
        }
    }

    /// Elevation with the unavailable sentinel folded into `None`.
    pub fn known_elevation(&self) -> Option<i32> {
        self.elevation.filter(|&e| e != ELEVATION_UNAVAILABLE)
    }

    pub(crate) fn write(&self, w: &mut BitWriter, field: &str) -> Result<(), CodecError> {
        let elevation = self.known_elevation();
        w.write_preamble(true, &[elevation.is_some(), false]);
        let res = (|| -> Result<(), CodecError> {
            write_lat(w, "lat", self.lat)?;
            write_lon(w, "long", self.lon)?;
            if let Some(e) = elevation {
                w.write_constrained("elevation", i64::from(e), ELEVATION.0, ELEVATION.1)?;
            }
            Ok(())
        })();
        res.map_err(|e| e.within(field))
    }

    pub(crate) fn read(r: &mut BitReader<'_>, field: &str) -> Result<Self, CodecError> {
        let read = |r: &mut BitReader<'_>| -> Result<Self, CodecError> {
            let pre = r.read_preamble("", true, 2)?;
            let lat = read_lat(r, "lat")?;
            let lon = read_lon(r, "long")?;
            let elevation = if pre.is_present(0) {
                let e = r.read_constrained("elevation", ELEVATION.0, ELEVATION.1)? as i32;
                Some(e).filter(|&e| e != ELEVATION_UNAVAILABLE)
            } else {
                None
            };
            if pre.is_present(1) {
                skip_regional_list(r, "regional")?;
            }
            r.skip_extensions("", &pre)?;
            Ok(Position3D {
                lat,
                lon,
                elevation,
            })
        };
        read(r).map_err(|e| e.within(field))
    }
}

pub(crate) fn write_lat(w: &mut BitWriter, field: &str, lat: i32) -> Result<(), CodecError> {
    w.write_constrained(field, i64::from(lat), LATITUDE.0, LATITUDE.1)
}

pub(crate) fn write_lon(w: &mut BitWriter, field: &str, lon: i32) -> Result<(), CodecError> {
    w.write_constrained(field, i64::from(lon), LONGITUDE.0, LONGITUDE.1)
}

pub(crate) fn read_lat(r: &mut BitReader<'_>, field: &str) -> Result<i32, CodecError> {
    Ok(r.read_constrained(field, LATITUDE.0, LATITUDE.1)? as i32)
}

pub(crate) fn read_lon(r: &mut BitReader<'_>, field: &str) -> Result<i32, CodecError> {
    Ok(r.read_constrained(field, LONGITUDE.0, LONGITUDE.1)? as i32)
}

pub(crate) fn write_minute_of_year(w: &mut BitWriter, field: &str, v: u32) -> Result<(), CodecError> {
    w.write_constrained(field, i64::from(v), 0, i64::from(MINUTE_OF_YEAR_UNAVAILABLE))
}

pub(crate) fn read_minute_of_year(r: &mut BitReader<'_>, field: &str) -> Result<u32, CodecError> {
    Ok(r.read_constrained(field, 0, i64::from(MINUTE_OF_YEAR_UNAVAILABLE))? as u32)
}

pub(crate) fn write_dsecond(w: &mut BitWriter, field: &str, v: u16) -> Result<(), CodecError> {
    w.write_constrained(field, i64::from(v), 0, 65_535)
}

pub(crate) fn read_dsecond(r: &mut BitReader<'_>, field: &str) -> Result<u16, CodecError> {
    Ok(r.read_constrained(field, 0, 65_535)? as u16)
}

pub(crate) fn write_msg_count(w: &mut BitWriter, field: &str, v: u8) -> Result<(), CodecError> {
    w.write_constrained(field, i64::from(v), 0, 127)
}

pub(crate) fn read_msg_count(r: &mut BitReader<'_>, field: &str) -> Result<u8, CodecError> {
    Ok(r.read_constrained(field, 0, 127)? as u8)
}

/// IntersectionReferenceID: optional 16-bit road regulator id, then the 16-bit id.
pub(crate) fn write_intersection_ref(
    w: &mut BitWriter,
    field: &str,
    id: u16,
    region: Option<u16>,
) -> Result<(), CodecError> {
    w.write_preamble(false, &[region.is_some()]);
    let res = (|| -> Result<(), CodecError> {
        if let Some(region) = region {
            w.write_constrained("region", i64::from(region), 0, 65_535)?;
        }
        w.write_constrained("id", i64::from(id), 0, 65_535)
    })();
    res.map_err(|e| e.within(field))
}

pub(crate) fn read_intersection_ref(
    r: &mut BitReader<'_>,
    field: &str,
) -> Result<(u16, Option<u16>), CodecError> {
    let read = |r: &mut BitReader<'_>| -> Result<(u16, Option<u16>), CodecError> {
        let pre = r.read_preamble("", false, 1)?;
        let region = if pre.is_present(0) {
            Some(r.read_constrained("region", 0, 65_535)? as u16)
        } else {
            None
        };
        let id = r.read_constrained("id", 0, 65_535)? as u16;
        Ok((id, region))
    };
    read(r).map_err(|e| e.within(field))
}

/// TemporaryID: four octets, network byte order.
pub(crate) fn write_temporary_id(w: &mut BitWriter, field: &str, id: u32) -> Result<(), CodecError> {
    let mut octets = [0u8; 4];
    BigEndian::write_u32(&mut octets, id);
    w.write_octet_string(field, &octets, 4, 4)
}

pub(crate) fn read_temporary_id(r: &mut BitReader<'_>, field: &str) -> Result<u32, CodecError> {
    let octets = r.read_octet_string(field, 4, 4)?;
    Ok(BigEndian::read_u32(&octets))
}

const VEHICLE_ID_ALTERNATIVES: u64 = 2;

/// VehicleID, always the `entityID` alternative.
pub(crate) fn write_vehicle_id(w: &mut BitWriter, field: &str, id: u32) -> Result<(), CodecError> {
    w.write_index(field, 0, VEHICLE_ID_ALTERNATIVES, false)?;
    write_temporary_id(w, &format!("{}.entityID", field), id)
}

pub(crate) fn read_vehicle_id(r: &mut BitReader<'_>, field: &str) -> Result<u32, CodecError> {
    match r.read_choice_index(field, VEHICLE_ID_ALTERNATIVES, false)? {
        0 => read_temporary_id(r, &format!("{}.entityID", field)),
        _ => Err(CodecError::mismatch(field, "stationID requester not supported")),
    }
}

/// One RegionalExtension: region id and an open-type payload nobody here understands.
pub(crate) fn skip_regional_extension(r: &mut BitReader<'_>) -> Result<(), CodecError> {
    let region = r.read_constrained("regionId", 0, 255)?;
    r.skip_open_type("regExtValue")?;
    trace!("skipped regional extension for region {}", region);
    Ok(())
}

/// SEQUENCE (SIZE(1..4)) OF RegionalExtension.
pub(crate) fn skip_regional_list(r: &mut BitReader<'_>, field: &str) -> Result<(), CodecError> {
    let count = r.read_count(field, 1, 4)?;
    for i in 0..count {
        skip_regional_extension(r).map_err(|e| e.within(&format!("{}[{}]", field, i)))?;
    }
    Ok(())
}

/// DescriptiveName: IA5String (SIZE(1..63)), 7 bits per character.
pub(crate) fn skip_descriptive_name(r: &mut BitReader<'_>, field: &str) -> Result<(), CodecError> {
    let len = r.read_count(field, 1, 63)?;
    r.skip_bits(len * 7).map_err(|e| e.within(field))
}

/// An OPTIONAL component this crate has no model for.
pub(crate) fn unsupported(field: &str) -> CodecError {
    CodecError::mismatch(field, "component not supported")
}

wire_enum! {
    /// Gear selector state.
    #[derive(Default)]
    pub enum TransmissionState [extensible = false] {
        Neutral = 0,
        Park = 1,
        ForwardGears = 2,
        ReverseGears = 3,
        Reserved1 = 4,
        Reserved2 = 5,
        Reserved3 = 6,
        #[default]
        Unavailable = 7,
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum BasicVehicleRole [extensible = true] {
        #[default]
        BasicVehicle = 0,
        PublicTransport = 1,
        SpecialTransport = 2,
        DangerousGoods = 3,
        RoadWork = 4,
        RoadRescue = 5,
        Emergency = 6,
        SafetyCar = 7,
        NoneUnknown = 8,
        Truck = 9,
        Motorcycle = 10,
        RoadSideSource = 11,
        Police = 12,
        Fire = 13,
        Ambulance = 14,
        Dot = 15,
        Transit = 16,
        SlowMoving = 17,
        StopNgo = 18,
        Cyclist = 19,
        Pedestrian = 20,
        NonMotorized = 21,
        Military = 22,
    }
}

wire_enum! {
    /// HPMS vehicle classification.
    #[derive(Default)]
    pub enum VehicleType [extensible = true] {
        None = 0,
        #[default]
        Unknown = 1,
        Special = 2,
        Moto = 3,
        Car = 4,
        CarOther = 5,
        Bus = 6,
        AxleCnt2 = 7,
        AxleCnt3 = 8,
        AxleCnt4 = 9,
        AxleCnt4Trailer = 10,
        AxleCnt5Trailer = 11,
        AxleCnt6Trailer = 12,
        AxleCnt5MultiTrailer = 13,
        AxleCnt6MultiTrailer = 14,
        AxleCnt7MultiTrailer = 15,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ErrorKind;

    #[test]
    fn temporary_id_is_big_endian() {
        let mut w = BitWriter::new();
        write_temporary_id(&mut w, "id", 0x1234_5678).expect("w");
        assert_eq!(w.as_bytes(), &[0x12, 0x34, 0x56, 0x78]);
        let bytes = w.into_bytes();
        assert_eq!(
            read_temporary_id(&mut BitReader::new(&bytes), "id").expect("r"),
            0x1234_5678
        );
    }

    #[test]
    fn elevation_sentinel_is_not_emitted() {
        let mut with = BitWriter::new();
        Position3D {
            lat: 1,
            lon: 2,
            elevation: Some(ELEVATION_UNAVAILABLE),
        }
        .write(&mut with, "refPoint")
        .expect("w");
        let mut without = BitWriter::new();
        Position3D::new(1, 2).write(&mut without, "refPoint").expect("w");
        assert_eq!(with.as_bytes(), without.as_bytes());
        // ext + 2 presence + 31 + 32
        assert_eq!(without.bit_len(), 66);
    }

    #[test]
    fn position_round_trip_with_elevation() {
        let p = Position3D {
            lat: 423_000_000,
            lon: -835_000_000,
            elevation: Some(1834),
        };
        let mut w = BitWriter::new();
        p.write(&mut w, "refPoint").expect("w");
        let bytes = w.into_bytes();
        assert_eq!(Position3D::read(&mut BitReader::new(&bytes), "refPoint").expect("r"), p);
    }

    #[test]
    fn latitude_out_of_range_has_path() {
        let mut w = BitWriter::new();
        let err = Position3D::new(900_000_002, 0)
            .write(&mut w, "refPoint")
            .expect_err("lat too large");
        assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
        assert_eq!(err.path(), "refPoint.lat");
    }

    #[test]
    fn enumerated_round_trip_and_width() {
        let mut w = BitWriter::new();
        BasicVehicleRole::Military.write(&mut w, "role").expect("w");
        // extension bit + 5 bits for 23 roots
        assert_eq!(w.bit_len(), 6);
        let bytes = w.into_bytes();
        assert_eq!(
            BasicVehicleRole::read(&mut BitReader::new(&bytes), "role").expect("r"),
            BasicVehicleRole::Military
        );
        assert_eq!(TransmissionState::ROOT_COUNT, 8);
        assert_eq!(VehicleType::from_index(16), None);
    }

    #[test]
    fn descriptive_name_and_regional_are_skipped() {
        let mut w = BitWriter::new();
        w.write_count("name", 3, 1, 63).expect("len");
        w.write_bits(0x41, 7);
        w.write_bits(0x42, 7);
        w.write_bits(0x43, 7);
        w.write_count("regional", 1, 1, 4).expect("count");
        w.write_constrained("regionId", 128, 0, 255).expect("region");
        let mut inner = BitWriter::new();
        inner.write_octets(&[9, 9]);
        w.write_open_type("regExtValue", inner).expect("open");
        w.write_bits(0b101, 3);
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        skip_descriptive_name(&mut r, "name").expect("name");
        skip_regional_list(&mut r, "regional").expect("regional");
        assert_eq!(r.read_bits(3).expect("tail"), 0b101);
    }
}
