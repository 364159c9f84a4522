//! BSM, RTCM, SRM and SSM through the full frame.

use j2735_uper::bits::BitReader;
use j2735_uper::message::bsm::{AccelerationSet, BrakeStatus, EngageStatus, PositionalAccuracy, VehicleSize};
use j2735_uper::message::common::{BasicVehicleRole, TransmissionState, VehicleType, ELEVATION_UNAVAILABLE};
use j2735_uper::message::rtcm::{RtcmRevision, MAX_PAYLOAD};
use j2735_uper::message::srm::{PriorityRequestType, Requester};
use j2735_uper::message::ssm::{PrioritizationResponseStatus, SignalRequestStatus};
use j2735_uper::{
    decode, encode_to_vec, AccessPoint, Bsm, ErrorKind, Frame, Position3D, Rtcm, Srm, Ssm,
};

fn round_trip(frame: Frame) -> Frame {
    let bytes = encode_to_vec(&frame).expect("encode");
    decode(&bytes).expect("decode")
}

fn sample_bsm() -> Bsm {
    Bsm {
        msg_count: 17,
        id: 0x1234_5678,
        sec_mark: 45_250,
        position: Position3D {
            lat: 423_000_123,
            lon: -837_001_456,
            elevation: Some(2_150),
        },
        accuracy: PositionalAccuracy {
            semi_major: 40,
            semi_minor: 30,
            orientation: 8_000,
        },
        transmission: TransmissionState::ForwardGears,
        speed: 700,
        heading: 14_400,
        steering_angle: -12,
        acceleration: AccelerationSet {
            longitudinal: -150,
            lateral: 20,
            vertical: -3,
            yaw_rate: 250,
        },
        brakes: BrakeStatus {
            wheel_brakes: 0b0_0110,
            traction: EngageStatus::On,
            abs: EngageStatus::Engaged,
            scs: EngageStatus::Off,
            brake_boost: EngageStatus::On,
            aux_brakes: EngageStatus::Engaged,
        },
        size: VehicleSize {
            width: 190,
            length: 480,
        },
    }
}

#[test]
fn test_bsm_round_trip() {
    let bsm = sample_bsm();
    assert_eq!(round_trip(Frame::Bsm(bsm.clone())), Frame::Bsm(bsm));
}

#[test]
fn test_bsm_id_is_four_big_endian_octets() {
    let bytes = encode_to_vec(&Frame::Bsm(sample_bsm())).expect("encode");
    let mut r = BitReader::new(&bytes);
    // envelope: extension bit, 15-bit id, 8-bit length; BSM: 3 preamble bits, 7-bit msgCnt
    r.skip_bits(1 + 15 + 8 + 3 + 7).expect("skip");
    assert_eq!(r.read_octets(4).expect("id"), vec![0x12, 0x34, 0x56, 0x78]);
}

#[test]
fn test_bsm_unknown_elevation_decodes_as_none() {
    let mut bsm = sample_bsm();
    bsm.position.elevation = Some(ELEVATION_UNAVAILABLE);
    match round_trip(Frame::Bsm(bsm)) {
        Frame::Bsm(back) => assert_eq!(back.position.elevation, None),
        other => panic!("expected BSM, got {:?}", other.message_id()),
    }
}

#[test]
fn test_bsm_out_of_range_speed_names_the_field() {
    let mut bsm = sample_bsm();
    bsm.speed = 8192;
    let err = encode_to_vec(&Frame::Bsm(bsm)).expect_err("speed 8192");
    assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
    assert_eq!(err.path(), "BasicSafetyMessage.coreData.speed");
}

#[test]
fn test_rtcm_round_trip() {
    let rtcm = Rtcm {
        msg_count: 5,
        revision: RtcmRevision::Rev3,
        minute_of_year: Some(300_000),
        payload: (0..200u16).map(|i| (i % 251) as u8).collect(),
    };
    assert_eq!(round_trip(Frame::Rtcm(rtcm.clone())), Frame::Rtcm(rtcm));
}

#[test]
fn test_rtcm_payload_limits() {
    let largest = Rtcm {
        payload: vec![0xd3; MAX_PAYLOAD],
        ..Default::default()
    };
    assert_eq!(round_trip(Frame::Rtcm(largest.clone())), Frame::Rtcm(largest));

    let err = encode_to_vec(&Frame::Rtcm(Rtcm {
        payload: vec![0xd3; MAX_PAYLOAD + 1],
        ..Default::default()
    }))
    .expect_err("1024 octets");
    assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
    assert_eq!(err.path(), "RTCMcorrections.msgs[0]");

    let err = encode_to_vec(&Frame::Rtcm(Rtcm::default())).expect_err("empty");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
}

fn sample_srm() -> Srm {
    Srm {
        minute_of_year: Some(210_000),
        second: 12_000,
        msg_count: Some(9),
        eta_minute: Some(210_001),
        eta_second: Some(30_000),
        duration: Some(5_000),
        intersection_id: 1201,
        region_id: 7,
        request_id: 3,
        request_type: PriorityRequestType::Update,
        inbound: AccessPoint::from_ids(2, 5),
        outbound: AccessPoint::from_ids(4, 0),
        requester: Requester {
            vehicle_id: 0x0a0b_0c0d,
            role: BasicVehicleRole::Transit,
            vehicle_type: VehicleType::Bus,
            position: Position3D::new(423_000_500, -837_000_900),
            heading: 7_200,
            transmission: TransmissionState::ForwardGears,
            speed: 450,
        },
    }
}

#[test]
fn test_srm_round_trip() {
    let srm = sample_srm();
    assert_eq!(srm.inbound, Some(AccessPoint::Lane(5)));
    assert_eq!(srm.outbound, Some(AccessPoint::Approach(4)));
    assert_eq!(round_trip(Frame::Srm(srm.clone())), Frame::Srm(srm));
}

#[test]
fn test_srm_without_inbound_is_rejected() {
    let srm = Srm {
        inbound: AccessPoint::from_ids(0, 0),
        ..sample_srm()
    };
    let err = encode_to_vec(&Frame::Srm(srm)).expect_err("no inbound");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
    assert_eq!(err.path(), "SignalRequestMessage.requests[0].request.inBoundLane");
}

#[test]
fn test_srm_unavailable_times_are_omitted() {
    let srm = Srm {
        minute_of_year: Some(527_040),
        eta_second: Some(65_535),
        msg_count: None,
        ..sample_srm()
    };
    match round_trip(Frame::Srm(srm)) {
        Frame::Srm(back) => {
            assert_eq!(back.minute_of_year, None);
            assert_eq!(back.eta_second, None);
            assert_eq!(back.msg_count, None);
            assert_eq!(back.duration, Some(5_000));
        }
        other => panic!("expected SRM, got {:?}", other.message_id()),
    }
}

fn status(vehicle_id: u32, status: PrioritizationResponseStatus) -> SignalRequestStatus {
    SignalRequestStatus {
        vehicle_id,
        request_id: 3,
        sequence_number: 9,
        role: Some(BasicVehicleRole::Transit),
        inbound: AccessPoint::Lane(5),
        outbound: Some(AccessPoint::Approach(4)),
        eta_minute: Some(210_001),
        eta_second: Some(30_000),
        duration: Some(5_000),
        status,
    }
}

fn sample_ssm() -> Ssm {
    Ssm {
        minute_of_year: Some(210_000),
        second: 12_500,
        msg_count: Some(2),
        update_count: 11,
        intersection_id: 1201,
        region_id: 7,
        requests: vec![
            status(0x0a0b_0c0d, PrioritizationResponseStatus::Granted),
            SignalRequestStatus {
                role: None,
                outbound: None,
                eta_minute: None,
                ..status(0x0102_0304, PrioritizationResponseStatus::Processing)
            },
        ],
    }
}

#[test]
fn test_ssm_round_trip() {
    let ssm = sample_ssm();
    assert_eq!(round_trip(Frame::Ssm(ssm.clone())), Frame::Ssm(ssm));
}

#[test]
fn test_ssm_request_list_bounds() {
    let empty = Ssm {
        requests: Vec::new(),
        ..sample_ssm()
    };
    let err = encode_to_vec(&Frame::Ssm(empty)).expect_err("empty");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
    assert_eq!(err.path(), "SignalStatusMessage.status[0].sigStatus");

    let full = Ssm {
        requests: (0..32)
            .map(|i| status(i, PrioritizationResponseStatus::Requested))
            .collect(),
        ..sample_ssm()
    };
    assert_eq!(round_trip(Frame::Ssm(full.clone())), Frame::Ssm(full));

    let over = Ssm {
        requests: (0..33)
            .map(|i| status(i, PrioritizationResponseStatus::Requested))
            .collect(),
        ..sample_ssm()
    };
    let err = encode_to_vec(&Frame::Ssm(over)).expect_err("33 records");
    assert_eq!(err.kind(), ErrorKind::OutOfRangeValue);
    assert_eq!(err.path(), "SignalStatusMessage.status[0].sigStatus");
}
