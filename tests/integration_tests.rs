use libcanbasic::bitrate::{Baudrate, BitrateFd, BitrateXl, Clock, FdProfile, Segments};
use libcanbasic::discovery::{ChannelCondition, LookupQuery};
use libcanbasic::filter::{AcceptanceFilter, FilterMode};
use libcanbasic::message::{MessageType, Received, Timestamp, TimestampXl};
use libcanbasic::mock::{FakeChannel, FakeDriver};
use libcanbasic::parameter::{Access, Features, FilterState, WireShape};
use libcanbasic::status::Language;
use libcanbasic::types::Device;
use libcanbasic::{
    Call, CanBasic, CanError, CanMessage, FdMessage, Generation, Handle, ParameterId,
    ParameterValue, Status, XlMessage,
};
use std::net::Ipv4Addr;
use std::sync::{Arc, Barrier};
use std::thread;

fn can() -> CanBasic<FakeDriver> {
    CanBasic::new(FakeDriver::with_default_channels().with_loopback())
}

fn xl_bitrate() -> BitrateXl {
    BitrateXl::new(Clock::MHz(160), 2, Segments::new(63, 16, 16))
        .with_xl_phase(Segments::new(5, 2, 2))
}

#[test]
fn test_classic_round_trip() {
    let can = can();
    can.initialize(Handle::PCIBUS1, Baudrate::Baud500K).unwrap();
    assert_eq!(can.generation(Handle::PCIBUS1), Ok(Generation::Classic));

    let msg = CanMessage::extended(0x18DA_F110, &[0x02, 0x10, 0x03]).unwrap();
    assert_eq!(can.write(Handle::PCIBUS1, &msg), Ok(Status::OK));

    let (received, timestamp) = can.read(Handle::PCIBUS1).unwrap();
    assert_eq!(received, msg);
    assert!(received.is_extended());
    assert_eq!(timestamp, Timestamp::new(1, 0, 0));
    assert_eq!(timestamp.total_micros(), 1_000);

    let record = &can.driver().transmitted(Handle::PCIBUS1)[0];
    assert_eq!(record.len(), 16);
}

#[test]
fn test_fd_round_trip() {
    let can = can();
    can.initialize_fd(Handle::USBBUS1, &BitrateFd::preset(FdProfile::Rate500k2m))
        .unwrap();

    let payload: Vec<u8> = (0..24).collect();
    let msg = FdMessage::fd(0x123, false, &payload).unwrap();
    assert_eq!(msg.dlc, 12);
    can.write_fd(Handle::USBBUS1, &msg).unwrap();

    let (received, _) = can.read_fd(Handle::USBBUS1).unwrap();
    assert_eq!(received.data(), &payload[..]);
    assert_eq!(can.driver().calls().last().unwrap().len, 72 + 8);
}

#[test]
fn test_xl_round_trip() {
    let can = can();
    can.initialize_xl(Handle::LANBUS1, &xl_bitrate()).unwrap();

    let msg = XlMessage::new(0x42, &[0x5A; 2048])
        .unwrap()
        .with_header(3, 0x01, 0xDEAD_BEEF);
    can.write_xl(Handle::LANBUS1, &msg).unwrap();

    match can.read_any(Handle::LANBUS1).unwrap() {
        Received::Xl(received, timestamp) => {
            assert_eq!(received, msg);
            assert_eq!(timestamp, TimestampXl(1_000));
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn test_xl_channel_carries_classic_frames() {
    let can = can();
    can.initialize_xl(Handle::LANBUS1, &xl_bitrate()).unwrap();

    let classic = CanMessage::standard(0x7DF, &[0x02, 0x01, 0x0D]).unwrap();
    let msg = XlMessage::from(&classic);
    assert!(!msg.is_xl());
    can.write_xl(Handle::LANBUS1, &msg).unwrap();

    let (received, _) = can.read_xl(Handle::LANBUS1).unwrap();
    assert_eq!(received.pid, 0x7DF);
    assert_eq!(received.data(), &[0x02, 0x01, 0x0D]);
}

#[test]
fn test_validation_before_driver_call() {
    let can = can();
    can.initialize(Handle::PCIBUS1, Baudrate::Baud1M).unwrap();
    can.initialize_fd(Handle::USBBUS1, &BitrateFd::preset(FdProfile::Rate1m4m))
        .unwrap();
    can.initialize_xl(Handle::LANBUS1, &xl_bitrate()).unwrap();

    let msg = CanMessage {
        id: 0x800,
        msg_type: MessageType::STANDARD,
        len: 0,
        data: [0; 8],
    };
    let err = can.write(Handle::PCIBUS1, &msg).unwrap_err();
    assert_eq!(err, CanError::IdOutOfRange { id: 0x800, max: 0x7FF });
    assert_eq!(err.status(), Status::ILLPARAMVAL);

    let mut msg = FdMessage::fd(0x10, false, &[0; 8]).unwrap();
    msg.dlc = 16;
    assert!(can.write_fd(Handle::USBBUS1, &msg).is_err());

    let mut msg = XlMessage::new(0x10, &[0]).unwrap();
    msg.data = vec![0; 2049];
    assert_eq!(
        can.write_xl(Handle::LANBUS1, &msg),
        Err(CanError::PayloadTooLong {
            len: 2049,
            max: 2048
        })
    );
    msg.data.clear();
    assert_eq!(
        can.write_xl(Handle::LANBUS1, &msg),
        Err(CanError::EmptyXlPayload)
    );

    let driver = can.driver();
    assert_eq!(driver.call_count(Call::Write), 0);
    assert_eq!(driver.call_count(Call::WriteFd), 0);
    assert_eq!(driver.call_count(Call::WriteXl), 0);
}

#[test]
fn test_generation_mismatch() {
    let can = can();
    can.initialize(Handle::PCIBUS1, Baudrate::Baud250K).unwrap();

    let err = can.read_fd(Handle::PCIBUS1).unwrap_err();
    assert_eq!(
        err,
        CanError::GenerationMismatch {
            handle: Handle::PCIBUS1,
            expected: Generation::Fd,
            actual: Generation::Classic,
        }
    );
    assert_eq!(err.status(), Status::ILLDATA);
    assert_eq!(can.driver().call_count(Call::ReadFd), 0);
}

#[test]
fn test_handle_checks() {
    let can = can();
    let err = can.read(Handle::USBBUS2).unwrap_err();
    assert_eq!(err, CanError::NotInitialized(Handle::USBBUS2));
    assert_eq!(err.status(), Status::INITIALIZE);

    let err = can
        .initialize(Handle(0x99), Baudrate::Baud500K)
        .unwrap_err();
    assert_eq!(err.status(), Status::ILLHW);
    assert!(err.status().is_illegal_handle());
    assert!(can.driver().calls().is_empty());

    // Known handle family, but no such hardware attached
    let err = can
        .initialize(Handle::USBBUS9, Baudrate::Baud500K)
        .unwrap_err();
    assert_eq!(err, CanError::Status(Status::ILLHW));
    assert!(!can.is_initialized(Handle::USBBUS9));
}

#[test]
fn test_occupied_hardware() {
    let driver = FakeDriver::new().with_channel(
        FakeChannel::new(Handle::USBBUS1, Device::Usb, 0, Features::empty(), "PCAN-USB")
            .with_condition(ChannelCondition::OCCUPIED),
    );
    let can = CanBasic::new(driver);
    assert_eq!(
        can.initialize(Handle::USBBUS1, Baudrate::Baud500K),
        Err(CanError::Status(Status::HWINUSE))
    );
    assert!(can.initialized_handles().is_empty());
}

#[test]
fn test_reinitialize_is_rejected() {
    let can = can();
    can.initialize(Handle::USBBUS1, Baudrate::Baud500K).unwrap();
    let err = can
        .initialize_fd(Handle::USBBUS1, &BitrateFd::preset(FdProfile::Rate500k2m))
        .unwrap_err();
    assert_eq!(err.status(), Status::ILLOPERATION);
    assert_eq!(can.generation(Handle::USBBUS1), Ok(Generation::Classic));
    assert_eq!(can.driver().call_count(Call::InitializeFd), 0);
}

#[test]
fn test_malformed_bitrate_never_reaches_driver() {
    let can = can();
    let mut bitrate = BitrateFd::preset(FdProfile::Rate500k2m);
    bitrate.nom_brp = 0;
    let err = can.initialize_fd(Handle::USBBUS1, &bitrate).unwrap_err();
    assert!(matches!(err, CanError::Bitrate(_)));
    assert_eq!(err.status(), Status::ILLPARAMVAL);

    let mut bitrate = xl_bitrate();
    bitrate.xl = None;
    assert!(can.initialize_xl(Handle::LANBUS1, &bitrate).is_err());
    assert!(can.driver().calls().is_empty());
}

#[test]
fn test_broadcast_uninitialize() {
    let can = can();
    can.initialize(Handle::PCIBUS1, Baudrate::Baud500K).unwrap();
    can.initialize(Handle::USBBUS1, Baudrate::Baud500K).unwrap();
    can.initialize_xl(Handle::LANBUS1, &xl_bitrate()).unwrap();
    assert_eq!(can.initialized_handles().len(), 3);

    can.uninitialize(Handle::NONE).unwrap();
    assert!(can.initialized_handles().is_empty());
    assert_eq!(can.driver().open_handles(), 0);

    let calls: Vec<_> = can
        .driver()
        .calls()
        .into_iter()
        .filter(|record| record.call == Call::Uninitialize)
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].handle, Handle::NONE);

    // Already closed: still a success
    assert_eq!(can.uninitialize(Handle::PCIBUS1), Ok(Status::OK));
}

#[test]
fn test_queue_signals_are_recoverable() {
    let can = CanBasic::new(FakeDriver::with_default_channels().with_tx_capacity(2));
    can.initialize(Handle::PCIBUS1, Baudrate::Baud500K).unwrap();

    let err = can.read(Handle::PCIBUS1).unwrap_err();
    assert!(err.is_queue_empty());
    assert!(err.is_recoverable());

    let msg = CanMessage::standard(0x100, &[1]).unwrap();
    can.write(Handle::PCIBUS1, &msg).unwrap();
    can.write(Handle::PCIBUS1, &msg).unwrap();
    let err = can.write(Handle::PCIBUS1, &msg).unwrap_err();
    assert!(err.is_transmit_full());
    assert_eq!(err, CanError::Status(Status::QXMTFULL));

    can.reset(Handle::PCIBUS1).unwrap();
    assert!(can.write(Handle::PCIBUS1, &msg).is_ok());
}

#[test]
fn test_caution_counts_as_success() {
    let can = can();
    can.initialize(Handle::PCIBUS1, Baudrate::Baud500K).unwrap();
    can.driver().inject(Call::Write, Status::CAUTION);
    let msg = CanMessage::standard(0x100, &[1]).unwrap();
    assert_eq!(can.write(Handle::PCIBUS1, &msg), Ok(Status::CAUTION));
}

#[test]
fn test_get_status_and_reset() {
    let can = can();
    assert!(can.get_status(Handle::PCIBUS1).is_err());
    assert!(can.reset(Handle::PCIBUS1).is_err());

    can.initialize(Handle::PCIBUS1, Baudrate::Baud500K).unwrap();
    assert_eq!(can.get_status(Handle::PCIBUS1), Ok(Status::OK));

    can.driver()
        .set_bus_status(Handle::PCIBUS1, Status::BUSOFF | Status::QRCVEMPTY);
    let status = can.get_status(Handle::PCIBUS1).unwrap();
    assert!(status.is_bus_error());
    assert!(status.contains(Status::QRCVEMPTY));

    let msg = CanMessage::standard(0x100, &[1]).unwrap();
    can.write(Handle::PCIBUS1, &msg).unwrap();
    can.reset(Handle::PCIBUS1).unwrap();
    assert!(can.read(Handle::PCIBUS1).unwrap_err().is_queue_empty());
}

#[test]
fn test_set_then_get_round_trips() {
    let can = can();
    can.initialize(Handle::USBBUS1, Baudrate::Baud500K).unwrap();

    for id in ParameterId::ALL {
        if id.access() != Access::ReadWrite {
            continue;
        }
        let value = match id.shape() {
            WireShape::Integer => ParameterValue::Integer(0x0102_0304),
            WireShape::Bitmask64 => ParameterValue::Bitmask(0x0000_0FFF_0000_0123),
            _ => continue,
        };
        can.set_value(Handle::USBBUS1, id, value.clone()).unwrap();
        assert_eq!(can.get_value(Handle::USBBUS1, id), Ok(value), "{id:?}");
    }
}

#[test]
fn test_text_parameters() {
    let can = can();
    can.set_value(Handle::NONE, ParameterId::LogLocation, "/var/log/can")
        .unwrap();
    assert_eq!(
        can.get_value(Handle::NONE, ParameterId::LogLocation),
        Ok(ParameterValue::Text("/var/log/can".to_string()))
    );

    let version = can.get_value(Handle::NONE, ParameterId::ApiVersion).unwrap();
    assert_eq!(version.as_text(), Some("4.9.0.942"));

    let name = can
        .get_value(Handle::LANBUS1, ParameterId::HardwareName)
        .unwrap();
    assert_eq!(name.as_text(), Some("PCAN-Gateway"));

    let err = can
        .set_value(Handle::NONE, ParameterId::LogText, "x".repeat(256).as_str())
        .unwrap_err();
    assert_eq!(err.status(), Status::ILLPARAMVAL);
}

#[test]
fn test_access_and_shape_checks() {
    let can = can();
    assert_eq!(
        can.get_value(Handle::NONE, ParameterId::LogText),
        Err(CanError::NotReadable(ParameterId::LogText))
    );
    let err = can
        .set_value(Handle::NONE, ParameterId::ApiVersion, "1.0")
        .unwrap_err();
    assert_eq!(err, CanError::NotWritable(ParameterId::ApiVersion));
    assert_eq!(err.status(), Status::ILLPARAMTYPE);

    let err = can
        .set_value(Handle::NONE, ParameterId::ListenOnly, "on")
        .unwrap_err();
    assert_eq!(err, CanError::ValueShape(ParameterId::ListenOnly));
    assert_eq!(err.status(), Status::ILLPARAMVAL);

    assert!(can.driver().calls().is_empty());

    // Supported by the registry, not by this hardware
    assert_eq!(
        can.get_value(Handle::PCIBUS1, ParameterId::FirmwareVersion),
        Err(CanError::Status(Status::ILLPARAMTYPE))
    );
}

#[test]
fn test_attached_channels_two_phase() {
    let can = can();
    let channels = can
        .get_value(Handle::NONE, ParameterId::AttachedChannels)
        .unwrap()
        .into_channels()
        .unwrap();
    assert_eq!(channels.len(), 4);
    assert_eq!(channels[0].handle, Handle::USBBUS1);
    assert_eq!(channels[1].controller_number, 1);
    assert_eq!(channels[3].device(), Some(Device::Lan));
    assert!(channels[3].features.contains(Features::XL_CAPABLE));

    let driver = can.driver();
    let calls = driver.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].call, Call::GetValue(ParameterId::AttachedChannelsCount));
    assert_eq!(calls[0].len, 4);
    assert_eq!(calls[1].call, Call::GetValue(ParameterId::AttachedChannels));
    assert_eq!(calls[1].len, 4 * 52);
}

#[test]
fn test_attached_channels_count_failure() {
    let can = can();
    can.driver().inject(
        Call::GetValue(ParameterId::AttachedChannelsCount),
        Status::ILLPARAMTYPE,
    );
    assert_eq!(
        can.attached_channels(Handle::NONE),
        Err(CanError::Status(Status::ILLPARAMTYPE))
    );
    assert_eq!(
        can.driver()
            .call_count(Call::GetValue(ParameterId::AttachedChannels)),
        0
    );
}

#[test]
fn test_attached_channels_rejects_oversized_count() {
    let can = can();
    for count in [u32::MAX, 65] {
        can.driver().report_channel_count(count);
        let err = can.attached_channels(Handle::NONE).unwrap_err();
        assert_eq!(err, CanError::ChannelCount(count));
        assert_eq!(err.status(), Status::ILLDATA);
    }
    assert_eq!(
        can.driver()
            .call_count(Call::GetValue(ParameterId::AttachedChannels)),
        0
    );
}

#[test]
fn test_attached_channels_empty_system() {
    let can = CanBasic::new(FakeDriver::new());
    assert_eq!(can.attached_channels(Handle::NONE), Ok(Vec::new()));
    let calls = can.driver().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].len, 0);
}

#[test]
fn test_filter_only_widens() {
    let can = can();
    can.initialize(Handle::PCIBUS1, Baudrate::Baud500K).unwrap();
    assert_eq!(
        can.acceptance_filter(Handle::PCIBUS1),
        Ok(AcceptanceFilter::Open)
    );

    can.set_value(Handle::PCIBUS1, ParameterId::MessageFilter, FilterState::Close)
        .unwrap();
    let filter = can.acceptance_filter(Handle::PCIBUS1).unwrap();
    assert!(!filter.accepts(0x150, false));

    can.filter_messages(Handle::PCIBUS1, 0x100, 0x1FF, FilterMode::Standard)
        .unwrap();
    assert!(can
        .acceptance_filter(Handle::PCIBUS1)
        .unwrap()
        .accepts(0x150, false));

    can.filter_messages(Handle::PCIBUS1, 0x300, 0x3FF, FilterMode::Standard)
        .unwrap();
    let filter = can.acceptance_filter(Handle::PCIBUS1).unwrap();
    assert!(filter.accepts(0x150, false));
    assert!(filter.accepts(0x3AB, false));
    assert!(!filter.accepts(0x250, false));
    assert_eq!(filter.state(), FilterState::Custom);

    let err = can
        .filter_messages(Handle::PCIBUS1, 0x200, 0x100, FilterMode::Standard)
        .unwrap_err();
    assert_eq!(err.status(), Status::ILLPARAMVAL);
    assert!(can
        .filter_messages(Handle::PCIBUS1, 0, 0x800, FilterMode::Standard)
        .is_err());
    assert_eq!(can.driver().filters(Handle::PCIBUS1).len(), 2);

    can.set_value(Handle::PCIBUS1, ParameterId::MessageFilter, FilterState::Open)
        .unwrap();
    assert!(can
        .acceptance_filter(Handle::PCIBUS1)
        .unwrap()
        .accepts(0x1FFF_FFFF, true));
}

#[test]
fn test_filter_requires_initialized_channel() {
    let can = can();
    assert_eq!(
        can.filter_messages(Handle::USBBUS1, 0x100, 0x1FF, FilterMode::Extended),
        Err(CanError::NotInitialized(Handle::USBBUS1))
    );
    assert_eq!(can.driver().calls().len(), 0);
}

#[test]
fn test_lookup_channel() {
    let can = can();
    let query = LookupQuery::new()
        .device_type(Device::Usb)
        .controller_number(1);
    assert_eq!(can.lookup_channel(&query), Ok(Handle::USBBUS2));

    let query = LookupQuery::new().ip_address(Ipv4Addr::new(192, 168, 1, 10));
    assert_eq!(can.lookup_channel(&query), Ok(Handle::LANBUS1));

    assert_eq!(
        can.lookup_channel_str("DeviceType=PCAN_PCI"),
        Ok(Handle::PCIBUS1)
    );

    assert_eq!(
        can.lookup_channel_str("devicetype=PCAN_LAN,deviceid=99"),
        Err(CanError::Status(Status::REGTEST))
    );

    let calls = can.driver().calls().len();
    let err = can.lookup_channel_str("serialnumber=1").unwrap_err();
    assert!(matches!(err, CanError::Lookup(_)));
    assert_eq!(err.status(), Status::ILLPARAMVAL);
    assert!(can.lookup_channel_str("deviceid=1,deviceid=2").is_err());
    assert!(can.lookup_channel(&LookupQuery::new()).is_err());
    assert_eq!(can.driver().calls().len(), calls);
}

#[test]
fn test_error_text() {
    let can = can();
    assert_eq!(
        can.get_error_text(Status::OK, Language::German),
        Ok("Kein Fehler".to_string())
    );
    let text = can
        .get_error_text(Status::QRCVEMPTY, Language::English)
        .unwrap();
    assert_eq!(text, Status::QRCVEMPTY.description());
    let call = can.driver().calls().pop().unwrap();
    assert_eq!(call.len, 256);
    assert_eq!(call.handle, Handle::NONE);
}

#[test]
fn test_distinct_handles_in_parallel() {
    let can = Arc::new(can());
    can.initialize(Handle::USBBUS1, Baudrate::Baud500K).unwrap();
    can.initialize(Handle::USBBUS2, Baudrate::Baud500K).unwrap();

    let workers: Vec<_> = [Handle::USBBUS1, Handle::USBBUS2]
        .into_iter()
        .map(|handle| {
            let can = Arc::clone(&can);
            thread::spawn(move || {
                for i in 0..10u8 {
                    let msg = CanMessage::standard(0x100 + u32::from(i), &[i]).unwrap();
                    can.write(handle, &msg).unwrap();
                }
                let mut ids = Vec::new();
                while let Ok((msg, _)) = can.read(handle) {
                    ids.push(msg.id);
                }
                ids
            })
        })
        .collect();

    for worker in workers {
        let ids = worker.join().unwrap();
        assert_eq!(ids, (0x100..0x10A).collect::<Vec<u32>>());
    }
}

#[test]
fn test_broadcast_uninitialize_while_initializing() {
    const ROUNDS: usize = 50;
    let can = Arc::new(can());
    let start = Arc::new(Barrier::new(2));
    let done = Arc::new(Barrier::new(2));

    let churn = {
        let (can, start, done) = (Arc::clone(&can), Arc::clone(&start), Arc::clone(&done));
        thread::spawn(move || {
            for _ in 0..ROUNDS {
                start.wait();
                for handle in [Handle::USBBUS1, Handle::USBBUS2, Handle::PCIBUS1] {
                    let _ = can.initialize(handle, Baudrate::Baud500K);
                    let _ = can.uninitialize(handle);
                    let _ = can.initialize(handle, Baudrate::Baud250K);
                }
                done.wait();
                // Main thread compares both views before the next round
                done.wait();
            }
        })
    };

    for _ in 0..ROUNDS {
        start.wait();
        can.uninitialize(Handle::NONE).unwrap();
        done.wait();
        assert_eq!(can.initialized_handles(), can.driver().opened());
        done.wait();
    }
    churn.join().unwrap();

    can.uninitialize(Handle::NONE).unwrap();
    assert!(can.initialized_handles().is_empty());
    assert!(can.driver().opened().is_empty());
}
