mod common;

use common::*;
use libcapture_reader::*;
use libcapture_tools::*;
use std::time::Duration;

fn open_file(interface: &ReadInterface) -> FileObject {
    let mut file = FileObject::new();
    interface
        .dispatch(&mut file, Request::Create(OpenRequest::new()))
        .expect("create");
    file
}

fn encode(ids: &[u32]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

#[test]
fn snap_length_controls() {
    let (_queue, interface) = setup(&Config::default());
    let mut file = open_file(&interface);

    let mut input = 1500u32.to_le_bytes();
    let code = ControlFunction::SetSnapLength.code(false);
    let n = interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut input)))
        .expect("set snap length");
    assert_eq!(n, 0);

    for wide in [false, true] {
        let mut output = [0u8; 8];
        let code = ControlFunction::GetSnapLength.code(wide);
        let n = interface
            .dispatch(&mut file, Request::Control(ControlRequest::with_output(code, &mut output)))
            .expect("get snap length");
        assert_eq!(n, 4);
        assert_eq!(u32::from_le_bytes([output[0], output[1], output[2], output[3]]), 1500);
    }
}

#[test]
fn statistics_control() {
    let (queue, interface) = setup(&config(&[("snap_length", 64)]));
    let mut file = open_file(&interface);
    queue.enqueue(packet(1, 10, 1, 1));

    let mut output = vec![0u8; Statistics::SIZE];
    let code = ControlFunction::GetStatistics.code(false);
    let n = interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_output(code, &mut output)))
        .expect("statistics");
    assert_eq!(n, Statistics::SIZE);
    let stats = Statistics::parse(&output).expect("statistics record");
    let session = file.session().expect("session");
    assert_eq!(stats.reader_id, session.reader_id().0);
    assert_eq!(stats.active_readers, 1);
    assert_eq!(stats.max_snap_length, 64);
    assert_eq!(stats.enqueued_blocks, 1);
    assert_eq!(stats, session.statistics());

    let mut short = vec![0u8; Statistics::SIZE - 1];
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_output(code, &mut short)))
        .expect_err("output too small");
    assert!(matches!(err, Error::BufferTooSmall { required: 48, actual: 47 }));
}

#[test]
fn filter_controls() {
    let (queue, interface) = setup(&config(&[("max_filter_ids", 4)]));
    let mut file = open_file(&interface);
    let session = file.session().expect("session").clone();

    let mut ids = encode(&[3, 5]);
    let code = ControlFunction::FilterProcesses.code(false);
    interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut ids)))
        .expect("process filter");
    let mut ids = encode(&[10]);
    let code = ControlFunction::FilterConnections.code(true);
    interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut ids)))
        .expect("connection filter");
    assert_eq!(session.filter(FilterKind::Process).expect("list").ids(), &[3, 5]);
    assert_eq!(session.filter(FilterKind::Connection).expect("list").ids(), &[10]);

    // too many identifiers: rejected, previous list kept
    let mut ids = encode(&[1, 2, 3, 4, 5]);
    let code = ControlFunction::FilterProcesses.code(false);
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut ids)))
        .expect_err("too many ids");
    assert!(matches!(err, Error::InvalidParameter(_)));
    assert_eq!(session.filter(FilterKind::Process).expect("list").ids(), &[3, 5]);

    for seq in 0..6 {
        queue.enqueue(packet(seq, 10, seq, if seq == 1 { 10 } else { 11 }));
    }
    let blocks = parse_stream(&drain(&session, 4096));
    assert_eq!(process_ids(&blocks), vec![0, 2, 4]);

    // empty input clears the list
    let code = ControlFunction::FilterProcesses.code(false);
    interface
        .dispatch(&mut file, Request::Control(ControlRequest::new(code, 0, 0, None)))
        .expect("clear filter");
    assert!(session.filter(FilterKind::Process).is_none());
}

#[test]
fn open_connections_control() {
    let (queue, interface) = setup(&Config::default());
    let mut file = open_file(&interface);
    let table = ConnectionTable {
        connections: vec![
            OpenConnection {
                connection_id: 1,
                process_id: 100,
            },
            OpenConnection {
                connection_id: 2,
                process_id: 200,
            },
        ],
    };
    let mut input = table.to_vec();
    let code = ControlFunction::SetOpenConnections.code(false);
    interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut input)))
        .expect("connection table");
    assert_eq!(queue.open_connections(), table);

    // count larger than the blob
    let mut input = table.to_vec();
    input[0] = 3;
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut input)))
        .expect_err("truncated table");
    assert!(matches!(err, Error::BufferTooSmall { .. }));
    assert_eq!(queue.open_connections(), table);
}

#[test]
fn data_event_control() {
    let (queue, interface) = setup(&Config::default());
    let mut file = open_file(&interface);
    let session = file.session().expect("session").clone();
    drain(&session, 4096);

    let code = ControlFunction::SetDataEvent.code(true);
    let mut input = 0xdead_beef_0000_0001u64.to_le_bytes();
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut input)))
        .expect_err("unknown handle");
    assert!(matches!(err, Error::InvalidParameter(_)));

    let (sender, receiver) = crossbeam_channel::unbounded();
    queue.register_event(EventHandle(0xdead_beef_0000_0001), sender);
    interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut input)))
        .expect("arm notification");
    assert!(receiver.try_recv().is_err());

    queue.enqueue(packet(1, 10, 1, 1));
    let reader = receiver
        .recv_timeout(Duration::from_secs(1))
        .expect("notification");
    assert_eq!(reader, session.reader_id());

    // a zero handle disarms
    let mut input = 0u32.to_le_bytes();
    let narrow = ControlFunction::SetDataEvent.code(false);
    interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(narrow, &mut input)))
        .expect("disarm notification");
    queue.enqueue(packet(2, 10, 1, 1));
    assert!(receiver.try_recv().is_err());

    // the wide variant needs 8 bytes of input
    let mut input = [1u8; 4];
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::with_input(code, &mut input)))
        .expect_err("short input");
    assert!(matches!(err, Error::BufferTooSmall { required: 8, actual: 4 }));
}

#[test]
fn control_validation() {
    let (_queue, interface) = setup(&Config::default());
    let mut file = open_file(&interface);

    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::new(0x800, 0, 0, None)))
        .expect_err("unknown code");
    assert!(matches!(err, Error::InvalidRequest(0x800)));

    let code = ControlFunction::SetSnapLength.code(false);
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::new(code, 4, 0, None)))
        .expect_err("missing buffer");
    assert!(matches!(err, Error::InvalidParameter(_)));

    let filter = ControlFunction::FilterProcesses.code(false);
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::new(filter, 8, 0, None)))
        .expect_err("declared input without buffer");
    assert!(matches!(err, Error::InvalidParameter(_)));

    let mut buf = [0u8; 2];
    let err = interface
        .dispatch(&mut file, Request::Control(ControlRequest::new(code, 4, 0, Some(&mut buf[..]))))
        .expect_err("short buffer");
    assert!(matches!(err, Error::BufferTooSmall { required: 4, actual: 2 }));

    // errors never tear the session down
    assert!(file.is_open());
    let session = file.session().expect("session");
    assert_eq!(session.snap_length(), 0);
    assert!(!drain(session, 4096).is_empty());
}

#[test]
fn dispatch_without_session() {
    let (_queue, interface) = setup(&Config::default());
    let mut file = FileObject::new();
    let mut buf = [0u8; 16];
    assert!(matches!(
        interface.dispatch(&mut file, Request::Read(&mut buf)),
        Err(Error::InvalidParameter(_))
    ));
    let code = ControlFunction::Restart.code(false);
    assert!(matches!(
        interface.dispatch(&mut file, Request::Control(ControlRequest::new(code, 0, 0, None))),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        interface.dispatch(&mut file, Request::Close),
        Err(Error::InvalidParameter(_))
    ));
}
