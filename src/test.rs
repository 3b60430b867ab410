#![allow(unused)]
use super::device;
use super::disk;
use device::RamBlock;
use disk::{
    BlkStatus, BlockDevice, Device, DeviceConfig, DeviceState, DiskError, HostEvent, MemHost,
    Outcome, ReqOp, Request, Segment,
};
use rand::Rng;
use std::sync::Arc;

/// 容量为 capacity, 块大小 512 的已启动设备
fn started(capacity: usize) -> (Arc<MemHost>, Device) {
    let host = Arc::new(MemHost::new());
    let config = DeviceConfig::default()
        .with_capacity(capacity)
        .with_block_size(512);
    let device = Device::start_with(host.clone(), config).unwrap();
    (host, device)
}

fn write_at(device: &mut Device, offset: u64, data: &[u8]) -> Outcome {
    let mut buf = data.to_vec();
    device.dispatch(Request::write(offset, vec![Segment::from(&mut buf)]))
}

fn read_at(device: &mut Device, offset: u64, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    device
        .dispatch(Request::read(offset, vec![Segment::from(&mut buf)]))
        .into_result()
        .unwrap();
    buf
}

#[test]
fn two_writes_then_one_read() {
    let (_host, mut device) = started(1024);
    assert_eq!(write_at(&mut device, 0, &[0xAA; 256]), Outcome::Completed);
    assert_eq!(write_at(&mut device, 256, &[0xBB; 256]), Outcome::Completed);

    let data = read_at(&mut device, 0, 512);
    assert!(data[..256].iter().all(|b| *b == 0xAA));
    assert!(data[256..].iter().all(|b| *b == 0xBB));
}

#[test]
fn overflowing_segment_keeps_earlier_segments() {
    let (_host, mut device) = started(1024);
    let mut first = vec![0x5Au8; 512];
    let mut second = vec![0xC3u8; 600];
    let outcome = device.dispatch(Request::write(
        0,
        vec![Segment::from(&mut first), Segment::from(&mut second)],
    ));
    assert_eq!(
        outcome,
        Outcome::Failed(DiskError::OutOfRange {
            offset: 512,
            len: 600,
            capacity: 1024
        })
    );
    assert_eq!(outcome.status(), BlkStatus::IoErr);

    let data = read_at(&mut device, 0, 1024);
    assert!(data[..512].iter().all(|b| *b == 0x5A));
    assert!(data[512..].iter().all(|b| *b == 0));
    // 设备仍然可用
    assert!(write_at(&mut device, 512, &[1; 512]).is_completed());
}

#[test]
fn fresh_device_reads_zero() {
    let (_host, mut device) = started(8192);
    assert!(read_at(&mut device, 0, 8192).iter().all(|b| *b == 0));
}

#[test]
fn random_round_trip() {
    let capacity = 64 * 1024;
    let (_host, mut device) = started(capacity);
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let len = rng.gen_range(0..=4096);
        let offset = rng.gen_range(0..=capacity - len) as u64;
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);
        assert!(write_at(&mut device, offset, &data).is_completed());
        assert_eq!(read_at(&mut device, offset, len), data);
    }
}

#[test]
fn multi_segment_read_follows_cursor() {
    let (_host, mut device) = started(4096);
    let pattern: Vec<u8> = (0..3000).map(|i| (i % 251) as u8).collect();
    assert!(write_at(&mut device, 100, &pattern).is_completed());

    let mut a = vec![0u8; 1000];
    let mut b = vec![0u8; 7];
    let mut c = vec![0u8; 1993];
    let outcome = device.dispatch(Request::read(
        100,
        vec![Segment::from(&mut a), Segment::from(&mut b), Segment::from(&mut c)],
    ));
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!([a, b, c].concat(), pattern);
}

#[test]
fn out_of_range_touches_nothing() {
    let (_host, mut device) = started(1024);
    assert!(write_at(&mut device, 0, &[0x11; 1024]).is_completed());

    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let offset = rng.gen_range(0..2048u64);
        let len = rng.gen_range(1..1024usize);
        if offset + len as u64 <= 1024 {
            continue;
        }
        let outcome = write_at(&mut device, offset, &vec![0xEEu8; len]);
        assert!(matches!(
            outcome,
            Outcome::Failed(DiskError::OutOfRange { .. })
        ));

        let mut buf = vec![0x77u8; len];
        let outcome = device.dispatch(Request::read(offset, vec![Segment::from(&mut buf)]));
        assert!(matches!(
            outcome,
            Outcome::Failed(DiskError::OutOfRange { .. })
        ));
        // 读失败时缓冲区也没有被改动
        assert!(buf.iter().all(|b| *b == 0x77));
    }
    assert!(read_at(&mut device, 0, 1024).iter().all(|b| *b == 0x11));
}

#[test]
fn repeated_write_is_idempotent() {
    let (_host, mut device) = started(2048);
    let first = vec![0x42u8; 700];
    let second = vec![0x24u8; 300];

    let mut request = || {
        let mut a = first.clone();
        let mut b = second.clone();
        let outcome = device.dispatch(Request::write(
            512,
            vec![Segment::from(&mut a), Segment::from(&mut b)],
        ));
        assert!(outcome.is_completed());
        read_at(&mut device, 0, 2048)
    };
    let once = request();
    let twice = request();
    assert_eq!(once, twice);
}

#[test]
fn unsupported_op_leaves_store_alone() {
    let (_host, mut device) = started(1024);
    for op in [ReqOp::Flush, ReqOp::Discard, ReqOp::WriteZeroes] {
        let mut buf = vec![0xFFu8; 512];
        let outcome = device.dispatch(Request::new(op, 0, vec![Segment::from(&mut buf)]));
        assert_eq!(outcome, Outcome::Failed(DiskError::Unsupported(op)));
        assert_eq!(outcome.status(), BlkStatus::IoErr);
    }
    // 即使越界也报告不支持
    let mut buf = vec![0xFFu8; 4096];
    let outcome = device.dispatch(Request::new(ReqOp::Discard, 0, vec![Segment::from(&mut buf)]));
    assert_eq!(outcome, Outcome::Failed(DiskError::Unsupported(ReqOp::Discard)));
    assert!(read_at(&mut device, 0, 1024).iter().all(|b| *b == 0));
}

#[test]
fn sector_addressed_request() {
    let (_host, mut device) = started(4096);
    let mut data = vec![0x9Cu8; 512];
    let outcome = device.dispatch(Request::at_sector(
        ReqOp::Write,
        2,
        vec![Segment::from(&mut data)],
    ));
    assert!(outcome.is_completed());
    assert!(read_at(&mut device, 1024, 512).iter().all(|b| *b == 0x9C));
    assert!(read_at(&mut device, 0, 1024).iter().all(|b| *b == 0));
}

#[test]
fn sector_past_end_is_out_of_range() {
    let (_host, mut device) = started(1024);
    // 1 << 55 个扇区换算成字节会溢出 u64, 不能回绕到偏移 0
    for sector in [1u64 << 55, u64::MAX, 2] {
        let mut data = vec![0xEEu8; 16];
        let outcome = device.dispatch(Request::at_sector(
            ReqOp::Write,
            sector,
            vec![Segment::from(&mut data)],
        ));
        assert!(matches!(
            outcome,
            Outcome::Failed(DiskError::OutOfRange { .. })
        ));
    }
    assert!(read_at(&mut device, 0, 1024).iter().all(|b| *b == 0));
}

#[test]
fn empty_request_completes() {
    let (_host, mut device) = started(1024);
    assert_eq!(
        device.dispatch(Request::write(1024, Vec::new())),
        Outcome::Completed
    );
}

#[test]
fn start_publishes_descriptor() {
    let (host, device) = started(1024 * 1024);
    assert_eq!(device.state(), DeviceState::Published);
    let published = host.published();
    assert_eq!(published.len(), 1);
    let descriptor = &published[0];
    assert_eq!(Some(descriptor.identity), device.identity());
    assert_eq!(descriptor.name, "ramdisk");
    assert_eq!(descriptor.capacity_sectors, 2048);
    assert_eq!(descriptor.logical_block_size, 512);
    assert_eq!(descriptor.max_segments, 32);
    assert_eq!(descriptor.max_segment_size, 64 * 1024);
    assert_eq!(descriptor.queue_depth, 128);
    assert_eq!(descriptor.minors, 1);
}

#[test]
fn stop_releases_in_reverse_order() {
    let host = Arc::new(MemHost::with_minor_limit(1));
    let config = DeviceConfig::default().with_capacity(4096);
    let mut device = Device::start_with(host.clone(), config).unwrap();
    let identity = device.identity().unwrap();
    assert_eq!(identity.minor, 0);

    device.stop();
    assert_eq!(device.state(), DeviceState::Released);
    assert!(!device.is_allocated());
    assert_eq!(
        host.events(),
        vec![
            HostEvent::Register {
                name: "ramdisk".into(),
                major: identity.major
            },
            HostEvent::AllocateMinor(0),
            HostEvent::Publish(identity),
            HostEvent::Unpublish(identity),
            HostEvent::ReleaseMinor(0),
            HostEvent::Unregister {
                major: identity.major
            },
        ]
    );
    assert!(host.published().is_empty());
    assert!(!host.is_registered("ramdisk"));
    assert_eq!(host.minors_in_use(), 0);

    // 第二次 stop 什么都不做
    device.stop();
    assert_eq!(host.events().len(), 6);
}

#[test]
fn minor_exhaustion_rolls_back() {
    let host = Arc::new(MemHost::with_minor_limit(0));
    let mut device = Device::new(host.clone(), DeviceConfig::default()).unwrap();
    assert_eq!(device.start(), Err(DiskError::Exhausted));
    assert_eq!(device.state(), DeviceState::Uninitialized);
    assert!(!device.is_allocated());
    assert_eq!(device.identity(), None);
    assert!(!host.is_registered("ramdisk"));
    assert!(matches!(
        host.events().as_slice(),
        [HostEvent::Register { .. }, HostEvent::Unregister { .. }]
    ));
}

#[test]
fn rejected_publish_rolls_back() {
    let host = Arc::new(MemHost::with_minor_limit(4));
    host.reject_publish("queue limits not supported");
    let mut device = Device::new(host.clone(), DeviceConfig::default().with_capacity(8192)).unwrap();
    assert_eq!(
        device.start(),
        Err(DiskError::Rejected("queue limits not supported".into()))
    );
    assert_eq!(device.state(), DeviceState::Uninitialized);
    assert!(!device.is_allocated());
    assert_eq!(host.minors_in_use(), 0);
    assert!(!host.is_registered("ramdisk"));
    assert!(matches!(
        host.events().as_slice(),
        [
            HostEvent::Register { .. },
            HostEvent::AllocateMinor(0),
            HostEvent::ReleaseMinor(0),
            HostEvent::Unregister { .. },
        ]
    ));

    // 回滚之后可以重新启动
    host.heal();
    device.start().unwrap();
    assert!(device.is_published());
}

#[test]
fn refused_registration_frees_store() {
    let host = Arc::new(MemHost::with_minor_limit(4));
    host.refuse_registration();
    let mut device = Device::new(host.clone(), DeviceConfig::default()).unwrap();
    assert_eq!(
        device.start(),
        Err(DiskError::RegistrationFailed("ramdisk".into()))
    );
    assert!(!device.is_allocated());
    assert!(host.events().is_empty());
}

#[test]
fn allocation_failure_touches_no_host_state() {
    let host = Arc::new(MemHost::with_minor_limit(4));
    let capacity = isize::MAX as usize + 1;
    let mut device = Device::new(host.clone(), DeviceConfig::default().with_capacity(capacity)).unwrap();
    let err = device.start().unwrap_err();
    assert_eq!(err, DiskError::AllocationFailure { bytes: capacity });
    assert!(err.is_lifecycle());
    assert_eq!(device.state(), DeviceState::Uninitialized);
    assert!(host.events().is_empty());
}

#[test]
fn stop_before_start_is_noop() {
    let host = Arc::new(MemHost::new());
    let mut device = Device::new(host.clone(), DeviceConfig::default()).unwrap();
    device.stop();
    assert_eq!(device.state(), DeviceState::Uninitialized);
    assert!(host.events().is_empty());
}

#[test]
fn no_back_transitions() {
    let (_host, mut device) = started(1024);
    assert!(matches!(
        device.start(),
        Err(DiskError::InvalidState {
            state: DeviceState::Published,
            ..
        })
    ));
    device.stop();
    assert!(matches!(
        device.start(),
        Err(DiskError::InvalidState {
            state: DeviceState::Released,
            ..
        })
    ));
}

#[test]
fn offline_device_refuses_requests() {
    let host = Arc::new(MemHost::new());
    let mut device = Device::new(host, DeviceConfig::default().with_capacity(4096)).unwrap();
    assert_eq!(
        write_at(&mut device, 0, &[1; 16]),
        Outcome::Failed(DiskError::Offline)
    );
    device.start().unwrap();
    assert!(write_at(&mut device, 0, &[1; 16]).is_completed());
    device.stop();
    assert_eq!(
        write_at(&mut device, 0, &[1; 16]),
        Outcome::Failed(DiskError::Offline)
    );
}

#[test]
fn single_instance_per_host() {
    let host = Arc::new(MemHost::new());
    let config = DeviceConfig::default().with_capacity(4096);
    let mut first = Device::start_with(host.clone(), config.clone()).unwrap();

    let mut second = Device::new(host.clone(), config.clone()).unwrap();
    assert!(matches!(
        second.start(),
        Err(DiskError::RegistrationFailed(_))
    ));
    assert!(!second.is_allocated());

    first.stop();
    second.start().unwrap();
    assert_eq!(host.published().len(), 1);
}

#[test]
fn drop_tears_down() {
    let host = Arc::new(MemHost::with_minor_limit(1));
    {
        let _device =
            Device::start_with(host.clone(), DeviceConfig::default().with_capacity(4096)).unwrap();
        assert_eq!(host.minors_in_use(), 1);
    }
    assert_eq!(host.minors_in_use(), 0);
    assert!(host.published().is_empty());
    assert!(!host.is_registered("ramdisk"));
}

#[test]
fn invalid_config_is_refused() {
    let host = Arc::new(MemHost::new());
    let config = DeviceConfig::default().with_capacity(1000);
    assert!(matches!(
        Device::new(host.clone(), config),
        Err(DiskError::InvalidConfig(_))
    ));
    assert!(host.events().is_empty());
}

#[test]
fn block_interface_round_trip() {
    let (_host, device) = started(16 * 512);
    let block_dev: Arc<dyn BlockDevice> = Arc::new(RamBlock::new(device));
    assert_eq!(block_dev.block_size(), 512);
    assert_eq!(block_dev.num_blocks(), 16);

    let mut rng = rand::thread_rng();
    let mut blocks = vec![[0u8; 512]; 16];
    for (block_id, block) in blocks.iter_mut().enumerate() {
        rng.fill(&mut block[..]);
        block_dev.write_block(block_id, &block[..]).unwrap();
    }
    for (block_id, block) in blocks.iter().enumerate() {
        let mut buf = [0u8; 512];
        block_dev.read_block(block_id, &mut buf).unwrap();
        assert_eq!(&buf, block);
    }

    let mut buf = [0u8; 512];
    assert!(matches!(
        block_dev.read_block(16, &mut buf),
        Err(DiskError::OutOfRange { .. })
    ));
    assert_eq!(
        block_dev.write_block(0, &[0u8; 100]),
        Err(DiskError::BlockLength {
            len: 100,
            block_size: 512
        })
    );
}
