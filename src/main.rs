use std::sync::Arc;

use clap::{value_parser, Arg, Command};
use log::{error, info};
use rand::Rng;

use ramdisk::disk::{
    Device, DeviceConfig, DiskError, MemHost, Outcome, Request, Segment, PAGE_SIZE,
    RAMDISK_MAX_SEGMENTS, RAMDISK_MAX_SEGMENT_SIZE, SECTOR_SIZE,
};
use ramdisk::logger;

const DEFAULT_ROUNDS: usize = 64;

#[derive(Debug, thiserror::Error)]
enum CheckError {
    #[error("{0}")]
    Disk(#[from] DiskError),

    #[error("round {round}: data read back at {offset} differs from data written")]
    Mismatch { round: usize, offset: u64 },

    #[error("write past the end returned {0:?}")]
    Unexpected(Outcome),
}

fn main() {
    logger::init();
    if let Err(err) = ramdisk_self_check() {
        match &err {
            // 设备没能启动, 已获取的资源都已回滚
            CheckError::Disk(disk_err) if disk_err.is_lifecycle() => {
                error!("ramdisk could not be started: {}", disk_err)
            }
            _ => error!("self check failed: {}", err),
        }
        std::process::exit(1);
    }
}

fn cli() -> Command {
    Command::new("ramdisk self check")
        .about("Start a memory-backed block device, run random I/O against it and tear it down")
        .arg(
            Arg::new("capacity")
                .short('c')
                .long("capacity")
                .value_parser(value_parser!(usize))
                .default_value("40")
                .help("Device capacity in MiB"),
        )
        .arg(
            Arg::new("block-size")
                .short('b')
                .long("block-size")
                .value_parser(value_parser!(usize))
                .default_value("4096")
                .help("Logical and physical block size in bytes"),
        )
        .arg(
            Arg::new("max-segments")
                .long("max-segments")
                .value_parser(value_parser!(usize))
                .default_value("32")
                .help("Maximum segments per request"),
        )
        .arg(
            Arg::new("max-segment-size")
                .long("max-segment-size")
                .value_parser(value_parser!(usize))
                .default_value("65536")
                .help("Maximum segment size in bytes"),
        )
        .arg(
            Arg::new("rounds")
                .short('r')
                .long("rounds")
                .value_parser(value_parser!(usize))
                .default_value("64")
                .help("Number of random write/read-back rounds"),
        )
}

/// MiB 换算成字节, 溢出时报告配置错误而不是回绕
fn capacity_bytes(mib: usize) -> Result<usize, DiskError> {
    mib.checked_mul(1 << 20)
        .ok_or_else(|| DiskError::InvalidConfig(format!("capacity of {} MiB overflows", mib)))
}

fn ramdisk_self_check() -> Result<(), CheckError> {
    let matches = cli().get_matches();
    let arg = |id: &str, default: usize| matches.get_one::<usize>(id).copied().unwrap_or(default);

    let config = DeviceConfig::default()
        .with_capacity(capacity_bytes(arg("capacity", 40))?)
        .with_block_size(arg("block-size", PAGE_SIZE))
        .with_max_segments(arg("max-segments", RAMDISK_MAX_SEGMENTS))
        .with_max_segment_size(arg("max-segment-size", RAMDISK_MAX_SEGMENT_SIZE));
    let rounds = arg("rounds", DEFAULT_ROUNDS);
    info!("config: {:?}", config);

    let host = Arc::new(MemHost::new());
    let mut device = Device::start_with(host, config)?;

    let mut rng = rand::thread_rng();
    for round in 0..rounds {
        random_round(&mut device, &mut rng, round)?;
    }
    info!("{} write/read-back rounds passed", rounds);

    // 越过末尾的请求必须失败
    let capacity = device.capacity() as u64;
    let mut tail = vec![0u8; SECTOR_SIZE * 2];
    let outcome = device.dispatch(Request::write(
        capacity - SECTOR_SIZE as u64,
        vec![Segment::from(&mut tail)],
    ));
    if !matches!(outcome, Outcome::Failed(DiskError::OutOfRange { .. })) {
        return Err(CheckError::Unexpected(outcome));
    }
    info!("write past the end rejected: {:?}", outcome);

    device.stop();
    Ok(())
}

/// 随机写一个多段请求, 再读回来比较
fn random_round(device: &mut Device, rng: &mut impl Rng, round: usize) -> Result<(), CheckError> {
    let config = device.config().clone();
    let segment_count = rng.gen_range(1..=config.max_segments);
    let sectors_per_segment = (config.max_segment_size / SECTOR_SIZE).max(1);
    let mut written: Vec<Vec<u8>> = (0..segment_count)
        .map(|_| {
            let mut buf = vec![0u8; rng.gen_range(1..=sectors_per_segment) * SECTOR_SIZE];
            rng.fill(&mut buf[..]);
            buf
        })
        .collect();
    let total: usize = written.iter().map(Vec::len).sum();
    if total > config.capacity {
        return Ok(());
    }
    let offset = (rng.gen_range(0..=(config.capacity - total) / SECTOR_SIZE) * SECTOR_SIZE) as u64;

    device
        .dispatch(Request::write(
            offset,
            written.iter_mut().map(Segment::from).collect(),
        ))
        .into_result()?;

    let mut read_back: Vec<Vec<u8>> = written.iter().map(|buf| vec![0u8; buf.len()]).collect();
    device
        .dispatch(Request::read(
            offset,
            read_back.iter_mut().map(Segment::from).collect(),
        ))
        .into_result()?;

    if written != read_back {
        return Err(CheckError::Mismatch { round, offset });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_overflow_is_reported() {
        assert_eq!(capacity_bytes(40), Ok(40 << 20));
        assert!(matches!(
            capacity_bytes(usize::MAX),
            Err(DiskError::InvalidConfig(_))
        ));
        assert!(matches!(
            capacity_bytes((usize::MAX >> 20) + 1),
            Err(DiskError::InvalidConfig(_))
        ));
    }
}
