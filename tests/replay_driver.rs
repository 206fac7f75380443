//! Recorded packet file through the async driver into a product directory

mod common;

use anyhow::Result;
use common::{cycle, geometry};
use seviri::ccsds::write_packet;
use seviri::product::{MANIFEST_FILE, image_file};
use seviri::{
    DecodeSession, DecoderConfig, DirectorySink, PacketReader, ReplaySource, ScanMode,
    SegmentReconstructor, Spacecraft, StopReason,
};
use std::fs;
use std::path::Path;

const APID: u16 = 0x20;

fn record(path: &Path, cycles: usize) -> Result<()> {
    let mut stream = Vec::new();
    for k in 0..cycles {
        for packet in cycle(Spacecraft::Msg4, k) {
            write_packet(&mut stream, APID, &packet)?;
        }
    }
    fs::write(path, stream)?;
    Ok(())
}

#[tokio::test]
async fn replayed_segment_lands_on_disk() -> Result<()> {
    let workspace = tempfile::tempdir()?;
    let recording = workspace.path().join("msg4.ccsds");
    let products = workspace.path().join("products");
    record(&recording, 1495)?;

    let config = DecoderConfig::for_mode(ScanMode::FullDisk);
    let reconstructor = SegmentReconstructor::with_geometry(
        config,
        geometry(ScanMode::FullDisk),
        DirectorySink::new(&products),
    )?;
    let source = ReplaySource::open(&recording, Spacecraft::Msg4.scid())?;
    let mut session = DecodeSession::start(source, reconstructor);

    let report = session.next_report().await.expect("one segment");
    assert_eq!(report.key, "2024-01-01_00-15-00");
    assert_eq!(report.source, Some(Spacecraft::Msg4));
    assert!(session.next_report().await.is_none());

    let exit = session.finish().await?;
    assert!(matches!(exit.stop, StopReason::EndOfStream));
    assert_eq!(exit.stats().packets_accepted, 1495 * 16);

    let dir = products.join(&report.key);
    for channel in 1..=12 {
        assert!(dir.join(image_file(&format!("SEVIRI-{channel}"))).is_file(), "missing channel {channel}");
    }

    let first = image::open(dir.join("SEVIRI-1.png"))?;
    let first = first.as_luma16().expect("16-bit grayscale");
    assert_eq!(first.dimensions(), (4, 4482));
    assert!(first.pixels().all(|p| p.0[0] != 0));

    let hrv = image::open(dir.join("SEVIRI-12.png"))?.into_luma16();
    assert_eq!(hrv.dimensions(), (6, 13500));

    let manifest: serde_yaml_ng::Value = serde_yaml_ng::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
    assert_eq!(manifest["source"].as_str(), Some("MSG-4"));
    assert_eq!(manifest["bit_depth"].as_u64(), Some(10));
    assert_eq!(manifest["has_timestamps"].as_bool(), Some(false));
    assert_eq!(manifest["images"].as_sequence().map(|s| s.len()), Some(12));
    Ok(())
}

#[tokio::test]
async fn unfinished_segment_is_discarded_at_end_of_input() -> Result<()> {
    let workspace = tempfile::tempdir()?;
    let recording = workspace.path().join("partial.ccsds");
    record(&recording, 100)?;

    let reader = PacketReader::open(&recording, Spacecraft::Msg4.scid())?;
    let reconstructor = SegmentReconstructor::with_geometry(
        DecoderConfig::for_mode(ScanMode::FullDisk),
        geometry(ScanMode::FullDisk),
        DirectorySink::new(workspace.path().join("products")),
    )?;
    let session = DecodeSession::start(ReplaySource::from_reader(reader), reconstructor);

    let exit = session.finish().await?;
    assert!(matches!(exit.stop, StopReason::EndOfStream));
    assert_eq!(exit.stats().segments_flushed, 0);
    assert!(!workspace.path().join("products").exists());
    Ok(())
}
