//! Lunchbox Engine Runtime
//!
//! Headless batch driver: spawns and despawns meshes every frame, runs one
//! incremental defrag step per frame and logs batch telemetry.

use anyhow::{Context, Result};
use lunchbox_core::glam::Vec3;
use lunchbox_core::memory::{BatchError, MemoryError};
use lunchbox_core::{Batch, Entity, EntityAllocator, MeshData, RecordingSink};
use lunchbox_metrics::RingBuffer;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const FRAMES: u32 = 600;
const REPORT_EVERY: u32 = 120;
const TARGET_LIVE: usize = 48;

type HeadlessBatch = Batch<f32, RecordingSink>;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Lunchbox Engine v{}", lunchbox_core::VERSION);
    let path = std::env::args().nth(1).map(PathBuf::from);
    let settings =
        lunchbox_services::init_services(path.as_deref()).context("loading settings")?;

    let manager = settings
        .batch
        .manager::<f32, _>(RecordingSink::new())
        .context("creating batch")?;
    let mut batch = Batch::new(manager);
    info!(
        capacity = settings.batch.capacity,
        stride = settings.batch.stride,
        quick_limit = settings.batch.quick_defrag_limit,
        "batch ready"
    );

    let base = MeshData::quad(Vec3::ZERO, 0.5);
    let mut entities = EntityAllocator::default();
    let mut live: Vec<Entity> = Vec::new();
    let mut upload_rate = RingBuffer::new(60);
    let mut last_uploaded = 0;

    for frame in 0..FRAMES {
        for i in 0..(1 + frame % 3) {
            let entity = entities.spawn();
            let copies = 1 + ((frame + i) % 4) as usize;
            let mesh = tiled(&base, copies, frame as f32);
            match batch.add(entity, &mesh) {
                Ok(_) => live.push(entity),
                Err(BatchError::Memory(MemoryError::BatchFull { .. })) => {
                    warn!(frame, "batch full, mesh skipped");
                    entities.despawn(entity);
                }
                Err(err) => return Err(err).context("adding mesh"),
            }
        }

        while live.len() > TARGET_LIVE {
            let victim = live.swap_remove((frame as usize * 7) % live.len());
            batch.remove(victim).context("removing mesh")?;
            entities.despawn(victim);
        }

        batch.defrag_quick().context("incremental defrag")?;

        let uploaded = batch.manager().sink().uploaded_bytes();
        upload_rate.push((uploaded - last_uploaded) as f64);
        last_uploaded = uploaded;

        if (frame + 1) % REPORT_EVERY == 0 {
            report(frame + 1, &batch, &upload_rate);
        }
    }

    let compacted = batch.defrag_full().context("full defrag")?;
    info!(compacted, "shutdown compaction");
    report(FRAMES, &batch, &upload_rate);
    batch.manager().check_invariants()?;

    lunchbox_metrics::metrics! {
        for (counter, total) in batch.manager().counter().iter() {
            info!(counter, total, "batch counter");
        }
    }

    Ok(())
}

/// `copies` side-by-side copies of `base` at depth `z`, packed as one mesh.
fn tiled(base: &MeshData, copies: usize, z: f32) -> MeshData {
    let mut mesh = MeshData::default();
    for i in 0..copies {
        let tile = base.translated(Vec3::new(i as f32, 0.0, z));
        mesh.positions.extend(tile.positions);
        mesh.uvs.extend(tile.uvs);
        mesh.normals.extend(tile.normals);
    }
    mesh
}

fn report(frame: u32, batch: &HeadlessBatch, upload_rate: &RingBuffer) {
    let stats = batch.stats();
    info!(
        frame,
        owners = batch.len(),
        used = stats.used,
        free = stats.free,
        gaps = stats.gap_count,
        cursor = stats.write_cursor,
        fragmentation = stats.fragmentation(),
        avg_upload_bytes = upload_rate.average(),
        peak_upload_bytes = upload_rate.peak(),
        "batch status"
    );
}
