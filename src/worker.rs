use crate::cell::Cell;
use crate::cluster::{ClusterError, PeerChannel, RootChannel};
use crate::config::{ConfigError, SimConfig};
use crate::engine::CaEngine;
use crate::grid::{BoundPolicy, CellGrid, GridError};
use crate::partition::{Layout, PartitionError, Sector};
use crate::selection;
use crate::shm::{RetryPolicy, SharedRow, ShmClient, ShmError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::net::{SocketAddr, TcpListener};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Shm(#[from] ShmError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub rank: usize,
    pub workers: usize,
    /// Address of the shared-memory coordinator.
    pub coordinator: SocketAddr,
    /// Address the root worker (rank 0) listens on for barrier and gather
    /// traffic; rank 0 binds it, everyone else connects to it.
    pub root: SocketAddr,
}

enum Role {
    Root(RootChannel),
    Peer(PeerChannel),
}

/// Fill a sector with the initial material layout, expressed in global
/// coordinates and shifted by the sector's offset. Regions outside the band
/// clip against the ignored top/bottom edges.
pub fn seed_sector(sector: &mut Sector, cfg: &SimConfig) -> Result<(), GridError> {
    let y_offset = sector.geometry.y_offset;
    let width = cfg.grid_width();
    let ground = cfg.ground_row();
    let seam = cfg.seam_rows();

    sector.grid.fill(Cell::Earth);
    sector.grid.fill_rect(
        0,
        ground - y_offset,
        width,
        cfg.grid_height() - ground,
        Cell::Air,
    )?;
    sector.grid.fill_rect(0, -y_offset, width, seam, Cell::Coal)?;
    // One drill column at the tunnel mouth, spanning the seam.
    sector.grid.fill_rect(
        (width - cfg.drill_cells()) / 2,
        -y_offset,
        1,
        seam,
        Cell::Drill,
    )?;
    Ok(())
}

/// Run one worker to completion. Returns the merged global grid at the root
/// worker and `None` everywhere else.
pub fn run(cfg: &SimConfig, opts: &WorkerOptions) -> Result<Option<CellGrid>, WorkerError> {
    cfg.validate(opts.workers + 1)?;
    let layout = Layout::new(cfg.grid_width(), cfg.grid_height(), opts.workers)?;
    let geo = layout.geometry(opts.rank);

    let mut sector = Sector::new(geo)?;
    seed_sector(&mut sector, cfg)?;
    debug!(
        rank = opts.rank,
        y_offset = geo.y_offset,
        height = geo.height,
        "sector seeded"
    );

    let retry = RetryPolicy {
        max_attempts: cfg.lock_retry_limit,
        delay: Duration::from_micros(cfg.lock_retry_delay_us),
    };
    let client = ShmClient::connect(
        opts.coordinator,
        opts.rank as u32,
        geo.width as usize,
        retry,
    )?;
    let mut shared = SharedRow::new(client);

    let top_row = sector.top_row();
    let block_above = layout.block_above(opts.rank);
    let block_below = layout.block_below(opts.rank);

    // Publish this sector's shared top row before anyone can read it.
    if let Some(block) = block_above {
        shared.init(block, sector.grid.row(top_row))?;
    }

    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(opts.rank as u64)),
        None => StdRng::from_os_rng(),
    };
    let engine = CaEngine::new(selection::gaussian_offsets(0.0, 3.0, -3, 3), cfg.kill_bubble());

    let mut role = if opts.rank == 0 {
        let listener = TcpListener::bind(opts.root).map_err(ClusterError::Io)?;
        Role::Root(RootChannel::accept_peers(listener, opts.workers - 1)?)
    } else {
        Role::Peer(PeerChannel::connect(opts.root, opts.rank as u32, retry)?)
    };

    // Startup barrier: a peer attaches to the root only after publishing its
    // boundary row, and nobody passes this barrier until every peer has
    // attached. No worker can read a neighbour's block before it is seeded.
    match &mut role {
        Role::Root(channel) => channel.barrier(0)?,
        Role::Peer(channel) => channel.barrier(0)?,
    }

    if opts.rank == 0 {
        info!(
            workers = opts.workers,
            iterations = cfg.iterations,
            "running simulation"
        );
    }
    let started = Instant::now();

    let update_top = top_row - 1;
    for iteration in 1..=cfg.iterations {
        if opts.rank == 0 && cfg.iterations >= 10 && iteration % (cfg.iterations / 10) == 0 {
            info!(pct = 100 * iteration / cfg.iterations, "simulation progress");
        }

        for y in (0..=update_top).rev() {
            // Bracket the two shared rows: refresh from the coordinator just
            // before the row is read or written, write back right after.
            if y == update_top {
                if let Some(block) = block_above {
                    shared.obtain(block, sector.grid.row_mut(top_row))?;
                }
            }
            if y == 0 {
                if let Some(block) = block_below {
                    shared.obtain(block, sector.grid.row_mut(0))?;
                }
            }

            engine.update_row(&mut sector.grid, y, &mut rng)?;

            if y == update_top && block_above.is_some() {
                shared.release(sector.grid.row(top_row))?;
            }
            if y == 0 && block_below.is_some() {
                shared.release(sector.grid.row(0))?;
            }
        }

        match &mut role {
            Role::Root(channel) => channel.barrier(iteration)?,
            Role::Peer(channel) => channel.barrier(iteration)?,
        }
    }

    match role {
        Role::Peer(mut channel) => {
            channel.send_sector(geo.y_offset, geo.width, geo.height, sector.grid.as_bytes())?;
            Ok(None)
        }
        Role::Root(mut channel) => {
            info!("collecting results");
            let mut global = CellGrid::with_size(cfg.grid_width(), cfg.grid_height())?;
            global.set_all_bounds(BoundPolicy::Reject);
            global.copy_cells(sector.grid.as_bytes(), geo.width, geo.height, 0, geo.y_offset)?;
            channel.gather(&mut global)?;
            info!(elapsed = ?started.elapsed(), "simulation finished");
            shared.terminate()?;
            Ok(Some(global))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimConfig {
        SimConfig {
            width: 10,
            height: 10,
            iterations: 4,
            coal_seam_height: 2,
            drill_length: 4,
            ground_height: 7,
            seed: Some(1),
            ..SimConfig::default()
        }
    }

    #[test]
    fn bottom_sector_gets_seam_and_drill() {
        let cfg = small_config();
        let layout = Layout::new(10, 10, 2).unwrap();
        let mut sector = Sector::new(layout.geometry(0)).unwrap();
        seed_sector(&mut sector, &cfg).unwrap();

        // Seam spans the two bottom rows, with the drill column at x=3.
        for x in 0..10 {
            for y in 0..2 {
                let expected = if x == 3 { Cell::Drill } else { Cell::Coal };
                assert_eq!(sector.grid.get(x, y).unwrap(), expected);
            }
        }
        // The rest of this band is earth; the air line is above it.
        for y in 2..sector.geometry.height {
            assert_eq!(sector.grid.get(0, y).unwrap(), Cell::Earth);
        }
    }

    #[test]
    fn top_sector_gets_the_air_line() {
        let cfg = small_config();
        let layout = Layout::new(10, 10, 2).unwrap();
        let mut sector = Sector::new(layout.geometry(1)).unwrap();
        seed_sector(&mut sector, &cfg).unwrap();

        // Global ground row 7 is local row 2 of this band (offset 5).
        for x in 0..10 {
            assert_eq!(sector.grid.get(x, 1).unwrap(), Cell::Earth);
            assert_eq!(sector.grid.get(x, 2).unwrap(), Cell::Air);
            assert_eq!(sector.grid.get(x, 4).unwrap(), Cell::Air);
        }
    }
}
