//! Invitrack operator tool.
//!
//! Offline inspection and repair of a redb ledger file. The live engine is
//! embedded by the host; this binary only touches the ledger.
//!
//! # Usage
//!
//! ```bash
//! # Show an inviter's count
//! invitrack --db ledger.redb count --community 1 --inviter 42
//!
//! # Report counters that disagree with attribution records
//! invitrack --db ledger.redb check
//!
//! # Prune departed invitees and rebuild counters
//! invitrack --db ledger.redb reconcile --community 1 --members-file members.txt
//! ```
//!
//! Offline reconciliation fixes counts but applies no privilege changes; the
//! next online reconciliation evaluates the corrected counts.

use std::{collections::HashSet, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use invitrack_core::{CommunityId, MemberId};
use invitrack_server::{
    RedbStorage, RuntimeError, Storage,
    reconcile::{detect_drift, reconcile_ledger},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Invite attribution ledger tool
#[derive(Parser, Debug)]
#[command(name = "invitrack")]
#[command(about = "Inspect and repair an invite attribution ledger")]
#[command(version)]
struct Args {
    /// Path to the ledger database
    #[arg(long, default_value = "invitrack.redb")]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List communities present in the ledger
    Communities,

    /// Show an inviter's stored count
    Count {
        /// Community id
        #[arg(long)]
        community: u64,
        /// Inviter id
        #[arg(long)]
        inviter: u64,
    },

    /// List attribution records of a community
    Attributions {
        /// Community id
        #[arg(long)]
        community: u64,
    },

    /// List counters of a community
    Counters {
        /// Community id
        #[arg(long)]
        community: u64,
    },

    /// Report counters that disagree with attribution records
    Check {
        /// Only check this community
        #[arg(long)]
        community: Option<u64>,
    },

    /// Prune records of departed invitees, then rebuild counters
    Reconcile {
        /// Community id
        #[arg(long)]
        community: u64,
        /// File with one current member id per line (`#` starts a comment)
        #[arg(long)]
        members_file: PathBuf,
    },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let storage = RedbStorage::open(&args.db).map_err(RuntimeError::from)?;
    tracing::debug!(db = %args.db.display(), "ledger opened");

    run(&storage, args.command).map_err(Into::into)
}

fn run<S: Storage>(storage: &S, command: Command) -> Result<ExitCode, RuntimeError> {
    match command {
        Command::Communities => {
            let communities = storage.list_communities()?;
            for community in &communities {
                tracing::info!(%community, "community");
            }
            tracing::info!(total = communities.len(), "communities listed");
        },

        Command::Count { community, inviter } => {
            let count = storage.read_count(CommunityId(community), MemberId(inviter))?;
            tracing::info!(community, inviter, count, "invite count");
        },

        Command::Attributions { community } => {
            let records = storage.list_attributions(CommunityId(community))?;
            for record in &records {
                tracing::info!(
                    invitee = %record.invitee,
                    inviter = %record.inviter,
                    code = record.invite_code.as_deref().unwrap_or("-"),
                    attributed_at = record.attributed_at_secs,
                    "attribution"
                );
            }
            tracing::info!(community, total = records.len(), "attributions listed");
        },

        Command::Counters { community } => {
            let counters = storage.list_counters(CommunityId(community))?;
            for counter in &counters {
                tracing::info!(inviter = %counter.inviter, count = counter.count, "counter");
            }
            tracing::info!(community, total = counters.len(), "counters listed");
        },

        Command::Check { community } => {
            let communities = match community {
                Some(community) => vec![CommunityId(community)],
                None => storage.list_communities()?,
            };

            let mut drifted = 0usize;
            for community in communities {
                for drift in detect_drift(storage, community)? {
                    drifted += 1;
                    tracing::warn!(
                        %community,
                        inviter = %drift.inviter,
                        stored = drift.stored,
                        actual = drift.actual,
                        "counter drift"
                    );
                }
            }

            if drifted > 0 {
                tracing::warn!(drifted, "ledger inconsistent, run reconcile");
                return Ok(ExitCode::FAILURE);
            }
            tracing::info!("ledger consistent");
        },

        Command::Reconcile { community, members_file } => {
            let text = std::fs::read_to_string(&members_file)?;
            let members = parse_members(&text)?;

            let report = reconcile_ledger(storage, CommunityId(community), &members)?;
            for correction in &report.corrections {
                tracing::warn!(
                    inviter = %correction.inviter,
                    stored = correction.stored,
                    actual = correction.actual,
                    "counter corrected"
                );
            }
            tracing::info!(
                community,
                members = members.len(),
                pruned = report.pruned.len(),
                corrected = report.corrections.len(),
                "ledger reconciled"
            );
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Parse a member list: one id per line, blank lines and `#` comments
/// ignored.
fn parse_members(text: &str) -> Result<HashSet<MemberId>, RuntimeError> {
    let mut members = HashSet::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let id = line.parse::<u64>().map_err(|e| {
            RuntimeError::Config(format!("members file line {}: {line:?}: {e}", index + 1))
        })?;
        members.insert(MemberId(id));
    }

    Ok(members)
}
