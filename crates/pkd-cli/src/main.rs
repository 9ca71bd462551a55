use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{admin, stock, work, GlobalOpts};

#[derive(Parser, Debug)]
#[command(name = "pkd")]
#[command(about = "Picking desk CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> site -> local)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    /// JSON order feed used as the remote platform snapshot
    #[arg(long, global = true)]
    feed: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Claim the next order for a worker
    Claim {
        #[arg(long)]
        worker_id: String,

        #[arg(long)]
        worker_name: String,
    },

    /// Move an assignment to a new state
    Transition {
        #[arg(long)]
        assignment_id: String,

        /// assigned | preparing | waiting | completed | cancelled
        #[arg(long)]
        to: String,

        /// Acting worker. Omit to act as administrator.
        #[arg(long)]
        worker_id: Option<String>,

        /// Record the state locally without pushing it to the platform
        #[arg(long, default_value_t = false)]
        skip_remote_sync: bool,

        #[arg(long)]
        note: Option<String>,
    },

    /// Print one assignment (active or archived)
    Show {
        #[arg(long)]
        assignment_id: String,
    },

    /// List active assignments, or the one held by --worker-id
    Active {
        #[arg(long)]
        worker_id: Option<String>,
    },

    /// Counts by state and by worker
    Stats,

    /// Re-read order snapshots from the feed
    Refresh {
        /// Single assignment; all active when omitted
        #[arg(long)]
        assignment_id: Option<String>,
    },

    /// Retry pending remote status pushes
    RetrySyncs {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Run periodic refresh and sync retry until interrupted
    Watch {
        #[arg(long, default_value_t = 50)]
        batch: usize,
    },

    /// Supervisor operations
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },

    /// Stock counting
    Stock {
        #[command(subcommand)]
        cmd: StockCmd,
    },
}

#[derive(Subcommand, Debug)]
enum DbCmd {
    Status,

    /// Apply SQL migrations
    Migrate,
}

#[derive(Subcommand, Debug)]
enum AdminCmd {
    /// Move assignments to another worker
    Reassign {
        #[arg(required = true)]
        assignment_ids: Vec<String>,

        #[arg(long)]
        worker_id: String,

        #[arg(long)]
        worker_name: String,
    },

    /// Release the claim lock of completed or cancelled assignments; history is kept
    Reopen {
        #[arg(required = true)]
        assignment_ids: Vec<String>,
    },

    /// Delete active assignments and their claim locks so the orders can be claimed again
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,

        /// Treat keys as order ids instead of assignment ids
        #[arg(long, default_value_t = false)]
        orders: bool,
    },

    /// Cancel assignments on behalf of their workers
    Release {
        #[arg(required = true)]
        assignment_ids: Vec<String>,

        #[arg(long)]
        reason: String,
    },

    /// Priority queue management
    Priority {
        #[command(subcommand)]
        cmd: PriorityCmd,
    },

    /// Set or clear assignment notes
    Notes {
        #[arg(long)]
        assignment_id: String,

        /// New text; omit to clear
        #[arg(long)]
        text: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PriorityCmd {
    /// Mark an unclaimed order as high priority
    Mark {
        #[arg(long)]
        order_id: String,

        #[arg(long)]
        reason: String,

        #[arg(long)]
        notes: Option<String>,
    },

    Unmark {
        #[arg(long)]
        order_id: String,
    },

    List,

    /// Flag a claimed assignment; omit --reason to clear
    Set {
        #[arg(long)]
        assignment_id: String,

        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum StockCmd {
    /// Compute the quantity to publish for a physical count
    Reconcile {
        #[arg(long)]
        sku: String,

        /// Physical count as entered (fractions are rounded)
        #[arg(long, allow_negative_numbers = true)]
        count: f64,

        /// Stock currently published on the platform
        #[arg(long, allow_negative_numbers = true)]
        current: i64,

        /// override | increment
        #[arg(long, default_value = "override")]
        mode: String,
    },

    /// Record the bin a SKU lives in
    SetLocation {
        #[arg(long)]
        sku: String,

        #[arg(long)]
        bin: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let opts = GlobalOpts {
        config_paths: cli.config_paths,
        feed: cli.feed,
    };

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = pkd_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = pkd_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_assignments_table={}",
                        s.ok, s.has_assignments_table
                    );
                }
                DbCmd::Migrate => {
                    pkd_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = pkd_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Claim {
            worker_id,
            worker_name,
        } => work::claim(&opts, worker_id, worker_name).await?,

        Commands::Transition {
            assignment_id,
            to,
            worker_id,
            skip_remote_sync,
            note,
        } => {
            work::transition(
                &opts,
                work::TransitionArgs {
                    assignment_id,
                    to,
                    worker_id,
                    skip_remote_sync,
                    note,
                },
            )
            .await?
        }

        Commands::Show { assignment_id } => work::show(&opts, assignment_id).await?,
        Commands::Active { worker_id } => work::active(&opts, worker_id).await?,
        Commands::Stats => work::stats(&opts).await?,
        Commands::Refresh { assignment_id } => work::refresh(&opts, assignment_id).await?,
        Commands::RetrySyncs { limit } => work::retry_syncs(&opts, limit).await?,
        Commands::Watch { batch } => work::watch(&opts, batch).await?,

        Commands::Admin { cmd } => match cmd {
            AdminCmd::Reassign {
                assignment_ids,
                worker_id,
                worker_name,
            } => admin::reassign(&opts, assignment_ids, worker_id, worker_name).await?,
            AdminCmd::Reopen { assignment_ids } => admin::reopen(&opts, assignment_ids).await?,
            AdminCmd::Remove { keys, orders } => admin::remove(&opts, keys, orders).await?,
            AdminCmd::Release {
                assignment_ids,
                reason,
            } => admin::release(&opts, assignment_ids, reason).await?,
            AdminCmd::Priority { cmd } => match cmd {
                PriorityCmd::Mark {
                    order_id,
                    reason,
                    notes,
                } => admin::priority_mark(&opts, order_id, reason, notes).await?,
                PriorityCmd::Unmark { order_id } => admin::priority_unmark(&opts, order_id).await?,
                PriorityCmd::List => admin::priority_list(&opts).await?,
                PriorityCmd::Set {
                    assignment_id,
                    reason,
                } => admin::priority_set(&opts, assignment_id, reason).await?,
            },
            AdminCmd::Notes {
                assignment_id,
                text,
            } => admin::notes(&opts, assignment_id, text).await?,
        },

        Commands::Stock { cmd } => match cmd {
            StockCmd::Reconcile {
                sku,
                count,
                current,
                mode,
            } => {
                stock::reconcile(
                    &opts,
                    stock::ReconcileArgs {
                        sku,
                        count,
                        current,
                        mode,
                    },
                )
                .await?
            }
            StockCmd::SetLocation { sku, bin } => stock::set_location(&opts, sku, bin).await?,
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_config_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pkd", "claim", "--worker-id", "w1", "--worker-name", "Ana", "--config", "a.yaml",
            "--config", "b.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config_paths, vec!["a.yaml", "b.yaml"]);
        assert!(matches!(cli.cmd, Commands::Claim { .. }));
    }

    #[test]
    fn remove_by_order_flag() {
        let cli = Cli::try_parse_from(["pkd", "admin", "remove", "--orders", "1001", "1002"]).unwrap();
        match cli.cmd {
            Commands::Admin {
                cmd: AdminCmd::Remove { keys, orders },
            } => {
                assert!(orders);
                assert_eq!(keys, vec!["1001", "1002"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn admin_help_describes_reopen_and_remove() {
        use clap::CommandFactory;

        let cmd = Cli::command();
        let admin = cmd.find_subcommand("admin").unwrap();
        let about = |name: &str| {
            admin
                .find_subcommand(name)
                .and_then(|c| c.get_about())
                .map(|a| a.to_string())
                .unwrap_or_default()
        };

        let reopen = about("reopen");
        assert!(reopen.contains("completed or cancelled"), "{reopen}");
        assert!(reopen.contains("history is kept"), "{reopen}");

        let remove = about("remove");
        assert!(remove.contains("active"), "{remove}");
        assert!(remove.contains("claimed again"), "{remove}");
        assert!(!remove.contains("protected"), "{remove}");
    }

    #[test]
    fn release_requires_reason() {
        let err = Cli::try_parse_from(["pkd", "admin", "release", "7c3e8a52-0000-4000-8000-000000000000"]);
        assert!(err.is_err());
    }

    #[test]
    fn stock_reconcile_accepts_fractional_count() {
        let cli = Cli::try_parse_from([
            "pkd", "stock", "reconcile", "--sku", "SKU-1", "--count", "2.5", "--current", "10",
            "--mode", "increment",
        ])
        .unwrap();
        match cli.cmd {
            Commands::Stock {
                cmd: StockCmd::Reconcile { count, mode, .. },
            } => {
                assert_eq!(count, 2.5);
                assert_eq!(mode, "increment");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
