use std::{io::Write, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use persistent_structures::{
    ctx,
    utillib::logging::{init_logging, LogLevelOpt},
    BoundedQueue, DirMap, DirMapConfig, DirQueue, DirQueueConfig, EntryKind, FsSync, Value,
};

#[derive(clap::Parser, Debug)]
#[clap(next_line_help = true)]
/// Use a directory as a key-value map (file names are keys, file
/// contents values) or as a queue (numbered files). Mostly an example
/// of the use of the library, but usable from shell scripts, too.
struct Opts {
    #[clap(flatten)]
    log_level: LogLevelOpt,

    /// Do not fsync written files and directories
    #[clap(long)]
    no_sync: bool,

    #[clap(subcommand)]
    subcommand: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Access a directory as a map
    Map {
        /// The path to the directory holding the map
        path: PathBuf,

        #[clap(subcommand)]
        command: MapCommand,
    },
    /// Access a directory as a queue
    Queue {
        /// The path to the directory holding the queue
        path: PathBuf,

        /// JSON file with the queue configuration (`file_prefix`,
        /// `max_size`, `sync`); the options below override it
        #[clap(long)]
        config: Option<PathBuf>,

        /// The prefix of the entry file names (default: "FSList-")
        #[clap(long)]
        prefix: Option<String>,

        /// Maximum number of entries for `put` (0: unbounded)
        #[clap(long)]
        max_size: Option<usize>,

        #[clap(subcommand)]
        command: QueueCommand,
    },
}

#[derive(clap::Subcommand, Debug)]
enum MapCommand {
    /// Print the value for a key (for subdirectories, their keys)
    Get { key: String },
    /// Set the value for a key
    Set { key: String, value: String },
    /// Delete a key
    Delete { key: String },
    /// List the keys, directories with a trailing '/'
    List,
    /// Print the number of keys
    Len,
}

#[derive(clap::Subcommand, Debug)]
enum QueueCommand {
    /// Append a value
    Put {
        value: String,

        /// Wait for room in a full queue, for at most this many
        /// seconds (default: fail right away)
        #[clap(long)]
        wait: Option<f64>,
    },
    /// Remove and print the front value
    Get {
        /// Wait for an entry in an empty queue, for at most this
        /// many seconds (default: fail right away)
        #[clap(long)]
        wait: Option<f64>,
    },
    /// Print the front value without removing it
    Peek,
    /// Print the number of entries
    Size,
    /// List the entries in queue order
    List,
    /// Put back entries claimed by consumers that died
    Recover,
}

fn print_value(value: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(value.as_bytes())?;
    if !value.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn run_map(map: DirMap, command: MapCommand) -> Result<()> {
    match command {
        MapCommand::Get { key } => match map.get(&key)? {
            Value::Text(s) => print_value(&s)?,
            Value::Nested(sub) => {
                for key in sub.keys()? {
                    println!("{}", key?);
                }
            }
        },
        MapCommand::Set { key, value } => map.set(&key, &value)?,
        MapCommand::Delete { key } => map.delete(&key)?,
        MapCommand::List => {
            for entry in map.entries()? {
                let (key, kind) = entry?;
                match kind {
                    EntryKind::File => println!("{key}"),
                    EntryKind::Directory => println!("{key}/"),
                }
            }
        }
        MapCommand::Len => println!("{}", map.len()?),
    }
    Ok(())
}

fn timeout(wait: Option<f64>) -> Result<Option<Duration>> {
    wait.map(|secs| {
        Duration::try_from_secs_f64(secs).with_context(|| anyhow!("invalid --wait value {secs}"))
    })
    .transpose()
}

fn run_queue(queue: DirQueue, command: QueueCommand) -> Result<()> {
    match command {
        QueueCommand::Put { value, wait } => {
            let timeout = timeout(wait)?;
            BoundedQueue::new(queue).put(&value, timeout.is_some(), timeout)?
        }
        QueueCommand::Get { wait } => {
            let timeout = timeout(wait)?;
            let value = BoundedQueue::new(queue).get(timeout.is_some(), timeout)?;
            print_value(&value)?
        }
        QueueCommand::Peek => print_value(&queue.peek()?)?,
        QueueCommand::Size => println!("{}", queue.size()?),
        QueueCommand::List => {
            for name in queue.sorted_entries()? {
                println!("{}", name.file_name());
            }
        }
        QueueCommand::Recover => {
            let n = queue.recover_claims()?;
            log::info!("restored {n} entries");
        }
    }
    Ok(())
}

fn load_queue_config(path: &PathBuf) -> Result<DirQueueConfig> {
    let s = std::fs::read_to_string(path).map_err(ctx!("loading config file from {path:?}"))?;
    serde_json::from_str(&s).map_err(ctx!("decoding JSON from config file {path:?}"))
}

fn main() -> Result<()> {
    let Opts {
        log_level,
        no_sync,
        subcommand,
    } = Opts::parse();
    init_logging(log_level.into());

    match subcommand {
        SubCommand::Map { path, command } => {
            let mut config = DirMapConfig::default();
            if no_sync {
                config.sync = FsSync::No;
            }
            let map = DirMap::open(&path, config)?;
            run_map(map, command)
        }
        SubCommand::Queue {
            path,
            config,
            prefix,
            max_size,
            command,
        } => {
            let mut config = match config {
                Some(config_path) => load_queue_config(&config_path)?,
                None => DirQueueConfig::default(),
            };
            if let Some(prefix) = prefix {
                config.file_prefix = prefix;
            }
            if let Some(max_size) = max_size {
                config.max_size = max_size;
            }
            if no_sync {
                config.sync = FsSync::No;
            }
            let queue = DirQueue::open(&path, config)?;
            run_queue(queue, command)
        }
    }
}
