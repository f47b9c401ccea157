//! The kvs-shell executable starts a key-value server in-process and feeds it commands read from
//! STDIN, one per line, printing every result line to STDOUT.
//!
//! `kvs-shell [--db FILE] [--config FILE] [--transport mailbox|dispatch] [--pool naive|shared|rayon]
//!            [--read-tickets N] [--workers N] [--timeout-ms MS] [-v]...`
//!
//!     --db            the snapshot file (default: database.txt in the current directory)
//!     --config        a JSON configuration file, the other options override its values
//!     --transport     `mailbox` serves commands through the single-slot mailbox (default),
//!                     `dispatch` through the per-client channel dispatcher
//!     --pool          the dispatcher's thread pool
//!     --read-tickets  how many reads may run at once
//!     --workers       the dispatcher's thread count
//!     --timeout-ms    how long to wait for a response before giving up
//!
//! Logs go to STDERR. On end of input the server is shut down and a health report is logged.
//! Exits with a non-zero code if the server can't be started or stops responding.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::exit;
use std::sync::Arc;
use std::thread;

use clap::{arg_enum, crate_version, value_t, App, Arg, ArgMatches};
use kvs_mailbox::thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};
use kvs_mailbox::{
    Config, KvStore, KvsError, KvsServer, Mailbox, MailboxClient, MailboxServer, Result,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Transport {
        mailbox,
        dispatch
    }
}

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Pool {
        naive,
        shared,
        rayon
    }
}

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    config: Config,
    transport: Transport,
    pool: Pool,
}

impl Opt {
    /// builds the configuration from the `--config` file (if any) and the command line overrides
    /// # Errors
    /// returns [`KvsError::Parsing`] if one of the parameters is invalid
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let mut config = match matches.value_of("config") {
            Some(path) => Config::from_file(Path::new(path))?,
            None => Config::default(),
        };
        if let Some(db) = matches.value_of("db") {
            config.snapshot_path = db.into();
        }
        if matches.is_present("read-tickets") {
            config.read_tickets = value_t!(matches, "read-tickets", usize)
                .map_err(|e| KvsError::Parsing(e.message))?;
        }
        if matches.is_present("workers") {
            config.workers =
                value_t!(matches, "workers", u32).map_err(|e| KvsError::Parsing(e.message))?;
        }
        if matches.is_present("timeout-ms") {
            config.response_timeout_ms = Some(
                value_t!(matches, "timeout-ms", u64).map_err(|e| KvsError::Parsing(e.message))?,
            );
        }
        config.validate()?;

        Ok(Opt {
            config,
            transport: value_t!(matches, "transport", Transport).unwrap_or(Transport::mailbox),
            pool: value_t!(matches, "pool", Pool).unwrap_or(Pool::shared),
        })
    }
}

fn main() {
    let matches = App::new("kvs-shell")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("runs key-value commands read from stdin against an in-process server")
        .arg(Arg::with_name("db")
            .long("db")
            .value_name("FILE")
            .help("sets the snapshot file"))
        .arg(Arg::with_name("config")
            .long("config")
            .value_name("FILE")
            .help("reads settings from a JSON configuration file"))
        .arg(Arg::with_name("transport")
            .long("transport")
            .value_name("TRANSPORT")
            .possible_values(&Transport::variants())
            .default_value("mailbox")
            .help("the channel commands are sent over"))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .possible_values(&Pool::variants())
            .default_value("shared")
            .help("the thread pool used by the dispatch transport"))
        .arg(Arg::with_name("read-tickets")
            .long("read-tickets")
            .value_name("N")
            .help("sets how many reads may run at once"))
        .arg(Arg::with_name("workers")
            .long("workers")
            .value_name("N")
            .help("sets the number of dispatcher threads"))
        .arg(Arg::with_name("timeout-ms")
            .long("timeout-ms")
            .value_name("MS")
            .help("sets how long to wait for a response"))
        .arg(Arg::with_name("verbose")
            .short("v")
            .multiple(true)
            .help("logs more detail, repeat for more"))
        .get_matches();

    subscriber_config(matches.occurrences_of("verbose"));

    let opt = match Opt::build(&matches) {
        Ok(opt) => opt,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    if let Err(e) = run(opt) {
        error!("{}", e);
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    info!("kvs-shell {}", env!("CARGO_PKG_VERSION"));
    info!("transport: {}, snapshot: {:?}", opt.transport, opt.config.snapshot_path);
    let store = KvStore::open(&opt.config)?;

    let result = match (opt.transport, opt.pool) {
        (Transport::mailbox, _) => run_mailbox(store.clone(), &opt.config),
        (Transport::dispatch, Pool::naive) => {
            run_dispatch::<NaiveThreadPool>(store.clone(), &opt.config)
        }
        (Transport::dispatch, Pool::shared) => {
            run_dispatch::<SharedQueueThreadPool>(store.clone(), &opt.config)
        }
        (Transport::dispatch, Pool::rayon) => {
            run_dispatch::<RayonThreadPool>(store.clone(), &opt.config)
        }
    };

    info!("health: {}", serde_json::to_string(&store.health())?);
    result
}

fn run_mailbox(store: KvStore, config: &Config) -> Result<()> {
    let mailbox = Arc::new(Mailbox::new(config.max_message_len));
    let server = MailboxServer::new(Arc::clone(&mailbox), store);
    let server_thread = thread::Builder::new()
        .name("kvs-mailbox-server".into())
        .spawn(move || server.run())?;

    let client = MailboxClient::attach(Arc::clone(&mailbox), config.response_timeout());
    let result = session(|line| client.call(line));

    mailbox.close();
    match server_thread.join() {
        Ok(served) => served.and(result),
        Err(_) => Err(KvsError::StringErr("mailbox server thread panicked".into())),
    }
}

fn run_dispatch<P: ThreadPool>(store: KvStore, config: &Config) -> Result<()> {
    let handle = KvsServer::new(store, P::new(config.workers)?)
        .max_message_len(config.max_message_len)
        .response_timeout(config.response_timeout())
        .start()?;
    let client = handle.connect();
    let result = session(|line| client.call(line));
    handle.shutdown().and(result)
}

/// sends every non-empty line of STDIN through `call` and prints the results. A line that is too
/// long to send is reported in place of a result.
fn session<F>(mut call: F) -> Result<()>
where
    F: FnMut(&str) -> Result<String>,
{
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match call(&line) {
            Ok(response) => writeln!(out, "{}", response)?,
            Err(e @ KvsError::MessageTooLong { .. }) => writeln!(out, "ERROR: {}", e)?,
            Err(e) => return Err(e),
        }
    }
    out.flush()?;
    Ok(())
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(verbosity: u64) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        // log to stderr, stdout carries the command results
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
