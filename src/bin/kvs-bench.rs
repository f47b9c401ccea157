//! The kvs-bench executable starts a key-value server in-process and drives it with many
//! concurrent clients, each issuing random `CREATE`, `READ`, `UPDATE` and `DELETE` commands.
//!
//! `kvs-bench [--clients N] [--ops N] [--keys N] [--db FILE] [--transport mailbox|dispatch]
//!            [--pool naive|shared|rayon] [--read-tickets N] [--workers N] [--seed N]
//!            [--unsynchronized] [-v]...`
//!
//!     --clients         number of concurrent client threads (default 100)
//!     --ops             commands issued by each client (default 10)
//!     --keys            keys are drawn from 1..=N (default 100)
//!     --seed            seeds the command generator, for repeatable runs
//!     --unsynchronized  with the mailbox transport, skip the session lock and use the raw
//!                       submit/await handshake. Responses can then reach the wrong client;
//!                       the run reports how many did.
//!
//! Every response is printed as `Client <id> received: <response>`, followed by a per-client
//! timing line and a summary.

use std::io::{self, Write};
use std::process::exit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::{arg_enum, crate_version, value_t, App, Arg, ArgMatches};
use kvs_mailbox::thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};
use kvs_mailbox::{
    Config, KvStore, KvsError, KvsServer, Mailbox, MailboxServer, Request, Result,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn, Level};
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
    clients: u32,
    ops: u32,
    keys: u32,
    seed: Option<u64>,
    unsynchronized: bool,
}

impl Opt {
    /// validates the numeric parameters
    /// # Errors
    /// returns [`KvsError::Parsing`] if one of the parameters is invalid
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let parse_err = |e: clap::Error| KvsError::Parsing(e.message);
        let mut config = Config::default();
        if let Some(db) = matches.value_of("db") {
            config.snapshot_path = db.into();
        }
        config.read_tickets = value_t!(matches, "read-tickets", usize).map_err(parse_err)?;
        config.workers = value_t!(matches, "workers", u32).map_err(parse_err)?;
        config.validate()?;

        let keys = value_t!(matches, "keys", u32).map_err(parse_err)?;
        if keys == 0 {
            return Err(KvsError::Parsing("--keys must be at least 1".into()));
        }
        let seed = if matches.is_present("seed") {
            Some(value_t!(matches, "seed", u64).map_err(parse_err)?)
        } else {
            None
        };

        Ok(Opt {
            config,
            transport: value_t!(matches, "transport", Transport).unwrap_or(Transport::mailbox),
            pool: value_t!(matches, "pool", Pool).unwrap_or(Pool::shared),
            clients: value_t!(matches, "clients", u32).map_err(parse_err)?,
            ops: value_t!(matches, "ops", u32).map_err(parse_err)?,
            keys,
            seed,
            unsynchronized: matches.is_present("unsynchronized"),
        })
    }
}

fn main() {
    let matches = App::new("kvs-bench")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("drives an in-process key-value server with concurrent random clients")
        .arg(Arg::with_name("clients")
            .long("clients")
            .value_name("N")
            .default_value("100")
            .help("sets the number of concurrent clients"))
        .arg(Arg::with_name("ops")
            .long("ops")
            .value_name("N")
            .default_value("10")
            .help("sets the number of commands each client issues"))
        .arg(Arg::with_name("keys")
            .long("keys")
            .value_name("N")
            .default_value("100")
            .help("keys are drawn from 1..=N"))
        .arg(Arg::with_name("db")
            .long("db")
            .value_name("FILE")
            .help("sets the snapshot file"))
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
            .default_value("10")
            .help("sets how many reads may run at once"))
        .arg(Arg::with_name("workers")
            .long("workers")
            .value_name("N")
            .default_value("4")
            .help("sets the number of dispatcher threads"))
        .arg(Arg::with_name("seed")
            .long("seed")
            .value_name("N")
            .help("seeds the random command generator"))
        .arg(Arg::with_name("unsynchronized")
            .long("unsynchronized")
            .help("uses the raw mailbox handshake without the session lock"))
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
    info!("kvs-bench {}", env!("CARGO_PKG_VERSION"));
    let store = KvStore::open(&opt.config)?;
    let start = Instant::now();

    let mismatched = match (opt.transport, opt.pool) {
        (Transport::mailbox, _) => run_mailbox(store.clone(), &opt),
        (Transport::dispatch, Pool::naive) => run_dispatch::<NaiveThreadPool>(store.clone(), &opt),
        (Transport::dispatch, Pool::shared) => {
            run_dispatch::<SharedQueueThreadPool>(store.clone(), &opt)
        }
        (Transport::dispatch, Pool::rayon) => run_dispatch::<RayonThreadPool>(store.clone(), &opt),
    }?;

    let elapsed = start.elapsed().as_secs_f64();
    let total = u64::from(opt.clients) * u64::from(opt.ops);
    println!(
        "{} clients completed {} operations in {:.6} seconds ({:.0} ops/s)",
        opt.clients,
        total,
        elapsed,
        total as f64 / elapsed.max(f64::EPSILON)
    );
    if mismatched > 0 {
        warn!("{} responses answered another client's request", mismatched);
        println!("{} responses answered another client's request", mismatched);
    }
    info!("health: {}", serde_json::to_string(&store.health())?);
    Ok(())
}

fn run_mailbox(store: KvStore, opt: &Opt) -> Result<usize> {
    let mailbox = Arc::new(Mailbox::new(opt.config.max_message_len));
    let server = MailboxServer::new(Arc::clone(&mailbox), store);
    let server_thread = thread::Builder::new()
        .name("kvs-mailbox-server".into())
        .spawn(move || server.run())?;

    let timeout = opt.config.response_timeout();
    let result = if opt.unsynchronized {
        drive(opt, |line| {
            mailbox.submit(line, timeout)?;
            mailbox.await_response(timeout)
        })
    } else {
        drive(opt, |line| mailbox.call(line, timeout))
    };

    mailbox.close();
    match server_thread.join() {
        Ok(served) => served.and(result),
        Err(_) => Err(KvsError::StringErr("mailbox server thread panicked".into())),
    }
}

fn run_dispatch<P: ThreadPool>(store: KvStore, opt: &Opt) -> Result<usize> {
    let handle = KvsServer::new(store, P::new(opt.config.workers)?)
        .max_message_len(opt.config.max_message_len)
        .start()?;
    let client = handle.connect();
    let result = drive(opt, |line| client.call(line));
    handle.shutdown().and(result)
}

/// runs `opt.clients` client threads that each send `opt.ops` random commands through `call`.
/// Returns the number of responses that did not answer the request they were received for.
fn drive<F>(opt: &Opt, call: F) -> Result<usize>
where
    F: Fn(&str) -> Result<String> + Sync,
{
    let mismatched = AtomicUsize::new(0);
    let outcome = crossbeam::scope(|scope| {
        let workers: Vec<_> = (1..=opt.clients)
            .map(|id| {
                let call = &call;
                let mismatched = &mismatched;
                scope.spawn(move |_| -> Result<()> {
                    let mut rng = match opt.seed {
                        Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(u64::from(id))),
                        None => SmallRng::from_entropy(),
                    };
                    let start = Instant::now();
                    for _ in 0..opt.ops {
                        let req = random_request(&mut rng, opt.keys);
                        let response = call(&req.to_line()?)?;
                        if !answers(&req, &response) {
                            mismatched.fetch_add(1, Ordering::Relaxed);
                        }
                        print_line(&format!("Client {} received: {}", id, response));
                    }
                    print_line(&format!(
                        "Client {} completed all operations in {:.6} seconds.",
                        id,
                        start.elapsed().as_secs_f64()
                    ));
                    Ok(())
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|w| {
                w.join()
                    .unwrap_or_else(|_| Err(KvsError::StringErr("client thread panicked".into())))
            })
            .collect::<Result<Vec<()>>>()
    });

    match outcome {
        Ok(clients) => clients.map(|_| mismatched.into_inner()),
        Err(_) => Err(KvsError::StringErr("client thread panicked".into())),
    }
}

/// generates one of the four commands with equal probability, for a key in `1..=keys` and a
/// value `value_<1..=100>`
fn random_request(rng: &mut SmallRng, keys: u32) -> Request {
    let key = rng.gen_range(1..=keys).to_string();
    let value = format!("value_{}", rng.gen_range(1..=100));
    match rng.gen_range(1..=4) {
        1 => Request::Create { key, value },
        2 => Request::Read { key },
        3 => Request::Update { key, value },
        _ => Request::Delete { key },
    }
}

/// `true` if `response` is a possible answer to `req`
fn answers(req: &Request, response: &str) -> bool {
    let not_found = |key: &str| response == format!("ERROR: Key {} not found", key);
    match req {
        Request::Create { key, .. } => response == format!("SUCCESS: CREATE for {}", key),
        Request::Update { key, .. } => response == format!("SUCCESS: UPDATE for {}", key),
        Request::Read { key } => response.starts_with(&format!("READ: {} => ", key)) || not_found(key),
        Request::Delete { key } => response == format!("SUCCESS: DELETE {}", key) || not_found(key),
    }
}

fn print_line(line: &str) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = writeln!(out, "{}", line) {
        error!("could not write to stdout: {}", e);
    }
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
        // log to stderr, stdout carries the client output
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
