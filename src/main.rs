#![cfg_attr(feature = "strict", deny(warnings))]
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use serde_json::{Map, Value};

use rsacc::checkpoint::{JsonDirStore, SqliteStore};
use rsacc::util::padded_hex;
use rsacc::{CheckpointStore, Config, ElementId, MembershipProof, Session};

/// Width of a rendered prime.
const PRIME_BYTES: usize = rsacc::hash_to_prime::HASH_BYTES;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// JSON configuration file; flags below override it.
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Number of threads (0 = one per core).
    #[clap(long, global = true)]
    threads: Option<usize>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a modulus and initial value into a fresh store.
    Setup {
        /// Checkpoint store: `*.sqlite`/`*.db` file or a directory.
        #[clap(long)]
        store: PathBuf,
        #[clap(long)]
        modulus_bits: Option<u32>,
    },
    /// Add identifiers (one hex string per line) to the accumulator.
    ///
    /// Continues from the latest checkpoint in the store, if any.
    Accumulate {
        #[clap(long)]
        store: PathBuf,
        /// Identifier file, or `-` for stdin.
        #[clap(long)]
        input: String,
        /// Identifiers to remove after the additions.
        #[clap(long)]
        delete: Option<PathBuf>,
        #[clap(long)]
        batch_size: Option<usize>,
        #[clap(long)]
        checkpoint_interval: Option<u64>,
        /// Write element -> witness here.
        #[clap(long)]
        witnesses: Option<PathBuf>,
        /// Write element -> prime here.
        #[clap(long)]
        primes: Option<PathBuf>,
    },
    /// Rebuild the accumulator from a checkpoint and check its integrity.
    Recover {
        #[clap(long)]
        store: PathBuf,
        /// Batch index; defaults to the latest.
        #[clap(long)]
        checkpoint: Option<u64>,
        #[clap(long)]
        witnesses: Option<PathBuf>,
        /// Recompute every witness and check it against the accumulator.
        #[clap(long)]
        check_witnesses: bool,
        /// Print a membership proof for this identifier.
        #[clap(long)]
        prove: Option<String>,
    },
    /// Check a membership proof (JSON) against a checkpoint.
    Verify {
        #[clap(long)]
        store: PathBuf,
        #[clap(long)]
        checkpoint: Option<u64>,
        #[clap(long)]
        proof: PathBuf,
    },
}

fn open_store(path: &Path) -> rsacc::Result<Box<dyn CheckpointStore>> {
    let sqlite = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("sqlite") | Some("db")
    );
    Ok(if sqlite {
        Box::new(SqliteStore::open(path)?)
    } else {
        Box::new(JsonDirStore::open(path)?)
    })
}

fn read_elements(input: &str) -> anyhow::Result<Vec<ElementId>> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(
            File::open(input).with_context(|| format!("opening {input}"))?,
        ))
    };
    let mut elements = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        elements.push(
            ElementId::new(&line).with_context(|| format!("{input}:{}", lineno + 1))?,
        );
    }
    Ok(elements)
}

fn write_table<'a, I>(path: &Path, rows: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (&'a ElementId, String)>,
{
    let map: Map<String, Value> = rows
        .into_iter()
        .map(|(x, value)| (x.to_string(), Value::String(value)))
        .collect();
    let mut writer = BufWriter::new(
        File::create(path).with_context(|| format!("creating {}", path.display()))?,
    );
    serde_json::to_writer_pretty(&mut writer, &map)?;
    writer.flush()?;
    Ok(())
}

fn write_witnesses<S: CheckpointStore>(
    session: &mut Session<S>,
    path: &Path,
) -> anyhow::Result<()> {
    let width = session.state().params().element_bytes();
    let table = session.witnesses()?;
    write_table(path, table.iter().map(|(x, w)| (x, padded_hex(w, width))))
}

fn accumulate(
    config: &Config,
    store: Box<dyn CheckpointStore>,
    input: &str,
    delete: Option<&Path>,
    witnesses: Option<&Path>,
    primes: Option<&Path>,
) -> anyhow::Result<()> {
    let mut session = match store.latest()? {
        Some(_) => Session::resume(config, store, None)?,
        None => {
            let params = store
                .load_parameters()
                .context("store has no parameters; run `setup` first")?;
            Session::new(params, config, store)?
        }
    };
    let elements = read_elements(input)?;
    let batches = elements.chunks(config.batch_size);
    let bar = ProgressBar::new(batches.len() as u64);
    let mut inserted = 0;
    for batch in batches {
        inserted += session.process_batch(batch)?.inserted.len();
        bar.inc(1);
    }
    bar.finish_and_clear();
    println!("inserted {inserted} of {} identifiers", elements.len());

    if let Some(path) = delete {
        let doomed = read_elements(&path.to_string_lossy())?;
        let removed = session.delete(&doomed)?;
        println!("removed {} identifiers", removed.len());
    }
    let batch_index = session.finish()?;
    let state = session.state();
    println!(
        "checkpoint {batch_index}: {} members, accumulator {}",
        state.members().len(),
        padded_hex(state.value(), state.params().element_bytes())
    );

    if let Some(path) = primes {
        let table = session.state().prime_table();
        write_table(
            path,
            table.iter().map(|(x, p)| (x, padded_hex(p.inner(), PRIME_BYTES))),
        )?;
    }
    if let Some(path) = witnesses {
        write_witnesses(&mut session, path)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: Args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(threads) = args.threads {
        config.threads = threads;
    }

    match args.command {
        Command::Setup {
            store,
            modulus_bits,
        } => {
            if let Some(bits) = modulus_bits {
                config.modulus_bits = bits;
            }
            config.validate()?;
            let mut store = open_store(&store)?;
            if store.load_parameters().is_ok() {
                bail!("store already holds parameters");
            }
            let bar = ProgressBar::new_spinner();
            bar.set_message(format!("generating {}-bit modulus", config.modulus_bits));
            bar.enable_steady_tick(100);
            let params = rsacc::primitives::Parameters::generate(
                config.modulus_bits,
                config.setup_candidate_budget,
            )?;
            bar.finish_and_clear();
            store.save_parameters(&params)?;
            println!(
                "modulus {}",
                padded_hex(params.modulus(), params.element_bytes())
            );
        }
        Command::Accumulate {
            store,
            input,
            delete,
            batch_size,
            checkpoint_interval,
            witnesses,
            primes,
        } => {
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(interval) = checkpoint_interval {
                config.checkpoint_interval = interval;
            }
            config.validate()?;
            accumulate(
                &config,
                open_store(&store)?,
                &input,
                delete.as_deref(),
                witnesses.as_deref(),
                primes.as_deref(),
            )?;
        }
        Command::Recover {
            store,
            checkpoint,
            witnesses,
            check_witnesses,
            prove,
        } => {
            let store = open_store(&store)?;
            let batch_index = match checkpoint {
                Some(index) => index,
                None => store.latest()?.context("store holds no checkpoints")?,
            };
            let mut session = Session::resume(&config, store, Some(batch_index))?;
            println!(
                "checkpoint {batch_index} verified: {} members",
                session.state().members().len()
            );
            if check_witnesses {
                let failed = session.verify_witnesses()?;
                if let Some(first) = failed.first() {
                    bail!("{} witnesses do not verify, first {first}", failed.len());
                }
                println!("all {} witnesses verify", session.state().members().len());
            }
            if let Some(path) = witnesses {
                write_witnesses(&mut session, &path)?;
            }
            if let Some(x) = prove {
                let proof = session.prove(&ElementId::new(&x)?)?;
                println!("{}", serde_json::to_string_pretty(&proof)?);
            }
        }
        Command::Verify {
            store,
            checkpoint,
            proof,
        } => {
            let store = open_store(&store)?;
            let params = store.load_parameters()?;
            let batch_index = match checkpoint {
                Some(index) => index,
                None => store.latest()?.context("store holds no checkpoints")?,
            };
            let checkpoint = store.load(batch_index)?;
            let file = File::open(&proof).with_context(|| format!("opening {}", proof.display()))?;
            let proof: MembershipProof = serde_json::from_reader(BufReader::new(file))?;
            if !proof.verify(&checkpoint.accumulator, params.modulus())? {
                bail!("{} is not a member at checkpoint {batch_index}", proof.element);
            }
            println!("{} is a member at checkpoint {batch_index}", proof.element);
        }
    }
    Ok(())
}
